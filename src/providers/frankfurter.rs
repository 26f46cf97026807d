use super::util::{self, ResilientFetcher};
use crate::core::error::{Error, Result};
use crate::core::rate::{CurrencyPair, ExchangeRate, ProviderQuote, RateSource, SourceKind};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

const PROVIDER: &str = "Frankfurter";

#[derive(Debug, Deserialize)]
struct FrankfurterResponse {
    base: Option<String>,
    #[serde(default)]
    rates: HashMap<String, Decimal>,
}

/// ECB reference rates republished by frankfurter.app, keyed by date.
pub struct FrankfurterSource {
    base_url: String,
    client: reqwest::Client,
    fetcher: ResilientFetcher,
}

impl FrankfurterSource {
    pub fn new(base_url: &str, client: reqwest::Client, fetcher: ResilientFetcher) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            fetcher,
        }
    }
}

#[async_trait]
impl RateSource for FrankfurterSource {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Fallback
    }

    #[instrument(name = "FrankfurterFetch", skip_all, fields(pair = %pair, date = %date))]
    async fn fetch_rate(
        &self,
        pair: &CurrencyPair,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>> {
        let url = format!(
            "{}/{}?from={}&to={}",
            self.base_url,
            date.format("%Y-%m-%d"),
            pair.base,
            pair.quote
        );
        let data: FrankfurterResponse = match self
            .fetcher
            .execute(
                || util::get_json(&self.client, PROVIDER, &url),
                Error::is_retryable,
            )
            .await
        {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                debug!("Frankfurter has no rates for {}", date);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let base = data
            .base
            .map(|b| b.to_uppercase())
            .unwrap_or_else(|| pair.base.clone());
        let counter = if base == pair.quote { &pair.base } else { &pair.quote };
        let Some(value) = data.rates.get(counter) else {
            debug!("No {} rate in Frankfurter response", counter);
            return Ok(None);
        };

        match ProviderQuote::new(&base, counter, *value).orient(pair) {
            Some(rate) => Ok(Some(ExchangeRate::new(pair, date, rate, PROVIDER)?)),
            None => Ok(None),
        }
    }
}
