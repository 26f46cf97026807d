use super::util::{self, ResilientFetcher};
use crate::core::error::{Error, Result};
use crate::core::rate::{CurrencyPair, ExchangeRate, ProviderQuote, RateSource, SourceKind};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

const PROVIDER: &str = "ExchangeRate-API";

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    base: Option<String>,
    #[serde(default)]
    rates: HashMap<String, Decimal>,
}

/// Free historical rates from exchangerate-api.com.
pub struct ExchangeRateApiSource {
    base_url: String,
    client: reqwest::Client,
    fetcher: ResilientFetcher,
}

impl ExchangeRateApiSource {
    pub fn new(base_url: &str, client: reqwest::Client, fetcher: ResilientFetcher) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            fetcher,
        }
    }
}

#[async_trait]
impl RateSource for ExchangeRateApiSource {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Fallback
    }

    #[instrument(name = "ExchangeRateApiFetch", skip_all, fields(pair = %pair, date = %date))]
    async fn fetch_rate(
        &self,
        pair: &CurrencyPair,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>> {
        let url = format!(
            "{}/history/{}/{}",
            self.base_url,
            pair.base,
            date.format("%Y-%m-%d")
        );
        let data: HistoryResponse = self
            .fetcher
            .execute(
                || util::get_json(&self.client, PROVIDER, &url),
                Error::is_retryable,
            )
            .await?;

        // The response may be expressed against another base than requested
        let base = data
            .base
            .map(|b| b.to_uppercase())
            .unwrap_or_else(|| pair.base.clone());
        let counter = if base == pair.quote { &pair.base } else { &pair.quote };
        let Some(value) = data.rates.get(counter) else {
            debug!("No {} rate in ExchangeRate-API response", counter);
            return Ok(None);
        };

        match ProviderQuote::new(&base, counter, *value).orient(pair) {
            Some(rate) => Ok(Some(ExchangeRate::new(pair, date, rate, PROVIDER)?)),
            None => Ok(None),
        }
    }
}
