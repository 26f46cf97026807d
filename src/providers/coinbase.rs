use super::util::{self, ResilientFetcher};
use crate::core::error::{Error, Result};
use crate::core::rate::{CurrencyPair, ExchangeRate, ProviderQuote, RateSource, SourceKind};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

const PROVIDER: &str = "Coinbase";
/// Coinbase only serves spot rates; they stand in for the last week.
const RECENCY_WINDOW_DAYS: u32 = 7;

#[derive(Debug, Deserialize)]
struct ExchangeRatesResponse {
    data: ExchangeRatesData,
}

#[derive(Debug, Deserialize)]
struct ExchangeRatesData {
    currency: Option<String>,
    #[serde(default)]
    rates: HashMap<String, Decimal>,
}

pub struct CoinbaseSource {
    base_url: String,
    client: reqwest::Client,
    fetcher: ResilientFetcher,
}

impl CoinbaseSource {
    pub fn new(base_url: &str, client: reqwest::Client, fetcher: ResilientFetcher) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            fetcher,
        }
    }
}

#[async_trait]
impl RateSource for CoinbaseSource {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Fallback
    }

    fn recency_window(&self) -> Option<u32> {
        Some(RECENCY_WINDOW_DAYS)
    }

    #[instrument(name = "CoinbaseRateFetch", skip_all, fields(pair = %pair, date = %date))]
    async fn fetch_rate(
        &self,
        pair: &CurrencyPair,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>> {
        if !self.covers(date) {
            debug!("{} is outside the Coinbase spot window", date);
            return Ok(None);
        }

        let url = format!("{}/exchange-rates?currency={}", self.base_url, pair.base);
        let response: ExchangeRatesResponse = self
            .fetcher
            .execute(
                || util::get_json(&self.client, PROVIDER, &url),
                Error::is_retryable,
            )
            .await?;

        let base = response
            .data
            .currency
            .map(|c| c.to_uppercase())
            .unwrap_or_else(|| pair.base.clone());
        let counter = if base == pair.quote { &pair.base } else { &pair.quote };
        let Some(value) = response.data.rates.get(counter) else {
            return Ok(None);
        };

        match ProviderQuote::new(&base, counter, *value).orient(pair) {
            Some(rate) => Ok(Some(ExchangeRate::new(pair, date, rate, PROVIDER)?)),
            None => Ok(None),
        }
    }
}
