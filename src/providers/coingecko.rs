use super::util::{self, ResilientFetcher};
use crate::core::error::{Error, Result};
use crate::core::price::PriceOracle;
use crate::core::rate::{CurrencyPair, ExchangeRate, RateSource, SourceKind};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

const PROVIDER: &str = "CoinGecko";
/// CoinGecko is rate limited, so it only backs up the last few days.
const RECENCY_WINDOW_DAYS: u32 = 3;

/// CoinGecko coin ids for common tickers. Unknown tickers are tried
/// lowercased.
const COIN_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("BNB", "binancecoin"),
    ("ADA", "cardano"),
    ("DOT", "polkadot"),
    ("LINK", "chainlink"),
    ("LTC", "litecoin"),
    ("XRP", "ripple"),
    ("SOL", "solana"),
    ("MATIC", "matic-network"),
    ("AVAX", "avalanche-2"),
    ("ATOM", "cosmos"),
    ("UNI", "uniswap"),
    ("AAVE", "aave"),
];

pub fn coin_id(symbol: &str) -> String {
    let upper = symbol.to_uppercase();
    COIN_IDS
        .iter()
        .find(|(ticker, _)| *ticker == upper)
        .map(|(_, id)| id.to_string())
        .unwrap_or_else(|| symbol.to_lowercase())
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    market_data: Option<MarketData>,
}

#[derive(Debug, Deserialize)]
struct MarketData {
    #[serde(default)]
    current_price: HashMap<String, Decimal>,
}

/// Last-resort fiat rates derived from tether quotes, plus historical crypto
/// spot prices.
pub struct CoinGeckoSource {
    base_url: String,
    client: reqwest::Client,
    fetcher: ResilientFetcher,
}

impl CoinGeckoSource {
    pub fn new(base_url: &str, client: reqwest::Client, fetcher: ResilientFetcher) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            fetcher,
        }
    }
}

#[async_trait]
impl RateSource for CoinGeckoSource {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn kind(&self) -> SourceKind {
        SourceKind::LastResort
    }

    fn recency_window(&self) -> Option<u32> {
        Some(RECENCY_WINDOW_DAYS)
    }

    #[instrument(name = "CoinGeckoRateFetch", skip_all, fields(pair = %pair, date = %date))]
    async fn fetch_rate(
        &self,
        pair: &CurrencyPair,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>> {
        if !self.covers(date) {
            debug!("{} is outside the CoinGecko window", date);
            return Ok(None);
        }

        let base = pair.base.to_lowercase();
        let quote = pair.quote.to_lowercase();
        let url = format!(
            "{}/simple/price?ids=tether&vs_currencies={},{}",
            self.base_url, base, quote
        );
        let prices: HashMap<String, HashMap<String, Decimal>> = self
            .fetcher
            .execute(
                || util::get_json(&self.client, PROVIDER, &url),
                Error::is_retryable,
            )
            .await?;

        // One tether priced in both currencies gives the cross rate
        let Some(tether) = prices.get("tether") else {
            return Ok(None);
        };
        let (Some(in_base), Some(in_quote)) = (tether.get(&base), tether.get(&quote)) else {
            return Ok(None);
        };
        if *in_base <= Decimal::ZERO || *in_quote <= Decimal::ZERO {
            return Ok(None);
        }
        match in_quote.checked_div(*in_base) {
            Some(rate) => Ok(Some(ExchangeRate::new(pair, date, rate, PROVIDER)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PriceOracle for CoinGeckoSource {
    fn name(&self) -> &str {
        PROVIDER
    }

    #[instrument(name = "CoinGeckoPriceFetch", skip_all, fields(symbol = %symbol, date = %date))]
    async fn usd_price(&self, symbol: &str, date: NaiveDate) -> Result<Option<Decimal>> {
        let url = format!(
            "{}/coins/{}/history?date={}",
            self.base_url,
            coin_id(symbol),
            date.format("%d-%m-%Y")
        );
        let response: HistoryResponse = match self
            .fetcher
            .execute(
                || util::get_json(&self.client, PROVIDER, &url),
                Error::is_retryable,
            )
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(response
            .market_data
            .and_then(|m| m.current_price.get("usd").copied())
            .filter(|price| *price > Decimal::ZERO))
    }
}
