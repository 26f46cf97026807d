//! Exchange-rate types and the rate source abstraction

use crate::core::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// A currency pair written `BASE/QUOTE`. A rate for the pair is the number of
/// `quote` units bought by one unit of `base`: `USD/EUR = 0.92` means
/// 1 USD = 0.92 EUR.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
}

impl CurrencyPair {
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
        }
    }

    pub fn usd_eur() -> Self {
        Self::new("USD", "EUR")
    }

    pub fn inverse(&self) -> Self {
        Self::new(&self.quote, &self.base)
    }
}

impl Display for CurrencyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for CurrencyPair {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((base, quote)) if !base.trim().is_empty() && !quote.trim().is_empty() => {
                Ok(CurrencyPair::new(base.trim(), quote.trim()))
            }
            _ => Err(Error::Config(format!(
                "Invalid currency pair '{s}', expected BASE/QUOTE"
            ))),
        }
    }
}

/// A resolved exchange rate for one date, as stored in the rate cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub date: NaiveDate,
    pub rate: Decimal,
    pub source: String,
    pub currency_pair: String,
    #[serde(rename = "timestamp")]
    pub retrieved_at: DateTime<Utc>,
}

impl ExchangeRate {
    pub fn new(pair: &CurrencyPair, date: NaiveDate, rate: Decimal, source: &str) -> Result<Self> {
        if rate <= Decimal::ZERO {
            return Err(Error::InvalidRate(rate));
        }
        Ok(Self {
            date,
            rate,
            source: source.to_string(),
            currency_pair: pair.to_string(),
            retrieved_at: Utc::now(),
        })
    }
}

/// Where an adapter sits in the resolution chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Primary,
    Fallback,
    LastResort,
}

/// A single upstream provider of historical exchange rates.
#[async_trait]
pub trait RateSource: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Number of days back from today for which the source can be trusted.
    /// `None` means the source serves any historical date.
    fn recency_window(&self) -> Option<u32> {
        None
    }

    fn covers(&self, date: NaiveDate) -> bool {
        match self.recency_window() {
            Some(days) => (Utc::now().date_naive() - date).num_days() <= i64::from(days),
            None => true,
        }
    }

    /// Fetches the rate for exactly `date`. `Ok(None)` means the provider has
    /// no record for that date.
    async fn fetch_rate(&self, pair: &CurrencyPair, date: NaiveDate)
    -> Result<Option<ExchangeRate>>;
}

/// A raw quote as published by a provider, before orientation.
#[derive(Debug, Clone)]
pub struct ProviderQuote {
    pub base: String,
    pub quote: String,
    pub value: Decimal,
}

impl ProviderQuote {
    pub fn new(base: &str, quote: &str, value: Decimal) -> Self {
        Self {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
            value,
        }
    }

    /// Expresses the quote in the orientation of `pair`, inverting it when the
    /// provider published the opposite direction.
    pub fn orient(&self, pair: &CurrencyPair) -> Option<Decimal> {
        if self.value <= Decimal::ZERO {
            return None;
        }
        if self.base == pair.base && self.quote == pair.quote {
            Some(self.value)
        } else if self.base == pair.quote && self.quote == pair.base {
            Decimal::ONE.checked_div(self.value)
        } else {
            None
        }
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_pair_parsing_and_display() {
        let pair: CurrencyPair = "usd/eur".parse().unwrap();
        assert_eq!(pair, CurrencyPair::usd_eur());
        assert_eq!(pair.to_string(), "USD/EUR");
        assert_eq!(pair.inverse().to_string(), "EUR/USD");
        assert!("USDEUR".parse::<CurrencyPair>().is_err());
        assert!("USD/".parse::<CurrencyPair>().is_err());
    }

    #[test]
    fn test_exchange_rate_must_be_positive() {
        let pair = CurrencyPair::usd_eur();
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert!(ExchangeRate::new(&pair, date, dec!(0), "ECB").is_err());
        assert!(ExchangeRate::new(&pair, date, dec!(-1.1), "ECB").is_err());
        let rate = ExchangeRate::new(&pair, date, dec!(0.92), "ECB").unwrap();
        assert_eq!(rate.currency_pair, "USD/EUR");
    }

    #[test]
    fn test_quote_orientation() {
        let pair = CurrencyPair::usd_eur();

        let direct = ProviderQuote::new("usd", "eur", dec!(0.92));
        assert_eq!(direct.orient(&pair), Some(dec!(0.92)));

        let inverse = ProviderQuote::new("EUR", "USD", dec!(1.25));
        assert_eq!(inverse.orient(&pair), Some(dec!(0.8)));

        let unrelated = ProviderQuote::new("EUR", "GBP", dec!(0.85));
        assert_eq!(unrelated.orient(&pair), None);

        let zero = ProviderQuote::new("USD", "EUR", dec!(0));
        assert_eq!(zero.orient(&pair), None);
    }

    #[test]
    fn test_weekend_detection() {
        // 2024-01-13 is a Saturday
        let saturday = NaiveDate::from_ymd_opt(2024, 1, 13).unwrap();
        assert!(is_weekend(saturday));
        assert!(is_weekend(saturday.succ_opt().unwrap()));
        assert!(!is_weekend(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()));
    }

    #[test]
    fn test_cache_json_shape() {
        let pair = CurrencyPair::usd_eur();
        let date = NaiveDate::from_ymd_opt(2023, 12, 15).unwrap();
        let rate = ExchangeRate::new(&pair, date, dec!(0.9234), "ECB").unwrap();

        let json = serde_json::to_value(&rate).unwrap();
        assert_eq!(json["date"], "2023-12-15");
        assert_eq!(json["rate"], "0.9234");
        assert_eq!(json["source"], "ECB");
        assert_eq!(json["currency_pair"], "USD/EUR");
        assert!(json["timestamp"].is_string());

        let restored: ExchangeRate = serde_json::from_value(json).unwrap();
        assert_eq!(restored, rate);
    }
}
