//! Crypto asset pricing abstractions

use crate::core::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Supplies the USD price of one unit of a crypto asset on a date.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    fn name(&self) -> &str;

    /// Whether prices are approximations rather than historical quotes.
    fn is_approximate(&self) -> bool {
        false
    }

    async fn usd_price(&self, symbol: &str, date: NaiveDate) -> Result<Option<Decimal>>;
}

/// Fixed per-symbol prices, ignoring the date. Used for deterministic
/// fixtures and for configured approximations of major assets.
pub struct StaticPriceOracle {
    prices: HashMap<String, Decimal>,
}

impl StaticPriceOracle {
    pub fn new(prices: HashMap<String, Decimal>) -> Self {
        Self {
            prices: prices
                .into_iter()
                .map(|(symbol, price)| (symbol.to_uppercase(), price))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

#[async_trait]
impl PriceOracle for StaticPriceOracle {
    fn name(&self) -> &str {
        "static"
    }

    fn is_approximate(&self) -> bool {
        true
    }

    async fn usd_price(&self, symbol: &str, _date: NaiveDate) -> Result<Option<Decimal>> {
        Ok(self.prices.get(&symbol.to_uppercase()).copied())
    }
}
