//! Crypto to USD to EUR valuation

use crate::core::error::{Error, Result};
use crate::core::money::round2;
use crate::core::price::PriceOracle;
use crate::core::rate::{CurrencyPair, ExchangeRate};
use crate::core::resolver::ExchangeRateResolver;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, warn};

/// Supplies a USD price by hand for a symbol on a date.
pub type ManualPrice<'a> = &'a dyn Fn(&str, NaiveDate) -> Option<Decimal>;

/// Values crypto amounts in USD and EUR. Stablecoins are taken at par; other
/// assets go through the reference oracle, then the spot oracle, then the
/// optional manual callback.
pub struct CurrencyConversionPipeline {
    resolver: ExchangeRateResolver,
    stablecoins: HashSet<String>,
    reference: Option<Box<dyn PriceOracle>>,
    spot: Option<Box<dyn PriceOracle>>,
    prices: HashMap<(String, NaiveDate), Decimal>,
}

impl CurrencyConversionPipeline {
    pub fn new<I, S>(resolver: ExchangeRateResolver, stablecoins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            resolver,
            stablecoins: stablecoins
                .into_iter()
                .map(|s| s.as_ref().to_uppercase())
                .collect(),
            reference: None,
            spot: None,
            prices: HashMap::new(),
        }
    }

    pub fn with_reference_oracle(mut self, oracle: Box<dyn PriceOracle>) -> Self {
        self.reference = Some(oracle);
        self
    }

    pub fn with_spot_oracle(mut self, oracle: Box<dyn PriceOracle>) -> Self {
        self.spot = Some(oracle);
        self
    }

    pub fn resolver(&self) -> &ExchangeRateResolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut ExchangeRateResolver {
        &mut self.resolver
    }

    pub fn is_stablecoin(&self, symbol: &str) -> bool {
        self.stablecoins.contains(&symbol.to_uppercase())
    }

    async fn lookup(oracle: &dyn PriceOracle, symbol: &str, date: NaiveDate) -> Option<Decimal> {
        match oracle.usd_price(symbol, date).await {
            Ok(Some(price)) if price > Decimal::ZERO => {
                if oracle.is_approximate() {
                    warn!(
                        "Using approximate price for {} from {}: ${}",
                        symbol,
                        oracle.name(),
                        price
                    );
                }
                Some(price)
            }
            Ok(_) => None,
            Err(e) => {
                error!("Failed to get {} price from {}: {}", symbol, oracle.name(), e);
                None
            }
        }
    }

    /// USD price of one `symbol` on `date`.
    pub async fn usd_price(
        &mut self,
        symbol: &str,
        date: NaiveDate,
        manual: Option<ManualPrice<'_>>,
    ) -> Result<Decimal> {
        let symbol = symbol.to_uppercase();
        if self.is_stablecoin(&symbol) {
            return Ok(Decimal::ONE);
        }
        let key = (symbol.clone(), date);
        if let Some(price) = self.prices.get(&key) {
            debug!("Using memoised {} price for {}", symbol, date);
            return Ok(*price);
        }

        let mut price = None;
        if let Some(reference) = &self.reference {
            price = Self::lookup(reference.as_ref(), &symbol, date).await;
        }
        if price.is_none() {
            if let Some(spot) = &self.spot {
                price = Self::lookup(spot.as_ref(), &symbol, date).await;
            }
        }
        if price.is_none() {
            warn!("No automatic price found for {} on {}", symbol, date);
            price = manual
                .and_then(|ask| ask(&symbol, date))
                .filter(|p| *p > Decimal::ZERO);
            if let Some(p) = price {
                info!("Manual price entered for {}: ${}", symbol, p);
            }
        }

        let price = price.ok_or_else(|| Error::RateNotFound {
            pair: format!("{symbol}/USD"),
            date,
        })?;
        self.prices.insert(key, price);
        Ok(price)
    }

    /// Returns `(usd_amount, usd_price)`.
    pub async fn convert_crypto_to_usd(
        &mut self,
        amount: Decimal,
        symbol: &str,
        date: NaiveDate,
        manual: Option<ManualPrice<'_>>,
    ) -> Result<(Decimal, Decimal)> {
        let price = self.usd_price(symbol, date, manual).await?;
        Ok((amount * price, price))
    }

    /// Returns the EUR amount rounded to cents and the rate applied.
    pub async fn convert_usd_to_eur(
        &mut self,
        amount: Decimal,
        date: NaiveDate,
    ) -> Result<(Decimal, ExchangeRate)> {
        let rate = self.resolver.get_rate(&CurrencyPair::usd_eur(), date).await?;
        Ok((round2(amount * rate.rate), rate))
    }

    /// Returns `(eur_amount, usd_amount, rate_used)`.
    pub async fn convert_crypto_to_eur(
        &mut self,
        amount: Decimal,
        symbol: &str,
        date: NaiveDate,
        manual: Option<ManualPrice<'_>>,
    ) -> Result<(Decimal, Decimal, ExchangeRate)> {
        let (usd, _) = self.convert_crypto_to_usd(amount, symbol, date, manual).await?;
        let (eur, rate) = self.convert_usd_to_eur(usd, date).await?;
        Ok((eur, usd, rate))
    }
}
