//! Exchange-rate resolution across cache, primary source and fallbacks

use crate::core::config::{ExchangeRateConfig, ValidationPolicy};
use crate::core::error::{Error, Result};
use crate::core::rate::{CurrencyPair, ExchangeRate, RateSource, is_weekend};
use crate::store::{CacheStats, RateCache};
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, error, info, warn};

/// Days of cached history considered when judging a new rate.
const VALIDATION_LOOKBACK_DAYS: u32 = 7;
const VALIDATION_SAMPLE: usize = 3;
pub const MANUAL_SOURCE: &str = "manual";

/// Supplies a rate by hand when every source has failed.
pub type ManualRate<'a> = &'a dyn Fn(&CurrencyPair, NaiveDate) -> Option<Decimal>;

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// How far around a missing date to look for a primary rate
    pub max_rate_age_days: u32,
    /// Allowed relative deviation from the recent average
    pub tolerance: Decimal,
    pub validation: ValidationPolicy,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_rate_age_days: 5,
            tolerance: dec!(0.2),
            validation: ValidationPolicy::Warn,
        }
    }
}

impl From<&ExchangeRateConfig> for ResolverSettings {
    fn from(config: &ExchangeRateConfig) -> Self {
        Self {
            max_rate_age_days: config.max_rate_age_days,
            tolerance: config.tolerance,
            validation: config.validation,
        }
    }
}

/// Outcome of warming the cache over a date range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreloadStats {
    pub requested_dates: usize,
    pub cache_hits: usize,
    pub primary_success: usize,
    pub fallback_success: usize,
    pub failures: usize,
    pub errors: Vec<String>,
}

/// Resolves historical rates from the cache, then the primary source (exact
/// date, then the closest business day), then each fallback in order.
pub struct ExchangeRateResolver {
    cache: RateCache,
    primary: Box<dyn RateSource>,
    fallbacks: Vec<Box<dyn RateSource>>,
    settings: ResolverSettings,
}

impl ExchangeRateResolver {
    pub fn new(
        cache: RateCache,
        primary: Box<dyn RateSource>,
        fallbacks: Vec<Box<dyn RateSource>>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            cache,
            primary,
            fallbacks,
            settings,
        }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    pub fn primary_name(&self) -> &str {
        self.primary.name()
    }

    pub fn fallback_names(&self) -> Vec<&str> {
        self.fallbacks.iter().map(|s| s.name()).collect()
    }

    pub async fn get_rate(&mut self, pair: &CurrencyPair, date: NaiveDate) -> Result<ExchangeRate> {
        if let Some(cached) = self.cache.get(pair, date) {
            debug!("Using cached {} rate for {}", pair, date);
            return Ok(cached.clone());
        }

        match self.primary.fetch_rate(pair, date).await {
            Ok(Some(rate)) => {
                self.cache.put(pair, date, rate.clone());
                return Ok(rate);
            }
            Ok(None) => debug!("{} has no {} rate for {}", self.primary.name(), pair, date),
            Err(e) => warn!("{} failed for {}: {}", self.primary.name(), date, e),
        }

        if let Some(closest) = self.find_closest_primary_rate(pair, date).await {
            info!(
                "Using closest {} rate from {} for {}",
                self.primary.name(),
                closest.date,
                date
            );
            let mut annotated = ExchangeRate::new(
                pair,
                date,
                closest.rate,
                &format!("{} (from {})", self.primary.name(), closest.date),
            )?;
            annotated.retrieved_at = closest.retrieved_at;
            self.cache.put(pair, date, annotated.clone());
            return Ok(annotated);
        }

        for source in &self.fallbacks {
            match source.fetch_rate(pair, date).await {
                Ok(Some(rate)) => {
                    info!("Using fallback source {} for {}", source.name(), date);
                    self.cache.put(pair, date, rate.clone());
                    return Ok(rate);
                }
                Ok(None) => debug!("Fallback source {} has no rate for {}", source.name(), date),
                Err(e) => warn!("Fallback source {} failed for {}: {}", source.name(), date, e),
            }
        }

        Err(Error::RateNotFound {
            pair: pair.to_string(),
            date,
        })
    }

    /// Nearest primary rate within `max_rate_age_days`, earlier day first at
    /// each distance. Weekends and future dates are never queried.
    async fn find_closest_primary_rate(
        &self,
        pair: &CurrencyPair,
        date: NaiveDate,
    ) -> Option<ExchangeRate> {
        let today = Utc::now().date_naive();
        for offset in 1..=i64::from(self.settings.max_rate_age_days) {
            for candidate in [date - Duration::days(offset), date + Duration::days(offset)] {
                if candidate > today || is_weekend(candidate) {
                    continue;
                }
                match self.primary.fetch_rate(pair, candidate).await {
                    Ok(Some(rate)) => return Some(rate),
                    Ok(None) => {}
                    Err(e) => debug!("{} failed for {}: {}", self.primary.name(), candidate, e),
                }
            }
        }
        None
    }

    fn recent_average(&self, rate: &ExchangeRate) -> Option<Decimal> {
        let pair: CurrencyPair = rate.currency_pair.parse().ok()?;
        let recent =
            self.cache
                .recent_rates(&pair, rate.date, VALIDATION_LOOKBACK_DAYS, VALIDATION_SAMPLE);
        if recent.is_empty() {
            return None;
        }
        let count = Decimal::from(recent.len());
        Some(recent.into_iter().sum::<Decimal>() / count)
    }

    /// Compares `rate` with the mean of up to three cached rates from the
    /// preceding week. With no history the rate is accepted.
    pub fn validate_reasonableness(&self, rate: &ExchangeRate, tolerance: Decimal) -> bool {
        let Some(average) = self.recent_average(rate) else {
            return true;
        };
        if average.is_zero() {
            return true;
        }
        let variation = (rate.rate - average).abs() / average;
        let reasonable = variation <= tolerance;
        if !reasonable {
            warn!(
                "Rate {} for {} seems unreasonable (recent average {:.4}, variation {:.2}%)",
                rate.rate,
                rate.date,
                average,
                variation * dec!(100)
            );
        }
        reasonable
    }

    /// [`get_rate`](Self::get_rate) followed by the plausibility check under
    /// the configured policy. When no source has a rate, `manual` may supply
    /// one; it is cached with source `"manual"`.
    pub async fn get_rate_with_validation(
        &mut self,
        pair: &CurrencyPair,
        date: NaiveDate,
        manual: Option<ManualRate<'_>>,
    ) -> Result<ExchangeRate> {
        match self.get_rate(pair, date).await {
            Ok(rate) => {
                if self.validate_reasonableness(&rate, self.settings.tolerance) {
                    return Ok(rate);
                }
                match self.settings.validation {
                    ValidationPolicy::Warn => {
                        warn!("Rate validation failed for {}, but proceeding", date);
                        Ok(rate)
                    }
                    ValidationPolicy::Reject => {
                        let average = self.recent_average(&rate).unwrap_or_default();
                        // A refused rate must not be served by later lookups
                        self.cache.remove(pair, date);
                        warn!("Rejected {} rate {} for {}", pair, rate.rate, date);
                        Err(Error::ImplausibleRate {
                            pair: pair.to_string(),
                            date,
                            average,
                            rate: rate.rate,
                        })
                    }
                }
            }
            Err(err @ Error::RateNotFound { .. }) => {
                let Some(value) = manual.and_then(|ask| ask(pair, date)) else {
                    return Err(err);
                };
                if value <= Decimal::ZERO {
                    warn!("Ignoring non-positive manual rate {} for {}", value, date);
                    return Err(err);
                }
                let rate = ExchangeRate::new(pair, date, value, MANUAL_SOURCE)?;
                info!("Manual rate entered: {} for {}", value, date);
                self.cache.put(pair, date, rate.clone());
                Ok(rate)
            }
            Err(e) => Err(e),
        }
    }

    /// Resolves every day from `start` to `end` inclusive so later lookups hit
    /// the cache. `on_progress` is called once per day.
    pub async fn preload_rates_for_date_range(
        &mut self,
        pair: &CurrencyPair,
        start: NaiveDate,
        end: NaiveDate,
        mut on_progress: impl FnMut(NaiveDate),
    ) -> PreloadStats {
        info!("Preloading {} rates from {} to {}", pair, start, end);
        let mut stats = PreloadStats::default();

        for day in start.iter_days().take_while(|d| *d <= end) {
            stats.requested_dates += 1;
            if self.cache.get(pair, day).is_some() {
                stats.cache_hits += 1;
            } else {
                match self.get_rate(pair, day).await {
                    Ok(rate) if rate.source.starts_with(self.primary.name()) => {
                        stats.primary_success += 1
                    }
                    Ok(_) => stats.fallback_success += 1,
                    Err(e) => {
                        if matches!(e, Error::RateNotFound { .. }) {
                            warn!("Failed to preload rate for {}: {}", day, e);
                        } else {
                            error!("Error preloading rate for {}: {}", day, e);
                        }
                        stats.failures += 1;
                        stats.errors.push(format!("{day}: {e}"));
                    }
                }
            }
            on_progress(day);
        }

        info!(
            "Preloading complete: {} primary, {} fallback, {} cached, {} failed",
            stats.primary_success, stats.fallback_success, stats.cache_hits, stats.failures
        );
        stats
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&mut self) -> Result<()> {
        self.cache.clear()
    }

    pub fn cleanup_expired_cache(&mut self) -> Result<usize> {
        self.cache.cleanup_expired()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::rate::SourceKind;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// In-memory rate source that counts its calls.
    pub(crate) struct MockSource {
        name: String,
        kind: SourceKind,
        rates: HashMap<NaiveDate, Decimal>,
        failing: bool,
        pub(crate) calls: Arc<AtomicUsize>,
        pub(crate) requested: Arc<std::sync::Mutex<Vec<NaiveDate>>>,
    }

    impl MockSource {
        pub(crate) fn new(name: &str, kind: SourceKind, rates: &[(NaiveDate, Decimal)]) -> Self {
            Self {
                name: name.to_string(),
                kind,
                rates: rates.iter().copied().collect(),
                failing: false,
                calls: Arc::new(AtomicUsize::new(0)),
                requested: Arc::new(std::sync::Mutex::new(Vec::new())),
            }
        }

        pub(crate) fn failing(name: &str, kind: SourceKind) -> Self {
            Self {
                failing: true,
                ..Self::new(name, kind, &[])
            }
        }
    }

    #[async_trait]
    impl RateSource for MockSource {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn fetch_rate(
            &self,
            pair: &CurrencyPair,
            date: NaiveDate,
        ) -> Result<Option<ExchangeRate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().unwrap().push(date);
            if self.failing {
                return Err(Error::SourceUnavailable {
                    provider: self.name.clone(),
                    message: "HTTP 503".to_string(),
                    retry_after: None,
                });
            }
            match self.rates.get(&date) {
                Some(rate) => Ok(Some(ExchangeRate::new(pair, date, *rate, &self.name)?)),
                None => Ok(None),
            }
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn build_resolver(
        dir: &TempDir,
        primary: MockSource,
        fallbacks: Vec<MockSource>,
        settings: ResolverSettings,
    ) -> ExchangeRateResolver {
        let cache = RateCache::open(
            dir.path().join("rates.json"),
            std::time::Duration::from_secs(3600),
        );
        ExchangeRateResolver::new(
            cache,
            Box::new(primary),
            fallbacks
                .into_iter()
                .map(|s| Box::new(s) as Box<dyn RateSource>)
                .collect(),
            settings,
        )
    }

    #[tokio::test]
    async fn test_cached_rate_is_served_without_network() {
        let dir = TempDir::new().unwrap();
        let primary = MockSource::new("ECB", SourceKind::Primary, &[(day(15), dec!(0.9132))]);
        let calls = primary.calls.clone();
        let mut resolver = build_resolver(&dir, primary, vec![], ResolverSettings::default());
        let pair = CurrencyPair::usd_eur();

        let first = resolver.get_rate(&pair, day(15)).await.unwrap();
        let second = resolver.get_rate(&pair, day(15)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.rate, dec!(0.9132));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A fresh resolver reads the persisted entry
        let primary = MockSource::new("ECB", SourceKind::Primary, &[]);
        let calls = primary.calls.clone();
        let mut reopened = build_resolver(&dir, primary, vec![], ResolverSettings::default());
        assert_eq!(reopened.get_rate(&pair, day(15)).await.unwrap().rate, dec!(0.9132));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_closest_date_skips_weekends_and_is_cached_under_target() {
        let dir = TempDir::new().unwrap();
        // Only Friday 12th and Saturday 13th carry data; the 16th is a Tuesday
        let primary = MockSource::new(
            "ECB",
            SourceKind::Primary,
            &[(day(12), dec!(0.915)), (day(13), dec!(0.5))],
        );
        let requested = primary.requested.clone();
        let calls = primary.calls.clone();
        let mut resolver = build_resolver(&dir, primary, vec![], ResolverSettings::default());
        let pair = CurrencyPair::usd_eur();

        let rate = resolver.get_rate(&pair, day(16)).await.unwrap();
        assert_eq!(rate.rate, dec!(0.915));
        assert_eq!(rate.date, day(16));
        assert_eq!(rate.source, "ECB (from 2024-01-12)");

        let asked = requested.lock().unwrap().clone();
        assert_eq!(asked, vec![day(16), day(15), day(17), day(18), day(19), day(12)]);
        assert!(asked.iter().skip(1).all(|d| !is_weekend(*d)));

        let again = resolver.get_rate(&pair, day(16)).await.unwrap();
        assert_eq!(again, rate);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_fallbacks_are_tried_in_order() {
        let dir = TempDir::new().unwrap();
        let primary = MockSource::failing("ECB", SourceKind::Primary);
        let broken = MockSource::failing("ExchangeRate-API", SourceKind::Fallback);
        let empty = MockSource::new("FreeCurrencyAPI", SourceKind::Fallback, &[]);
        let good = MockSource::new("Coinbase", SourceKind::Fallback, &[(day(15), dec!(0.92))]);
        let last = MockSource::new("CoinGecko", SourceKind::LastResort, &[(day(15), dec!(0.95))]);
        let (broken_calls, empty_calls, last_calls) =
            (broken.calls.clone(), empty.calls.clone(), last.calls.clone());

        let mut resolver = build_resolver(
            &dir,
            primary,
            vec![broken, empty, good, last],
            ResolverSettings::default(),
        );
        assert_eq!(
            resolver.fallback_names(),
            vec!["ExchangeRate-API", "FreeCurrencyAPI", "Coinbase", "CoinGecko"]
        );

        let rate = resolver.get_rate(&CurrencyPair::usd_eur(), day(15)).await.unwrap();
        assert_eq!(rate.source, "Coinbase");
        assert_eq!(rate.rate, dec!(0.92));
        assert_eq!(broken_calls.load(Ordering::SeqCst), 1);
        assert_eq!(empty_calls.load(Ordering::SeqCst), 1);
        assert_eq!(last_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_closest_search_respects_max_age() {
        let dir = TempDir::new().unwrap();
        let primary = MockSource::new("ECB", SourceKind::Primary, &[(day(8), dec!(0.9))]);
        let fallback = MockSource::new("Coinbase", SourceKind::Fallback, &[(day(16), dec!(0.93))]);
        let settings = ResolverSettings {
            max_rate_age_days: 3,
            ..ResolverSettings::default()
        };
        let mut resolver = build_resolver(&dir, primary, vec![fallback], settings);

        let rate = resolver.get_rate(&CurrencyPair::usd_eur(), day(16)).await.unwrap();
        assert_eq!(rate.source, "Coinbase");
    }

    #[tokio::test]
    async fn test_closest_search_never_queries_future_dates() {
        let dir = TempDir::new().unwrap();
        let today = Utc::now().date_naive();
        // Only the coming days carry data
        let upcoming = (1..=5)
            .map(|offset| (today + Duration::days(offset), dec!(0.9)))
            .collect::<Vec<_>>();
        let primary = MockSource::new("ECB", SourceKind::Primary, &upcoming);
        let requested = primary.requested.clone();
        let fallback = MockSource::new("Coinbase", SourceKind::Fallback, &[(today, dec!(0.93))]);
        let mut resolver = build_resolver(&dir, primary, vec![fallback], ResolverSettings::default());

        let rate = resolver.get_rate(&CurrencyPair::usd_eur(), today).await.unwrap();
        assert_eq!(rate.source, "Coinbase");
        assert_eq!(rate.rate, dec!(0.93));

        let asked = requested.lock().unwrap().clone();
        assert_eq!(asked.first(), Some(&today));
        assert!(asked.iter().all(|d| *d <= today), "future dates requested: {asked:?}");
    }

    #[tokio::test]
    async fn test_rate_not_found_when_every_source_is_empty() {
        let dir = TempDir::new().unwrap();
        let primary = MockSource::new("ECB", SourceKind::Primary, &[]);
        let fallback = MockSource::failing("Coinbase", SourceKind::Fallback);
        let mut resolver = build_resolver(&dir, primary, vec![fallback], ResolverSettings::default());

        let err = resolver
            .get_rate(&CurrencyPair::usd_eur(), day(15))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateNotFound { date, .. } if date == day(15)));
    }

    #[tokio::test]
    async fn test_reasonableness_against_recent_history() {
        let dir = TempDir::new().unwrap();
        let primary = MockSource::new(
            "ECB",
            SourceKind::Primary,
            &[(day(10), dec!(0.90)), (day(11), dec!(0.92)), (day(12), dec!(0.94))],
        );
        let mut resolver = build_resolver(&dir, primary, vec![], ResolverSettings::default());
        let pair = CurrencyPair::usd_eur();

        let cold = ExchangeRate::new(&pair, day(10), dec!(5), "test").unwrap();
        assert!(resolver.validate_reasonableness(&cold, dec!(0.2)));

        for d in [10, 11, 12] {
            resolver.get_rate(&pair, day(d)).await.unwrap();
        }
        let close = ExchangeRate::new(&pair, day(15), dec!(0.95), "test").unwrap();
        assert!(resolver.validate_reasonableness(&close, dec!(0.2)));
        let far = ExchangeRate::new(&pair, day(15), dec!(1.5), "test").unwrap();
        assert!(!resolver.validate_reasonableness(&far, dec!(0.2)));
        assert!(resolver.validate_reasonableness(&far, dec!(1)));
    }

    #[tokio::test]
    async fn test_validation_policy() {
        let dir = TempDir::new().unwrap();
        let rates = [(day(10), dec!(0.90)), (day(11), dec!(0.90)), (day(12), dec!(2.0))];
        let pair = CurrencyPair::usd_eur();

        let mut warn_resolver = build_resolver(
            &dir,
            MockSource::new("ECB", SourceKind::Primary, &rates),
            vec![],
            ResolverSettings::default(),
        );
        warn_resolver.get_rate(&pair, day(10)).await.unwrap();
        warn_resolver.get_rate(&pair, day(11)).await.unwrap();
        let accepted = warn_resolver
            .get_rate_with_validation(&pair, day(12), None)
            .await
            .unwrap();
        assert_eq!(accepted.rate, dec!(2.0));

        let dir = TempDir::new().unwrap();
        let mut strict = build_resolver(
            &dir,
            MockSource::new("ECB", SourceKind::Primary, &rates),
            vec![],
            ResolverSettings {
                validation: ValidationPolicy::Reject,
                ..ResolverSettings::default()
            },
        );
        strict.get_rate(&pair, day(10)).await.unwrap();
        strict.get_rate(&pair, day(11)).await.unwrap();
        let err = strict
            .get_rate_with_validation(&pair, day(12), None)
            .await
            .unwrap_err();
        match err {
            Error::ImplausibleRate { rate, average, .. } => {
                assert_eq!(rate, dec!(2.0));
                assert_eq!(average, dec!(0.90));
            }
            other => panic!("Unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_rate_is_not_served_later() {
        let dir = TempDir::new().unwrap();
        let primary = MockSource::new(
            "ECB",
            SourceKind::Primary,
            &[(day(10), dec!(0.90)), (day(11), dec!(0.90)), (day(12), dec!(2.0))],
        );
        let fallback = MockSource::new("Coinbase", SourceKind::Fallback, &[]);
        let primary_calls = primary.calls.clone();
        let mut strict = build_resolver(
            &dir,
            primary,
            vec![fallback],
            ResolverSettings {
                max_rate_age_days: 1,
                validation: ValidationPolicy::Reject,
                ..ResolverSettings::default()
            },
        );
        let pair = CurrencyPair::usd_eur();
        strict.get_rate(&pair, day(10)).await.unwrap();
        strict.get_rate(&pair, day(11)).await.unwrap();

        assert!(
            strict
                .get_rate_with_validation(&pair, day(12), None)
                .await
                .is_err()
        );
        assert_eq!(strict.get_cache_stats().total_entries, 2);

        // Neither the in-memory cache nor the file keeps the refused value
        let reopened = RateCache::open(
            dir.path().join("rates.json"),
            std::time::Duration::from_secs(3600),
        );
        assert!(reopened.get(&pair, day(12)).is_none());

        // A plain lookup asks the primary again instead of reusing it
        let before = primary_calls.load(Ordering::SeqCst);
        strict.get_rate(&pair, day(12)).await.unwrap();
        assert_eq!(primary_calls.load(Ordering::SeqCst), before + 1);
        assert!(
            strict
                .get_rate_with_validation(&pair, day(12), None)
                .await
                .is_err()
        );
        assert_eq!(strict.get_cache_stats().total_entries, 2);
    }

    #[tokio::test]
    async fn test_manual_rate_is_cached() {
        let dir = TempDir::new().unwrap();
        let primary = MockSource::new("ECB", SourceKind::Primary, &[]);
        let calls = primary.calls.clone();
        let mut resolver = build_resolver(&dir, primary, vec![], ResolverSettings::default());
        let pair = CurrencyPair::usd_eur();

        let refuse = |_: &CurrencyPair, _: NaiveDate| Some(dec!(-1));
        assert!(matches!(
            resolver
                .get_rate_with_validation(&pair, day(15), Some(&refuse))
                .await
                .unwrap_err(),
            Error::RateNotFound { .. }
        ));

        let supply = |_: &CurrencyPair, _: NaiveDate| Some(dec!(0.91));
        let rate = resolver
            .get_rate_with_validation(&pair, day(15), Some(&supply))
            .await
            .unwrap();
        assert_eq!(rate.source, MANUAL_SOURCE);
        assert_eq!(rate.rate, dec!(0.91));

        let before = calls.load(Ordering::SeqCst);
        let cached = resolver.get_rate(&pair, day(15)).await.unwrap();
        assert_eq!(cached.source, MANUAL_SOURCE);
        assert_eq!(calls.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn test_preload_counts_outcomes() {
        let dir = TempDir::new().unwrap();
        // 2024-01-08 (Mon) to 2024-01-11 (Thu)
        let primary = MockSource::new("ECB", SourceKind::Primary, &[(day(8), dec!(0.91))]);
        let fallback = MockSource::new("Coinbase", SourceKind::Fallback, &[(day(11), dec!(0.92))]);
        let settings = ResolverSettings {
            max_rate_age_days: 1,
            ..ResolverSettings::default()
        };
        let mut resolver = build_resolver(&dir, primary, vec![fallback], settings);
        let pair = CurrencyPair::usd_eur();

        let mut seen = Vec::new();
        let stats = resolver
            .preload_rates_for_date_range(&pair, day(8), day(11), |d| seen.push(d))
            .await;
        // The 9th borrows the 8th's rate; the 10th has no neighbour and no
        // fallback; the 11th comes from the fallback
        assert_eq!(stats.requested_dates, 4);
        assert_eq!(stats.primary_success, 2);
        assert_eq!(stats.fallback_success, 1);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].starts_with("2024-01-10"));
        assert_eq!(seen, vec![day(8), day(9), day(10), day(11)]);

        let again = resolver
            .preload_rates_for_date_range(&pair, day(8), day(9), |_| {})
            .await;
        assert_eq!(again.cache_hits, 2);
    }

    #[tokio::test]
    async fn test_cache_housekeeping() {
        let dir = TempDir::new().unwrap();
        let primary = MockSource::new("ECB", SourceKind::Primary, &[(day(15), dec!(0.92))]);
        let mut resolver = build_resolver(&dir, primary, vec![], ResolverSettings::default());
        resolver.get_rate(&CurrencyPair::usd_eur(), day(15)).await.unwrap();

        let stats = resolver.get_cache_stats();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.sources["ECB"], 1);
        assert_eq!(resolver.cleanup_expired_cache().unwrap(), 0);

        resolver.clear_cache().unwrap();
        assert_eq!(resolver.get_cache_stats().total_entries, 0);
    }
}
