use crate::core::error::Result;
use crate::core::rate::{CurrencyPair, ExchangeRate};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Snapshot of the rate cache for housekeeping commands.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub cache_file: PathBuf,
    pub cache_duration: Duration,
    /// Number of entries per source name
    pub sources: BTreeMap<String, usize>,
    pub cache_file_size: u64,
}

/// Resolved exchange rates persisted as a single JSON document keyed by
/// `"{pair}_{date}"`. Entries older than the TTL are kept in memory until
/// cleaned up but never served and never written back.
pub struct RateCache {
    path: PathBuf,
    ttl: Duration,
    entries: BTreeMap<String, ExchangeRate>,
}

impl RateCache {
    /// Opens the cache file at `path`. A missing file yields an empty cache;
    /// an unreadable or corrupt file is logged and ignored, and individual
    /// malformed entries are skipped.
    pub fn open(path: impl AsRef<Path>, ttl: Duration) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match Self::load(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to load rate cache {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        debug!("Loaded {} cached exchange rates", entries.len());
        Self { path, ttl, entries }
    }

    fn load(path: &Path) -> Result<BTreeMap<String, ExchangeRate>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw: BTreeMap<String, Value> = serde_json::from_str(&fs::read_to_string(path)?)?;
        let mut entries = BTreeMap::new();
        for (key, value) in raw {
            match serde_json::from_value::<ExchangeRate>(value) {
                Ok(rate) if rate.rate > Decimal::ZERO => {
                    entries.insert(key, rate);
                }
                Ok(rate) => warn!("Skipping cached rate {} with non-positive value {}", key, rate.rate),
                Err(e) => warn!("Failed to load cached rate {}: {}", key, e),
            }
        }
        Ok(entries)
    }

    pub fn key(pair: &CurrencyPair, date: NaiveDate) -> String {
        format!("{}_{}", pair, date.format("%Y-%m-%d"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_valid(&self, rate: &ExchangeRate) -> bool {
        let age = Utc::now().signed_duration_since(rate.retrieved_at);
        match age.to_std() {
            Ok(age) => age < self.ttl,
            // Timestamps slightly in the future count as fresh
            Err(_) => true,
        }
    }

    /// Returns the entry for `pair` on `date` if it is still within the TTL.
    pub fn get(&self, pair: &CurrencyPair, date: NaiveDate) -> Option<&ExchangeRate> {
        let key = Self::key(pair, date);
        match self.entries.get(&key) {
            Some(rate) if self.is_valid(rate) => {
                debug!("Cache HIT for {}", key);
                Some(rate)
            }
            Some(_) => {
                debug!("Cache entry expired for {}", key);
                None
            }
            None => {
                debug!("Cache MISS for {}", key);
                None
            }
        }
    }

    /// Stores `rate` under `pair`/`date` and rewrites the cache file. A failed
    /// write is logged; the in-memory entry is kept either way.
    pub fn put(&mut self, pair: &CurrencyPair, date: NaiveDate, rate: ExchangeRate) {
        let key = Self::key(pair, date);
        debug!("Cache PUT for {}", key);
        self.entries.insert(key, rate);
        if let Err(e) = self.persist() {
            warn!("Failed to save rate cache {}: {}", self.path.display(), e);
        }
    }

    /// Drops the entry for `pair` on `date` and rewrites the cache file.
    pub fn remove(&mut self, pair: &CurrencyPair, date: NaiveDate) -> Option<ExchangeRate> {
        let key = Self::key(pair, date);
        let removed = self.entries.remove(&key)?;
        debug!("Cache REMOVE for {}", key);
        if let Err(e) = self.persist() {
            warn!("Failed to save rate cache {}: {}", self.path.display(), e);
        }
        Some(removed)
    }

    /// Up to `limit` valid rates for `pair` from the `lookback_days` days
    /// before `date`, most recent first.
    pub fn recent_rates(
        &self,
        pair: &CurrencyPair,
        date: NaiveDate,
        lookback_days: u32,
        limit: usize,
    ) -> Vec<Decimal> {
        (1..=i64::from(lookback_days))
            .filter_map(|offset| date.checked_sub_signed(chrono::Duration::days(offset)))
            .filter_map(|day| self.get(pair, day))
            .map(|rate| rate.rate)
            .take(limit)
            .collect()
    }

    /// Writes every valid entry to disk.
    pub fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let valid: BTreeMap<&String, &ExchangeRate> = self
            .entries
            .iter()
            .filter(|(_, rate)| self.is_valid(rate))
            .collect();
        fs::write(&self.path, serde_json::to_string_pretty(&valid)?)?;
        debug!("Saved {} exchange rates to cache", valid.len());
        Ok(())
    }

    /// Drops expired entries and returns how many were removed.
    pub fn cleanup_expired(&mut self) -> Result<usize> {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, rate| {
            Utc::now()
                .signed_duration_since(rate.retrieved_at)
                .to_std()
                .map(|age| age < ttl)
                .unwrap_or(true)
        });
        let removed = before - self.entries.len();
        if removed > 0 {
            self.persist()?;
            info!("Cleaned up {} expired cache entries", removed);
        }
        Ok(removed)
    }

    /// Empties the cache and deletes its file.
    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        info!("Exchange rate cache cleared");
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let valid_entries = self
            .entries
            .values()
            .filter(|rate| self.is_valid(rate))
            .count();
        let mut sources = BTreeMap::new();
        for rate in self.entries.values() {
            *sources.entry(rate.source.clone()).or_insert(0) += 1;
        }
        CacheStats {
            total_entries: self.entries.len(),
            valid_entries,
            expired_entries: self.entries.len() - valid_entries,
            cache_file: self.path.clone(),
            cache_duration: self.ttl,
            sources,
            cache_file_size: fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn rate(date: NaiveDate, value: Decimal, source: &str) -> ExchangeRate {
        ExchangeRate::new(&CurrencyPair::usd_eur(), date, value, source).unwrap()
    }

    fn stale(mut rate: ExchangeRate) -> ExchangeRate {
        rate.retrieved_at = Utc::now() - chrono::Duration::hours(2);
        rate
    }

    #[test]
    fn test_put_get_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("rates.json");
        let pair = CurrencyPair::usd_eur();

        let mut cache = RateCache::open(&path, Duration::from_secs(3600));
        assert!(cache.is_empty());
        cache.put(&pair, day(15), rate(day(15), dec!(0.9234), "ECB"));
        assert_eq!(cache.get(&pair, day(15)).unwrap().rate, dec!(0.9234));
        assert!(cache.get(&pair, day(16)).is_none());

        let reopened = RateCache::open(&path, Duration::from_secs(3600));
        assert_eq!(reopened.len(), 1);
        let restored = reopened.get(&pair, day(15)).unwrap();
        assert_eq!(restored.rate, dec!(0.9234));
        assert_eq!(restored.source, "ECB");
    }

    #[test]
    fn test_expired_entries_are_not_served_or_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rates.json");
        let pair = CurrencyPair::usd_eur();

        let mut cache = RateCache::open(&path, Duration::from_secs(3600));
        cache.put(&pair, day(10), stale(rate(day(10), dec!(0.91), "ECB")));
        cache.put(&pair, day(11), rate(day(11), dec!(0.92), "ECB"));

        assert!(cache.get(&pair, day(10)).is_none());
        assert_eq!(cache.len(), 2);

        let stats = cache.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.valid_entries, 1);
        assert_eq!(stats.expired_entries, 1);
        assert_eq!(stats.sources["ECB"], 2);
        assert!(stats.cache_file_size > 0);

        let reopened = RateCache::open(&path, Duration::from_secs(3600));
        assert_eq!(reopened.len(), 1);

        assert_eq!(cache.cleanup_expired().unwrap(), 1);
        assert_eq!(cache.cleanup_expired().unwrap(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_corrupt_file_yields_empty_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rates.json");
        fs::write(&path, "{not json").unwrap();

        let cache = RateCache::open(&path, Duration::from_secs(3600));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_bad_entries_are_skipped_and_numbers_accepted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rates.json");
        let now = Utc::now().to_rfc3339();
        let json = format!(
            r#"{{
  "USD/EUR_2024-01-15": {{"date": "2024-01-15", "rate": 0.9234, "source": "ECB", "currency_pair": "USD/EUR", "timestamp": "{now}"}},
  "USD/EUR_2024-01-16": {{"date": "2024-01-16", "rate": "abc", "source": "ECB", "currency_pair": "USD/EUR", "timestamp": "{now}"}},
  "USD/EUR_2024-01-17": {{"date": "2024-01-17", "rate": -1, "source": "ECB", "currency_pair": "USD/EUR", "timestamp": "{now}"}}
}}"#
        );
        fs::write(&path, json).unwrap();

        let cache = RateCache::open(&path, Duration::from_secs(3600));
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get(&CurrencyPair::usd_eur(), day(15)).unwrap().rate,
            dec!(0.9234)
        );
    }

    #[test]
    fn test_recent_rates_most_recent_first() {
        let dir = tempdir().unwrap();
        let pair = CurrencyPair::usd_eur();
        let mut cache = RateCache::open(dir.path().join("rates.json"), Duration::from_secs(3600));
        for (d, value) in [(2, dec!(0.80)), (8, dec!(0.90)), (9, dec!(0.91)), (10, dec!(0.92)), (11, dec!(0.93))] {
            cache.put(&pair, day(d), rate(day(d), value, "ECB"));
        }

        assert_eq!(
            cache.recent_rates(&pair, day(12), 7, 3),
            vec![dec!(0.93), dec!(0.92), dec!(0.91)]
        );
        // Day 2 lies outside the 7-day window
        assert_eq!(cache.recent_rates(&pair, day(10), 7, 10), vec![dec!(0.91), dec!(0.90)]);
        assert!(cache.recent_rates(&pair.inverse(), day(12), 7, 3).is_empty());
    }

    #[test]
    fn test_remove_drops_entry_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rates.json");
        let pair = CurrencyPair::usd_eur();
        let mut cache = RateCache::open(&path, Duration::from_secs(3600));
        cache.put(&pair, day(15), rate(day(15), dec!(0.92), "ECB"));
        cache.put(&pair, day(16), rate(day(16), dec!(2.0), "ECB"));

        let removed = cache.remove(&pair, day(16)).unwrap();
        assert_eq!(removed.rate, dec!(2.0));
        assert!(cache.remove(&pair, day(16)).is_none());

        let reopened = RateCache::open(&path, Duration::from_secs(3600));
        assert_eq!(reopened.len(), 1);
        assert!(reopened.get(&pair, day(16)).is_none());
        assert_eq!(reopened.get(&pair, day(15)).unwrap().rate, dec!(0.92));
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rates.json");
        let pair = CurrencyPair::usd_eur();
        let mut cache = RateCache::open(&path, Duration::from_secs(3600));
        cache.put(&pair, day(15), rate(day(15), dec!(0.92), "ECB"));
        assert!(path.exists());

        cache.clear().unwrap();
        assert!(cache.is_empty());
        assert!(!path.exists());
        assert_eq!(cache.stats().cache_file_size, 0);
    }
}
