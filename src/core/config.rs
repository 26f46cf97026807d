use crate::core::error::Error;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::{fs, path::PathBuf};
use tracing::debug;

/// What to do with a rate that deviates from recent history.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Log a warning and keep the rate
    #[default]
    Warn,
    /// Refuse the rate with `ImplausibleRate`
    Reject,
}

/// Rate providers that can be listed as configured fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FallbackSource {
    ExchangeRateApi,
    FreeCurrencyApi,
    Coinbase,
    CoinGecko,
    Frankfurter,
}

impl FallbackSource {
    /// Free sources tried, in this order, before any configured fallback.
    pub const FREE: [FallbackSource; 3] = [
        FallbackSource::ExchangeRateApi,
        FallbackSource::FreeCurrencyApi,
        FallbackSource::Coinbase,
    ];
}

impl FromStr for FallbackSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exchangerate-api" => Ok(FallbackSource::ExchangeRateApi),
            "freecurrency-api" => Ok(FallbackSource::FreeCurrencyApi),
            "coinbase" => Ok(FallbackSource::Coinbase),
            "coingecko" => Ok(FallbackSource::CoinGecko),
            "frankfurter" => Ok(FallbackSource::Frankfurter),
            _ => Err(Error::Config(format!("Unknown fallback source: {s}"))),
        }
    }
}

fn default_cache_duration() -> u64 {
    3600
}

fn default_max_rate_age_days() -> u32 {
    5
}

fn default_fallback_sources() -> Vec<String> {
    vec!["coingecko".to_string()]
}

fn default_tolerance() -> Decimal {
    dec!(0.2)
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExchangeRateConfig {
    /// Seconds a cached rate stays valid
    #[serde(default = "default_cache_duration")]
    pub cache_duration_secs: u64,
    /// How many days around a missing date to search for a primary rate
    #[serde(default = "default_max_rate_age_days")]
    pub max_rate_age_days: u32,
    #[serde(default = "default_fallback_sources")]
    pub fallback_sources: Vec<String>,
    #[serde(default = "default_tolerance")]
    pub tolerance: Decimal,
    #[serde(default)]
    pub validation: ValidationPolicy,
    pub cache_file: Option<String>,
}

impl Default for ExchangeRateConfig {
    fn default() -> Self {
        Self {
            cache_duration_secs: default_cache_duration(),
            max_rate_age_days: default_max_rate_age_days(),
            fallback_sources: default_fallback_sources(),
            tolerance: default_tolerance(),
            validation: ValidationPolicy::default(),
            cache_file: None,
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    60
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Total attempts per request, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_secs: default_max_delay(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl ProviderConfig {
    fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub ecb: Option<ProviderConfig>,
    pub exchangerate_api: Option<ProviderConfig>,
    pub freecurrency_api: Option<ProviderConfig>,
    pub coinbase: Option<ProviderConfig>,
    pub coingecko: Option<ProviderConfig>,
    pub frankfurter: Option<ProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            ecb: Some(ProviderConfig::new(
                "https://data-api.ecb.europa.eu/service/data",
            )),
            exchangerate_api: Some(ProviderConfig::new("https://api.exchangerate-api.com/v4")),
            freecurrency_api: Some(ProviderConfig::new("https://api.freecurrencyapi.com/v1")),
            coinbase: Some(ProviderConfig::new("https://api.coinbase.com/v2")),
            coingecko: Some(ProviderConfig::new("https://api.coingecko.com/api/v3")),
            frankfurter: Some(ProviderConfig::new("https://api.frankfurter.app")),
        }
    }
}

impl ProvidersConfig {
    pub fn base_url(&self, source: FallbackSource) -> String {
        let defaults = ProvidersConfig::default();
        let pick = |configured: &Option<ProviderConfig>, fallback: Option<ProviderConfig>| {
            configured
                .as_ref()
                .map(|p| p.base_url.clone())
                .or_else(|| fallback.map(|p| p.base_url))
                .unwrap_or_default()
        };
        match source {
            FallbackSource::ExchangeRateApi => {
                pick(&self.exchangerate_api, defaults.exchangerate_api)
            }
            FallbackSource::FreeCurrencyApi => {
                pick(&self.freecurrency_api, defaults.freecurrency_api)
            }
            FallbackSource::Coinbase => pick(&self.coinbase, defaults.coinbase),
            FallbackSource::CoinGecko => pick(&self.coingecko, defaults.coingecko),
            FallbackSource::Frankfurter => pick(&self.frankfurter, defaults.frankfurter),
        }
    }

    pub fn ecb_base_url(&self) -> String {
        self.ecb
            .as_ref()
            .map(|p| p.base_url.clone())
            .or_else(|| ProvidersConfig::default().ecb.map(|p| p.base_url))
            .unwrap_or_default()
    }
}

fn default_stablecoins() -> Vec<String> {
    ["USDT", "USDC", "BUSD", "DAI", "TUSD", "FDUSD", "USDP"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub exchange_rates: ExchangeRateConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default = "default_stablecoins")]
    pub stablecoins: Vec<String>,
    /// Approximate USD prices used when no historical quote is wanted
    #[serde(default)]
    pub approximate_prices: HashMap<String, Decimal>,
    pub data_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exchange_rates: ExchangeRateConfig::default(),
            api: ApiConfig::default(),
            providers: ProvidersConfig::default(),
            stablecoins: default_stablecoins(),
            approximate_prices: HashMap::new(),
            data_path: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("fr", "fisc", "fisc")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("fr", "fisc", "fisc")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    /// Location of the JSON rate cache.
    pub fn cache_file_path(&self) -> Result<PathBuf> {
        if let Some(file) = &self.exchange_rates.cache_file {
            return Ok(PathBuf::from(file));
        }
        Ok(self.default_data_path()?.join("exchange_rate_cache.json"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config.validate()?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let rates = &self.exchange_rates;
        if rates.cache_duration_secs == 0 {
            anyhow::bail!("exchange_rates.cache_duration_secs must be positive");
        }
        if rates.max_rate_age_days == 0 {
            anyhow::bail!("exchange_rates.max_rate_age_days must be positive");
        }
        if rates.tolerance <= Decimal::ZERO || rates.tolerance > Decimal::ONE {
            anyhow::bail!(
                "exchange_rates.tolerance must be in (0, 1], got {}",
                rates.tolerance
            );
        }
        if self.api.max_retries == 0 {
            anyhow::bail!("api.max_retries must be at least 1");
        }
        if self.api.timeout_secs == 0 {
            anyhow::bail!("api.timeout_secs must be positive");
        }
        if self.api.base_delay_ms > self.api.max_delay_secs.saturating_mul(1000) {
            anyhow::bail!(
                "api.base_delay_ms ({}) must not exceed api.max_delay_secs ({}s)",
                self.api.base_delay_ms,
                self.api.max_delay_secs
            );
        }
        self.configured_fallbacks()?;
        if let Some((symbol, price)) = self
            .approximate_prices
            .iter()
            .find(|(_, price)| **price <= Decimal::ZERO)
        {
            anyhow::bail!("approximate_prices.{symbol} must be positive, got {price}");
        }
        Ok(())
    }

    /// Configured fallback sources in declaration order.
    pub fn configured_fallbacks(&self) -> Result<Vec<FallbackSource>> {
        self.exchange_rates
            .fallback_sources
            .iter()
            .map(|name| FallbackSource::from_str(name).map_err(anyhow::Error::from))
            .collect()
    }
}
