pub mod coinbase;
pub mod coingecko;
pub mod ecb;
pub mod exchangerate_api;
pub mod frankfurter;
pub mod freecurrency_api;
pub mod util;

use crate::core::config::{AppConfig, FallbackSource};
use crate::core::conversion::CurrencyConversionPipeline;
use crate::core::price::StaticPriceOracle;
use crate::core::rate::RateSource;
use crate::core::resolver::{ExchangeRateResolver, ResolverSettings};
use crate::store::RateCache;
use anyhow::Result;
use std::time::Duration;
use tracing::debug;
use util::{ResilientFetcher, RetryPolicy};

/// Shared HTTP plumbing handed to every adapter.
#[derive(Clone)]
pub struct ProviderContext {
    pub client: reqwest::Client,
    pub fetcher: ResilientFetcher,
}

impl ProviderContext {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            client: util::http_client(Duration::from_secs(config.api.timeout_secs))?,
            fetcher: ResilientFetcher::new(RetryPolicy::from(&config.api)),
        })
    }
}

/// Fallback order: the free sources first, then configured sources that
/// are not already among them.
pub fn fallback_chain(config: &AppConfig) -> Result<Vec<FallbackSource>> {
    let mut chain = FallbackSource::FREE.to_vec();
    for source in config.configured_fallbacks()? {
        if !chain.contains(&source) {
            chain.push(source);
        }
    }
    Ok(chain)
}

pub fn build_fallback(
    source: FallbackSource,
    config: &AppConfig,
    ctx: &ProviderContext,
) -> Box<dyn RateSource> {
    let base_url = config.providers.base_url(source);
    let client = ctx.client.clone();
    let fetcher = ctx.fetcher.clone();
    match source {
        FallbackSource::ExchangeRateApi => Box::new(exchangerate_api::ExchangeRateApiSource::new(
            &base_url, client, fetcher,
        )),
        FallbackSource::FreeCurrencyApi => {
            let api_key = config
                .providers
                .freecurrency_api
                .as_ref()
                .and_then(|p| p.api_key.clone());
            Box::new(freecurrency_api::FreeCurrencyApiSource::new(
                &base_url, api_key, client, fetcher,
            ))
        }
        FallbackSource::Coinbase => Box::new(coinbase::CoinbaseSource::new(
            &base_url, client, fetcher,
        )),
        FallbackSource::CoinGecko => Box::new(coingecko::CoinGeckoSource::new(
            &base_url, client, fetcher,
        )),
        FallbackSource::Frankfurter => Box::new(frankfurter::FrankfurterSource::new(
            &base_url, client, fetcher,
        )),
    }
}

/// Wires the cache, the ECB primary source and the fallback chain.
pub fn build_resolver(config: &AppConfig) -> Result<ExchangeRateResolver> {
    let ctx = ProviderContext::from_config(config)?;
    let cache = RateCache::open(
        config.cache_file_path()?,
        Duration::from_secs(config.exchange_rates.cache_duration_secs),
    );
    let primary = Box::new(ecb::EcbSource::new(
        &config.providers.ecb_base_url(),
        ctx.client.clone(),
        ctx.fetcher.clone(),
    ));
    let fallbacks = fallback_chain(config)?
        .into_iter()
        .map(|source| build_fallback(source, config, &ctx))
        .collect::<Vec<_>>();
    debug!(
        "Resolver fallbacks: {:?}",
        fallbacks.iter().map(|s| s.name()).collect::<Vec<_>>()
    );

    Ok(ExchangeRateResolver::new(
        cache,
        primary,
        fallbacks,
        ResolverSettings::from(&config.exchange_rates),
    ))
}

/// Resolver plus price oracles: configured approximate prices first, then
/// CoinGecko spot history.
pub fn build_pipeline(config: &AppConfig) -> Result<CurrencyConversionPipeline> {
    let ctx = ProviderContext::from_config(config)?;
    let resolver = build_resolver(config)?;
    let spot = coingecko::CoinGeckoSource::new(
        &config.providers.base_url(FallbackSource::CoinGecko),
        ctx.client,
        ctx.fetcher,
    );

    let mut pipeline = CurrencyConversionPipeline::new(resolver, &config.stablecoins);
    let reference = StaticPriceOracle::new(config.approximate_prices.clone());
    if !reference.is_empty() {
        pipeline = pipeline.with_reference_oracle(Box::new(reference));
    }
    Ok(pipeline.with_spot_oracle(Box::new(spot)))
}
