use super::util::{self, ResilientFetcher};
use crate::core::error::{Error, Result};
use crate::core::rate::{CurrencyPair, ExchangeRate, ProviderQuote, RateSource, SourceKind};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::ACCEPT;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{debug, instrument};

const PROVIDER: &str = "ECB";
const SDMX_GENERIC_XML: &str = "application/vnd.sdmx.data+xml;version=2.1";

/// European Central Bank reference rates from the SDMX data service.
///
/// The ECB publishes every series as units of foreign currency per euro, so
/// only pairs with EUR on one side are served.
pub struct EcbSource {
    base_url: String,
    client: reqwest::Client,
    fetcher: ResilientFetcher,
}

impl EcbSource {
    pub fn new(base_url: &str, client: reqwest::Client, fetcher: ResilientFetcher) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            fetcher,
        }
    }

    /// The non-euro side of `pair`, if the ECB publishes it.
    fn foreign_currency(pair: &CurrencyPair) -> Option<&str> {
        match (pair.base.as_str(), pair.quote.as_str()) {
            ("EUR", "EUR") => None,
            ("EUR", other) | (other, "EUR") => Some(other),
            _ => None,
        }
    }
}

/// Finds the observation for `date` in a generic SDMX data message.
fn parse_observation(xml: &str, date: NaiveDate) -> Result<Option<Decimal>> {
    if xml.trim().is_empty() {
        return Ok(None);
    }
    let doc = roxmltree::Document::parse(xml).map_err(|e| Error::Malformed {
        provider: PROVIDER.to_string(),
        message: e.to_string(),
    })?;

    let wanted = date.format("%Y-%m-%d").to_string();
    for obs in doc.descendants().filter(|n| n.has_tag_name("Obs")) {
        let period = obs
            .descendants()
            .find(|n| n.has_tag_name("ObsDimension") && n.attribute("id") == Some("TIME_PERIOD"))
            .and_then(|n| n.attribute("value"));
        if period != Some(wanted.as_str()) {
            continue;
        }
        let value = obs
            .descendants()
            .find(|n| n.has_tag_name("ObsValue"))
            .and_then(|n| n.attribute("value"))
            .and_then(|v| Decimal::from_str(v.trim()).ok());
        if value.is_some() {
            return Ok(value);
        }
    }
    Ok(None)
}

#[async_trait]
impl RateSource for EcbSource {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Primary
    }

    #[instrument(name = "EcbRateFetch", skip_all, fields(pair = %pair, date = %date))]
    async fn fetch_rate(
        &self,
        pair: &CurrencyPair,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>> {
        let Some(foreign) = Self::foreign_currency(pair) else {
            debug!("ECB does not publish {}", pair);
            return Ok(None);
        };

        let day = date.format("%Y-%m-%d");
        let url = format!(
            "{}/EXR/D.{}.EUR.SP00.A?startPeriod={}&endPeriod={}",
            self.base_url, foreign, day, day
        );
        debug!("Requesting ECB rate from {}", url);

        let body = match self
            .fetcher
            .execute(
                || util::send(PROVIDER, self.client.get(&url).header(ACCEPT, SDMX_GENERIC_XML)),
                Error::is_retryable,
            )
            .await
        {
            Ok(body) => body,
            // The data service answers 404 when no observation exists
            Err(e) if e.is_not_found() => {
                debug!("No ECB observation for {}", date);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let Some(value) = parse_observation(&body, date)? else {
            debug!("No ECB observation for {}", date);
            return Ok(None);
        };
        match ProviderQuote::new("EUR", foreign, value).orient(pair) {
            Some(rate) => Ok(Some(ExchangeRate::new(pair, date, rate, PROVIDER)?)),
            None => Ok(None),
        }
    }
}
