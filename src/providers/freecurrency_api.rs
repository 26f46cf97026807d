use super::util::{self, ResilientFetcher};
use crate::core::error::{Error, Result};
use crate::core::rate::{CurrencyPair, ExchangeRate, ProviderQuote, RateSource, SourceKind};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

const PROVIDER: &str = "FreeCurrencyAPI";

#[derive(Debug, Deserialize)]
struct HistoricalResponse {
    #[serde(default)]
    data: HashMap<String, HashMap<String, Decimal>>,
}

/// Historical rates from freecurrencyapi.com, keyed by date.
pub struct FreeCurrencyApiSource {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    fetcher: ResilientFetcher,
}

impl FreeCurrencyApiSource {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        client: reqwest::Client,
        fetcher: ResilientFetcher,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
            fetcher,
        }
    }
}

#[async_trait]
impl RateSource for FreeCurrencyApiSource {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Fallback
    }

    #[instrument(name = "FreeCurrencyApiFetch", skip_all, fields(pair = %pair, date = %date))]
    async fn fetch_rate(
        &self,
        pair: &CurrencyPair,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>> {
        let day = date.format("%Y-%m-%d").to_string();
        let url = format!(
            "{}/historical?apikey={}&date={}&base_currency={}&currencies={}",
            self.base_url,
            self.api_key.as_deref().unwrap_or_default(),
            day,
            pair.base,
            pair.quote
        );
        let response: HistoricalResponse = self
            .fetcher
            .execute(
                || util::get_json(&self.client, PROVIDER, &url),
                Error::is_retryable,
            )
            .await?;

        let Some(value) = response.data.get(&day).and_then(|rates| rates.get(&pair.quote)) else {
            debug!("No {} rate for {} in FreeCurrencyAPI response", pair, day);
            return Ok(None);
        };

        match ProviderQuote::new(&pair.base, &pair.quote, *value).orient(pair) {
            Some(rate) => Ok(Some(ExchangeRate::new(pair, date, rate, PROVIDER)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::util::RetryPolicy;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(base_url: &str) -> FreeCurrencyApiSource {
        let fetcher = ResilientFetcher::new(RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        });
        FreeCurrencyApiSource::new(
            base_url,
            Some("test-key".to_string()),
            util::http_client(Duration::from_secs(5)).unwrap(),
            fetcher,
        )
    }

    #[tokio::test]
    async fn test_fetch_historical_rate() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/historical"))
            .and(query_param("apikey", "test-key"))
            .and(query_param("date", "2024-01-15"))
            .and(query_param("base_currency", "USD"))
            .and(query_param("currencies", "EUR"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"data": {"2024-01-15": {"EUR": 0.914}}}"#),
            )
            .mount(&mock_server)
            .await;

        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let rate = source(&mock_server.uri())
            .fetch_rate(&CurrencyPair::usd_eur(), date)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rate.rate, dec!(0.914));
        assert_eq!(rate.source, "FreeCurrencyAPI");
    }

    #[tokio::test]
    async fn test_other_date_is_no_data() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"data": {"2024-01-12": {"EUR": 0.914}}}"#),
            )
            .mount(&mock_server)
            .await;

        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let rate = source(&mock_server.uri())
            .fetch_rate(&CurrencyPair::usd_eur(), date)
            .await
            .unwrap();
        assert!(rate.is_none());
    }

    #[tokio::test]
    async fn test_invalid_key_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(401).set_body_string(r#"{"message": "Invalid authentication credentials"}"#),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let err = source(&mock_server.uri())
            .fetch_rate(&CurrencyPair::usd_eur(), date)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Rejected { status: 401, .. }));
    }
}
