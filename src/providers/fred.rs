use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::config::FredApiKey;
use crate::core::observation::sort_descending;
use crate::core::{Observation, ProviderError, SeriesProvider};

pub const DEFAULT_PASSTHROUGH_LIMIT: u32 = 60;

/// Parameters of one FRED observations query.
#[derive(Debug, Clone, PartialEq)]
pub struct FredQuery {
    pub series_id: String,
    pub limit: u32,
    pub observation_start: Option<String>,
    pub observation_end: Option<String>,
}

impl FredQuery {
    pub fn new(series_id: impl Into<String>, limit: u32) -> Self {
        FredQuery {
            series_id: series_id.into(),
            limit,
            observation_start: None,
            observation_end: None,
        }
    }
}

/// What FRED returned for a query. Never an error: transport and parse
/// failures come back as an empty series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FredSeries {
    pub observations: Vec<Observation>,
    /// FRED's own `error_message`, e.g. for a bad series id or API key.
    pub error_message: Option<String>,
    pub error_code: Option<i64>,
}

#[derive(Deserialize, Debug)]
struct FredObservationsResponse {
    #[serde(default)]
    observations: Vec<Observation>,
    error_message: Option<String>,
    error_code: Option<i64>,
}

pub struct FredProvider {
    base_url: String,
    api_key: FredApiKey,
    client: reqwest::Client,
}

impl FredProvider {
    pub fn new(base_url: &str, api_key: FredApiKey, client: reqwest::Client) -> Self {
        FredProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        }
    }

    #[instrument(
        name = "FredFetch",
        skip(self, query),
        fields(series_id = %query.series_id, limit = query.limit)
    )]
    pub async fn fetch_observations(&self, query: &FredQuery) -> FredSeries {
        match self.request(query).await {
            Ok(mut series) => {
                sort_descending(&mut series.observations);
                if let Some(message) = &series.error_message {
                    warn!(error = %message, "FRED returned an error message");
                }
                series
            }
            Err(e) => {
                warn!(error = %e, "FRED request failed, returning empty series");
                FredSeries::default()
            }
        }
    }

    async fn request(&self, query: &FredQuery) -> Result<FredSeries, ProviderError> {
        let url = format!("{}/series/observations", self.base_url);
        debug!("Requesting FRED observations from {}", url);

        let limit = query.limit.to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("series_id", query.series_id.as_str()),
            ("api_key", self.api_key.expose()),
            ("file_type", "json"),
            ("sort_order", "desc"),
            ("limit", limit.as_str()),
        ];
        if let Some(start) = &query.observation_start {
            params.push(("observation_start", start.as_str()));
        }
        if let Some(end) = &query.observation_end {
            params.push(("observation_end", end.as_str()));
        }

        // FRED reports errors as JSON bodies on 4xx, so the status is not checked.
        // The request URL carries the API key and is stripped from any error.
        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.without_url()))?;
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Request(e.without_url()))?;
        let data: FredObservationsResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::Decode {
                upstream: "FRED",
                message: e.to_string(),
            })?;

        Ok(FredSeries {
            observations: data.observations,
            error_message: data.error_message,
            error_code: data.error_code,
        })
    }
}

#[async_trait]
impl SeriesProvider for FredProvider {
    async fn fetch_series(
        &self,
        key: &str,
        limit: u32,
    ) -> Result<Vec<Observation>, ProviderError> {
        Ok(self
            .fetch_observations(&FredQuery::new(key, limit))
            .await
            .observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::observation::is_descending;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> FredProvider {
        FredProvider::new(
            &server.uri(),
            FredApiKey::new("test-key"),
            reqwest::Client::new(),
        )
    }

    #[tokio::test]
    async fn test_successful_fetch() {
        let mock_server = MockServer::start().await;
        let mock_response = r#"{
            "observations": [
                {"realtime_start": "2024-06-10", "realtime_end": "2024-06-10", "date": "2024-05-01", "value": "21000.1"},
                {"realtime_start": "2024-06-10", "realtime_end": "2024-06-10", "date": "2024-04-01", "value": "20950.0"}
            ]
        }"#;

        Mock::given(method("GET"))
            .and(path("/series/observations"))
            .and(query_param("series_id", "M2SL"))
            .and(query_param("api_key", "test-key"))
            .and(query_param("file_type", "json"))
            .and(query_param("sort_order", "desc"))
            .and(query_param("limit", "24"))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = provider(&mock_server)
            .fetch_observations(&FredQuery::new("M2SL", 24))
            .await;
        assert_eq!(result.observations.len(), 2);
        assert_eq!(
            result.observations[0],
            Observation::new("2024-05-01", "21000.1")
        );
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn test_date_filters_are_forwarded() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/series/observations"))
            .and(query_param("observation_start", "2020-01-01"))
            .and(query_param("observation_end", "2021-01-01"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"observations": []}"#))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut query = FredQuery::new("GDP", 10);
        query.observation_start = Some("2020-01-01".to_string());
        query.observation_end = Some("2021-01-01".to_string());
        let result = provider(&mock_server).fetch_observations(&query).await;
        assert!(result.observations.is_empty());
    }

    #[tokio::test]
    async fn test_fred_error_message_is_kept() {
        let mock_server = MockServer::start().await;
        let mock_response = r#"{
            "error_code": 400,
            "error_message": "Bad Request.  The series does not exist."
        }"#;
        Mock::given(method("GET"))
            .and(path("/series/observations"))
            .respond_with(ResponseTemplate::new(400).set_body_string(mock_response))
            .mount(&mock_server)
            .await;

        let result = provider(&mock_server)
            .fetch_observations(&FredQuery::new("NOPE", 10))
            .await;
        assert!(result.observations.is_empty());
        assert_eq!(result.error_code, Some(400));
        assert_eq!(
            result.error_message.as_deref(),
            Some("Bad Request.  The series does not exist.")
        );
    }

    #[tokio::test]
    async fn test_malformed_body_degrades_to_empty() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/series/observations"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&mock_server)
            .await;

        let result = provider(&mock_server)
            .fetch_observations(&FredQuery::new("M2SL", 10))
            .await;
        assert_eq!(result, FredSeries::default());
    }

    #[tokio::test]
    async fn test_transport_failure_degrades_to_empty() {
        let provider = FredProvider::new(
            "http://127.0.0.1:1",
            FredApiKey::new("test-key"),
            reqwest::Client::new(),
        );
        let observations = provider.fetch_series("M2SL", 10).await.unwrap();
        assert!(observations.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_does_not_expose_api_key() {
        let provider = FredProvider::new(
            "http://127.0.0.1:1",
            FredApiKey::new("SUPERSECRET"),
            reqwest::Client::new(),
        );
        let err = provider
            .request(&FredQuery::new("M2SL", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Request(_)));
        assert!(!err.to_string().contains("SUPERSECRET"), "{err}");
        assert!(!format!("{err:?}").contains("SUPERSECRET"));
    }

    #[tokio::test]
    async fn test_observations_are_descending() {
        let mock_server = MockServer::start().await;
        let mock_response = r#"{
            "observations": [
                {"date": "2024-03-01", "value": "3"},
                {"date": "2024-05-01", "value": "5"},
                {"date": "2024-04-01", "value": "4"}
            ]
        }"#;
        Mock::given(method("GET"))
            .and(path("/series/observations"))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .mount(&mock_server)
            .await;

        let observations = provider(&mock_server)
            .fetch_series("M2SL", 10)
            .await
            .unwrap();
        assert!(is_descending(&observations));
        assert_eq!(observations[0].date, "2024-05-01");
    }
}
