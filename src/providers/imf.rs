use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::observation::sort_descending;
use crate::core::{Observation, ProviderError, SeriesProvider};

/// China broad money from International Financial Statistics.
pub const DEFAULT_KEY: &str = "IFS/M.CN.FMBN_NUM";

/// IMF CompactData collapses single-element arrays into bare objects.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Deserialize, Debug)]
struct ImfResponse {
    #[serde(rename = "CompactData")]
    compact_data: Option<ImfCompactData>,
}

#[derive(Deserialize, Debug)]
struct ImfCompactData {
    #[serde(rename = "DataSet")]
    data_set: Option<ImfDataSet>,
}

#[derive(Deserialize, Debug)]
struct ImfDataSet {
    #[serde(rename = "Series")]
    series: Option<OneOrMany<ImfSeries>>,
}

#[derive(Deserialize, Debug)]
struct ImfSeries {
    #[serde(rename = "Obs")]
    obs: Option<OneOrMany<ImfObs>>,
}

#[derive(Deserialize, Debug)]
struct ImfObs {
    #[serde(rename = "@TIME_PERIOD")]
    time_period: Option<String>,
    #[serde(rename = "@OBS_VALUE")]
    obs_value: Option<serde_json::Value>,
}

impl ImfObs {
    fn into_observation(self) -> Option<Observation> {
        let date = self.time_period.filter(|p| !p.is_empty())?;
        let value = match self.obs_value? {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(Observation::new(date, value))
    }
}

/// Parses an IMF CompactData body into observations of its first series,
/// most recent first.
pub fn parse_compact_data(body: &str) -> Result<Vec<Observation>, ProviderError> {
    let response: ImfResponse = serde_json::from_str(body).map_err(|e| ProviderError::Decode {
        upstream: "IMF",
        message: e.to_string(),
    })?;

    let Some(series) = response
        .compact_data
        .and_then(|c| c.data_set)
        .and_then(|d| d.series)
        .and_then(|s| s.into_vec().into_iter().next())
    else {
        return Ok(Vec::new());
    };

    let mut observations: Vec<Observation> = series
        .obs
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .filter_map(ImfObs::into_observation)
        .collect();

    sort_descending(&mut observations);
    Ok(observations)
}

pub struct ImfProvider {
    base_url: String,
    client: reqwest::Client,
}

impl ImfProvider {
    pub fn new(base_url: &str, client: reqwest::Client) -> Self {
        ImfProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    #[instrument(name = "ImfFetch", skip(self))]
    pub async fn fetch_observations(&self, key: &str) -> Result<Vec<Observation>, ProviderError> {
        let url = format!("{}/CompactData/{}", self.base_url, key);
        debug!("Requesting IMF data from {}", url);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::UpstreamStatus {
                upstream: "IMF",
                status: response.status().as_u16(),
            });
        }

        let text = response.text().await?;
        parse_compact_data(&text)
    }
}

#[async_trait]
impl SeriesProvider for ImfProvider {
    /// CompactData has no observation limit, so `limit` trims the parsed series.
    async fn fetch_series(
        &self,
        key: &str,
        limit: u32,
    ) -> Result<Vec<Observation>, ProviderError> {
        let mut observations = self.fetch_observations(key).await?;
        observations.truncate(limit as usize);
        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::observation::is_descending;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_series_array_and_obs_array() {
        let body = r#"{
            "CompactData": {"DataSet": {"Series": [
                {"@FREQ": "M", "Obs": [
                    {"@TIME_PERIOD": "2024-01", "@OBS_VALUE": "299000000"},
                    {"@TIME_PERIOD": "2024-03", "@OBS_VALUE": "301000000"},
                    {"@TIME_PERIOD": "2024-02", "@OBS_VALUE": "300000000"}
                ]},
                {"@FREQ": "M", "Obs": [{"@TIME_PERIOD": "1999-01", "@OBS_VALUE": "1"}]}
            ]}}
        }"#;
        let observations = parse_compact_data(body).unwrap();
        assert_eq!(
            observations,
            vec![
                Observation::new("2024-03", "301000000"),
                Observation::new("2024-02", "300000000"),
                Observation::new("2024-01", "299000000"),
            ]
        );
        assert!(is_descending(&observations));
    }

    #[test]
    fn test_parse_single_series_and_single_obs() {
        let body = r#"{
            "CompactData": {"DataSet": {"Series": {
                "Obs": {"@TIME_PERIOD": "2024-03", "@OBS_VALUE": 42.5}
            }}}
        }"#;
        let observations = parse_compact_data(body).unwrap();
        assert_eq!(observations, vec![Observation::new("2024-03", "42.5")]);
    }

    #[test]
    fn test_parse_skips_incomplete_obs() {
        let body = r#"{
            "CompactData": {"DataSet": {"Series": {"Obs": [
                {"@TIME_PERIOD": "2024-03"},
                {"@OBS_VALUE": "5"},
                {"@TIME_PERIOD": "2024-01", "@OBS_VALUE": "7"}
            ]}}}
        }"#;
        let observations = parse_compact_data(body).unwrap();
        assert_eq!(observations, vec![Observation::new("2024-01", "7")]);
    }

    #[test]
    fn test_parse_missing_series_is_empty() {
        assert!(
            parse_compact_data(r#"{"CompactData": {"DataSet": {}}}"#)
                .unwrap()
                .is_empty()
        );
        assert!(parse_compact_data("{}").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_successful_fetch_with_limit() {
        let mock_server = MockServer::start().await;
        let body = r#"{
            "CompactData": {"DataSet": {"Series": {"Obs": [
                {"@TIME_PERIOD": "2024-01", "@OBS_VALUE": "1"},
                {"@TIME_PERIOD": "2024-02", "@OBS_VALUE": "2"},
                {"@TIME_PERIOD": "2024-03", "@OBS_VALUE": "3"}
            ]}}}
        }"#;
        Mock::given(method("GET"))
            .and(path("/CompactData/IFS/M.CN.FMBN_NUM"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = ImfProvider::new(&mock_server.uri(), reqwest::Client::new());
        let observations = provider.fetch_series(DEFAULT_KEY, 2).await.unwrap();
        assert_eq!(
            observations,
            vec![
                Observation::new("2024-03", "3"),
                Observation::new("2024-02", "2"),
            ]
        );
    }

    #[tokio::test]
    async fn test_non_success_status_is_surfaced() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/CompactData/IFS/M.XX.NOPE"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let provider = ImfProvider::new(&mock_server.uri(), reqwest::Client::new());
        let err = provider
            .fetch_observations("IFS/M.XX.NOPE")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "IMF API returned 500");
    }
}
