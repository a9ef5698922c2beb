use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::core::observation::sort_descending;
use crate::core::{Observation, ProviderError, SeriesProvider};

pub const DEFAULT_DATAFLOW: &str = "BSI";
/// Euro area M3, outstanding amounts, EUR millions.
pub const DEFAULT_KEY: &str = "M.U2.Y.V.M30.X.1.U2.2300.Z01.E";
pub const DEFAULT_LAST_N: u32 = 24;

// SDMX-JSON keeps observation values and time periods apart: each series maps
// a stringified index to a values array, and the index points into the
// observation dimension's `values` list.

#[derive(Deserialize, Debug)]
struct SdmxMessage {
    #[serde(rename = "dataSets", default)]
    data_sets: Vec<SdmxDataSet>,
    structure: Option<SdmxStructure>,
}

#[derive(Deserialize, Debug)]
struct SdmxDataSet {
    /// Keyed by dimension positions such as `0:0:0`, in document order.
    #[serde(default)]
    series: IndexMap<String, SdmxSeries>,
}

#[derive(Deserialize, Debug)]
struct SdmxSeries {
    #[serde(default)]
    observations: HashMap<String, Vec<Option<serde_json::Value>>>,
}

#[derive(Deserialize, Debug)]
struct SdmxStructure {
    dimensions: SdmxDimensions,
}

#[derive(Deserialize, Debug)]
struct SdmxDimensions {
    #[serde(default)]
    observation: Vec<SdmxDimension>,
}

#[derive(Deserialize, Debug)]
struct SdmxDimension {
    #[serde(default)]
    values: Vec<SdmxDimensionValue>,
}

#[derive(Deserialize, Debug)]
struct SdmxDimensionValue {
    id: Option<String>,
    name: Option<String>,
}

impl SdmxDimensionValue {
    fn label(&self) -> Option<&str> {
        self.id.as_deref().or(self.name.as_deref())
    }
}

fn value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn flatten_sdmx(message: SdmxMessage) -> Vec<Observation> {
    let periods = message
        .structure
        .as_ref()
        .and_then(|s| s.dimensions.observation.first())
        .map(|dim| dim.values.as_slice())
        .unwrap_or_default();

    let Some(series) = message
        .data_sets
        .into_iter()
        .next()
        .and_then(|ds| ds.series.into_values().next())
    else {
        return Vec::new();
    };

    let mut observations: Vec<Observation> = series
        .observations
        .iter()
        .filter_map(|(idx, values)| {
            let period = idx
                .parse::<usize>()
                .ok()
                .and_then(|i| periods.get(i))
                .and_then(SdmxDimensionValue::label)?;
            let value = values.first()?.as_ref().and_then(value_to_string)?;
            Some(Observation::new(period, value))
        })
        .collect();

    sort_descending(&mut observations);
    observations
}

/// Parses an SDMX-JSON body into observations, most recent first.
pub fn parse_sdmx_json(body: &str) -> Result<Vec<Observation>, ProviderError> {
    let message: SdmxMessage = serde_json::from_str(body).map_err(|e| ProviderError::Decode {
        upstream: "ECB",
        message: e.to_string(),
    })?;
    Ok(flatten_sdmx(message))
}

pub struct EcbProvider {
    base_url: String,
    client: reqwest::Client,
}

impl EcbProvider {
    pub fn new(base_url: &str, client: reqwest::Client) -> Self {
        EcbProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    #[instrument(name = "EcbFetch", skip(self))]
    pub async fn fetch_observations(
        &self,
        dataflow: &str,
        key: &str,
        last_n: u32,
    ) -> Result<Vec<Observation>, ProviderError> {
        let url = format!("{}/{}/{}", self.base_url, dataflow, key);
        debug!("Requesting ECB data from {}", url);

        let last_n = last_n.to_string();
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("format", "jsondata"), ("lastNObservations", last_n.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::UpstreamStatus {
                upstream: "ECB",
                status: response.status().as_u16(),
            });
        }

        let text = response.text().await?;
        parse_sdmx_json(&text)
    }
}

#[async_trait]
impl SeriesProvider for EcbProvider {
    /// `key` is `dataflow/series-key`, e.g. `BSI/M.U2.Y.V.M30.X.1.U2.2300.Z01.E`.
    async fn fetch_series(
        &self,
        key: &str,
        limit: u32,
    ) -> Result<Vec<Observation>, ProviderError> {
        let (dataflow, series_key) = key.split_once('/').unwrap_or((DEFAULT_DATAFLOW, key));
        self.fetch_observations(dataflow, series_key, limit).await
    }
}
