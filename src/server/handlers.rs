use axum::http::StatusCode;
use axum::response::Response;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::AppState;
use super::response::{ApiError, PROXY_VERSION, json_response};
use super::routes::AVAILABLE_ROUTES;
use crate::core::ProviderError;
use crate::global_m2::{GlobalM2Result, compute_global_m2};
use crate::providers::{FredQuery, ecb, fred};

pub type QueryParams = HashMap<String, String>;

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Query value, treating an empty string as absent.
pub(super) fn param<'a>(params: &'a QueryParams, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

fn parse_limit(params: &QueryParams, default: u32) -> Result<u32, ApiError> {
    match param(params, "limit") {
        None => Ok(default),
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|limit| *limit > 0)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid limit parameter: {raw}"))),
    }
}

/// Turns an upstream status error into an envelope carrying that status.
fn upstream_error(
    err: ProviderError,
    body: impl FnOnce(String) -> serde_json::Value,
) -> Result<Response, ApiError> {
    match err.upstream_status().and_then(|s| StatusCode::from_u16(s).ok()) {
        Some(status) => {
            warn!(error = %err, "Upstream returned an error status");
            Ok(json_response(status, &body(err.to_string())))
        }
        None => Err(err.into()),
    }
}

pub fn health() -> Response {
    json_response(
        StatusCode::OK,
        &json!({
            "status": "ok",
            "timestamp": timestamp(),
            "version": PROXY_VERSION,
        }),
    )
}

pub fn invalid_endpoint() -> Response {
    json_response(
        StatusCode::BAD_REQUEST,
        &json!({
            "error": "Invalid endpoint",
            "available": AVAILABLE_ROUTES,
        }),
    )
}

pub async fn fred(state: &AppState, params: &QueryParams) -> Result<Response, ApiError> {
    let Some(series_id) = param(params, "series_id") else {
        return Err(ApiError::BadRequest(
            "Missing series_id parameter".to_string(),
        ));
    };
    let query = FredQuery {
        series_id: series_id.to_string(),
        limit: parse_limit(params, fred::DEFAULT_PASSTHROUGH_LIMIT)?,
        observation_start: param(params, "observation_start").map(str::to_string),
        observation_end: param(params, "observation_end").map(str::to_string),
    };
    debug!(?query, "FRED passthrough");

    let series = state.fred.fetch_observations(&query).await;
    Ok(json_response(
        StatusCode::OK,
        &json!({
            "source": "FRED",
            "series_id": query.series_id,
            "count": series.observations.len(),
            "observations": series.observations,
            "error": series.error_message,
            "error_code": series.error_code,
        }),
    ))
}

pub async fn ecb(
    state: &AppState,
    dataflow: &str,
    key: &str,
    params: &QueryParams,
) -> Result<Response, ApiError> {
    let last_n = parse_limit(params, ecb::DEFAULT_LAST_N)?;
    match state.ecb.fetch_observations(dataflow, key, last_n).await {
        Ok(observations) => Ok(json_response(
            StatusCode::OK,
            &json!({
                "source": "ECB",
                "dataflow": dataflow,
                "key": key,
                "observations": observations,
            }),
        )),
        Err(err) => upstream_error(err, |message| {
            json!({
                "source": "ECB",
                "error": message,
                "dataflow": dataflow,
                "key": key,
            })
        }),
    }
}

pub async fn imf(state: &AppState, key: &str) -> Result<Response, ApiError> {
    match state.imf.fetch_observations(key).await {
        Ok(observations) => Ok(json_response(
            StatusCode::OK,
            &json!({
                "source": "IMF",
                "key": key,
                "observations": observations,
            }),
        )),
        Err(err) => upstream_error(err, |message| {
            json!({
                "source": "IMF",
                "error": message,
                "key": key,
            })
        }),
    }
}

#[derive(Serialize)]
struct GlobalM2Envelope<'a> {
    source: &'static str,
    timestamp: String,
    #[serde(flatten)]
    result: &'a GlobalM2Result,
}

pub async fn global_m2(state: &AppState) -> Response {
    let result = compute_global_m2(&state.sources(), &state.global_m2).await;
    json_response(
        StatusCode::OK,
        &GlobalM2Envelope {
            source: "AGGREGATED",
            timestamp: timestamp(),
            result: &result,
        },
    )
}
