//! Uniform JSON envelope and error conversion for every response

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::core::ProviderError;

pub const CACHE_CONTROL: &str = "public, max-age=1800, stale-while-revalidate=3600";
pub const PROXY_VERSION: &str = env!("CARGO_PKG_VERSION");

const X_PROXY_VERSION: HeaderName = HeaderName::from_static("x-proxy-version");

const CORS_HEADERS: [(HeaderName, &str); 4] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, OPTIONS"),
    (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
    (header::ACCESS_CONTROL_MAX_AGE, "86400"),
];

fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    for (name, value) in CORS_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    response
}

/// 204 with CORS headers and nothing else.
pub fn preflight() -> Response {
    with_cors((StatusCode::NO_CONTENT, Body::empty()).into_response())
}

/// Pretty JSON body plus CORS, cache and version headers.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    let (status, text) = match serde_json::to_string_pretty(body) {
        Ok(text) => (status, text),
        Err(e) => {
            error!(error = %e, "Failed to serialize response body");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"error": "Internal server error"}"#.to_string(),
            )
        }
    };

    let mut response = with_cors((status, text).into_response());
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL));
    headers.insert(X_PROXY_VERSION, HeaderValue::from_static(PROXY_VERSION));
    response
}

/// Failures that escape a route handler.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                json_response(StatusCode::BAD_REQUEST, &json!({ "error": message }))
            }
            err => {
                error!(error = %err, "Request failed");
                json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &json!({ "error": "Internal server error", "message": err.to_string() }),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_response_headers() {
        let response = json_response(StatusCode::OK, &json!({ "status": "ok" }));
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, OPTIONS");
        assert_eq!(headers[header::CACHE_CONTROL], CACHE_CONTROL);
        assert_eq!(headers["x-proxy-version"], PROXY_VERSION);
    }

    #[test]
    fn test_preflight_has_only_cors_headers() {
        let response = preflight();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "86400");
        assert!(headers.get(header::CACHE_CONTROL).is_none());
        assert!(headers.get(header::CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_bad_request_status() {
        let response = ApiError::BadRequest("Missing series_id parameter".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_provider_error_is_internal() {
        let err = ApiError::from(ProviderError::Decode {
            upstream: "ECB",
            message: "eof".to_string(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
