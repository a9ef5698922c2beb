//! HTTP edge: a single dispatcher that answers CORS preflight first, then
//! routes by path prefix to a passthrough adapter, the aggregator, or health.

pub mod handlers;
pub mod response;
pub mod routes;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Query, State};
use axum::http::{Method, Uri};
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, FredApiKey, GlobalM2Config};
use crate::global_m2::GlobalM2Sources;
use crate::providers::{EcbProvider, FredProvider, ImfProvider, build_client};
use handlers::QueryParams;
use response::ApiError;
use routes::Route;

pub struct AppState {
    pub fred: Arc<FredProvider>,
    pub ecb: Arc<EcbProvider>,
    pub imf: Arc<ImfProvider>,
    pub global_m2: GlobalM2Config,
}

impl AppState {
    pub fn from_config(config: &AppConfig, api_key: FredApiKey) -> Result<Self> {
        if api_key.is_empty() {
            warn!("FRED_API_KEY is not set; FRED requests will be rejected upstream");
        }
        let client = build_client(config.providers.request_timeout())?;
        Ok(AppState {
            fred: Arc::new(FredProvider::new(
                &config.providers.fred.base_url,
                api_key,
                client.clone(),
            )),
            ecb: Arc::new(EcbProvider::new(
                &config.providers.ecb.base_url,
                client.clone(),
            )),
            imf: Arc::new(ImfProvider::new(&config.providers.imf.base_url, client)),
            global_m2: config.global_m2.clone(),
        })
    }

    pub fn sources(&self) -> GlobalM2Sources {
        GlobalM2Sources {
            fred: self.fred.clone(),
            ecb: self.ecb.clone(),
            imf: self.imf.clone(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

async fn dispatch(State(state): State<Arc<AppState>>, method: Method, uri: Uri) -> Response {
    if method == Method::OPTIONS {
        return response::preflight();
    }
    debug!(%method, %uri, "Handling request");

    match AssertUnwindSafe(route_request(&state, &uri))
        .catch_unwind()
        .await
    {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => err.into_response(),
        Err(panic) => ApiError::Internal(panic_message(panic)).into_response(),
    }
}

async fn route_request(state: &AppState, uri: &Uri) -> Result<Response, ApiError> {
    let Query(params) = Query::<QueryParams>::try_from_uri(uri)
        .map_err(|e| ApiError::BadRequest(format!("Invalid query string: {e}")))?;

    let has_series_id = handlers::param(&params, "series_id").is_some();
    match Route::resolve(uri.path(), has_series_id) {
        Route::Fred | Route::LegacyFred => handlers::fred(state, &params).await,
        Route::Ecb { dataflow, key } => handlers::ecb(state, &dataflow, &key, &params).await,
        Route::Imf { key } => handlers::imf(state, &key).await,
        Route::GlobalM2 => Ok(handlers::global_m2(state).await),
        Route::Health => Ok(handlers::health()),
        Route::Unknown => Ok(handlers::invalid_endpoint()),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}

/// Serves until Ctrl-C.
pub async fn serve(config: &AppConfig, api_key: FredApiKey) -> Result<()> {
    let state = Arc::new(AppState::from_config(config, api_key)?);
    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
