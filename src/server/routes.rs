use crate::providers::{ecb, imf};

/// Paths listed back to clients that hit an unknown endpoint.
pub const AVAILABLE_ROUTES: [&str; 5] = ["/fred/", "/ecb/", "/imf/", "/global-m2", "/health"];

/// Where a request goes, decided from the path alone (plus whether a legacy
/// `series_id` query parameter is present).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Fred,
    Ecb { dataflow: String, key: String },
    Imf { key: String },
    GlobalM2,
    Health,
    /// Pre-routing clients that call `/?series_id=...` directly.
    LegacyFred,
    Unknown,
}

impl Route {
    pub fn resolve(path: &str, has_series_id: bool) -> Route {
        if path.starts_with("/fred/") {
            Route::Fred
        } else if let Some(rest) = path.strip_prefix("/ecb/") {
            let (dataflow, key) = rest.split_once('/').unwrap_or((rest, ""));
            Route::Ecb {
                dataflow: non_empty_or(dataflow, ecb::DEFAULT_DATAFLOW),
                key: non_empty_or(key, ecb::DEFAULT_KEY),
            }
        } else if let Some(rest) = path.strip_prefix("/imf/") {
            Route::Imf {
                key: non_empty_or(rest, imf::DEFAULT_KEY),
            }
        } else if path == "/global-m2" {
            Route::GlobalM2
        } else if path == "/health" {
            Route::Health
        } else if has_series_id {
            Route::LegacyFred
        } else {
            Route::Unknown
        }
    }
}

fn non_empty_or(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}
