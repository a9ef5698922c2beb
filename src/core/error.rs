use thiserror::Error;

/// Errors an upstream adapter surfaces to its caller.
///
/// FRED never produces these: its failures degrade to an empty series.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The upstream answered with a non-success status. ECB and IMF return
    /// these for unknown dataflows or keys, so the status is passed through.
    #[error("{upstream} API returned {status}")]
    UpstreamStatus { upstream: &'static str, status: u16 },

    /// Transport failure before a response was received.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The body was not the JSON shape the adapter expects.
    #[error("Failed to parse {upstream} response: {message}")]
    Decode {
        upstream: &'static str,
        message: String,
    },
}

impl ProviderError {
    /// Upstream status code when this error carries one.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            ProviderError::UpstreamStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
