pub mod ecb;
pub mod fred;
pub mod imf;

use anyhow::{Context, Result};
use std::time::Duration;

pub use ecb::EcbProvider;
pub use fred::{FredProvider, FredQuery, FredSeries};
pub use imf::ImfProvider;

/// Shared HTTP client for every upstream. No timeout unless one is configured.
pub fn build_client(timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut builder =
        reqwest::Client::builder().user_agent(concat!("macro-proxy/", env!("CARGO_PKG_VERSION")));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().context("Failed to build HTTP client")
}
