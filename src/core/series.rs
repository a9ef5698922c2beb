//! Series fetching abstraction

use async_trait::async_trait;

use super::error::ProviderError;
use super::observation::Observation;

/// Fetches one series from one upstream, most recent observation first.
///
/// `key` is source specific: a FRED series id, an ECB `dataflow/key` pair, or
/// an IMF `database/frequency.country.indicator` path.
#[async_trait]
pub trait SeriesProvider: Send + Sync {
    async fn fetch_series(&self, key: &str, limit: u32)
    -> Result<Vec<Observation>, ProviderError>;
}
