//! Core abstractions shared by the adapters, aggregator and HTTP edge

pub mod error;
pub mod log;
pub mod observation;
pub mod series;

// Re-export main types for cleaner imports
pub use error::ProviderError;
pub use observation::{MISSING_VALUE_SENTINEL, Observation};
pub use series::SeriesProvider;
