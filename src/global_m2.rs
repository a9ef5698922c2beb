//! Global M2 aggregation across the US, Euro area, Japan and China.
//!
//! Each region series is fetched concurrently together with the FX rates,
//! converted to USD billions with a fixed per-region formula, checked against a
//! plausibility band and then blended into a total and a value-weighted
//! year-over-year growth figure. Nothing is cached between calls.

use futures::join;
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::config::{Band, FxFallback, GlobalM2Config, PlausibilityBands};
use crate::core::observation::latest_valid_index;
use crate::core::{Observation, SeriesProvider};
use crate::providers::{ecb, imf};

/// Monthly series, so twelve periods back is one year.
pub const YOY_LOOKBACK: usize = 12;

/// ECB reports M3 in EUR millions.
pub const EURO_MILLIONS_PER_BILLION: f64 = 1_000.0;
/// FRED reports Japan M3 in yen.
pub const YEN_PER_BILLION: f64 = 1_000_000_000.0;
/// IMF reports China M2 in CNY millions.
pub const CNY_MILLIONS_TO_BILLIONS: f64 = 0.001;

pub const US_M2_SERIES: &str = "M2SL";
pub const JAPAN_M3_SERIES: &str = "MABMM301JPM189S";
pub const EURUSD_SERIES: &str = "DEXUSEU";
pub const USDJPY_SERIES: &str = "DEXJPUS";
pub const USDCNY_SERIES: &str = "DEXCHUS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Us,
    Euro,
    Japan,
    China,
}

impl Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Region::Us => "us",
                Region::Euro => "euro",
                Region::Japan => "japan",
                Region::China => "china",
            }
        )
    }
}

impl Region {
    pub const ALL: [Region; 4] = [Region::Us, Region::Euro, Region::Japan, Region::China];

    /// Key understood by the region's `SeriesProvider`.
    pub fn series_key(&self) -> String {
        match self {
            Region::Us => US_M2_SERIES.to_string(),
            Region::Euro => format!("{}/{}", ecb::DEFAULT_DATAFLOW, ecb::DEFAULT_KEY),
            Region::Japan => JAPAN_M3_SERIES.to_string(),
            Region::China => imf::DEFAULT_KEY.to_string(),
        }
    }

    pub fn source_label(&self) -> String {
        match self {
            Region::Us => format!("FRED:{US_M2_SERIES}"),
            Region::Euro => format!("ECB:{}", ecb::DEFAULT_DATAFLOW),
            Region::Japan => format!("FRED:{JAPAN_M3_SERIES}"),
            Region::China => "IMF:IFS".to_string(),
        }
    }

    /// Converts a value in the region's native units to USD billions.
    pub fn to_usd_billions(&self, native: f64, fx: &FxRateSet) -> f64 {
        match self {
            Region::Us => native,
            Region::Euro => native / EURO_MILLIONS_PER_BILLION * fx.eurusd,
            Region::Japan => native / fx.usdjpy / YEN_PER_BILLION,
            Region::China => native * CNY_MILLIONS_TO_BILLIONS / fx.usdcny,
        }
    }

    pub fn band(&self, bands: &PlausibilityBands) -> Band {
        match self {
            Region::Us => bands.us,
            Region::Euro => bands.euro,
            Region::Japan => bands.japan,
            Region::China => bands.china,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FxRateSet {
    #[serde(rename = "EURUSD")]
    pub eurusd: f64,
    #[serde(rename = "USDJPY")]
    pub usdjpy: f64,
    #[serde(rename = "USDCNY")]
    pub usdcny: f64,
}

impl From<FxFallback> for FxRateSet {
    fn from(fallback: FxFallback) -> Self {
        FxRateSet {
            eurusd: fallback.eurusd,
            usdjpy: fallback.usdjpy,
            usdcny: fallback.usdcny,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentResult {
    #[serde(rename = "valueUSD")]
    pub value_usd: Option<f64>,
    pub yoy_growth: Option<f64>,
    pub date: String,
    pub source: String,
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Components {
    pub us: ComponentResult,
    pub euro: ComponentResult,
    pub japan: ComponentResult,
    pub china: ComponentResult,
}

impl Components {
    pub fn iter(&self) -> impl Iterator<Item = &ComponentResult> {
        [&self.us, &self.euro, &self.japan, &self.china].into_iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalM2Result {
    #[serde(rename = "totalUSD")]
    pub total_usd: f64,
    pub yoy_growth: f64,
    pub components: Components,
    pub fx_rates: FxRateSet,
    pub warnings: Vec<String>,
}

/// Percent change from `previous` to `current`, undefined when either is
/// missing or zero.
pub fn calc_yoy(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    match (current, previous) {
        (Some(current), Some(previous)) if current != 0.0 && previous != 0.0 => {
            Some((current - previous) / previous * 100.0)
        }
        _ => None,
    }
}

/// Sum of valid components' USD levels.
pub fn total_usd<'a>(components: impl IntoIterator<Item = &'a ComponentResult>) -> f64 {
    components
        .into_iter()
        .filter(|c| c.valid)
        .filter_map(|c| c.value_usd)
        .sum()
}

/// USD-level weighted mean of valid components' growth; 0 without weight.
pub fn weighted_growth<'a>(components: impl IntoIterator<Item = &'a ComponentResult>) -> f64 {
    let (weighted, weight) = components
        .into_iter()
        .filter(|c| c.valid)
        .filter_map(|c| Some((c.value_usd?, c.yoy_growth?)))
        .fold((0.0, 0.0), |(weighted, weight), (value, growth)| {
            (weighted + value * growth, weight + value)
        });

    if weight == 0.0 { 0.0 } else { weighted / weight }
}

/// Builds one region's component, returning a warning when it is excluded.
pub fn evaluate_component(
    region: Region,
    observations: &[Observation],
    fx: &FxRateSet,
    bands: &PlausibilityBands,
) -> (ComponentResult, Option<String>) {
    let source = region.source_label();
    let invalid = |date: String| ComponentResult {
        value_usd: None,
        yoy_growth: None,
        date,
        source: source.clone(),
        valid: false,
    };

    let Some(latest_idx) = latest_valid_index(observations) else {
        let warning = format!("{region}: no valid observations from {source}");
        return (invalid("unknown".to_string()), Some(warning));
    };
    let latest = &observations[latest_idx];
    let latest_value = latest.numeric_value();
    let year_ago_value = observations
        .get(latest_idx + YOY_LOOKBACK)
        .or(observations.last())
        .and_then(Observation::numeric_value);

    let value_usd = latest_value.map(|v| region.to_usd_billions(v, fx));
    let band = region.band(bands);
    match value_usd {
        Some(usd) if band.contains(usd) => {
            let component = ComponentResult {
                value_usd: Some(usd),
                yoy_growth: calc_yoy(latest_value, year_ago_value),
                date: latest.date.clone(),
                source: source.clone(),
                valid: true,
            };
            (component, None)
        }
        _ => {
            let shown = value_usd.map_or("n/a".to_string(), |v| format!("{v:.2}"));
            let warning = format!(
                "{region}: converted value {shown} USD bn for {} is outside the plausible range ({}, {}); excluded",
                latest.date, band.min, band.max
            );
            (invalid(latest.date.clone()), Some(warning))
        }
    }
}

/// Blends already-fetched region series into the global result.
pub fn aggregate(
    us: &[Observation],
    euro: &[Observation],
    japan: &[Observation],
    china: &[Observation],
    fx_rates: FxRateSet,
    bands: &PlausibilityBands,
) -> GlobalM2Result {
    let mut warnings = Vec::new();
    let mut evaluate = |region: Region, observations: &[Observation]| {
        let (component, warning) = evaluate_component(region, observations, &fx_rates, bands);
        if let Some(warning) = warning {
            warn!("{}", warning);
            warnings.push(warning);
        }
        component
    };

    let components = Components {
        us: evaluate(Region::Us, us),
        euro: evaluate(Region::Euro, euro),
        japan: evaluate(Region::Japan, japan),
        china: evaluate(Region::China, china),
    };

    GlobalM2Result {
        total_usd: total_usd(components.iter()),
        yoy_growth: weighted_growth(components.iter()),
        components,
        fx_rates,
        warnings,
    }
}

/// Upstreams the aggregator reads from.
#[derive(Clone)]
pub struct GlobalM2Sources {
    pub fred: Arc<dyn SeriesProvider>,
    pub ecb: Arc<dyn SeriesProvider>,
    pub imf: Arc<dyn SeriesProvider>,
}

impl GlobalM2Sources {
    fn for_region(&self, region: Region) -> &dyn SeriesProvider {
        match region {
            Region::Us | Region::Japan => self.fred.as_ref(),
            Region::Euro => self.ecb.as_ref(),
            Region::China => self.imf.as_ref(),
        }
    }

    async fn fetch_region(&self, region: Region, limit: u32) -> Vec<Observation> {
        match self
            .for_region(region)
            .fetch_series(&region.series_key(), limit)
            .await
        {
            Ok(observations) => {
                debug!(%region, count = observations.len(), "Fetched region series");
                observations
            }
            Err(e) => {
                warn!(%region, error = %e, "Region fetch failed, continuing without it");
                Vec::new()
            }
        }
    }

    async fn fetch_rate(&self, series_id: &str, limit: u32, fallback: f64) -> f64 {
        let observations = self
            .fred
            .fetch_series(series_id, limit)
            .await
            .unwrap_or_default();
        observations
            .iter()
            .find_map(Observation::numeric_value)
            .filter(|rate| *rate > 0.0)
            .unwrap_or_else(|| {
                warn!(series_id, fallback, "No usable FX rate, using fallback");
                fallback
            })
    }

    /// Fetches the three FX rates concurrently, defaulting each independently.
    pub async fn fetch_fx_rates(&self, limit: u32, fallback: FxFallback) -> FxRateSet {
        let (eurusd, usdjpy, usdcny) = join!(
            self.fetch_rate(EURUSD_SERIES, limit, fallback.eurusd),
            self.fetch_rate(USDJPY_SERIES, limit, fallback.usdjpy),
            self.fetch_rate(USDCNY_SERIES, limit, fallback.usdcny),
        );
        FxRateSet {
            eurusd,
            usdjpy,
            usdcny,
        }
    }
}

/// Fetches every region and the FX rates concurrently and aggregates them.
///
/// Always produces a result: failed or implausible regions become invalid
/// components with a warning.
#[instrument(name = "GlobalM2", skip_all)]
pub async fn compute_global_m2(
    sources: &GlobalM2Sources,
    settings: &GlobalM2Config,
) -> GlobalM2Result {
    let limit = settings.series_limit;
    let (us, euro, japan, china, fx_rates) = join!(
        sources.fetch_region(Region::Us, limit),
        sources.fetch_region(Region::Euro, limit),
        sources.fetch_region(Region::Japan, limit),
        sources.fetch_region(Region::China, limit),
        sources.fetch_fx_rates(settings.fx_limit, settings.fx_fallback),
    );
    debug!(?fx_rates, "Resolved FX rates");

    aggregate(&us, &euro, &japan, &china, fx_rates, &settings.bands)
}
