use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

pub const DEFAULT_FRED_BASE_URL: &str = "https://api.stlouisfed.org/fred";
pub const DEFAULT_ECB_BASE_URL: &str = "https://data-api.ecb.europa.eu/service/data";
pub const DEFAULT_IMF_BASE_URL: &str = "http://dataservices.imf.org/REST/SDMX_JSON.svc";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8787";

/// FRED credential supplied by the hosting environment.
///
/// `Debug` is redacted so the key never ends up in logs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct FredApiKey(String);

impl FredApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        FredApiKey(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for FredApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FredApiKey(***)")
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: DEFAULT_LISTEN.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct UpstreamConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProvidersConfig {
    pub fred: UpstreamConfig,
    pub ecb: UpstreamConfig,
    pub imf: UpstreamConfig,
    /// Per-request upstream timeout. Unset means requests may wait forever.
    pub request_timeout_secs: Option<u64>,
}

impl ProvidersConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            fred: UpstreamConfig {
                base_url: DEFAULT_FRED_BASE_URL.to_string(),
            },
            ecb: UpstreamConfig {
                base_url: DEFAULT_ECB_BASE_URL.to_string(),
            },
            imf: UpstreamConfig {
                base_url: DEFAULT_IMF_BASE_URL.to_string(),
            },
            request_timeout_secs: None,
        }
    }
}

/// Rates used when the live FX fetch yields nothing usable.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct FxFallback {
    pub eurusd: f64,
    pub usdjpy: f64,
    pub usdcny: f64,
}

impl Default for FxFallback {
    fn default() -> Self {
        FxFallback {
            eurusd: 1.08,
            usdjpy: 150.0,
            usdcny: 7.2,
        }
    }
}

/// Open interval of plausible converted values, in USD billions.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

impl Band {
    pub const fn new(min: f64, max: f64) -> Self {
        Band { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value > self.min && value < self.max
    }
}

pub const US_M2_BAND: Band = Band::new(0.0, 50_000.0);
pub const EURO_M3_BAND: Band = Band::new(0.0, 50_000.0);
pub const JAPAN_M3_BAND: Band = Band::new(0.0, 50_000.0);
pub const CHINA_M2_BAND: Band = Band::new(0.0, 100_000.0);

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct PlausibilityBands {
    pub us: Band,
    pub euro: Band,
    pub japan: Band,
    pub china: Band,
}

impl Default for PlausibilityBands {
    fn default() -> Self {
        PlausibilityBands {
            us: US_M2_BAND,
            euro: EURO_M3_BAND,
            japan: JAPAN_M3_BAND,
            china: CHINA_M2_BAND,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct GlobalM2Config {
    pub fx_fallback: FxFallback,
    pub bands: PlausibilityBands,
    /// Observations requested per region series.
    pub series_limit: u32,
    /// Observations requested per FX series.
    pub fx_limit: u32,
}

impl Default for GlobalM2Config {
    fn default() -> Self {
        GlobalM2Config {
            fx_fallback: FxFallback::default(),
            bands: PlausibilityBands::default(),
            series_limit: 24,
            fx_limit: 5,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub providers: ProvidersConfig,
    pub global_m2: GlobalM2Config,
}

impl AppConfig {
    /// Loads the default config file, or built-in defaults when it is absent.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config at {}, using built-in defaults",
                config_path.display()
            );
            return Ok(AppConfig::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "macro-proxy", "macro-proxy")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }
}
