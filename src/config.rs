//! Load and validate runtime configuration.

use serde::Deserialize;
use std::{fs, path::Path};
use tracing::warn;

use crate::engine::DEFAULT_SAMPLE_COUNT;
use crate::types::{Mode, DEFAULT_CAPITAL};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiCfg {
    pub base_url: String,
    pub host: String, // X-RapidAPI-Host header
    pub timeout_sec: u64,
}

impl Default for ApiCfg {
    fn default() -> Self {
        Self {
            base_url: "https://yahoo-finance-real-time1.p.rapidapi.com".into(),
            host: "yahoo-finance-real-time1.p.rapidapi.com".into(),
            timeout_sec: 15,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DefaultsCfg {
    pub ticker: String,
    pub mode: Mode,
    pub capital: f64,
    /// Earliest expiration picked by default, in days.
    pub min_days: i64,
    pub sample_count: usize,
}

impl Default for DefaultsCfg {
    fn default() -> Self {
        Self {
            ticker: "TSLA".into(),
            mode: Mode::Csp,
            capital: DEFAULT_CAPITAL,
            min_days: 7,
            sample_count: DEFAULT_SAMPLE_COUNT,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WatchCfg {
    pub refresh_interval_sec: u64,
}

impl Default for WatchCfg {
    fn default() -> Self {
        Self {
            refresh_interval_sec: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiCfg,
    pub defaults: DefaultsCfg,
    pub watch: WatchCfg,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let s = fs::read_to_string(path)?;
        Self::parse(&s)
    }

    /// Like `load`, but a missing file means defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_yaml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.defaults.capital <= 0.0 {
            anyhow::bail!("defaults.capital must be positive, got {}", self.defaults.capital);
        }
        if self.defaults.sample_count < 2 {
            anyhow::bail!(
                "defaults.sample_count must be at least 2, got {}",
                self.defaults.sample_count
            );
        }
        if self.watch.refresh_interval_sec == 0 {
            anyhow::bail!("watch.refresh_interval_sec must be positive");
        }
        Ok(())
    }
}
