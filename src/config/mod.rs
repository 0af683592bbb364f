use crate::global;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::audio::DEFAULT_TOP_FRACTION;
use crate::detection::CycleTiming;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub alert: AlertConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,
    /// Length of one capture window
    pub window_duration_ms: u64,
    /// Gap between capture windows
    pub pause_duration_ms: u64,
    /// Share of the highest samples averaged into the loudness value
    pub top_fraction: f64,
    /// Input device name; empty or missing uses the system default
    pub device: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Loudness above which a window counts as loud
    pub threshold: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            window_duration_ms: 5000,
            pause_duration_ms: 1000,
            top_fraction: DEFAULT_TOP_FRACTION,
            device: None,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self { threshold: 400.0 }
    }
}

impl CaptureConfig {
    pub fn timing(&self) -> CycleTiming {
        CycleTiming::from_millis(self.window_duration_ms, self.pause_duration_ms)
    }
}

impl Config {
    /// Load the user config, writing the defaults on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path:?}"))?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let capture = &self.capture;
        if capture.sample_rate == 0 {
            bail!("capture.sample_rate must be greater than zero");
        }
        if capture.window_duration_ms == 0 {
            bail!("capture.window_duration_ms must be greater than zero");
        }
        if !(capture.top_fraction > 0.0 && capture.top_fraction <= 1.0) {
            bail!(
                "capture.top_fraction must be in (0, 1], got {}",
                capture.top_fraction
            );
        }
        if !self.alert.threshold.is_finite() {
            bail!("alert.threshold must be a finite number");
        }
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
