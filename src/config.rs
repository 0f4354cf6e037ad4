use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::capture::Facing;
use crate::coverage::DEFAULT_SECTOR_COUNT;
use crate::error::ConfigError;
use crate::oracle::Locale;

/// Overrides `tickIntervalMs` from the environment, mainly for demos.
pub const TICK_ENV_VAR: &str = "DENTAL_CAPTURE_TICK_MS";

/// Tunables for a capture session. Every field has a default, so a config
/// file only needs the keys it changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConfig {
    /// Equal angular slices per rotation.
    pub sector_count: u16,
    /// Degrees added per frame by the tick-derived angle source.
    pub angle_step_degrees: u16,
    pub tick_interval_ms: u64,
    /// Upper bound on a single still capture, including encoding.
    pub capture_timeout_ms: u64,
    pub oracle_timeout_ms: u64,
    /// Verdicts must score strictly above this to be accepted.
    pub acceptance_threshold: f64,
    pub nominal_accuracy: f64,
    /// Pause in Processing between an accepted verdict and Completed.
    pub reconstruction_delay_ms: u64,
    pub jpeg_quality: u8,
    pub facing: Facing,
    pub locale: Locale,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sector_count: DEFAULT_SECTOR_COUNT,
            angle_step_degrees: 15,
            tick_interval_ms: 1500,
            capture_timeout_ms: 10_000,
            oracle_timeout_ms: 60_000,
            acceptance_threshold: 70.0,
            nominal_accuracy: 0.994,
            reconstruction_delay_ms: 4000,
            jpeg_quality: 80,
            facing: Facing::Environment,
            locale: Locale::Es,
        }
    }
}

impl CaptureConfig {
    /// Reads a JSON config. A missing file yields the defaults; an unreadable
    /// or invalid one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read capture config from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse capture config at {}", path.display()))?
        } else {
            info!("No capture config at {}, using defaults", path.display());
            CaptureConfig::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var(TICK_ENV_VAR) {
            self.tick_interval_ms = value
                .trim()
                .parse()
                .with_context(|| format!("{TICK_ENV_VAR} must be a whole number of milliseconds"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=360).contains(&self.sector_count) {
            return Err(ConfigError::SectorCount(self.sector_count));
        }

        // Each rotation of ticks must land in every sector at least once.
        let step = self.angle_step_degrees;
        if step == 0 || 360 % step != 0 || u32::from(step) * u32::from(self.sector_count) > 360 {
            return Err(ConfigError::AngleStep {
                step,
                sector_width: 360.0 / f64::from(self.sector_count),
            });
        }

        if !(0.0..=100.0).contains(&self.acceptance_threshold) {
            return Err(ConfigError::AcceptanceThreshold(self.acceptance_threshold));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::JpegQuality(self.jpeg_quality));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration("tickIntervalMs"));
        }
        if self.capture_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("captureTimeoutMs"));
        }
        if self.oracle_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("oracleTimeoutMs"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }

    pub fn reconstruction_delay(&self) -> Duration {
        Duration::from_millis(self.reconstruction_delay_ms)
    }
}
