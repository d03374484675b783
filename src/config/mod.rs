//! Scanner Configuration
//!
//! Scan policies, normalizer and driver settings stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::driver::DriverOptions;
use crate::normalize::NormalizerConfig;
use crate::policy::{ErrorCorrectionPolicy, PolicyError, ScanMode};

/// Scanner settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Scan mode and per-mode policies
    pub scan: ScanSettings,
    /// Card number normalization
    pub normalizer: NormalizerConfig,
    /// Loop driver settings
    pub driver: DriverSettings,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Policy for the configured scan mode
    pub fn policy(&self) -> Result<ErrorCorrectionPolicy, PolicyError> {
        self.scan.policy_for(self.scan.mode)
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            queue_capacity: self.driver.queue_capacity,
            normalizer: self.normalizer,
        }
    }
}

/// Scan-related settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Mode used when no mode is given on the command line
    pub mode: ScanMode,
    /// Parameters for fast mode
    pub fast: PolicyTable,
    /// Parameters for accurate mode
    pub accurate: PolicyTable,
}

impl ScanSettings {
    /// Build the policy for `mode` from its table
    pub fn policy_for(&self, mode: ScanMode) -> Result<ErrorCorrectionPolicy, PolicyError> {
        let table = match mode {
            ScanMode::Fast => &self.fast,
            ScanMode::Accurate => &self.accurate,
        };
        ErrorCorrectionPolicy::new(mode, table.required_agreement_count, table.max_duration_secs)
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            mode: ScanMode::Fast,
            fast: PolicyTable {
                required_agreement_count: ErrorCorrectionPolicy::FAST_REQUIRED_AGREEMENT,
                max_duration_secs: ErrorCorrectionPolicy::FAST_MAX_DURATION_SECS,
            },
            accurate: PolicyTable {
                required_agreement_count: ErrorCorrectionPolicy::ACCURATE_REQUIRED_AGREEMENT,
                max_duration_secs: ErrorCorrectionPolicy::ACCURATE_MAX_DURATION_SECS,
            },
        }
    }
}

/// Error-correction parameters for one mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyTable {
    /// Agreeing frames needed to converge
    pub required_agreement_count: u32,
    /// Time budget in seconds
    pub max_duration_secs: f64,
}

/// Loop driver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    /// Frames waiting for classification before new frames are dropped
    pub queue_capacity: usize,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DriverOptions::default().queue_capacity,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Get the configuration directory
pub fn config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "cardscan", "CardScan")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}
