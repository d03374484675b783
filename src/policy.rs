//! Error-correction policy
//!
//! Controls how many agreeing frames a scan needs before it converges and how
//! long it may run before it settles for a best-effort result or gives up.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Scan performance priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Optimise for latency
    #[default]
    Fast,
    /// Optimise for precision, accept a best-effort answer at timeout
    Accurate,
}

impl std::fmt::Display for ScanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanMode::Fast => f.write_str("fast"),
            ScanMode::Accurate => f.write_str("accurate"),
        }
    }
}

impl std::str::FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(ScanMode::Fast),
            "accurate" => Ok(ScanMode::Accurate),
            other => Err(format!("unknown scan mode '{other}', expected 'fast' or 'accurate'")),
        }
    }
}

/// Rejected policy parameters
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("max duration must be positive and finite, got {0}s")]
    NonPositiveDuration(f64),
    #[error("required agreement count must be at least 1, got {0}")]
    AgreementTooLow(u32),
}

/// Immutable error-correction parameters for one scan session.
///
/// Only constructible through [`ErrorCorrectionPolicy::new`] (or the presets),
/// so every instance is valid. Deserialisation goes through the same check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PolicySettings", into = "PolicySettings")]
pub struct ErrorCorrectionPolicy {
    mode: ScanMode,
    required_agreement_count: u32,
    max_duration: Duration,
}

impl ErrorCorrectionPolicy {
    pub const FAST_REQUIRED_AGREEMENT: u32 = 2;
    pub const FAST_MAX_DURATION_SECS: f64 = 1.5;
    pub const ACCURATE_REQUIRED_AGREEMENT: u32 = 3;
    pub const ACCURATE_MAX_DURATION_SECS: f64 = 4.0;

    /// Build a policy, rejecting a non-positive duration or an agreement count below 1
    pub fn new(
        mode: ScanMode,
        required_agreement_count: u32,
        max_duration_secs: f64,
    ) -> Result<Self, PolicyError> {
        if !max_duration_secs.is_finite() || max_duration_secs <= 0.0 {
            return Err(PolicyError::NonPositiveDuration(max_duration_secs));
        }
        if required_agreement_count < 1 {
            return Err(PolicyError::AgreementTooLow(required_agreement_count));
        }

        Ok(Self {
            mode,
            required_agreement_count,
            max_duration: Duration::from_secs_f64(max_duration_secs),
        })
    }

    /// Latency-first preset: 2 agreeing frames within 1.5s
    pub fn fast() -> Self {
        Self {
            mode: ScanMode::Fast,
            required_agreement_count: Self::FAST_REQUIRED_AGREEMENT,
            max_duration: Duration::from_secs_f64(Self::FAST_MAX_DURATION_SECS),
        }
    }

    /// Precision-first preset: 3 agreeing frames within 4.0s
    pub fn accurate() -> Self {
        Self {
            mode: ScanMode::Accurate,
            required_agreement_count: Self::ACCURATE_REQUIRED_AGREEMENT,
            max_duration: Duration::from_secs_f64(Self::ACCURATE_MAX_DURATION_SECS),
        }
    }

    /// Preset for a scan mode
    pub fn for_mode(mode: ScanMode) -> Self {
        match mode {
            ScanMode::Fast => Self::fast(),
            ScanMode::Accurate => Self::accurate(),
        }
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn required_agreement_count(&self) -> u32 {
        self.required_agreement_count
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }
}

impl Default for ErrorCorrectionPolicy {
    fn default() -> Self {
        Self::fast()
    }
}

/// Plain serialisable form of a policy, as written in config files
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicySettings {
    pub mode: ScanMode,
    pub required_agreement_count: u32,
    pub max_duration_secs: f64,
}

impl TryFrom<PolicySettings> for ErrorCorrectionPolicy {
    type Error = PolicyError;

    fn try_from(settings: PolicySettings) -> Result<Self, Self::Error> {
        Self::new(
            settings.mode,
            settings.required_agreement_count,
            settings.max_duration_secs,
        )
    }
}

impl From<ErrorCorrectionPolicy> for PolicySettings {
    fn from(policy: ErrorCorrectionPolicy) -> Self {
        Self {
            mode: policy.mode,
            required_agreement_count: policy.required_agreement_count,
            max_duration_secs: policy.max_duration.as_secs_f64(),
        }
    }
}
