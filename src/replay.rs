//! Scripted scan replay
//!
//! Runs a list of model readings through a real [`LoopDriver`] on a manual
//! clock, one reading per frame interval. Handy for tuning policies against
//! recorded model output.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::aggregation::AggregationState;
use crate::capture::{Frame, RegionOfInterest};
use crate::classifier::{DiagnosticsSnapshot, DigitReading, ScriptedModel, SsdCardClassifier};
use crate::driver::{DriverOptions, LoopDriver, ManualClock};
use crate::policy::ErrorCorrectionPolicy;
use crate::sink::{ChannelSink, ScanEvent};

const REPLAY_FRAME_WIDTH: u32 = 64;
const REPLAY_FRAME_HEIGHT: u32 = 40;

/// Recorded model output, one entry per camera frame
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReplayScript {
    /// Time between frames; 100ms when absent
    pub interval_ms: Option<u64>,
    #[serde(default)]
    pub frames: Vec<ScriptFrame>,
}

/// One recorded reading. A frame with no fields is a frame the model read nothing from.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScriptFrame {
    pub digits: Option<String>,
    pub is_number: Option<bool>,
    pub expiry_month: Option<String>,
    pub expiry_year: Option<String>,
    pub name: Option<String>,
    pub qr_code: Option<String>,
}

impl ScriptFrame {
    fn reading(&self) -> Option<DigitReading> {
        if self.digits.is_none()
            && self.expiry_month.is_none()
            && self.name.is_none()
            && self.qr_code.is_none()
        {
            return None;
        }
        Some(DigitReading {
            digits: self.digits.clone().unwrap_or_default(),
            is_number: self.is_number.unwrap_or(self.digits.is_some()),
            boxes: Vec::new(),
            expiry_month: self.expiry_month.clone(),
            expiry_year: self.expiry_year.clone(),
            name: self.name.clone(),
            qr_code: self.qr_code.clone(),
        })
    }
}

impl ReplayScript {
    pub const DEFAULT_INTERVAL_MS: u64 = 100;

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay script {:?}", path))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid replay script {:?}", path))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let script: Self = toml::from_str(content)?;
        script.interval()?;
        Ok(script)
    }

    /// Time between frames. A zero interval would never let the session time out.
    pub fn interval(&self) -> Result<Duration> {
        match self.interval_ms.unwrap_or(Self::DEFAULT_INTERVAL_MS) {
            0 => bail!("Replay frame interval must be at least 1ms"),
            ms => Ok(Duration::from_millis(ms)),
        }
    }

    fn model(&self) -> ScriptedModel {
        ScriptedModel::new(self.frames.iter().map(ScriptFrame::reading))
    }
}

/// How a replay ended
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOutcome {
    pub state: AggregationState,
    /// Frames fed to the session, including empty ones after the script ran out
    pub frames: u64,
    pub diagnostics: DiagnosticsSnapshot,
}

/// Replay `script` under `policy`, handing every event to `on_event`.
///
/// Once the script runs out, empty frames keep coming until the session times
/// out, so every replay ends in a terminal state.
pub fn run(
    script: &ReplayScript,
    policy: ErrorCorrectionPolicy,
    options: DriverOptions,
    mut on_event: impl FnMut(&ScanEvent),
) -> Result<ReplayOutcome> {
    let (sink, events) = ChannelSink::new();
    let clock = Arc::new(ManualClock::new());
    let classifier = SsdCardClassifier::new(script.model());
    let driver = LoopDriver::with_clock(Box::new(classifier), Arc::new(sink), options, clock.clone());

    let interval = script.interval()?;
    let budget_ticks = policy.max_duration().as_millis() / interval.as_millis().max(1) + 2;
    let max_ticks = script.frames.len() as u64 + budget_ticks as u64;

    driver.start_session(policy)?;
    let roi = RegionOfInterest::full(REPLAY_FRAME_WIDTH, REPLAY_FRAME_HEIGHT);

    for tick in 0..max_ticks {
        driver.submit_frame(Frame::blank(REPLAY_FRAME_WIDTH, REPLAY_FRAME_HEIGHT), roi);
        driver.flush()?;
        events.try_iter().for_each(|event| on_event(&event));

        if driver.state().is_some_and(|s| s.is_terminal()) {
            debug!(tick, "replay settled");
            break;
        }
        clock.advance(interval);
    }

    let snapshot = driver
        .snapshot()
        .context("Replay session disappeared")?;

    Ok(ReplayOutcome {
        state: snapshot.state,
        frames: snapshot.frames,
        diagnostics: driver.diagnostics(),
    })
}
