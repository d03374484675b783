//! Frame Classifier Layer
//!
//! Wraps an opaque per-frame OCR model. Given a frame and a region of interest
//! a classifier returns a [`RawPrediction`]; it never touches aggregation state.
//! Backends:
//! - SSD digit model behind [`SsdCardClassifier`]
//! - Scripted readings for replay and tests ([`ScriptedModel`])

pub mod scripted;
pub mod ssd;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::capture::{BoundingBox, Frame, RegionOfInterest};

pub use scripted::ScriptedModel;
pub use ssd::{DigitModel, DigitReading, SsdCardClassifier};

/// Raw output of one classification call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPrediction {
    /// Digit string as read by the model, separators included
    pub candidate_digits: Option<String>,
    /// Whether the model believes the string is a card number
    pub is_plausible_number: bool,
    /// Number detection boxes
    pub detection_boxes: Vec<BoundingBox>,
    /// Time spent in the model
    pub compute_duration_ms: f64,
    /// Expiry month text, when the model reads one
    pub expiry_month: Option<String>,
    /// Expiry year text, when the model reads one
    pub expiry_year: Option<String>,
    /// Cardholder name text, when the model reads one
    pub name: Option<String>,
    /// Decoded QR payload, when the frame shows a QR code instead of a card
    pub qr_code: Option<String>,
}

impl RawPrediction {
    /// Prediction carrying no signal
    pub fn empty() -> Self {
        Self::default()
    }

    /// Prediction carrying only a digit string
    pub fn digits(digits: impl Into<String>) -> Self {
        Self {
            candidate_digits: Some(digits.into()),
            is_plausible_number: true,
            ..Self::default()
        }
    }

    /// Whether the frame looks like a card rather than some other target.
    ///
    /// Drives the per-tick region-of-interest signal; has no effect on convergence.
    pub fn is_card(&self) -> bool {
        self.is_plausible_number || !self.detection_boxes.is_empty()
    }
}

/// Per-frame classifier
pub trait FrameClassifier: Send {
    /// Classify one frame. Invalid regions yield [`RawPrediction::empty`].
    fn classify(&mut self, frame: &Frame, roi: &RegionOfInterest) -> RawPrediction;

    /// Cumulative timing counters for this classifier
    fn compute_stats(&self) -> Arc<ComputeStats>;
}

/// Cumulative classifier timing, for performance monitoring only
#[derive(Debug, Default)]
pub struct ComputeStats {
    frames: AtomicU64,
    compute_micros: AtomicU64,
}

impl ComputeStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one model invocation
    pub fn record(&self, duration: Duration) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.compute_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_processed: self.frames.load(Ordering::Relaxed),
            total_compute_duration_ms: self.compute_micros.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}

/// Point-in-time copy of [`ComputeStats`]
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct DiagnosticsSnapshot {
    pub frames_processed: u64,
    pub total_compute_duration_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_card() {
        assert!(!RawPrediction::empty().is_card());
        assert!(RawPrediction::digits("4242").is_card());

        let boxed = RawPrediction {
            detection_boxes: vec![BoundingBox::default()],
            ..RawPrediction::default()
        };
        assert!(boxed.is_card());
    }

    #[test]
    fn test_compute_stats_accumulate() {
        let stats = ComputeStats::new();
        stats.record(Duration::from_millis(3));
        stats.record(Duration::from_micros(1500));

        let snap = stats.snapshot();
        assert_eq!(snap.frames_processed, 2);
        assert!((snap.total_compute_duration_ms - 4.5).abs() < 1e-9);
    }
}
