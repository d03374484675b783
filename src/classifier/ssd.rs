//! SSD-based card classifier
//!
//! Crops the region of interest, hands it to the digit model and records how
//! long the model took.

use image::RgbaImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

use super::{ComputeStats, FrameClassifier, RawPrediction};
use crate::capture::{BoundingBox, Frame, RegionOfInterest};

/// One reading from the digit model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DigitReading {
    pub digits: String,
    pub is_number: bool,
    pub boxes: Vec<BoundingBox>,
    pub expiry_month: Option<String>,
    pub expiry_year: Option<String>,
    pub name: Option<String>,
    pub qr_code: Option<String>,
}

impl DigitReading {
    pub fn number(digits: impl Into<String>) -> Self {
        Self {
            digits: digits.into(),
            is_number: true,
            ..Self::default()
        }
    }

    pub fn with_expiry(mut self, month: impl Into<String>, year: impl Into<String>) -> Self {
        self.expiry_month = Some(month.into());
        self.expiry_year = Some(year.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Reading of a QR code with no card number in view
    pub fn qr_code(payload: impl Into<String>) -> Self {
        Self {
            qr_code: Some(payload.into()),
            ..Self::default()
        }
    }
}

/// Opaque on-device OCR model operating on a cropped card image
pub trait DigitModel: Send {
    /// `None` means the model produced nothing usable for this crop
    fn predict(&mut self, card: &RgbaImage) -> Option<DigitReading>;
}

/// Classifier running a [`DigitModel`] over the region of interest
pub struct SsdCardClassifier<M> {
    model: M,
    stats: Arc<ComputeStats>,
}

impl<M: DigitModel> SsdCardClassifier<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            stats: Arc::new(ComputeStats::new()),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<M: DigitModel> FrameClassifier for SsdCardClassifier<M> {
    fn classify(&mut self, frame: &Frame, roi: &RegionOfInterest) -> RawPrediction {
        let Some(card) = frame.crop(roi) else {
            trace!(?roi, frame = ?frame.dimensions(), "region of interest outside frame");
            return RawPrediction::empty();
        };

        let start = Instant::now();
        let reading = self.model.predict(&card);
        let duration = start.elapsed();

        let Some(reading) = reading else {
            return RawPrediction::empty();
        };

        self.stats.record(duration);

        RawPrediction {
            candidate_digits: Some(reading.digits),
            is_plausible_number: reading.is_number,
            detection_boxes: reading.boxes,
            compute_duration_ms: duration.as_secs_f64() * 1000.0,
            expiry_month: reading.expiry_month,
            expiry_year: reading.expiry_year,
            name: reading.name,
            qr_code: reading.qr_code,
        }
    }

    fn compute_stats(&self) -> Arc<ComputeStats> {
        self.stats.clone()
    }
}
