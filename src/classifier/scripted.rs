//! Scripted digit model
//!
//! Replays a fixed sequence of readings, one per call. Used by the replay
//! binary and by tests in place of the on-device network.

use image::RgbaImage;
use std::collections::VecDeque;

use super::{DigitModel, DigitReading};

#[derive(Debug, Clone, Default)]
pub struct ScriptedModel {
    readings: VecDeque<Option<DigitReading>>,
}

impl ScriptedModel {
    pub fn new(readings: impl IntoIterator<Item = Option<DigitReading>>) -> Self {
        Self {
            readings: readings.into_iter().collect(),
        }
    }

    /// Readings not yet consumed
    pub fn remaining(&self) -> usize {
        self.readings.len()
    }
}

impl DigitModel for ScriptedModel {
    fn predict(&mut self, _card: &RgbaImage) -> Option<DigitReading> {
        // Exhausted scripts read as empty frames
        self.readings.pop_front().flatten()
    }
}
