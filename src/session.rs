//! Scan sessions
//!
//! A session is one scan attempt. It owns its aggregation machine and tallies
//! and is replaced wholesale on restart.

use serde::Serialize;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::aggregation::{AggregationMachine, AggregationState, FrameObservation, TallyEntry};
use crate::classifier::RawPrediction;
use crate::normalize::{Candidate, Normalizer};
use crate::policy::ErrorCorrectionPolicy;

#[derive(Debug)]
pub struct ScanSession {
    id: Uuid,
    generation: u64,
    started_at: Instant,
    machine: AggregationMachine,
}

impl ScanSession {
    pub fn new(policy: ErrorCorrectionPolicy, generation: u64, started_at: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            generation,
            started_at,
            machine: AggregationMachine::new(policy),
        }
    }

    /// Normalize and apply one prediction
    pub fn apply(&mut self, prediction: &RawPrediction, normalizer: &Normalizer, now: Instant) -> TickOutcome {
        let observation = FrameObservation {
            number: normalizer.normalize(prediction),
            expiry: normalizer.normalize_expiry(prediction),
            name: normalizer.normalize_name(prediction),
        };
        let has_candidate = observation.number.is_some();
        let elapsed = self.elapsed(now);
        let changed = self.machine.update(observation, elapsed).cloned();

        TickOutcome {
            frame: self.machine.frame_count(),
            has_candidate,
            changed,
        }
    }

    /// Abandon the session. Returns false when it had already finished.
    pub fn cancel(&mut self) -> bool {
        self.machine.abandon()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn policy(&self) -> &ErrorCorrectionPolicy {
        self.machine.policy()
    }

    pub fn state(&self) -> &AggregationState {
        self.machine.state()
    }

    pub fn is_terminal(&self) -> bool {
        self.machine.state().is_terminal()
    }

    pub fn frame_count(&self) -> u64 {
        self.machine.frame_count()
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn snapshot(&self, now: Instant) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            state: self.machine.state().clone(),
            frames: self.machine.frame_count(),
            elapsed: self.elapsed(now),
            tallies: self.machine.number_tallies().to_vec(),
        }
    }
}

/// What one applied frame did to a session
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    /// Frame index within the session
    pub frame: u64,
    /// Whether the frame normalized to a card number
    pub has_candidate: bool,
    /// New state, when this frame changed it
    pub changed: Option<AggregationState>,
}

/// Copy of a session's progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub state: AggregationState,
    pub frames: u64,
    pub elapsed: Duration,
    pub tallies: Vec<TallyEntry<Candidate>>,
}
