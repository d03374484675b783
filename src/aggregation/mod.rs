//! Aggregation State Machine
//!
//! Consumes one normalized observation per frame and converges on a single
//! card number once enough frames agree, or settles at the time budget:
//!
//! ```text
//! Collecting --(count >= required)--------------> Converged
//! Collecting --(timeout, some candidate seen)---> Converged (best effort)
//! Collecting --(timeout, nothing seen | cancel)-> Abandoned
//! ```
//!
//! Both outcomes are terminal; later updates are ignored.

pub mod tally;

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, trace};

use crate::normalize::{Candidate, Expiry};
use crate::policy::ErrorCorrectionPolicy;

pub use tally::{Tally, TallyEntry};

/// Normalized fields read from one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameObservation {
    pub number: Option<Candidate>,
    pub expiry: Option<Expiry>,
    pub name: Option<String>,
}

impl FrameObservation {
    /// Frame without any usable signal
    pub fn nothing() -> Self {
        Self::default()
    }

    pub fn number(number: Candidate) -> Self {
        Self {
            number: Some(number),
            ..Self::default()
        }
    }
}

/// Final answer of a converged scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    pub number: Candidate,
    /// Most agreed expiry among frames that also read a number
    pub expiry: Option<Expiry>,
    /// Most agreed cardholder name among frames that also read a number
    pub name: Option<String>,
    /// Reached through the timeout rather than the agreement threshold
    pub best_effort: bool,
    /// Votes behind `number`
    pub agreement: u32,
    /// Frames seen by the session, including rejected ones
    pub frames: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AggregationState {
    #[default]
    Collecting,
    Converged(ScanResult),
    Abandoned,
}

impl AggregationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AggregationState::Collecting)
    }

    pub fn result(&self) -> Option<&ScanResult> {
        match self {
            AggregationState::Converged(result) => Some(result),
            _ => None,
        }
    }
}

/// Per-session convergence engine
#[derive(Debug, Clone)]
pub struct AggregationMachine {
    policy: ErrorCorrectionPolicy,
    state: AggregationState,
    frame_count: u64,
    numbers: Tally<Candidate>,
    expiries: Tally<Expiry>,
    names: Tally<String>,
}

impl AggregationMachine {
    pub fn new(policy: ErrorCorrectionPolicy) -> Self {
        Self {
            policy,
            state: AggregationState::Collecting,
            frame_count: 0,
            numbers: Tally::new(),
            expiries: Tally::new(),
            names: Tally::new(),
        }
    }

    /// Apply one frame. `elapsed` is wall-clock time since the session started.
    ///
    /// Returns the new state when this update changed it.
    pub fn update(&mut self, observation: FrameObservation, elapsed: Duration) -> Option<&AggregationState> {
        if self.state.is_terminal() {
            return None;
        }

        self.frame_count += 1;
        let frame = self.frame_count;

        if let Some(number) = observation.number {
            let entry = self.numbers.record(number, frame);
            trace!(frame, last4 = entry.value.last4(), count = entry.count, "tallied candidate");

            if let Some(expiry) = observation.expiry {
                self.expiries.record(expiry, frame);
            }
            if let Some(name) = observation.name {
                self.names.record(name, frame);
            }
        }

        let required = self.policy.required_agreement_count();
        if let Some(result) = self
            .numbers
            .leader_at_least(required)
            .map(|entry| self.result_for(entry, false))
        {
            debug!(frame, agreement = result.agreement, "converged");
            return Some(self.transition(AggregationState::Converged(result)));
        }

        if elapsed > self.policy.max_duration() {
            let next = match self.numbers.leader().map(|entry| self.result_for(entry, true)) {
                Some(result) => {
                    debug!(frame, ?elapsed, agreement = result.agreement, "timed out, best-effort result");
                    AggregationState::Converged(result)
                }
                None => {
                    debug!(frame, ?elapsed, "timed out without a candidate");
                    AggregationState::Abandoned
                }
            };
            return Some(self.transition(next));
        }

        None
    }

    /// Force `Abandoned`. Returns false when already terminal.
    pub fn abandon(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = AggregationState::Abandoned;
        true
    }

    pub fn state(&self) -> &AggregationState {
        &self.state
    }

    pub fn policy(&self) -> &ErrorCorrectionPolicy {
        &self.policy
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn number_tallies(&self) -> &[TallyEntry<Candidate>] {
        self.numbers.entries()
    }

    fn result_for(&self, entry: &TallyEntry<Candidate>, best_effort: bool) -> ScanResult {
        ScanResult {
            number: entry.value.clone(),
            expiry: self.expiries.leader().map(|e| e.value),
            name: self.names.leader().map(|e| e.value.clone()),
            best_effort,
            agreement: entry.count,
            frames: self.frame_count,
        }
    }

    fn transition(&mut self, next: AggregationState) -> &AggregationState {
        self.state = next;
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::RawPrediction;
    use crate::normalize::Normalizer;
    use crate::policy::ScanMode;

    const VISA: &str = "4242424242424242";
    const VISA_ALT: &str = "4111111111111111";

    fn candidate(digits: &str) -> Candidate {
        Normalizer::default()
            .normalize(&RawPrediction::digits(digits))
            .unwrap()
    }

    fn accurate() -> ErrorCorrectionPolicy {
        ErrorCorrectionPolicy::new(ScanMode::Accurate, 3, 4.0).unwrap()
    }

    fn at(frame: u64) -> Duration {
        Duration::from_millis(100 * frame)
    }

    #[test]
    fn test_fast_single_frame_converges() {
        let policy = ErrorCorrectionPolicy::new(ScanMode::Fast, 1, 2.0).unwrap();
        let mut machine = AggregationMachine::new(policy);

        let state = machine
            .update(FrameObservation::number(candidate(VISA)), at(1))
            .cloned();

        let result = state.as_ref().and_then(|s| s.result()).unwrap();
        assert_eq!(result.number.as_str(), VISA);
        assert!(!result.best_effort);
        assert_eq!(result.agreement, 1);
    }

    #[test]
    fn test_accurate_converges_on_third_agreement() {
        let mut machine = AggregationMachine::new(accurate());
        let frames = [VISA, VISA_ALT, VISA, VISA];

        for (i, digits) in frames.iter().enumerate() {
            let tick = i as u64 + 1;
            let changed = machine
                .update(FrameObservation::number(candidate(digits)), at(tick))
                .cloned();
            if tick < 4 {
                assert!(changed.is_none(), "changed early at tick {tick}");
            } else {
                let result = changed.and_then(|s| s.result().cloned()).unwrap();
                assert_eq!(result.number.as_str(), VISA);
                assert_eq!(result.agreement, 3);
                assert_eq!(result.frames, 4);
            }
        }
    }

    #[test]
    fn test_rejected_frames_abandon_only_after_budget() {
        let mut machine = AggregationMachine::new(accurate());

        for tick in 1..=40 {
            assert!(machine.update(FrameObservation::nothing(), at(tick)).is_none());
        }
        assert_eq!(machine.state(), &AggregationState::Collecting);
        assert!(machine.number_tallies().is_empty());

        let changed = machine.update(FrameObservation::nothing(), at(41)).cloned();
        assert_eq!(changed, Some(AggregationState::Abandoned));
        assert_eq!(machine.frame_count(), 41);
    }

    #[test]
    fn test_timeout_with_partial_agreement_is_best_effort() {
        let mut machine = AggregationMachine::new(accurate());
        machine.update(FrameObservation::number(candidate(VISA)), at(1));
        machine.update(FrameObservation::number(candidate(VISA_ALT)), at(2));
        machine.update(FrameObservation::number(candidate(VISA)), at(3));
        for tick in 4..=40 {
            machine.update(FrameObservation::nothing(), at(tick));
        }
        assert_eq!(machine.state(), &AggregationState::Collecting);

        let changed = machine.update(FrameObservation::nothing(), at(41)).cloned();
        let result = changed.and_then(|s| s.result().cloned()).unwrap();
        assert_eq!(result.number.as_str(), VISA);
        assert_eq!(result.agreement, 2);
        assert!(result.best_effort);
    }

    #[test]
    fn test_best_effort_tie_prefers_first_seen() {
        let mut machine = AggregationMachine::new(accurate());
        machine.update(FrameObservation::number(candidate(VISA_ALT)), at(1));
        machine.update(FrameObservation::number(candidate(VISA)), at(2));

        let changed = machine.update(FrameObservation::nothing(), at(50)).cloned();
        let result = changed.and_then(|s| s.result().cloned()).unwrap();
        assert_eq!(result.number.as_str(), VISA_ALT);
    }

    #[test]
    fn test_agreement_wins_over_timeout_in_same_update() {
        let mut machine = AggregationMachine::new(accurate());
        machine.update(FrameObservation::number(candidate(VISA)), at(1));
        machine.update(FrameObservation::number(candidate(VISA)), at(2));

        let changed = machine
            .update(FrameObservation::number(candidate(VISA)), at(60))
            .cloned();
        let result = changed.and_then(|s| s.result().cloned()).unwrap();
        assert!(!result.best_effort);
    }

    #[test]
    fn test_identical_candidates_always_converge() {
        for required in 1..=6 {
            let policy = ErrorCorrectionPolicy::new(ScanMode::Accurate, required, 4.0).unwrap();
            let mut machine = AggregationMachine::new(policy);

            for tick in 1..=u64::from(required) {
                machine.update(FrameObservation::number(candidate(VISA)), at(tick));
            }

            let result = machine.state().result().unwrap();
            assert_eq!(result.number.as_str(), VISA);
            assert_eq!(result.agreement, required);
            assert!(!result.best_effort);
        }
    }

    #[test]
    fn test_terminal_states_ignore_updates() {
        let policy = ErrorCorrectionPolicy::new(ScanMode::Fast, 1, 2.0).unwrap();
        let mut machine = AggregationMachine::new(policy);
        machine.update(FrameObservation::number(candidate(VISA)), at(1));

        let before_state = machine.state().clone();
        let before_tallies = machine.number_tallies().to_vec();

        assert!(machine
            .update(FrameObservation::number(candidate(VISA_ALT)), at(2))
            .is_none());
        assert!(machine.update(FrameObservation::nothing(), at(100)).is_none());
        assert!(!machine.abandon());

        assert_eq!(machine.state(), &before_state);
        assert_eq!(machine.number_tallies(), &before_tallies[..]);
        assert_eq!(machine.frame_count(), 1);

        let mut abandoned = AggregationMachine::new(accurate());
        assert!(abandoned.abandon());
        assert!(abandoned
            .update(FrameObservation::number(candidate(VISA)), at(1))
            .is_none());
        assert!(abandoned.number_tallies().is_empty());
        assert_eq!(abandoned.state(), &AggregationState::Abandoned);
    }

    #[test]
    fn test_side_fields_follow_number_frames() {
        let policy = ErrorCorrectionPolicy::new(ScanMode::Accurate, 2, 4.0).unwrap();
        let mut machine = AggregationMachine::new(policy);
        let expiry = Expiry { month: 4, year: 2029 };
        let other = Expiry { month: 4, year: 2028 };

        // Expiry without a number is not counted
        machine.update(
            FrameObservation {
                expiry: Some(other),
                ..FrameObservation::nothing()
            },
            at(1),
        );
        machine.update(
            FrameObservation {
                number: Some(candidate(VISA)),
                expiry: Some(expiry),
                name: Some("JANE DOE".into()),
            },
            at(2),
        );
        machine.update(FrameObservation::number(candidate(VISA)), at(3));

        let result = machine.state().result().unwrap();
        assert_eq!(result.expiry, Some(expiry));
        assert_eq!(result.name.as_deref(), Some("JANE DOE"));
    }
}
