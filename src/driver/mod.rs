//! Loop Driver
//!
//! Feeds camera frames through classification, normalization and aggregation.
//!
//! Frames are classified on a dedicated worker thread so capture never stalls.
//! The worker takes jobs from a bounded FIFO queue and applies results under
//! the session lock, so tallies always see frames in arrival order. Each job is
//! tagged with the session generation it was submitted for; cancelling or
//! restarting bumps the generation and any result still in flight is dropped.
//! Frames still queued when a session converges or is abandoned are skipped
//! without being classified.

pub mod clock;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::aggregation::AggregationState;
use crate::capture::{Frame, RegionOfInterest};
use crate::classifier::{ComputeStats, DiagnosticsSnapshot, FrameClassifier, RawPrediction};
use crate::error::ScanError;
use crate::normalize::{Normalizer, NormalizerConfig};
use crate::policy::{ErrorCorrectionPolicy, PolicySettings};
use crate::session::{ScanSession, SessionSnapshot};
use crate::sink::{FrameTick, ResultSink};

pub use clock::{Clock, ManualClock, SystemClock};

/// Loop driver settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverOptions {
    /// Frames waiting for classification before new ones are dropped
    pub queue_capacity: usize,
    /// Normalizer used for every session
    pub normalizer: NormalizerConfig,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 4,
            normalizer: NormalizerConfig::default(),
        }
    }
}

enum Job {
    Frame {
        generation: u64,
        frame: Frame,
        roi: RegionOfInterest,
    },
    Flush(Sender<()>),
    Shutdown,
}

#[derive(Default)]
struct DriverState {
    session: Option<ScanSession>,
    /// Bumped on every start, restart and cancel
    generation: u64,
    paused: bool,
    last_policy: Option<ErrorCorrectionPolicy>,
}

struct Shared {
    state: Mutex<DriverState>,
    sink: Arc<dyn ResultSink>,
    clock: Arc<dyn Clock>,
    normalizer: Normalizer,
}

impl Shared {
    /// Whether a job for `generation` still has a live session to feed
    fn is_live(&self, generation: u64) -> bool {
        let state = self.state.lock();
        state.generation == generation
            && state.session.as_ref().is_some_and(|s| !s.is_terminal())
    }

    /// Apply a classification result. Runs steps 1-5 of the update under the lock.
    fn apply(&self, generation: u64, prediction: &RawPrediction) {
        let mut state = self.state.lock();
        let current = state.generation;

        let Some(session) = state
            .session
            .as_mut()
            .filter(|s| s.generation() == generation && current == generation)
        else {
            debug!(generation, current, "discarding stale classification result");
            return;
        };
        if session.is_terminal() {
            trace!(session = %session.id(), "discarding result for a finished session");
            return;
        }

        let outcome = session.apply(prediction, &self.normalizer, self.clock.now());
        let id = session.id();

        self.sink.on_frame(&FrameTick {
            session: id,
            frame: outcome.frame,
            is_card: prediction.is_card(),
            has_candidate: outcome.has_candidate,
            state_changed: outcome.changed.is_some(),
        });
        if let Some(payload) = prediction.qr_code.as_deref() {
            debug!(session = %id, "qr code in view");
            self.sink.on_qr_code(id, payload);
        }

        match outcome.changed {
            Some(AggregationState::Converged(result)) => {
                info!(
                    session = %id,
                    last4 = result.number.last4(),
                    agreement = result.agreement,
                    frames = result.frames,
                    best_effort = result.best_effort,
                    "scan converged"
                );
                self.sink.on_converged(id, &result);
            }
            Some(AggregationState::Abandoned) => {
                info!(session = %id, frames = outcome.frame, "scan abandoned, no card found");
                self.sink.on_abandoned(id);
            }
            Some(AggregationState::Collecting) | None => {}
        }
    }
}

/// Drives one scan session at a time from incoming frames
pub struct LoopDriver {
    shared: Arc<Shared>,
    jobs: Sender<Job>,
    stats: Arc<ComputeStats>,
    worker: Option<JoinHandle<()>>,
}

impl LoopDriver {
    /// Create a driver using the system clock
    pub fn new(
        classifier: Box<dyn FrameClassifier>,
        sink: Arc<dyn ResultSink>,
        options: DriverOptions,
    ) -> Self {
        Self::with_clock(classifier, sink, options, Arc::new(SystemClock))
    }

    /// Create a driver with an explicit clock
    pub fn with_clock(
        classifier: Box<dyn FrameClassifier>,
        sink: Arc<dyn ResultSink>,
        options: DriverOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (jobs, receiver) = bounded(options.queue_capacity.max(1));
        let stats = classifier.compute_stats();
        let shared = Arc::new(Shared {
            state: Mutex::new(DriverState::default()),
            sink,
            clock,
            normalizer: Normalizer::new(options.normalizer),
        });

        let worker_shared = shared.clone();
        let worker = std::thread::spawn(move || {
            debug!("classification worker starting");
            run_worker(classifier, receiver, worker_shared);
            debug!("classification worker exiting");
        });

        Self {
            shared,
            jobs,
            stats,
            worker: Some(worker),
        }
    }

    /// Start a new session, discarding any previous one
    pub fn start_session(&self, policy: ErrorCorrectionPolicy) -> Result<Uuid, ScanError> {
        self.ensure_running()?;
        let mut state = self.shared.state.lock();
        Ok(self.begin(&mut state, policy))
    }

    /// Validate raw policy settings, then start a session with them
    pub fn start_session_with(&self, settings: PolicySettings) -> Result<Uuid, ScanError> {
        let policy = ErrorCorrectionPolicy::try_from(settings)?;
        self.start_session(policy)
    }

    /// Start over with the policy of the most recent session
    pub fn restart_session(&self) -> Result<Uuid, ScanError> {
        self.ensure_running()?;
        let mut state = self.shared.state.lock();
        let policy = state.last_policy.ok_or(ScanError::NoSession)?;
        Ok(self.begin(&mut state, policy))
    }

    /// Abandon the live session. Results still in flight are dropped.
    ///
    /// Returns false when there was no live session to cancel.
    pub fn cancel_session(&self) -> bool {
        let mut state = self.shared.state.lock();
        state.generation += 1;

        let Some(session) = state.session.as_mut() else {
            return false;
        };
        if !session.cancel() {
            return false;
        }

        let id = session.id();
        info!(session = %id, frames = session.frame_count(), "scan cancelled");
        self.shared.sink.on_abandoned(id);
        true
    }

    /// Stop accepting frames without ending the session
    pub fn pause(&self) {
        self.shared.state.lock().paused = true;
        debug!("scanning paused");
    }

    /// Accept frames again after [`LoopDriver::pause`]
    pub fn resume(&self) {
        self.shared.state.lock().paused = false;
        debug!("scanning resumed");
    }

    /// Queue a frame for classification.
    ///
    /// Returns false when the frame was dropped: no live session, paused,
    /// or the classification queue is full.
    pub fn submit_frame(&self, frame: Frame, roi: RegionOfInterest) -> bool {
        let generation = {
            let state = self.shared.state.lock();
            match state.session.as_ref() {
                Some(session) if !session.is_terminal() && !state.paused => session.generation(),
                _ => {
                    trace!(paused = state.paused, "dropping frame, no live session");
                    return false;
                }
            }
        };

        match self.jobs.try_send(Job::Frame {
            generation,
            frame,
            roi,
        }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!("classification queue full, dropping frame");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("classification worker gone, dropping frame");
                false
            }
        }
    }

    /// Block until every frame queued so far has been applied
    pub fn flush(&self) -> Result<(), ScanError> {
        let (ack, done) = bounded(1);
        self.jobs
            .send(Job::Flush(ack))
            .map_err(|_| ScanError::Disconnected)?;
        done.recv().map_err(|_| ScanError::Disconnected)
    }

    /// Current session state, if a session was ever started
    pub fn state(&self) -> Option<AggregationState> {
        self.shared
            .state
            .lock()
            .session
            .as_ref()
            .map(|s| s.state().clone())
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        let now = self.shared.clock.now();
        self.shared
            .state
            .lock()
            .session
            .as_ref()
            .map(|s| s.snapshot(now))
    }

    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    /// Classifier timing counters. Informational only.
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.stats.snapshot()
    }

    /// Stop the worker and wait for it to exit
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = self.jobs.send(Job::Shutdown);
            if handle.join().is_err() {
                warn!("classification worker panicked");
            }
        }
    }

    fn ensure_running(&self) -> Result<(), ScanError> {
        match &self.worker {
            Some(handle) if !handle.is_finished() => Ok(()),
            _ => Err(ScanError::Disconnected),
        }
    }

    fn begin(&self, state: &mut DriverState, policy: ErrorCorrectionPolicy) -> Uuid {
        state.generation += 1;
        if let Some(previous) = state.session.take() {
            debug!(session = %previous.id(), "discarding previous session");
        }

        let session = ScanSession::new(policy, state.generation, self.shared.clock.now());
        let id = session.id();
        state.session = Some(session);
        state.last_policy = Some(policy);
        state.paused = false;

        info!(
            session = %id,
            mode = %policy.mode(),
            required = policy.required_agreement_count(),
            max_duration = ?policy.max_duration(),
            "scan session started"
        );
        self.shared.sink.on_collecting(id);
        id
    }
}

impl Drop for LoopDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(mut classifier: Box<dyn FrameClassifier>, jobs: Receiver<Job>, shared: Arc<Shared>) {
    for job in jobs.iter() {
        match job {
            Job::Frame {
                generation,
                frame,
                roi,
            } => {
                if !shared.is_live(generation) {
                    debug!(generation, "skipping frame queued for a finished session");
                    continue;
                }
                let prediction = classifier.classify(&frame, &roi);
                shared.apply(generation, &prediction);
            }
            Job::Flush(ack) => {
                let _ = ack.send(());
            }
            Job::Shutdown => break,
        }
    }
}
