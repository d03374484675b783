//! cardscan - frame-by-frame card number aggregation
//!
//! Takes a stream of noisy per-frame OCR predictions from a camera card
//! scanner and converges on one card number within a bounded time budget.
//!
//! ```text
//! Frame -> FrameClassifier -> RawPrediction -> Normalizer -> AggregationMachine
//!                                                               |
//!                        ResultSink <- LoopDriver <-------------+
//! ```

pub mod aggregation;
pub mod capture;
pub mod classifier;
pub mod config;
pub mod driver;
pub mod error;
pub mod normalize;
pub mod policy;
pub mod replay;
pub mod session;
pub mod sink;

pub use aggregation::{AggregationMachine, AggregationState, FrameObservation, ScanResult, TallyEntry};
pub use capture::{BoundingBox, Frame, RegionOfInterest};
pub use classifier::{DiagnosticsSnapshot, DigitModel, DigitReading, FrameClassifier, RawPrediction, SsdCardClassifier};
pub use driver::{DriverOptions, LoopDriver};
pub use error::ScanError;
pub use normalize::{Candidate, Expiry, Normalizer, NormalizerConfig};
pub use policy::{ErrorCorrectionPolicy, PolicyError, ScanMode};
pub use session::{ScanSession, SessionSnapshot};
pub use sink::{ChannelSink, FrameTick, ResultSink, ScanEvent};
