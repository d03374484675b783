//! Capture Layer
//!
//! Camera frames and the region-of-interest geometry handed to the classifier.
//! The camera session itself lives outside this crate and only delivers frames.

pub mod frame;

pub use frame::{BoundingBox, Frame, RegionOfInterest};
