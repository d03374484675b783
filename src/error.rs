//! Errors surfaced by the scanner core
//!
//! Per-frame problems never show up here; they are absorbed by the pipeline.

use thiserror::Error;

use crate::policy::PolicyError;

#[derive(Debug, Error)]
pub enum ScanError {
    /// Policy rejected before any frame was processed
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] PolicyError),
    /// Restart requested before any session was started
    #[error("no scan session has been started")]
    NoSession,
    /// Classification worker is gone
    #[error("scan loop has shut down")]
    Disconnected,
}
