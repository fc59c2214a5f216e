//! Linking pipeline
//!
//! This module drives one linking run end to end: scan the bucket, match
//! filenames against the product catalog and persist links through a
//! dedicated writer task. The orchestrator owns the phase sequence and the
//! pause/resume protocol.

use thiserror::Error;

use crate::infrastructure::storage::StorageError;

pub mod batch_writer;
pub mod options;
pub mod orchestrator;

// Re-export commonly used items
pub use batch_writer::{BatchWriter, WriteRecord, WriterReport};
pub use options::LinkingOptions;
pub use orchestrator::LinkingOrchestrator;

/// Failures that abort a linking run. Per-record problems never surface
/// here; they are collected on the session row instead.
#[derive(Debug, Error)]
pub enum LinkingError {
    #[error("linking configuration invalid: {0}")]
    Configuration(String),

    #[error("session '{0}' not found")]
    SessionNotFound(String),

    #[error("session '{id}' is {actual}, expected {expected}")]
    SessionState {
        id: String,
        actual: String,
        expected: String,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}
