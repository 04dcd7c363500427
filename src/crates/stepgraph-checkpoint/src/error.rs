//! Error types for checkpoint operations
//!
//! Absence of a checkpoint is never an error: `load`, `load_by_label`,
//! `list`, and `delete` report unknown executions or labels as
//! `None`/empty/no-op. The variants here cover the cases that genuinely
//! must surface: corrupted data on disk, serialization failures, I/O
//! failures, and invalid backend configuration.

use std::path::Path;
use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// A checkpoint exists on disk but cannot be parsed. Callers resuming
    /// from a corrupt checkpoint should fail the resume rather than
    /// silently start over.
    #[error("corrupt checkpoint at {path}: {detail}")]
    Corrupt {
        /// Path of the unreadable checkpoint file
        path: String,
        /// Parser diagnostic
        detail: String,
    },

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization error (research-log frontmatter)
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing backend configuration, raised at construction
    /// time rather than on first use
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CheckpointError {
    /// Build a `Corrupt` error for a file that failed to parse
    pub fn corrupt(path: &Path, detail: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            path: path.display().to_string(),
            detail: detail.to_string(),
        }
    }
}
