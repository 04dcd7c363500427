//! Error types for graph construction and execution
//!
//! Only two kinds of problem are allowed to surface as `Err`:
//! configuration errors (bad graph wiring, raised synchronously at
//! compile time) and checkpoint corruption. Node failures are routed
//! through retry policies and reported as `failed` step results on the
//! stream; absent checkpoints are `None`. Long-running unattended runs
//! can therefore consume the step stream without a try/catch at every
//! node boundary.

use thiserror::Error;

pub use stepgraph_checkpoint::CheckpointError;

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors produced while building or executing a graph
#[derive(Error, Debug)]
pub enum GraphError {
    /// Bad graph wiring: duplicate node ids, edges to unknown nodes,
    /// missing start node. Raised at compile time, never mid-run.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// A node handler failed after exhausting its retry policy
    #[error("node '{node}' failed: {error}")]
    NodeExecution {
        /// Node that failed
        node: String,
        /// Error description
        error: String,
    },

    /// A routing decision named a node the graph does not contain
    #[error("node '{node}' routed to unknown target '{target}'")]
    InvalidRoute { node: String, target: String },

    /// Checkpoint persistence error
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid execution options
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Application-defined error from inside a node handler
    #[error("{0}")]
    Custom(String),
}

impl GraphError {
    /// Shorthand used by node handlers for domain failures
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}
