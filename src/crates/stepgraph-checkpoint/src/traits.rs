//! The [`Checkpointer`] trait: pluggable durability for graph executions
//!
//! A checkpointer persists labeled snapshots of [`ExecutionState`] so a run
//! can be interrupted and resumed from any prior step. Four backends ship
//! with this crate ([`MemoryCheckpointer`](crate::MemoryCheckpointer),
//! [`FileCheckpointer`](crate::FileCheckpointer),
//! [`ResearchLogCheckpointer`](crate::ResearchLogCheckpointer),
//! [`SessionCheckpointer`](crate::SessionCheckpointer)); downstream code
//! can implement the trait for any other storage system.
//!
//! # Contract
//!
//! - Every operation is async and `save` stores a **by-value snapshot**:
//!   mutating the caller's state after `save` never changes what was
//!   persisted.
//! - Checkpoints for one execution are totally ordered by save call order.
//!   `load` without a label returns the snapshot from the most recent
//!   `save`, tracked explicitly, never the lexically greatest label.
//! - Unknown executions and labels are data, not errors: reads return
//!   `Ok(None)` or an empty list, `delete` is a silent no-op. Only
//!   corruption, I/O, and configuration problems produce `Err`.
//! - Saving the same label twice is an idempotent overwrite.

use async_trait::async_trait;

use crate::error::Result;
use crate::state::ExecutionState;

/// Persistence interface shared by all checkpoint backends
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Persist a snapshot of `state` under `label`.
    ///
    /// When `label` is `None` the backend generates one: timestamp-based
    /// (`checkpoint_<epoch-ms>`) for the memory, file, and research
    /// backends, sequence-based (`node-NNN`) for the session backend.
    async fn save(
        &self,
        execution_id: &str,
        state: &ExecutionState,
        label: Option<&str>,
    ) -> Result<()>;

    /// Load the snapshot from the most recent `save` for this execution,
    /// or `None` if the execution has no checkpoints.
    async fn load(&self, execution_id: &str) -> Result<Option<ExecutionState>>;

    /// Load a specific labeled snapshot, or `None` if the execution or
    /// label is unknown.
    async fn load_by_label(
        &self,
        execution_id: &str,
        label: &str,
    ) -> Result<Option<ExecutionState>>;

    /// List labels for this execution in save order (ascending). Empty for
    /// an unknown execution.
    async fn list(&self, execution_id: &str) -> Result<Vec<String>>;

    /// Delete one labeled checkpoint, or all checkpoints for the execution
    /// when `label` is `None`. Unknown executions and labels are silent
    /// no-ops.
    async fn delete(&self, execution_id: &str, label: Option<&str>) -> Result<()>;
}
