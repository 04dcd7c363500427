//! Step-by-step execution results
//!
//! A graph run is consumed as a stream of [`StepResult`]s, one per node
//! in execution order. Each result carries a full snapshot of the state
//! after the node ran, so a consumer can render progress, persist its own
//! audit trail, or abandon the stream at any point without losing the
//! latest state.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use stepgraph_checkpoint::ExecutionState;

/// Lifecycle phase of a single node execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Node is in flight. The executor reports this phase through
    /// tracing only; stream items are always settled.
    Running,
    /// Node finished and its delta was applied
    Completed,
    /// Node failed after exhausting its retry policy; the run stopped
    Failed,
    /// Node requested a pause; the run stopped at a resumable point
    Paused,
}

/// One settled node execution, with the post-node state snapshot
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    /// Node that produced this result
    pub node_id: String,
    /// How the node settled
    pub status: StepStatus,
    /// Full state after the node ran
    pub state: ExecutionState,
    /// Failure description, present only when `status` is `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Human-readable pause reason, present only when `status` is `Paused`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause_reason: Option<String>,
}

impl StepResult {
    pub fn completed(node_id: impl Into<String>, state: ExecutionState) -> Self {
        Self {
            node_id: node_id.into(),
            status: StepStatus::Completed,
            state,
            error: None,
            pause_reason: None,
        }
    }

    pub fn failed(
        node_id: impl Into<String>,
        state: ExecutionState,
        error: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            status: StepStatus::Failed,
            state,
            error: Some(error.into()),
            pause_reason: None,
        }
    }

    pub fn paused(
        node_id: impl Into<String>,
        state: ExecutionState,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            status: StepStatus::Paused,
            state,
            error: None,
            pause_reason: Some(reason.into()),
        }
    }

    /// Whether the run can continue after this step
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, StepStatus::Failed | StepStatus::Paused)
    }
}

/// Stream of step results from a graph run
pub type StepStream = Pin<Box<dyn Stream<Item = StepResult> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_and_paused_are_terminal() {
        let state = ExecutionState::new("run");
        assert!(StepResult::failed("a", state.clone(), "boom").is_terminal());
        assert!(StepResult::paused("a", state.clone(), "review").is_terminal());
        assert!(!StepResult::completed("a", state).is_terminal());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&StepStatus::Completed).unwrap(),
            "\"completed\""
        );
    }
}
