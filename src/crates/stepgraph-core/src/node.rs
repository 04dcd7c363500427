//! Node handlers and their outcomes
//!
//! A node is an async function from a state snapshot to a
//! [`NodeOutcome`]. Handlers never mutate shared state directly; they
//! describe the change (or the pause, or the detour) and the executor
//! applies it. That keeps every state transition observable and
//! checkpointable at one place.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use stepgraph_checkpoint::{ExecutionState, StateDelta};

use crate::error::Result;

/// What a node asks the executor to do next
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    /// Merge this delta into the state and follow the node's edge
    Delta(StateDelta),
    /// Stop the run at a resumable point, e.g. to wait for human input
    Pause { reason: String },
    /// Ignore the node's static edge and jump to the named node instead.
    /// No state change is applied.
    Route { to: String },
}

impl NodeOutcome {
    pub fn pause(reason: impl Into<String>) -> Self {
        Self::Pause {
            reason: reason.into(),
        }
    }

    pub fn route(to: impl Into<String>) -> Self {
        Self::Route { to: to.into() }
    }
}

impl From<StateDelta> for NodeOutcome {
    fn from(delta: StateDelta) -> Self {
        Self::Delta(delta)
    }
}

/// Per-invocation context handed to every node handler
#[derive(Debug, Clone)]
pub struct NodeContext {
    /// Cooperative cancellation signal for the whole run. Long-running
    /// handlers should select on `cancel.cancelled()`.
    pub cancel: CancellationToken,
}

/// Boxed future returned by a node handler
pub type NodeFuture = BoxFuture<'static, Result<NodeOutcome>>;

/// Type-erased async node function
pub type NodeHandler = Arc<dyn Fn(ExecutionState, NodeContext) -> NodeFuture + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delta_converts_into_outcome() {
        let outcome: NodeOutcome = StateDelta::new().with_output("k", json!(1)).into();
        assert!(matches!(outcome, NodeOutcome::Delta(_)));
    }
}
