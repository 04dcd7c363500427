//! Durable, resumable graph execution
//!
//! Workflows are directed graphs of async nodes sharing one
//! [`ExecutionState`]. Build a graph with [`GraphBuilder`], compile it,
//! and consume the run as a stream of [`StepResult`]s:
//!
//! ```no_run
//! use futures::StreamExt;
//! use serde_json::json;
//! use stepgraph_core::{
//!     ExecutionState, GraphBuilder, RunOptions, StateDelta, END,
//! };
//!
//! # async fn demo() -> stepgraph_core::Result<()> {
//! let mut builder = GraphBuilder::new();
//! builder
//!     .add_node("greet", |_state, _ctx| async {
//!         Ok(StateDelta::new().with_output("greeting", json!("hello")).into())
//!     })
//!     .add_edge("greet", END)
//!     .set_start("greet");
//! let graph = builder.compile()?;
//!
//! let mut steps = graph.run(ExecutionState::with_generated_id(), RunOptions::new());
//! while let Some(step) = steps.next().await {
//!     println!("{}: {:?}", step.node_id, step.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Attach a checkpointer from `stepgraph-checkpoint` via
//! [`RunOptions::with_checkpointer`] and every completed step is durable;
//! a run interrupted by a pause, a crash, or cancellation restarts from
//! its latest snapshot.

pub mod compiled;
pub mod error;
pub mod graph;
pub mod node;
pub mod retry;
pub mod stream;

pub use compiled::{CompiledGraph, RunOptions};
pub use error::{GraphError, Result};
pub use graph::{GraphBuilder, Route, Router, END};
pub use node::{NodeContext, NodeFuture, NodeHandler, NodeOutcome};
pub use retry::RetryPolicy;
pub use stream::{StepResult, StepStatus, StepStream};

// The checkpoint layer is part of the public surface; re-export it so
// most applications only depend on this crate.
pub use stepgraph_checkpoint::{
    create_checkpointer, CheckpointError, Checkpointer, CheckpointerConfig, ExecutionState,
    FileCheckpointer, MemoryCheckpointer, ResearchLogCheckpointer, SessionCheckpointer,
    SessionDir, StateDelta,
};
