//! Durable state snapshots for graph executions
//!
//! This crate owns the pieces of the engine that touch persistence:
//!
//! - [`ExecutionState`] / [`StateDelta`]: the shared, versioned state a
//!   graph run mutates one node at a time
//! - [`Checkpointer`]: the pluggable durability contract (save / load /
//!   load_by_label / list / delete, all async, absence is data not error)
//! - Four backends with different durability/readability tradeoffs:
//!   [`MemoryCheckpointer`], [`FileCheckpointer`],
//!   [`ResearchLogCheckpointer`], and [`SessionCheckpointer`]
//! - [`create_checkpointer`]: factory selecting a backend by type tag
//!
//! The executor in `stepgraph-core` drives this crate: after every node it
//! hands the checkpointer a by-value snapshot of the post-node state, so
//! any prior step is a valid resume point.

pub mod error;
pub mod factory;
pub mod file;
pub mod memory;
pub mod record;
pub mod research;
pub mod session;
pub mod state;
pub mod traits;

mod fsutil;

pub use error::{CheckpointError, Result};
pub use factory::{create_checkpointer, CheckpointerConfig};
pub use file::FileCheckpointer;
pub use memory::MemoryCheckpointer;
pub use record::{CheckpointRecord, ResearchFrontmatter, SessionRecord};
pub use research::ResearchLogCheckpointer;
pub use session::{SessionCheckpointer, SessionDir};
pub use state::{ExecutionState, StateDelta};
pub use traits::Checkpointer;
