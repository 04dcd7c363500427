//! Execution state model
//!
//! [`ExecutionState`] is the shared, versioned record that flows through a
//! graph run. The engine only interprets three things: the immutable
//! `execution_id`, the `last_updated` timestamp (rewritten on every
//! mutation), and the `outputs` map that nodes append results to. Any
//! workflow-specific fields ride along in the flattened `fields` map and
//! are treated opaquely; a workflow that wants typed access can
//! deserialize the same JSON into its own superset struct.
//!
//! Nodes never mutate state directly. They return a [`StateDelta`] and the
//! executor applies it, which keeps snapshots and live state strictly
//! separated: a checkpoint is always a by-value copy taken after the delta
//! is applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Shared state for one graph execution
///
/// All checkpoints for one run carry the same `execution_id`; it is stable
/// for the lifetime of the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionState {
    /// Identity of the run; immutable once set
    pub execution_id: String,

    /// Rewritten every time a delta is applied
    pub last_updated: DateTime<Utc>,

    /// Node-produced results, keyed by node-defined names
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,

    /// Node that signalled a pause, if the run is suspended awaiting
    /// external input. Set by the executor, cleared on resume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_node: Option<String>,

    /// Workflow-specific fields the engine does not interpret
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl ExecutionState {
    /// Create a fresh state with the given execution id
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            last_updated: Utc::now(),
            outputs: BTreeMap::new(),
            paused_node: None,
            fields: serde_json::Map::new(),
        }
    }

    /// Create a fresh state with a generated v4 UUID as the execution id
    pub fn with_generated_id() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    /// Rewrite `last_updated` to now
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    /// Merge a partial update into this state and rewrite `last_updated`
    pub fn apply(&mut self, delta: StateDelta) {
        self.outputs.extend(delta.outputs);
        for (key, value) in delta.fields {
            self.fields.insert(key, value);
        }
        self.touch();
    }

    /// Look up a node output by key
    pub fn output(&self, key: &str) -> Option<&Value> {
        self.outputs.get(key)
    }

    /// Look up a workflow-specific field by key
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a workflow-specific field in place (used by tests and callers
    /// preparing an initial state; nodes should return deltas instead)
    pub fn set_field(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
        self.touch();
    }
}

/// Partial-state update returned by a node handler
///
/// Applying a delta extends `outputs` and overwrites any workflow fields it
/// names; keys not mentioned are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDelta {
    /// New or replaced entries for the state's `outputs` map
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,

    /// New or replaced workflow-specific fields
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl StateDelta {
    /// An empty delta (node completed with no state change)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an output entry
    pub fn with_output(mut self, key: impl Into<String>, value: Value) -> Self {
        self.outputs.insert(key.into(), value);
        self
    }

    /// Add a workflow-specific field
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// True if the delta changes nothing
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty() && self.fields.is_empty()
    }
}
