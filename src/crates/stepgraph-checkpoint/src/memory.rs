//! In-memory checkpoint storage for tests and ephemeral runs
//!
//! Keeps an ordered list of snapshots per execution behind an
//! `Arc<RwLock<HashMap>>`. No I/O, no persistence across restarts;
//! intended for unit tests and short-lived runs where durability does not
//! matter. `clear()` resets everything between tests and
//! `count(execution_id)` exposes the checkpoint count for diagnostics.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::record::auto_label;
use crate::state::ExecutionState;
use crate::traits::Checkpointer;

#[derive(Debug, Clone)]
struct MemoryEntry {
    label: String,
    #[allow(dead_code)]
    timestamp: DateTime<Utc>,
    state: ExecutionState,
}

/// Checkpointer backed by process memory
///
/// Entries per execution are kept in save order, so `load` is simply the
/// last entry. Re-saving an existing label removes the old entry and
/// appends the new one, keeping "most recent save wins" true for
/// overwrites as well.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointer {
    storage: Arc<RwLock<HashMap<String, Vec<MemoryEntry>>>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checkpoints held for one execution
    pub async fn count(&self, execution_id: &str) -> usize {
        self.storage
            .read()
            .await
            .get(execution_id)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Drop all checkpoints for all executions
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn save(
        &self,
        execution_id: &str,
        state: &ExecutionState,
        label: Option<&str>,
    ) -> Result<()> {
        let label = label.map(str::to_owned).unwrap_or_else(auto_label);
        let entry = MemoryEntry {
            label: label.clone(),
            timestamp: Utc::now(),
            state: state.clone(),
        };

        let mut storage = self.storage.write().await;
        let entries = storage.entry(execution_id.to_owned()).or_default();
        entries.retain(|e| e.label != label);
        entries.push(entry);
        Ok(())
    }

    async fn load(&self, execution_id: &str) -> Result<Option<ExecutionState>> {
        let storage = self.storage.read().await;
        Ok(storage
            .get(execution_id)
            .and_then(|entries| entries.last())
            .map(|entry| entry.state.clone()))
    }

    async fn load_by_label(
        &self,
        execution_id: &str,
        label: &str,
    ) -> Result<Option<ExecutionState>> {
        let storage = self.storage.read().await;
        Ok(storage
            .get(execution_id)
            .and_then(|entries| entries.iter().find(|e| e.label == label))
            .map(|entry| entry.state.clone()))
    }

    async fn list(&self, execution_id: &str) -> Result<Vec<String>> {
        let storage = self.storage.read().await;
        Ok(storage
            .get(execution_id)
            .map(|entries| entries.iter().map(|e| e.label.clone()).collect())
            .unwrap_or_default())
    }

    async fn delete(&self, execution_id: &str, label: Option<&str>) -> Result<()> {
        let mut storage = self.storage.write().await;
        match label {
            Some(label) => {
                if let Some(entries) = storage.get_mut(execution_id) {
                    entries.retain(|e| e.label != label);
                }
            }
            None => {
                storage.remove(execution_id);
            }
        }
        Ok(())
    }
}
