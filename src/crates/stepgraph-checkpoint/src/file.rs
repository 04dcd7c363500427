//! Flat-file checkpoint storage
//!
//! One directory per execution, one JSON file per label:
//! `{base_dir}/{execution_id}/{sanitized_label}.json`, each file holding a
//! [`CheckpointRecord`] (`{label, timestamp, state}`). Labels are
//! sanitized for the filesystem before use, so the listed label is the
//! sanitized form and round-trips through `load_by_label`.
//!
//! Save order is tracked explicitly: an in-process recency index maps each
//! execution to its most recently saved label, and every record carries a
//! nanosecond timestamp as the durable fallback, so `load` works correctly
//! on a fresh instance pointed at an existing directory. `list` sorts
//! directory entries lexically, which is save-order-compatible for the
//! default `checkpoint_<epoch-ms>` labels; caller-supplied labels must sort
//! correctly on their own if listing order matters to them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{CheckpointError, Result};
use crate::fsutil::{list_stems, read_optional, remove_dir_optional, remove_optional, write_atomic};
use crate::record::{auto_label, sanitize_label, CheckpointRecord};
use crate::state::ExecutionState;
use crate::traits::Checkpointer;

/// Checkpointer writing one JSON file per checkpoint under a base directory
#[derive(Debug)]
pub struct FileCheckpointer {
    base_dir: PathBuf,
    // execution id -> sanitized label of the most recent save
    recent: RwLock<HashMap<String, String>>,
}

impl FileCheckpointer {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            recent: RwLock::new(HashMap::new()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn execution_dir(&self, execution_id: &str) -> PathBuf {
        self.base_dir.join(sanitize_label(execution_id))
    }

    fn checkpoint_path(&self, execution_id: &str, label: &str) -> PathBuf {
        self.execution_dir(execution_id).join(format!("{label}.json"))
    }

    async fn read_record(&self, path: &Path) -> Result<Option<CheckpointRecord>> {
        let Some(content) = read_optional(path).await? else {
            return Ok(None);
        };
        let record = serde_json::from_str(&content)
            .map_err(|err| CheckpointError::corrupt(path, err))?;
        Ok(Some(record))
    }

    /// Scan the execution directory for the record with the greatest
    /// timestamp. Used when this instance has not saved for the execution
    /// yet (e.g. resuming in a new process).
    async fn latest_on_disk(&self, execution_id: &str) -> Result<Option<CheckpointRecord>> {
        let dir = self.execution_dir(execution_id);
        let mut latest: Option<CheckpointRecord> = None;
        for stem in list_stems(&dir, "json").await? {
            let path = dir.join(format!("{stem}.json"));
            if let Some(record) = self.read_record(&path).await? {
                let newer = latest
                    .as_ref()
                    .map(|l| record.timestamp > l.timestamp)
                    .unwrap_or(true);
                if newer {
                    latest = Some(record);
                }
            }
        }
        Ok(latest)
    }
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    async fn save(
        &self,
        execution_id: &str,
        state: &ExecutionState,
        label: Option<&str>,
    ) -> Result<()> {
        let label = match label {
            Some(label) => sanitize_label(label),
            None => auto_label(),
        };

        let dir = self.execution_dir(execution_id);
        tokio::fs::create_dir_all(&dir).await?;

        let record = CheckpointRecord {
            label: label.clone(),
            timestamp: Utc::now(),
            state: state.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&record)?;
        write_atomic(&self.checkpoint_path(execution_id, &label), &bytes).await?;

        self.recent
            .write()
            .await
            .insert(execution_id.to_owned(), label.clone());
        tracing::debug!(execution_id, label = %label, "checkpoint saved");
        Ok(())
    }

    async fn load(&self, execution_id: &str) -> Result<Option<ExecutionState>> {
        let recent_label = self.recent.read().await.get(execution_id).cloned();
        if let Some(label) = recent_label {
            let path = self.checkpoint_path(execution_id, &label);
            if let Some(record) = self.read_record(&path).await? {
                return Ok(Some(record.state));
            }
            // The file was deleted behind our back; fall through to a scan.
        }
        Ok(self
            .latest_on_disk(execution_id)
            .await?
            .map(|record| record.state))
    }

    async fn load_by_label(
        &self,
        execution_id: &str,
        label: &str,
    ) -> Result<Option<ExecutionState>> {
        let path = self.checkpoint_path(execution_id, &sanitize_label(label));
        Ok(self.read_record(&path).await?.map(|record| record.state))
    }

    async fn list(&self, execution_id: &str) -> Result<Vec<String>> {
        list_stems(&self.execution_dir(execution_id), "json").await
    }

    async fn delete(&self, execution_id: &str, label: Option<&str>) -> Result<()> {
        match label {
            Some(label) => {
                let sanitized = sanitize_label(label);
                remove_optional(&self.checkpoint_path(execution_id, &sanitized)).await?;
                let mut recent = self.recent.write().await;
                if recent.get(execution_id).map(String::as_str) == Some(sanitized.as_str()) {
                    recent.remove(execution_id);
                }
            }
            None => {
                remove_dir_optional(&self.execution_dir(execution_id)).await?;
                self.recent.write().await.remove(execution_id);
            }
        }
        Ok(())
    }
}
