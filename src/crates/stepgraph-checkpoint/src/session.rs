//! Session-scoped sequential checkpoint storage
//!
//! Writes into a single `{session_dir}/checkpoints/` directory with no
//! execution-id segment; the session directory itself is already scoped
//! to one execution. Labels are generated from a monotonically increasing
//! in-process counter (`node-001`, `node-002`, …) regardless of any
//! caller-supplied label, so the directory listing reads as the run's
//! timeline.
//!
//! The target directory is late-bound: [`SessionDir::Fixed`] names a path
//! up front, while [`SessionDir::FromState`] resolves it from the current
//! state at save time (a workflow can decide its own checkpoint location,
//! e.g. a session folder created mid-run). With a state-derived resolver
//! there is no directory to read from, so the trait's load/list/delete
//! operations return a configuration error; callers use the
//! directory-qualified `*_in` methods instead.
//!
//! Loading restores the counter from the highest sequence number seen, so
//! resumed runs continue forward-only numbering instead of overwriting.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{CheckpointError, Result};
use crate::fsutil::{list_stems, read_optional, remove_optional, write_atomic};
use crate::record::{sequence_label, SessionRecord};
use crate::state::ExecutionState;
use crate::traits::Checkpointer;

/// Where a session checkpointer writes: a fixed path, or a pure function
/// of the current state
#[derive(Clone)]
pub enum SessionDir {
    Fixed(PathBuf),
    FromState(Arc<dyn Fn(&ExecutionState) -> PathBuf + Send + Sync>),
}

impl fmt::Debug for SessionDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionDir::Fixed(path) => f.debug_tuple("Fixed").field(path).finish(),
            SessionDir::FromState(_) => f.debug_tuple("FromState").field(&"<resolver>").finish(),
        }
    }
}

/// Checkpointer with sequential labels and a late-bound session directory
#[derive(Debug)]
pub struct SessionCheckpointer {
    dir: SessionDir,
    counter: AtomicU64,
}

impl SessionCheckpointer {
    pub fn new(dir: SessionDir) -> Self {
        Self {
            dir,
            counter: AtomicU64::new(0),
        }
    }

    /// Session checkpointer writing under a fixed directory
    pub fn fixed(session_dir: impl Into<PathBuf>) -> Self {
        Self::new(SessionDir::Fixed(session_dir.into()))
    }

    /// Session checkpointer whose directory is derived from state at each
    /// save
    pub fn from_state<F>(resolver: F) -> Self
    where
        F: Fn(&ExecutionState) -> PathBuf + Send + Sync + 'static,
    {
        Self::new(SessionDir::FromState(Arc::new(resolver)))
    }

    /// Reset the sequence counter to zero
    pub fn reset_counter(&self) {
        self.counter.store(0, Ordering::SeqCst);
    }

    /// Sequence number of the last save (0 before any save)
    pub fn sequence(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Number of checkpoint files in the session directory
    pub async fn checkpoint_count(&self) -> Result<usize> {
        let dir = self.static_checkpoints_dir()?;
        Ok(list_stems(&dir, "json").await?.len())
    }

    fn static_checkpoints_dir(&self) -> Result<PathBuf> {
        match &self.dir {
            SessionDir::Fixed(path) => Ok(path.join("checkpoints")),
            SessionDir::FromState(_) => Err(CheckpointError::Configuration(
                "session directory is state-derived; use the directory-qualified load path"
                    .to_owned(),
            )),
        }
    }

    fn resolve_checkpoints_dir(&self, state: &ExecutionState) -> PathBuf {
        match &self.dir {
            SessionDir::Fixed(path) => path.join("checkpoints"),
            SessionDir::FromState(resolver) => resolver(state).join("checkpoints"),
        }
    }

    async fn read_record(path: &Path) -> Result<Option<SessionRecord>> {
        let Some(content) = read_optional(path).await? else {
            return Ok(None);
        };
        let record = serde_json::from_str(&content)
            .map_err(|err| CheckpointError::corrupt(path, err))?;
        Ok(Some(record))
    }

    async fn scan(dir: &Path) -> Result<Vec<SessionRecord>> {
        let mut records = Vec::new();
        for stem in list_stems(dir, "json").await? {
            let path = dir.join(format!("{stem}.json"));
            if let Some(record) = Self::read_record(&path).await? {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.checkpoint_number);
        Ok(records)
    }

    /// Bump the counter so future saves continue past `seen`
    fn observe_sequence(&self, seen: u64) {
        self.counter.fetch_max(seen, Ordering::SeqCst);
    }

    /// Load the latest checkpoint from an explicit session directory,
    /// restoring the sequence counter from the highest stored number.
    pub async fn load_in(
        &self,
        session_dir: impl AsRef<Path>,
        execution_id: &str,
    ) -> Result<Option<ExecutionState>> {
        let dir = session_dir.as_ref().join("checkpoints");
        let records = Self::scan(&dir).await?;
        if let Some(last) = records.last() {
            self.observe_sequence(last.checkpoint_number);
        }
        Ok(records
            .into_iter()
            .rev()
            .find(|r| r.execution_id == execution_id)
            .map(|r| r.state))
    }

    /// Load one labeled checkpoint from an explicit session directory. On
    /// success the counter advances to at least that checkpoint's sequence
    /// number, so a subsequent save continues forward rather than reusing
    /// `node-001`.
    pub async fn load_by_label_in(
        &self,
        session_dir: impl AsRef<Path>,
        execution_id: &str,
        label: &str,
    ) -> Result<Option<ExecutionState>> {
        let path = session_dir
            .as_ref()
            .join("checkpoints")
            .join(format!("{label}.json"));
        match Self::read_record(&path).await? {
            Some(record) if record.execution_id == execution_id => {
                self.observe_sequence(record.checkpoint_number);
                Ok(Some(record.state))
            }
            _ => Ok(None),
        }
    }

    /// List labels from an explicit session directory, in sequence order
    pub async fn list_in(&self, session_dir: impl AsRef<Path>) -> Result<Vec<String>> {
        let dir = session_dir.as_ref().join("checkpoints");
        Ok(Self::scan(&dir).await?.into_iter().map(|r| r.label).collect())
    }
}

#[async_trait]
impl Checkpointer for SessionCheckpointer {
    async fn save(
        &self,
        execution_id: &str,
        state: &ExecutionState,
        label: Option<&str>,
    ) -> Result<()> {
        if let Some(ignored) = label {
            tracing::debug!(label = ignored, "session backend ignores caller labels");
        }

        let number = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let label = sequence_label(number);

        let dir = self.resolve_checkpoints_dir(state);
        tokio::fs::create_dir_all(&dir).await?;

        let record = SessionRecord {
            label: label.clone(),
            execution_id: execution_id.to_owned(),
            timestamp: Utc::now(),
            checkpoint_number: number,
            state: state.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&record)?;
        write_atomic(&dir.join(format!("{label}.json")), &bytes).await?;

        tracing::debug!(execution_id, label = %label, "session checkpoint saved");
        Ok(())
    }

    async fn load(&self, execution_id: &str) -> Result<Option<ExecutionState>> {
        let dir = self.static_checkpoints_dir()?;
        let records = Self::scan(&dir).await?;
        if let Some(last) = records.last() {
            self.observe_sequence(last.checkpoint_number);
        }
        Ok(records
            .into_iter()
            .rev()
            .find(|r| r.execution_id == execution_id)
            .map(|r| r.state))
    }

    async fn load_by_label(
        &self,
        execution_id: &str,
        label: &str,
    ) -> Result<Option<ExecutionState>> {
        let dir = self.static_checkpoints_dir()?;
        let path = dir.join(format!("{label}.json"));
        match Self::read_record(&path).await? {
            Some(record) if record.execution_id == execution_id => {
                self.observe_sequence(record.checkpoint_number);
                Ok(Some(record.state))
            }
            _ => Ok(None),
        }
    }

    async fn list(&self, execution_id: &str) -> Result<Vec<String>> {
        let dir = self.static_checkpoints_dir()?;
        Ok(Self::scan(&dir)
            .await?
            .into_iter()
            .filter(|r| r.execution_id == execution_id)
            .map(|r| r.label)
            .collect())
    }

    async fn delete(&self, execution_id: &str, label: Option<&str>) -> Result<()> {
        let dir = self.static_checkpoints_dir()?;
        match label {
            Some(label) => {
                remove_optional(&dir.join(format!("{label}.json"))).await?;
            }
            None => {
                for record in Self::scan(&dir).await? {
                    if record.execution_id == execution_id {
                        remove_optional(&dir.join(format!("{}.json", record.label))).await?;
                    }
                }
                self.reset_counter();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn state(id: &str) -> ExecutionState {
        let mut s = ExecutionState::new(id);
        s.outputs.insert("phase".into(), json!("build"));
        s
    }

    #[tokio::test]
    async fn saves_yield_sequential_labels() {
        let dir = TempDir::new().unwrap();
        let saver = SessionCheckpointer::fixed(dir.path());
        let s = state("run-1");

        saver.save("run-1", &s, None).await.unwrap();
        saver.save("run-1", &s, Some("my-label")).await.unwrap();
        saver.save("run-1", &s, None).await.unwrap();

        assert_eq!(
            saver.list("run-1").await.unwrap(),
            vec!["node-001", "node-002", "node-003"]
        );
    }

    #[tokio::test]
    async fn files_live_directly_under_checkpoints() {
        let dir = TempDir::new().unwrap();
        let saver = SessionCheckpointer::fixed(dir.path());
        saver.save("run-1", &state("run-1"), None).await.unwrap();

        assert!(dir.path().join("checkpoints").join("node-001.json").exists());
    }

    #[tokio::test]
    async fn load_by_label_restores_counter_forward_only() {
        let dir = TempDir::new().unwrap();
        let saver = SessionCheckpointer::fixed(dir.path());
        let s = state("run-1");

        saver.save("run-1", &s, None).await.unwrap();
        saver.save("run-1", &s, None).await.unwrap();

        saver.reset_counter();
        assert_eq!(saver.sequence(), 0);

        let loaded = saver.load_by_label("run-1", "node-002").await.unwrap();
        assert!(loaded.is_some());
        assert_eq!(saver.sequence(), 2);

        saver.save("run-1", &s, None).await.unwrap();
        let labels = saver.list("run-1").await.unwrap();
        assert_eq!(labels, vec!["node-001", "node-002", "node-003"]);
    }

    #[tokio::test]
    async fn load_restores_counter_from_highest_sequence() {
        let dir = TempDir::new().unwrap();
        {
            let saver = SessionCheckpointer::fixed(dir.path());
            let s = state("run-1");
            saver.save("run-1", &s, None).await.unwrap();
            saver.save("run-1", &s, None).await.unwrap();
            saver.save("run-1", &s, None).await.unwrap();
        }

        let saver = SessionCheckpointer::fixed(dir.path());
        let loaded = saver.load("run-1").await.unwrap();
        assert!(loaded.is_some());
        assert_eq!(saver.sequence(), 3);

        saver.save("run-1", &state("run-1"), None).await.unwrap();
        assert!(dir.path().join("checkpoints").join("node-004.json").exists());
    }

    #[tokio::test]
    async fn state_derived_directory_saves_but_refuses_static_loads() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let saver = SessionCheckpointer::from_state(move |state: &ExecutionState| {
            let session = state
                .field("session_dir")
                .and_then(|v| v.as_str())
                .unwrap_or("default");
            root.join(session)
        });

        let mut s = state("run-1");
        s.set_field("session_dir", json!("session-a"));
        saver.save("run-1", &s, None).await.unwrap();

        assert!(dir
            .path()
            .join("session-a")
            .join("checkpoints")
            .join("node-001.json")
            .exists());

        let err = saver.load("run-1").await.unwrap_err();
        assert!(matches!(err, CheckpointError::Configuration(_)));

        // The directory-qualified path works.
        let loaded = saver
            .load_in(dir.path().join("session-a"), "run-1")
            .await
            .unwrap();
        assert!(loaded.is_some());
    }

    #[tokio::test]
    async fn delete_all_resets_counter() {
        let dir = TempDir::new().unwrap();
        let saver = SessionCheckpointer::fixed(dir.path());
        let s = state("run-1");

        saver.save("run-1", &s, None).await.unwrap();
        saver.save("run-1", &s, None).await.unwrap();

        saver.delete("run-1", None).await.unwrap();
        assert_eq!(saver.sequence(), 0);
        assert!(saver.list("run-1").await.unwrap().is_empty());

        saver.save("run-1", &s, None).await.unwrap();
        assert_eq!(saver.list("run-1").await.unwrap(), vec!["node-001"]);
    }

    #[tokio::test]
    async fn delete_one_label_keeps_the_rest() {
        let dir = TempDir::new().unwrap();
        let saver = SessionCheckpointer::fixed(dir.path());
        let s = state("run-1");

        saver.save("run-1", &s, None).await.unwrap();
        saver.save("run-1", &s, None).await.unwrap();

        saver.delete("run-1", Some("node-001")).await.unwrap();
        assert_eq!(saver.list("run-1").await.unwrap(), vec!["node-002"]);
    }

    #[tokio::test]
    async fn unknown_execution_is_empty_not_error() {
        let dir = TempDir::new().unwrap();
        let saver = SessionCheckpointer::fixed(dir.path());

        assert!(saver.load("nope").await.unwrap().is_none());
        assert!(saver.load_by_label("nope", "node-001").await.unwrap().is_none());
        assert!(saver.list("nope").await.unwrap().is_empty());
        saver.delete("nope", None).await.unwrap();
    }
}
