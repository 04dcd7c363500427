//! Human-readable research-log checkpoint storage
//!
//! Like the flat-file backend, but each checkpoint is a Markdown document:
//! YAML frontmatter (`execution_id`, `label`, `timestamp`, `node_count`)
//! delimited by `---` lines, followed by the JSON-serialized state as the
//! document body. The frontmatter lets a UI list checkpoints cheaply via
//! [`ResearchLogCheckpointer::get_metadata`] without parsing the state
//! body.
//!
//! Layout: `{research_dir}/checkpoints/{execution_id}/{label}.md`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{CheckpointError, Result};
use crate::fsutil::{list_stems, read_optional, remove_dir_optional, remove_optional, write_atomic};
use crate::record::{auto_label, sanitize_label, ResearchFrontmatter};
use crate::state::ExecutionState;
use crate::traits::Checkpointer;

/// Checkpointer writing Markdown files with YAML frontmatter
#[derive(Debug)]
pub struct ResearchLogCheckpointer {
    research_dir: PathBuf,
    // execution id -> sanitized label of the most recent save
    recent: RwLock<HashMap<String, String>>,
}

impl ResearchLogCheckpointer {
    pub fn new(research_dir: impl Into<PathBuf>) -> Self {
        Self {
            research_dir: research_dir.into(),
            recent: RwLock::new(HashMap::new()),
        }
    }

    fn execution_dir(&self, execution_id: &str) -> PathBuf {
        self.research_dir
            .join("checkpoints")
            .join(sanitize_label(execution_id))
    }

    fn checkpoint_path(&self, execution_id: &str, label: &str) -> PathBuf {
        self.execution_dir(execution_id).join(format!("{label}.md"))
    }

    /// Read only the frontmatter of one checkpoint. The state body is not
    /// parsed, which keeps listing large checkpoints cheap.
    pub async fn get_metadata(
        &self,
        execution_id: &str,
        label: &str,
    ) -> Result<Option<ResearchFrontmatter>> {
        let path = self.checkpoint_path(execution_id, &sanitize_label(label));
        let Some(content) = read_optional(&path).await? else {
            return Ok(None);
        };
        let (frontmatter, _) = split_document(&path, &content)?;
        Ok(Some(frontmatter))
    }

    async fn read_state(&self, path: &Path) -> Result<Option<ExecutionState>> {
        let Some(content) = read_optional(path).await? else {
            return Ok(None);
        };
        let (_, body) = split_document(path, &content)?;
        let state = serde_json::from_str(body)
            .map_err(|err| CheckpointError::corrupt(path, err))?;
        Ok(Some(state))
    }
}

/// Split a research-log document into parsed frontmatter and the raw body
fn split_document<'a>(path: &Path, content: &'a str) -> Result<(ResearchFrontmatter, &'a str)> {
    let rest = content
        .strip_prefix("---\n")
        .ok_or_else(|| CheckpointError::corrupt(path, "missing frontmatter delimiter"))?;
    let end = rest
        .find("\n---\n")
        .ok_or_else(|| CheckpointError::corrupt(path, "unterminated frontmatter"))?;
    let frontmatter = serde_yaml::from_str(&rest[..end])
        .map_err(|err| CheckpointError::corrupt(path, err))?;
    Ok((frontmatter, &rest[end + 5..]))
}

#[async_trait]
impl Checkpointer for ResearchLogCheckpointer {
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

        let frontmatter = ResearchFrontmatter {
            execution_id: execution_id.to_owned(),
            label: label.clone(),
            timestamp: Utc::now(),
            node_count: state.outputs.len(),
        };
        let yaml = serde_yaml::to_string(&frontmatter)?;
        let body = serde_json::to_string_pretty(state)?;
        let document = format!("---\n{yaml}---\n{body}\n");

        write_atomic(&self.checkpoint_path(execution_id, &label), document.as_bytes()).await?;

        self.recent
            .write()
            .await
            .insert(execution_id.to_owned(), label.clone());
        tracing::debug!(execution_id, label = %label, "research-log checkpoint saved");
        Ok(())
    }

    async fn load(&self, execution_id: &str) -> Result<Option<ExecutionState>> {
        let recent_label = self.recent.read().await.get(execution_id).cloned();
        if let Some(label) = recent_label {
            let path = self.checkpoint_path(execution_id, &label);
            if let Some(state) = self.read_state(&path).await? {
                return Ok(Some(state));
            }
        }

        // No save from this instance: pick the greatest frontmatter
        // timestamp among the files on disk.
        let dir = self.execution_dir(execution_id);
        let mut latest: Option<(ResearchFrontmatter, PathBuf)> = None;
        for stem in list_stems(&dir, "md").await? {
            let path = dir.join(format!("{stem}.md"));
            let Some(content) = read_optional(&path).await? else {
                continue;
            };
            let (frontmatter, _) = split_document(&path, &content)?;
            let newer = latest
                .as_ref()
                .map(|(l, _)| frontmatter.timestamp > l.timestamp)
                .unwrap_or(true);
            if newer {
                latest = Some((frontmatter, path));
            }
        }

        match latest {
            Some((_, path)) => self.read_state(&path).await,
            None => Ok(None),
        }
    }

    async fn load_by_label(
        &self,
        execution_id: &str,
        label: &str,
    ) -> Result<Option<ExecutionState>> {
        let path = self.checkpoint_path(execution_id, &sanitize_label(label));
        self.read_state(&path).await
    }

    async fn list(&self, execution_id: &str) -> Result<Vec<String>> {
        list_stems(&self.execution_dir(execution_id), "md").await
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn state_with_outputs(id: &str, keys: &[&str]) -> ExecutionState {
        let mut state = ExecutionState::new(id);
        for (i, key) in keys.iter().enumerate() {
            state.outputs.insert((*key).into(), json!(i));
        }
        state
    }

    #[tokio::test]
    async fn round_trip_through_markdown() {
        let dir = TempDir::new().unwrap();
        let saver = ResearchLogCheckpointer::new(dir.path());
        let mut state = state_with_outputs("run-1", &["plan", "draft"]);
        state.set_field("topic", json!("caching"));

        saver.save("run-1", &state, Some("phase-1")).await.unwrap();
        let loaded = saver
            .load_by_label("run-1", "phase-1")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn documents_have_frontmatter_and_json_body() {
        let dir = TempDir::new().unwrap();
        let saver = ResearchLogCheckpointer::new(dir.path());
        let state = state_with_outputs("run-1", &["plan"]);

        saver.save("run-1", &state, Some("phase-1")).await.unwrap();

        let path = dir
            .path()
            .join("checkpoints")
            .join("run-1")
            .join("phase-1.md");
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with("---\n"));
        assert!(content.contains("execution_id: run-1"));
        assert!(content.contains("node_count: 1"));
        assert!(content.contains("\"plan\""));
    }

    #[tokio::test]
    async fn metadata_reads_only_frontmatter() {
        let dir = TempDir::new().unwrap();
        let saver = ResearchLogCheckpointer::new(dir.path());
        let state = state_with_outputs("run-1", &["plan", "draft", "review"]);

        saver.save("run-1", &state, Some("phase-2")).await.unwrap();

        let meta = saver
            .get_metadata("run-1", "phase-2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.execution_id, "run-1");
        assert_eq!(meta.label, "phase-2");
        assert_eq!(meta.node_count, 3);
    }

    #[tokio::test]
    async fn load_returns_most_recent_save() {
        let dir = TempDir::new().unwrap();
        let saver = ResearchLogCheckpointer::new(dir.path());

        saver
            .save("run-1", &state_with_outputs("run-1", &["a"]), Some("zz"))
            .await
            .unwrap();
        saver
            .save(
                "run-1",
                &state_with_outputs("run-1", &["a", "b"]),
                Some("aa"),
            )
            .await
            .unwrap();

        let latest = saver.load("run-1").await.unwrap().unwrap();
        assert_eq!(latest.outputs.len(), 2);
    }

    #[tokio::test]
    async fn fresh_instance_recovers_latest_from_frontmatter_timestamps() {
        let dir = TempDir::new().unwrap();
        {
            let saver = ResearchLogCheckpointer::new(dir.path());
            saver
                .save("run-1", &state_with_outputs("run-1", &["a"]), Some("zz"))
                .await
                .unwrap();
            saver
                .save(
                    "run-1",
                    &state_with_outputs("run-1", &["a", "b"]),
                    Some("aa"),
                )
                .await
                .unwrap();
        }

        // New instance, empty recency index: must fall back to the
        // frontmatter timestamps, not the lexically greatest label.
        let saver = ResearchLogCheckpointer::new(dir.path());
        let latest = saver.load("run-1").await.unwrap().unwrap();
        assert_eq!(latest.outputs.len(), 2);
    }

    #[tokio::test]
    async fn unknown_execution_is_empty_not_error() {
        let dir = TempDir::new().unwrap();
        let saver = ResearchLogCheckpointer::new(dir.path());

        assert!(saver.load("nope").await.unwrap().is_none());
        assert!(saver.get_metadata("nope", "x").await.unwrap().is_none());
        assert!(saver.list("nope").await.unwrap().is_empty());
        saver.delete("nope", Some("x")).await.unwrap();
    }

    #[tokio::test]
    async fn truncated_document_surfaces_as_corruption() {
        let dir = TempDir::new().unwrap();
        let saver = ResearchLogCheckpointer::new(dir.path());

        let exec_dir = dir.path().join("checkpoints").join("run-1");
        std::fs::create_dir_all(&exec_dir).unwrap();
        std::fs::write(exec_dir.join("bad.md"), b"---\nlabel: bad\n").unwrap();

        let err = saver.load_by_label("run-1", "bad").await.unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { .. }));
    }
}
