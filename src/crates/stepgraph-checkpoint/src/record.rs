//! On-disk checkpoint record formats and label helpers
//!
//! Three wire formats share the same state snapshot but differ in
//! envelope:
//!
//! - [`CheckpointRecord`]: flat-file backend, one JSON file per label
//! - [`SessionRecord`]: session backend, adds the execution id and the
//!   sequence number (the directory itself is execution-scoped)
//! - [`ResearchFrontmatter`]: research-log backend, YAML frontmatter
//!   ahead of a JSON body so the metadata can be read without parsing the
//!   (potentially large) state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::ExecutionState;

/// Flat-file checkpoint body: `{baseDir}/{executionId}/{label}.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub label: String,
    pub timestamp: DateTime<Utc>,
    pub state: ExecutionState,
}

/// Session checkpoint body: `{sessionDir}/checkpoints/{label}.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub label: String,
    pub execution_id: String,
    pub timestamp: DateTime<Utc>,
    pub checkpoint_number: u64,
    pub state: ExecutionState,
}

/// Research-log frontmatter, delimited by `---` lines in the `.md` file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchFrontmatter {
    pub execution_id: String,
    pub label: String,
    pub timestamp: DateTime<Utc>,
    /// Number of keys in the snapshot's `outputs` map
    pub node_count: usize,
}

/// Generate a timestamp-based label: `checkpoint_<epoch-ms>`
///
/// The format sorts lexically in save order, so directory listings of
/// auto-labeled checkpoints double as a save-order listing.
pub fn auto_label() -> String {
    format!("checkpoint_{}", Utc::now().timestamp_millis())
}

/// Generate a zero-padded sequence label for the session backend
pub fn sequence_label(n: u64) -> String {
    format!("node-{:03}", n)
}

/// Parse the sequence number out of a `node-NNN` label
pub fn parse_sequence_label(label: &str) -> Option<u64> {
    label.strip_prefix("node-")?.parse().ok()
}

/// Replace characters that are unsafe in file names with `_`
pub fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(
            sanitize_label("step/with:special*chars"),
            "step_with_special_chars"
        );
        assert_eq!(sanitize_label("plain-label_01"), "plain-label_01");
    }

    #[test]
    fn sequence_labels_are_zero_padded() {
        assert_eq!(sequence_label(1), "node-001");
        assert_eq!(sequence_label(42), "node-042");
        assert_eq!(sequence_label(1000), "node-1000");
    }

    #[test]
    fn sequence_labels_parse_back() {
        assert_eq!(parse_sequence_label("node-007"), Some(7));
        assert_eq!(parse_sequence_label("checkpoint_123"), None);
    }

    #[test]
    fn auto_labels_carry_epoch_millis() {
        let label = auto_label();
        let millis: i64 = label.strip_prefix("checkpoint_").unwrap().parse().unwrap();
        assert!(millis > 0);
    }
}
