//! Backend selection
//!
//! One entry point, [`create_checkpointer`], builds any of the four
//! backends from a [`CheckpointerConfig`]. Missing or invalid options are
//! a [`CheckpointError::Configuration`] raised here, before any execution
//! begins, never deferred to first use.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{CheckpointError, Result};
use crate::file::FileCheckpointer;
use crate::memory::MemoryCheckpointer;
use crate::research::ResearchLogCheckpointer;
use crate::session::{SessionCheckpointer, SessionDir};
use crate::traits::Checkpointer;

/// Backend type tag plus backend-specific options
#[derive(Debug, Clone)]
pub enum CheckpointerConfig {
    /// Ephemeral, in-process storage
    Memory,
    /// One JSON file per checkpoint under `base_dir/{execution_id}/`
    File { base_dir: PathBuf },
    /// Markdown + frontmatter under `research_dir/checkpoints/`
    Research { research_dir: PathBuf },
    /// Sequential labels under `{session_dir}/checkpoints/`; the directory
    /// may be fixed or derived from state
    Session { session_dir: SessionDir },
}

/// Build a checkpointer from a config, validating options immediately
pub fn create_checkpointer(config: CheckpointerConfig) -> Result<Arc<dyn Checkpointer>> {
    match config {
        CheckpointerConfig::Memory => Ok(Arc::new(MemoryCheckpointer::new())),
        CheckpointerConfig::File { base_dir } => {
            require_path("file checkpointer base_dir", &base_dir)?;
            Ok(Arc::new(FileCheckpointer::new(base_dir)))
        }
        CheckpointerConfig::Research { research_dir } => {
            require_path("research checkpointer research_dir", &research_dir)?;
            Ok(Arc::new(ResearchLogCheckpointer::new(research_dir)))
        }
        CheckpointerConfig::Session { session_dir } => {
            if let SessionDir::Fixed(path) = &session_dir {
                require_path("session checkpointer session_dir", path)?;
            }
            Ok(Arc::new(SessionCheckpointer::new(session_dir)))
        }
    }
}

fn require_path(what: &str, path: &PathBuf) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(CheckpointError::Configuration(format!(
            "{what} must not be empty"
        )));
    }
    Ok(())
}
