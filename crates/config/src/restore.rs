use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const RESTORE_FILE_NAME: &str = "last_conversation.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct RestoreState {
    #[serde(default)]
    last_conversation_id: Option<String>,
}

/// Durable store for the last-active conversation id, so a new session can
/// reopen where the previous one left off.
///
/// An explicit path-backed store with a clear lifecycle, rather than
/// ambient global state: construct with a directory, `load` on view mount,
/// `save` on conversation switch, `clear` on delete/reset.
#[derive(Debug, Clone)]
pub struct RestoreStore {
    path: PathBuf,
}

impl RestoreStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join(RESTORE_FILE_NAME),
        }
    }

    pub fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let state: RestoreState = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(state.last_conversation_id)
    }

    pub fn save(&self, conversation_id: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let state = RestoreState {
            last_conversation_id: Some(conversation_id.to_string()),
        };
        let content = toml::to_string_pretty(&state).context("Failed to serialize restore state")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        }
        Ok(())
    }
}
