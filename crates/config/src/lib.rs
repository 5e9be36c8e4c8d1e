//! Client configuration (`deepquery.toml`) and the conversation
//! restoration store.
//!
//! Both use explicit, injectable paths so tests never touch the real home
//! directory; the CLI resolves the canonical locations once at startup.

pub mod restore;

pub use restore::RestoreStore;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "deepquery.toml";

/// Agent endpoint used by development builds.
pub const DEV_SERVER_URL: &str = "http://localhost:2024";
/// Agent endpoint used by packaged builds.
pub const PROD_SERVER_URL: &str = "http://localhost:8123";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub ui: UiSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_url")]
    pub url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: default_server_url(),
        }
    }
}

/// Per-turn agent parameters carried in the outbound request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_knowledge_source")]
    pub knowledge_source: String,
    #[serde(default = "default_knowledge_source_type")]
    pub knowledge_source_type: String,
    #[serde(default = "default_true")]
    pub rag_enabled: bool,
    #[serde(default)]
    pub deep_research_enabled: bool,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "default_initial_query_count")]
    pub initial_query_count: u32,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_reasoning_model_id")]
    pub reasoning_model_id: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            knowledge_source: default_knowledge_source(),
            knowledge_source_type: default_knowledge_source_type(),
            rag_enabled: true,
            deep_research_enabled: false,
            max_rounds: default_max_rounds(),
            initial_query_count: default_initial_query_count(),
            model_id: default_model_id(),
            reasoning_model_id: default_reasoning_model_id(),
        }
    }
}

/// Presentation-side tuning: scroll behavior, placeholder timing, and the
/// start-event suppression table consumed by the feed normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiSettings {
    #[serde(default = "default_scroll_threshold_px")]
    pub scroll_threshold_px: f64,
    #[serde(default = "default_scroll_debounce_ms")]
    pub scroll_debounce_ms: u64,
    #[serde(default = "default_placeholder_delay_ms")]
    pub placeholder_delay_ms: u64,
    #[serde(default = "default_finalize_timeout_secs")]
    pub finalize_timeout_secs: u64,
    /// Step names whose start-flavored events are dropped from the
    /// timeline (see `StepKey::config_name`).
    #[serde(default = "default_suppressed_start_steps")]
    pub suppressed_start_steps: Vec<String>,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            scroll_threshold_px: default_scroll_threshold_px(),
            scroll_debounce_ms: default_scroll_debounce_ms(),
            placeholder_delay_ms: default_placeholder_delay_ms(),
            finalize_timeout_secs: default_finalize_timeout_secs(),
            suppressed_start_steps: default_suppressed_start_steps(),
        }
    }
}

fn default_server_url() -> String {
    if cfg!(debug_assertions) {
        DEV_SERVER_URL.to_string()
    } else {
        PROD_SERVER_URL.to_string()
    }
}

fn default_knowledge_source() -> String {
    "cnb/docs".to_string()
}

fn default_knowledge_source_type() -> String {
    "cnb".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_rounds() -> u32 {
    3
}

fn default_initial_query_count() -> u32 {
    3
}

fn default_model_id() -> String {
    "gpt-4o-mini".to_string()
}

fn default_reasoning_model_id() -> String {
    "gpt-4o".to_string()
}

fn default_scroll_threshold_px() -> f64 {
    100.0
}

fn default_scroll_debounce_ms() -> u64 {
    150
}

fn default_placeholder_delay_ms() -> u64 {
    1500
}

fn default_finalize_timeout_secs() -> u64 {
    30
}

fn default_suppressed_start_steps() -> Vec<String> {
    vec!["query_generation".to_string()]
}

/// Get the config directory path (~/.config/deepquery/).
pub fn config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Could not determine home directory")?;
    Ok(PathBuf::from(home).join(".config").join("deepquery"))
}

/// Canonical config file path.
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

impl ClientConfig {
    /// Load from `path`, falling back to defaults when the file does not
    /// exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config at {}", path.display()))
    }
}
