//! Shared startup plumbing: effective config, API client, restore store,
//! and the engine assembled from config values.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use deepquery_api_client::ApiClient;
use deepquery_config::{config_dir, config_path, ClientConfig, RestoreStore};
use deepquery_engine::{EngineConfig, ReconciliationEngine, TurnDefaults};
use deepquery_feed::{NormalizerConfig, StepKey};
use tracing::warn;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct CliContext {
    pub config: ClientConfig,
    pub client: ApiClient,
    pub restore: RestoreStore,
}

impl CliContext {
    pub fn load() -> Result<Self> {
        let config = ClientConfig::load(&config_path()?)?;
        let client = ApiClient::new(&config.server.url, HTTP_TIMEOUT)
            .context("failed to build HTTP client")?;
        let restore = RestoreStore::new(config_dir()?);
        Ok(Self {
            config,
            client,
            restore,
        })
    }
}

pub fn build_engine(config: &ClientConfig) -> ReconciliationEngine {
    let mut suppressed = HashSet::new();
    for name in &config.ui.suppressed_start_steps {
        match StepKey::from_config_name(name) {
            Some(key) => {
                suppressed.insert(key);
            }
            None => warn!("ignoring unknown suppressed step {name:?} in config"),
        }
    }
    let normalizer = NormalizerConfig {
        suppressed_starts: suppressed,
        fast_model: config.agent.model_id.clone(),
        reasoning_model: config.agent.reasoning_model_id.clone(),
        ..NormalizerConfig::default()
    };
    ReconciliationEngine::new(EngineConfig {
        normalizer,
        placeholder_delay: Duration::from_millis(config.ui.placeholder_delay_ms),
        finalize_timeout: Duration::from_secs(config.ui.finalize_timeout_secs),
    })
}

pub fn turn_defaults(config: &ClientConfig) -> TurnDefaults {
    TurnDefaults {
        knowledge_source: config.agent.knowledge_source.clone(),
        knowledge_source_type: config.agent.knowledge_source_type.clone(),
        rag_enabled: config.agent.rag_enabled,
        deep_research_enabled: config.agent.deep_research_enabled,
        max_rounds: config.agent.max_rounds,
        initial_query_count: config.agent.initial_query_count,
        model_id: config.agent.model_id.clone(),
    }
}
