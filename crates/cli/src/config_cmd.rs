use anyhow::{bail, Context, Result};
use deepquery_config::{config_path, ClientConfig};

pub fn show_config() -> Result<()> {
    let path = config_path()?;
    let config = ClientConfig::load(&path)?;
    println!("config: {}", path.display());
    println!("server: {}", config.server.url);
    println!("model: {}", config.agent.model_id);
    println!("reasoning model: {}", config.agent.reasoning_model_id);
    println!("knowledge source: {}", config.agent.knowledge_source);
    println!("deep research: {}", config.agent.deep_research_enabled);
    println!("max rounds: {}", config.agent.max_rounds);
    Ok(())
}

pub fn set_config(
    server: Option<String>,
    model: Option<String>,
    kb: Option<String>,
    deep_research: Option<bool>,
    max_rounds: Option<u32>,
) -> Result<()> {
    let path = config_path()?;
    let mut config = ClientConfig::load(&path)?;

    if let Some(url) = server {
        config.server.url = normalize_server_url(&url)?;
    }
    if let Some(model) = model {
        config.agent.model_id = model;
    }
    if let Some(kb) = kb {
        config.agent.knowledge_source = kb;
    }
    if let Some(enabled) = deep_research {
        config.agent.deep_research_enabled = enabled;
    }
    if let Some(rounds) = max_rounds {
        if rounds == 0 {
            bail!("max rounds must be at least 1");
        }
        config.agent.max_rounds = rounds;
    }

    config.save(&path).context("failed to save config")?;
    println!("Saved {}", path.display());
    Ok(())
}

fn normalize_server_url(value: &str) -> Result<String> {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        bail!("server URL cannot be empty");
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        bail!("server URL must start with http:// or https://");
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::normalize_server_url;

    #[test]
    fn normalize_server_url_strips_trailing_slash() {
        assert_eq!(
            normalize_server_url("http://localhost:2024/").unwrap(),
            "http://localhost:2024"
        );
    }

    #[test]
    fn normalize_server_url_rejects_bare_host() {
        assert!(normalize_server_url("localhost:2024").is_err());
    }
}
