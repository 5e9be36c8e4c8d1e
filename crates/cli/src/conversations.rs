//! Conversation management commands and the health check.

use anyhow::{Context, Result};
use deepquery_api::MessageRole;
use tracing::warn;

use crate::context::CliContext;

pub async fn run_list() -> Result<()> {
    let ctx = CliContext::load()?;
    let conversations = ctx
        .client
        .list_conversations()
        .await
        .context("failed to list conversations")?;
    if conversations.is_empty() {
        println!("No conversations yet.");
        return Ok(());
    }

    let last = ctx.restore.load().unwrap_or_default();
    for conversation in &conversations {
        let marker = if last.as_deref() == Some(conversation.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {}  {}  [{}] {} messages  {}",
            conversation.id,
            conversation.updated_at.format("%Y-%m-%d %H:%M"),
            conversation.mode,
            conversation.message_count,
            conversation.title,
        );
    }
    Ok(())
}

pub async fn run_show(id: &str) -> Result<()> {
    let ctx = CliContext::load()?;
    let messages = ctx
        .client
        .list_messages(id)
        .await
        .with_context(|| format!("failed to load conversation {id}"))?;

    for message in &messages {
        let who = match message.role {
            MessageRole::User => "you",
            MessageRole::Agent => "agent",
            MessageRole::System => "system",
        };
        println!("[{who}] {}", message.content);
        println!();
    }

    // Showing a conversation makes it the one `ask` continues.
    if let Err(err) = ctx.restore.save(id) {
        warn!("failed to remember conversation {id}: {err:#}");
    }
    Ok(())
}

pub async fn run_delete(id: &str) -> Result<()> {
    let ctx = CliContext::load()?;
    ctx.client
        .delete_conversation(id)
        .await
        .with_context(|| format!("failed to delete conversation {id}"))?;

    if ctx.restore.load().unwrap_or_default().as_deref() == Some(id) {
        if let Err(err) = ctx.restore.clear() {
            warn!("failed to clear restore state: {err:#}");
        }
    }
    println!("Deleted {id}.");
    Ok(())
}

pub async fn run_health() -> Result<()> {
    let ctx = CliContext::load()?;
    let health = ctx
        .client
        .health()
        .await
        .with_context(|| format!("agent service at {} is unreachable", ctx.client.base_url()))?;
    println!("{}: {}", ctx.client.base_url(), health.status);
    Ok(())
}
