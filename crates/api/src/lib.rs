//! Request/response types shared between the client crates and the
//! upstream agent service (conversation persistence + streaming runs).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest generated conversation title, in characters.
pub const MAX_TITLE_LENGTH: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Agent,
    System,
}

/// One conversation message, user- or agent-authored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: MessageRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn agent(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: MessageRole::Agent,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Parse a message-channel stream record. The upstream labels authors
    /// `human`/`ai`; records without a stable id are not yet addressable
    /// and yield `None`.
    pub fn from_stream_value(value: &serde_json::Value) -> Option<Self> {
        let obj = value.as_object()?;
        let id = obj.get("id").and_then(serde_json::Value::as_str)?;
        let role = match obj.get("type").and_then(serde_json::Value::as_str)? {
            "human" => MessageRole::User,
            "ai" => MessageRole::Agent,
            "system" => MessageRole::System,
            _ => return None,
        };
        let content = obj
            .get("content")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("")
            .to_string();
        Some(Self {
            id: id.to_string(),
            role,
            content,
            timestamp: Utc::now(),
        })
    }
}

/// Conversation metadata as stored by the persistence service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub message_count: u64,
    pub kb_type: String,
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<Conversation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageListResponse {
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConversationRequest {
    pub kb_type: String,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendMessageRequest {
    pub message: Message,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// The full outbound parameter envelope for one research turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    /// Conversation content so far, ending with the new user message.
    pub messages: Vec<Message>,
    pub knowledge_source: String,
    pub knowledge_source_type: String,
    pub rag_enabled: bool,
    pub deep_research_enabled: bool,
    pub max_rounds: u32,
    pub initial_query_count: u32,
    pub model_id: String,
    /// Stream modes requested from the transport; one per channel kind.
    pub stream_modes: Vec<String>,
}

/// Derive a conversation title from the first user message: collapse
/// whitespace, truncate at a word boundary, fall back to a fixed label.
pub fn conversation_title(first_message: &str) -> String {
    let collapsed = first_message.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return "New conversation".to_string();
    }
    if collapsed.chars().count() <= MAX_TITLE_LENGTH {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(MAX_TITLE_LENGTH).collect();
    let trimmed = match cut.rsplit_once(' ') {
        Some((head, _)) => head,
        None => cut.as_str(),
    };
    format!("{trimmed}...")
}
