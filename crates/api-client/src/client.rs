use std::time::Duration;

use anyhow::{bail, Result};

use deepquery_api::*;

use crate::stream::{TransportError, TurnStream};

/// Typed HTTP client for the agent service: conversation persistence plus
/// the streaming run endpoint.
///
/// Persistence calls are fallible in the ordinary `Result` way; per policy
/// the callers log failures and continue, since a turn's correctness never
/// depends on persistence succeeding.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new client with the given base URL and timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create from an existing `reqwest::Client` (e.g. shared in tests).
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    // ── Health ────────────────────────────────────────────────────────────

    pub async fn health(&self) -> Result<HealthResponse> {
        let resp = self.client.get(self.url("/health")).send().await?;
        parse_response(resp).await
    }

    // ── Conversations ─────────────────────────────────────────────────────

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let resp = self.client.get(self.url("/conversations")).send().await?;
        let body: ConversationListResponse = parse_response(resp).await?;
        Ok(body.conversations)
    }

    pub async fn create_conversation(
        &self,
        req: &CreateConversationRequest,
    ) -> Result<Conversation> {
        let resp = self
            .client
            .post(self.url("/conversations"))
            .json(req)
            .send()
            .await?;
        parse_response(resp).await
    }

    pub async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let resp = self
            .client
            .get(self.url(&format!("/conversations/{conversation_id}/messages")))
            .send()
            .await?;
        let body: MessageListResponse = parse_response(resp).await?;
        Ok(body.messages)
    }

    pub async fn append_message(&self, conversation_id: &str, message: &Message) -> Result<()> {
        let req = AppendMessageRequest {
            message: message.clone(),
        };
        let resp = self
            .client
            .post(self.url(&format!("/conversations/{conversation_id}/messages")))
            .json(&req)
            .send()
            .await?;
        let _: OkResponse = parse_response(resp).await?;
        Ok(())
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.url(&format!("/conversations/{conversation_id}")))
            .send()
            .await?;
        let _: OkResponse = parse_response(resp).await?;
        Ok(())
    }

    // ── Streaming runs ────────────────────────────────────────────────────

    /// Start one research turn and return the multi-channel envelope
    /// stream. Connection failure is a transport error the caller surfaces
    /// as a blocking, retryable state; there is no automatic reconnect.
    pub async fn start_turn(&self, request: &TurnRequest) -> Result<TurnStream, TransportError> {
        let url = format!("{}/runs/stream", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(TransportError::Connect)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }
        Ok(TurnStream::new(resp))
    }
}

/// Parse an HTTP response: return the deserialized body on 2xx,
/// or an error containing the status and body text.
async fn parse_response<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("{status}: {body}");
    }
    Ok(resp.json().await?)
}
