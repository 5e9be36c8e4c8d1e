//! Turn submission and cancellation, decoupled from the concrete HTTP
//! client through the [`ConversationStore`] and [`TurnTransport`] seams.
//!
//! Persistence is best-effort: a conversation service outage must never
//! block a research turn, so store failures are logged and the turn
//! proceeds on local state. Transport failures are the opposite; without a
//! stream there is no turn, so they propagate to the caller.

use anyhow::Result;
use deepquery_api::{
    conversation_title, Conversation, CreateConversationRequest, Message, TurnRequest,
};
use deepquery_feed::ChannelKind;
use tracing::{debug, warn};

use crate::reconcile::ReconciliationEngine;

/// Conversation persistence operations the controller needs.
///
/// Used generically, never as `dyn`, so the auto-trait caveats of async
/// trait methods do not apply here.
#[allow(async_fn_in_trait)]
pub trait ConversationStore {
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;
    async fn create_conversation(
        &self,
        request: &CreateConversationRequest,
    ) -> Result<Conversation>;
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;
    async fn append_message(&self, conversation_id: &str, message: &Message) -> Result<()>;
}

/// The streaming run transport for one turn at a time.
#[allow(async_fn_in_trait)]
pub trait TurnTransport {
    async fn start_turn(&mut self, request: &TurnRequest) -> Result<()>;
    /// Abort the in-flight turn, if any. Idempotent.
    fn abort(&mut self);
}

/// Agent parameters carried on every outbound turn request.
#[derive(Debug, Clone)]
pub struct TurnDefaults {
    pub knowledge_source: String,
    pub knowledge_source_type: String,
    pub rag_enabled: bool,
    pub deep_research_enabled: bool,
    pub max_rounds: u32,
    pub initial_query_count: u32,
    pub model_id: String,
}

impl TurnDefaults {
    /// Persistence mode label derived from the enabled capabilities.
    pub fn mode(&self) -> &'static str {
        if self.deep_research_enabled {
            "deep_research"
        } else if self.rag_enabled {
            "rag"
        } else {
            "chat"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input; nothing was sent and no state changed.
    Ignored,
    Submitted,
}

/// Owns the conversation view state and drives turn lifecycle against the
/// store and transport seams.
#[derive(Debug)]
pub struct SubmissionController<S, T> {
    store: S,
    transport: T,
    defaults: TurnDefaults,
    conversations: Vec<Conversation>,
    active: Option<Conversation>,
    messages: Vec<Message>,
}

impl<S: ConversationStore, T: TurnTransport> SubmissionController<S, T> {
    pub fn new(store: S, transport: T, defaults: TurnDefaults) -> Self {
        Self {
            store,
            transport,
            defaults,
            conversations: Vec::new(),
            active: None,
            messages: Vec::new(),
        }
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Access the transport, e.g. for the driver loop to pull envelopes
    /// from the stream the transport holds.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub async fn refresh_conversations(&mut self) {
        match self.store.list_conversations().await {
            Ok(conversations) => self.conversations = conversations,
            Err(err) => warn!("failed to refresh conversation list: {err:#}"),
        }
    }

    /// Make `conversation` the active one and load its messages. A failed
    /// load opens the conversation empty rather than failing the switch.
    pub async fn open_conversation(&mut self, conversation: Conversation) {
        self.messages = match self.store.list_messages(&conversation.id).await {
            Ok(messages) => messages,
            Err(err) => {
                warn!("failed to load messages for {}: {err:#}", conversation.id);
                Vec::new()
            }
        };
        self.active = Some(conversation);
    }

    /// Submit one user message as a new research turn.
    ///
    /// Blank input is a no-op. Otherwise the engine turn starts, the
    /// message is recorded locally and persisted best-effort, and the
    /// stream request goes out. A transport error leaves the engine reset.
    pub async fn submit(
        &mut self,
        text: &str,
        engine: &mut ReconciliationEngine,
    ) -> Result<SubmitOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SubmitOutcome::Ignored);
        }

        engine.begin_turn();
        self.ensure_conversation(text).await;

        let message = Message::user(text);
        self.messages.push(message.clone());
        self.persist_message(&message).await;

        let request = TurnRequest {
            messages: self.messages.clone(),
            knowledge_source: self.defaults.knowledge_source.clone(),
            knowledge_source_type: self.defaults.knowledge_source_type.clone(),
            rag_enabled: self.defaults.rag_enabled,
            deep_research_enabled: self.defaults.deep_research_enabled,
            max_rounds: self.defaults.max_rounds,
            initial_query_count: self.defaults.initial_query_count,
            model_id: self.defaults.model_id.clone(),
            stream_modes: ChannelKind::all()
                .iter()
                .map(|c| c.stream_mode().to_string())
                .collect(),
        };
        if let Err(err) = self.transport.start_turn(&request).await {
            engine.cancel_turn();
            return Err(err);
        }
        Ok(SubmitOutcome::Submitted)
    }

    /// Cancel the in-flight turn: abort the transport, discard the live
    /// timeline, and re-sync the conversation list with the store.
    pub async fn cancel(&mut self, engine: &mut ReconciliationEngine) {
        self.transport.abort();
        engine.cancel_turn();
        self.refresh_conversations().await;
    }

    /// Record the completed agent answer locally and persist best-effort.
    pub async fn record_agent_message(&mut self, message: Message) {
        self.persist_message(&message).await;
        self.messages.push(message);
    }

    async fn ensure_conversation(&mut self, first_message: &str) {
        if self.active.is_some() {
            return;
        }
        let request = CreateConversationRequest {
            kb_type: self.defaults.knowledge_source_type.clone(),
            mode: self.defaults.mode().to_string(),
            title: Some(conversation_title(first_message)),
        };
        match self.store.create_conversation(&request).await {
            Ok(conversation) => {
                debug!("created conversation {}", conversation.id);
                self.conversations.insert(0, conversation.clone());
                self.active = Some(conversation);
            }
            // The turn still runs; it just will not be persisted.
            Err(err) => warn!("failed to create conversation: {err:#}"),
        }
    }

    async fn persist_message(&self, message: &Message) {
        let Some(conversation) = &self.active else {
            return;
        };
        if let Err(err) = self.store.append_message(&conversation.id, message).await {
            warn!(
                "failed to persist message {} to {}: {err:#}",
                message.id, conversation.id
            );
        }
    }
}
