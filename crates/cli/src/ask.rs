//! The `ask` command: submit one research turn and render its progress.
//!
//! The engine is synchronous and clock-driven, so the driver loop pulls
//! envelopes with a short timeout and ticks the engine between pulls;
//! Ctrl-C cancels the turn by dropping the stream.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use deepquery_api::{
    Conversation, CreateConversationRequest, Message, MessageRole, TurnRequest,
};
use deepquery_api_client::{ApiClient, TurnStream};
use deepquery_core::ActivityEvent;
use deepquery_engine::{
    ConversationStore, ReconciliationEngine, SubmissionController, SubmitOutcome, TurnTransport,
};
use deepquery_feed::ChannelKind;
use tracing::warn;

use crate::context::{build_engine, turn_defaults, CliContext};

/// How often the driver wakes to fire engine deadlines while the stream
/// is quiet.
const TICK_INTERVAL: Duration = Duration::from_millis(200);

pub struct ApiStore {
    client: ApiClient,
}

impl ConversationStore for ApiStore {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        self.client.list_conversations().await
    }

    async fn create_conversation(
        &self,
        request: &CreateConversationRequest,
    ) -> Result<Conversation> {
        self.client.create_conversation(request).await
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.client.list_messages(conversation_id).await
    }

    async fn append_message(&self, conversation_id: &str, message: &Message) -> Result<()> {
        self.client.append_message(conversation_id, message).await
    }
}

/// Holds the in-flight stream; dropping it is what aborts the HTTP
/// request on cancel.
pub struct ApiTransport {
    client: ApiClient,
    stream: Option<TurnStream>,
}

impl ApiTransport {
    pub fn take_stream(&mut self) -> Option<TurnStream> {
        self.stream.take()
    }
}

impl TurnTransport for ApiTransport {
    async fn start_turn(&mut self, request: &TurnRequest) -> Result<()> {
        self.stream = Some(self.client.start_turn(request).await?);
        Ok(())
    }

    fn abort(&mut self) {
        self.stream = None;
    }
}

enum TurnEnd {
    Completed(Option<Message>),
    Cancelled,
}

#[derive(Debug, Default)]
pub struct AskOptions {
    pub new_conversation: bool,
    pub conversation: Option<String>,
    pub deep_research: Option<bool>,
    pub kb: Option<String>,
    pub no_rag: bool,
}

pub async fn run_ask(question: &str, options: AskOptions) -> Result<()> {
    let ctx = CliContext::load()?;
    let mut defaults = turn_defaults(&ctx.config);
    if let Some(enabled) = options.deep_research {
        defaults.deep_research_enabled = enabled;
    }
    if let Some(kb) = &options.kb {
        defaults.knowledge_source = kb.clone();
    }
    if options.no_rag {
        defaults.rag_enabled = false;
    }

    let mut engine = build_engine(&ctx.config);
    let store = ApiStore {
        client: ctx.client.clone(),
    };
    let transport = ApiTransport {
        client: ctx.client.clone(),
        stream: None,
    };
    let mut controller = SubmissionController::new(store, transport, defaults);

    if let Some(id) = &options.conversation {
        controller.refresh_conversations().await;
        let conversation = controller
            .conversations()
            .iter()
            .find(|c| &c.id == id)
            .cloned()
            .with_context(|| format!("no conversation {id}"))?;
        controller.open_conversation(conversation).await;
    } else if !options.new_conversation {
        restore_last_conversation(&ctx, &mut controller).await;
    }

    match controller.submit(question, &mut engine).await? {
        SubmitOutcome::Ignored => {
            println!("Nothing to ask.");
            return Ok(());
        }
        SubmitOutcome::Submitted => {}
    }

    let Some(mut stream) = controller.transport_mut().take_stream() else {
        // start_turn succeeded, so the stream must be there.
        anyhow::bail!("turn started without a stream");
    };

    match drive_turn(&mut stream, &mut controller, &mut engine).await? {
        TurnEnd::Cancelled => {
            println!("Cancelled.");
            return Ok(());
        }
        TurnEnd::Completed(Some(answer)) => {
            println!();
            println!("{}", answer.content);
            if let Some(frozen) = engine.history().get(&answer.id) {
                println!();
                println!("Research activity:");
                for event in frozen {
                    print_event(event);
                }
            }
            controller.record_agent_message(answer).await;
        }
        TurnEnd::Completed(None) => {
            println!("The agent returned no answer.");
        }
    }

    if let Some(conversation) = controller.active_conversation() {
        if let Err(err) = ctx.restore.save(&conversation.id) {
            warn!("failed to remember conversation {}: {err:#}", conversation.id);
        }
    }
    Ok(())
}

async fn restore_last_conversation(
    ctx: &CliContext,
    controller: &mut SubmissionController<ApiStore, ApiTransport>,
) {
    let last_id = match ctx.restore.load() {
        Ok(Some(id)) => id,
        Ok(None) => return,
        Err(err) => {
            warn!("failed to read restore state: {err:#}");
            return;
        }
    };
    controller.refresh_conversations().await;
    let found = controller
        .conversations()
        .iter()
        .find(|c| c.id == last_id)
        .cloned();
    match found {
        Some(conversation) => controller.open_conversation(conversation).await,
        // The conversation was deleted elsewhere; forget it.
        None => {
            if let Err(err) = ctx.restore.clear() {
                warn!("failed to clear restore state: {err:#}");
            }
        }
    }
}

async fn drive_turn(
    stream: &mut TurnStream,
    controller: &mut SubmissionController<ApiStore, ApiTransport>,
    engine: &mut ReconciliationEngine,
) -> Result<TurnEnd> {
    let mut printed = 0usize;
    let mut answer: Option<Message> = None;

    loop {
        engine.tick(Instant::now());
        printed = print_new_events(engine, printed);

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                controller.cancel(engine).await;
                return Ok(TurnEnd::Cancelled);
            }
            pulled = tokio::time::timeout(TICK_INTERVAL, stream.next_envelope()) => {
                match pulled {
                    // Quiet stream; loop back to fire deadlines.
                    Err(_) => continue,
                    Ok(Ok(Some(envelope))) => {
                        if envelope.channel == ChannelKind::Messages {
                            if let Some(message) = Message::from_stream_value(&envelope.body) {
                                if message.role == MessageRole::Agent {
                                    answer = Some(message);
                                }
                            }
                        }
                        engine.handle_envelope(&envelope, Instant::now());
                        printed = print_new_events(engine, printed);
                    }
                    Ok(Ok(None)) => break,
                    Ok(Err(err)) => {
                        engine.cancel_turn();
                        return Err(err.into());
                    }
                }
            }
        }
    }

    // Stream end clears the loading arm of the freeze join.
    engine.set_loading(false);
    engine.tick(Instant::now());
    Ok(TurnEnd::Completed(answer))
}

fn print_new_events(engine: &ReconciliationEngine, printed: usize) -> usize {
    let events = engine.timeline().events();
    for event in events.iter().skip(printed) {
        print_event(event);
    }
    events.len().max(printed)
}

fn print_event(event: &ActivityEvent) {
    match event.round {
        Some(round) => println!("  [round {round}] {}: {}", event.title, event.summary),
        None => println!("  {}: {}", event.title, event.summary),
    }
}
