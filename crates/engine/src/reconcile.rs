//! Turn-scoped reconciliation of channel envelopes into one live timeline.
//!
//! Envelopes arrive concurrently across channels with no cross-channel
//! ordering guarantee; the engine keeps a single phase machine per turn and
//! reconciles whatever arrives, whenever it arrives. Time-driven behavior
//! (placeholder synthesis, the finalize watchdog) is modeled as armed
//! deadlines polled by [`ReconciliationEngine::tick`], so every path is
//! deterministic under test.

use std::time::{Duration, Instant};

use deepquery_api::{Message, MessageRole};
use deepquery_core::{ActivityEvent, ActivityHistoryStore, Timeline};
use deepquery_feed::normalize::{continuing_search_event, task_result_records};
use deepquery_feed::{normalize, ChannelKind, Envelope, NormalizerConfig, SideSignals};
use tracing::{debug, warn};

/// Where the engine is within the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// No turn in flight; envelopes are dropped.
    Idle,
    /// Research underway; events accumulate on the live timeline.
    Active,
    /// Terminal event seen; waiting on the freeze join to complete.
    Finalizing,
}

/// Per-turn bookkeeping exposed to the view layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnState {
    pub is_loading: bool,
    pub has_seen_terminal_event: bool,
    /// Highest research round observed so far this turn.
    pub round_count: u32,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub normalizer: NormalizerConfig,
    /// Delay before the synthetic "Continuing Search" placeholder lands.
    pub placeholder_delay: Duration,
    /// Watchdog on the gap between the terminal event and the freeze join.
    pub finalize_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            normalizer: NormalizerConfig::default(),
            placeholder_delay: Duration::from_millis(1500),
            finalize_timeout: Duration::from_secs(30),
        }
    }
}

/// Reconciles the five envelope channels into the live [`Timeline`] and,
/// at turn end, freezes that timeline into the [`ActivityHistoryStore`]
/// keyed by the answer message id.
///
/// The freeze fires only at the join of three independently-ordered
/// conditions: the terminal event was seen, loading was cleared, and an
/// agent-authored message with a stable id arrived. Whichever condition
/// lands last triggers it.
#[derive(Debug)]
pub struct ReconciliationEngine {
    config: EngineConfig,
    phase: TurnPhase,
    turn: TurnState,
    timeline: Timeline,
    history: ActivityHistoryStore,
    answer_id: Option<String>,
    placeholder_due: Option<Instant>,
    finalize_deadline: Option<Instant>,
}

impl ReconciliationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            phase: TurnPhase::Idle,
            turn: TurnState::default(),
            timeline: Timeline::new(),
            history: ActivityHistoryStore::new(),
            answer_id: None,
            placeholder_due: None,
            finalize_deadline: None,
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn turn_state(&self) -> TurnState {
        self.turn
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn history(&self) -> &ActivityHistoryStore {
        &self.history
    }

    /// Drop all frozen history, e.g. on conversation switch.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Start a new turn: clear the live timeline and arm loading state.
    /// History from previous turns is untouched.
    pub fn begin_turn(&mut self) {
        self.phase = TurnPhase::Active;
        self.turn = TurnState {
            is_loading: true,
            ..TurnState::default()
        };
        self.timeline.clear();
        self.answer_id = None;
        self.placeholder_due = None;
        self.finalize_deadline = None;
    }

    /// Abort the current turn, discarding the live timeline. Nothing is
    /// frozen; history keeps only completed turns.
    pub fn cancel_turn(&mut self) {
        if self.phase == TurnPhase::Idle {
            return;
        }
        debug!("turn cancelled with {} live events", self.timeline.len());
        self.reset_turn();
    }

    /// Feed one envelope into the current turn. Envelopes arriving outside
    /// a turn are dropped.
    pub fn handle_envelope(&mut self, envelope: &Envelope, now: Instant) {
        if self.phase == TurnPhase::Idle {
            debug!("dropping envelope on {:?}: no turn in flight", envelope.channel);
            return;
        }

        if envelope.channel == ChannelKind::Messages {
            if let Some(message) = Message::from_stream_value(&envelope.body) {
                if message.role == MessageRole::Agent {
                    self.observe_agent_message(&message.id);
                }
            }
            return;
        }

        let mut signals = SideSignals::default();
        if envelope.channel == ChannelKind::Debug {
            // A task_result wrapper may carry several update-shaped records.
            if let Some(records) = task_result_records(&envelope.body) {
                for record in records {
                    if let Some(event) = normalize(
                        ChannelKind::Update,
                        record,
                        &self.config.normalizer,
                        &mut signals,
                    ) {
                        self.push_event(event);
                    }
                }
            }
        } else if let Some(event) = normalize(
            envelope.channel,
            &envelope.body,
            &self.config.normalizer,
            &mut signals,
        ) {
            self.push_event(event);
        }

        self.apply_signals(signals, now);
    }

    /// Loading-flag edge from the transport driver. Clearing it is one arm
    /// of the freeze join.
    pub fn set_loading(&mut self, loading: bool) {
        if self.phase == TurnPhase::Idle {
            return;
        }
        self.turn.is_loading = loading;
        if !loading {
            self.try_freeze();
        }
    }

    /// Record the answer message id; one arm of the freeze join. Later
    /// observations replace earlier ones so the latest agent message wins.
    pub fn observe_agent_message(&mut self, id: &str) {
        if self.phase == TurnPhase::Idle {
            return;
        }
        self.answer_id = Some(id.to_string());
        self.try_freeze();
    }

    /// Fire any armed deadlines that have come due.
    pub fn tick(&mut self, now: Instant) {
        if let Some(due) = self.placeholder_due {
            if now >= due && self.phase == TurnPhase::Active {
                self.placeholder_due = None;
                self.timeline.append(continuing_search_event());
            }
        }
        if let Some(deadline) = self.finalize_deadline {
            if now >= deadline && self.phase == TurnPhase::Finalizing {
                warn!("finalize join timed out; discarding {} live events", self.timeline.len());
                self.reset_turn();
            }
        }
    }

    fn push_event(&mut self, event: ActivityEvent) {
        if let Some(round) = event.round {
            self.turn.round_count = self.turn.round_count.max(round);
        }
        // Any real event supersedes a pending placeholder.
        self.placeholder_due = None;
        self.timeline.append(event);
    }

    fn apply_signals(&mut self, signals: SideSignals, now: Instant) {
        if signals.saw_terminal_complete && !self.turn.has_seen_terminal_event {
            self.turn.has_seen_terminal_event = true;
            self.phase = TurnPhase::Finalizing;
            self.placeholder_due = None;
            self.finalize_deadline = Some(now + self.config.finalize_timeout);
            self.try_freeze();
            return;
        }
        // Armed after the reflection event is pushed, so the push that
        // carried the signal does not cancel its own placeholder.
        if signals.schedule_continuing_search && self.phase == TurnPhase::Active {
            self.placeholder_due = Some(now + self.config.placeholder_delay);
        }
    }

    fn try_freeze(&mut self) {
        if self.phase != TurnPhase::Finalizing || self.turn.is_loading {
            return;
        }
        let Some(answer_id) = self.answer_id.clone() else {
            return;
        };
        if !self.history.freeze(&answer_id, self.timeline.snapshot()) {
            debug!("history for {answer_id} already frozen");
        }
        self.reset_turn();
    }

    fn reset_turn(&mut self) {
        self.phase = TurnPhase::Idle;
        self.turn = TurnState::default();
        self.timeline.clear();
        self.answer_id = None;
        self.placeholder_due = None;
        self.finalize_deadline = None;
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> ReconciliationEngine {
        ReconciliationEngine::default()
    }

    fn custom(body: serde_json::Value) -> Envelope {
        Envelope::new(ChannelKind::Custom, body)
    }

    fn agent_message(id: &str) -> Envelope {
        Envelope::new(
            ChannelKind::Messages,
            json!({"id": id, "type": "ai", "content": "answer"}),
        )
    }

    fn full_turn_envelopes() -> Vec<Envelope> {
        vec![
            custom(json!({
                "step": "generate_queries_complete",
                "queries": ["q1", "q2"],
                "loop_count": 0
            })),
            custom(json!({
                "step": "retrieve_complete",
                "loop_count": 0,
                "new_contexts": 4,
                "total_contexts": 4,
                "sources_count": 3
            })),
            custom(json!({
                "step": "reflect_complete",
                "sufficient": true,
                "confidence": 0.9,
                "loop_count": 1
            })),
            custom(json!({
                "step": "finalize_complete",
                "contexts_count": 4,
                "sources_count": 3
            })),
        ]
    }

    fn titles(events: &[ActivityEvent]) -> Vec<&str> {
        events.iter().map(|e| e.title.as_str()).collect()
    }

    #[test]
    fn happy_path_freezes_timeline_under_answer_id() {
        let mut engine = engine();
        let now = Instant::now();

        engine.begin_turn();
        for envelope in full_turn_envelopes() {
            engine.handle_envelope(&envelope, now);
        }
        assert_eq!(engine.phase(), TurnPhase::Finalizing);
        assert!(engine.turn_state().has_seen_terminal_event);

        engine.handle_envelope(&agent_message("m1"), now);
        // Still loading: no freeze yet.
        assert_eq!(engine.phase(), TurnPhase::Finalizing);
        assert!(engine.history().get("m1").is_none());

        engine.set_loading(false);
        assert_eq!(engine.phase(), TurnPhase::Idle);
        assert!(engine.timeline().is_empty());

        let frozen = engine.history().get("m1").unwrap();
        assert_eq!(
            titles(frozen),
            vec![
                "Generating Search Queries",
                "Knowledge Base Search",
                "Reflection",
                "Generating Answer"
            ]
        );
    }

    #[test]
    fn join_arms_complete_in_any_order() {
        // Loading cleared before the answer message arrives.
        let mut engine = engine();
        let now = Instant::now();
        engine.begin_turn();
        for envelope in full_turn_envelopes() {
            engine.handle_envelope(&envelope, now);
        }
        engine.set_loading(false);
        assert_eq!(engine.phase(), TurnPhase::Finalizing);
        engine.handle_envelope(&agent_message("m2"), now);
        assert_eq!(engine.phase(), TurnPhase::Idle);
        assert_eq!(engine.history().get("m2").unwrap().len(), 4);
    }

    #[test]
    fn envelope_order_across_channels_does_not_matter() {
        let envelopes = full_turn_envelopes();
        let mut indices: Vec<usize> = (0..envelopes.len()).collect();
        let mut permutations = Vec::new();
        permute(&mut indices, 0, &mut permutations);

        for order in permutations {
            let mut engine = engine();
            let now = Instant::now();
            engine.begin_turn();
            for &i in &order {
                engine.handle_envelope(&envelopes[i], now);
            }
            engine.set_loading(false);
            engine.handle_envelope(&agent_message("m1"), now);

            let frozen = engine.history().get("m1").unwrap();
            let mut got = titles(frozen);
            got.sort_unstable();
            let mut want = vec![
                "Generating Answer",
                "Generating Search Queries",
                "Knowledge Base Search",
                "Reflection",
            ];
            want.sort_unstable();
            assert_eq!(got, want, "order {order:?}");
        }
    }

    fn permute(items: &mut Vec<usize>, k: usize, out: &mut Vec<Vec<usize>>) {
        if k == items.len() {
            out.push(items.clone());
            return;
        }
        for i in k..items.len() {
            items.swap(k, i);
            permute(items, k + 1, out);
            items.swap(k, i);
        }
    }

    #[test]
    fn insufficient_reflection_schedules_placeholder() {
        let mut engine = engine();
        let t0 = Instant::now();
        engine.begin_turn();
        engine.handle_envelope(
            &custom(json!({
                "step": "reflect_complete",
                "sufficient": false,
                "confidence": 0.4,
                "reasoning": "coverage gaps",
                "loop_count": 1
            })),
            t0,
        );

        // Before the delay elapses nothing is synthesized.
        engine.tick(t0 + Duration::from_millis(1400));
        assert_eq!(engine.timeline().len(), 1);

        engine.tick(t0 + Duration::from_millis(1500));
        assert_eq!(
            titles(engine.timeline().events()),
            vec!["Reflection", "Continuing Search"]
        );

        // The deadline fired once; later ticks do not repeat it.
        engine.tick(t0 + Duration::from_secs(10));
        assert_eq!(engine.timeline().len(), 2);
    }

    #[test]
    fn real_event_cancels_pending_placeholder() {
        let mut engine = engine();
        let t0 = Instant::now();
        engine.begin_turn();
        engine.handle_envelope(
            &custom(json!({
                "step": "reflect_complete",
                "sufficient": false,
                "confidence": 0.4,
                "loop_count": 1
            })),
            t0,
        );
        engine.handle_envelope(
            &custom(json!({"step": "retrieve_start", "queries": ["more"], "loop_count": 1})),
            t0 + Duration::from_millis(500),
        );

        engine.tick(t0 + Duration::from_secs(5));
        let got = titles(engine.timeline().events());
        assert!(!got.contains(&"Continuing Search"), "{got:?}");
    }

    #[test]
    fn insufficient_then_sufficient_loop_keeps_both_rounds() {
        let mut engine = engine();
        let t0 = Instant::now();
        engine.begin_turn();

        engine.handle_envelope(
            &custom(json!({
                "step": "retrieve_complete", "loop_count": 0,
                "new_contexts": 3, "total_contexts": 3
            })),
            t0,
        );
        engine.handle_envelope(
            &custom(json!({
                "step": "reflect_complete", "sufficient": false,
                "confidence": 0.4, "reasoning": "thin", "loop_count": 1
            })),
            t0,
        );
        engine.tick(t0 + Duration::from_secs(2));
        engine.handle_envelope(
            &custom(json!({
                "step": "retrieve_complete", "loop_count": 1,
                "new_contexts": 2, "total_contexts": 5
            })),
            t0 + Duration::from_secs(3),
        );
        engine.handle_envelope(
            &custom(json!({
                "step": "reflect_complete", "sufficient": true,
                "confidence": 0.85, "loop_count": 2
            })),
            t0 + Duration::from_secs(4),
        );

        assert_eq!(
            titles(engine.timeline().events()),
            vec![
                "Knowledge Base Search",
                "Reflection",
                "Continuing Search",
                "Knowledge Base Search",
                "Reflection"
            ]
        );
        assert_eq!(engine.turn_state().round_count, 2);
    }

    #[test]
    fn terminal_event_cancels_pending_placeholder() {
        let mut engine = engine();
        let t0 = Instant::now();
        engine.begin_turn();
        engine.handle_envelope(
            &custom(json!({
                "step": "reflect_complete", "sufficient": false,
                "confidence": 0.4, "loop_count": 1
            })),
            t0,
        );
        engine.handle_envelope(
            &custom(json!({"step": "finalize_complete", "contexts_count": 3, "sources_count": 2})),
            t0 + Duration::from_millis(100),
        );
        engine.tick(t0 + Duration::from_secs(5));
        let got = titles(engine.timeline().events());
        assert!(!got.contains(&"Continuing Search"), "{got:?}");
    }

    #[test]
    fn cancel_discards_live_timeline_and_drops_later_envelopes() {
        let mut engine = engine();
        let now = Instant::now();
        engine.begin_turn();
        engine.handle_envelope(
            &custom(json!({"step": "generate_queries_complete", "queries": ["q"]})),
            now,
        );
        assert_eq!(engine.timeline().len(), 1);

        engine.cancel_turn();
        assert_eq!(engine.phase(), TurnPhase::Idle);
        assert!(engine.timeline().is_empty());
        assert!(!engine.turn_state().is_loading);

        // Late arrivals from the aborted stream are dropped.
        engine.handle_envelope(
            &custom(json!({"step": "retrieve_complete", "new_contexts": 1, "total_contexts": 1})),
            now,
        );
        engine.handle_envelope(&agent_message("m9"), now);
        engine.set_loading(false);
        assert!(engine.timeline().is_empty());
        assert!(engine.history().is_empty());
    }

    #[test]
    fn duplicate_terminal_and_join_signals_freeze_once() {
        let mut engine = engine();
        let now = Instant::now();
        engine.begin_turn();
        for envelope in full_turn_envelopes() {
            engine.handle_envelope(&envelope, now);
        }
        engine.handle_envelope(&agent_message("m1"), now);
        engine.set_loading(false);
        let frozen_len = engine.history().get("m1").unwrap().len();

        // Replay of the join signals after the turn already closed.
        engine.set_loading(false);
        engine.observe_agent_message("m1");
        assert_eq!(engine.history().len(), 1);
        assert_eq!(engine.history().get("m1").unwrap().len(), frozen_len);
    }

    #[test]
    fn finalize_watchdog_discards_stuck_turn() {
        let mut engine = engine();
        let t0 = Instant::now();
        engine.begin_turn();
        engine.handle_envelope(
            &custom(json!({"step": "finalize_complete", "contexts_count": 1, "sources_count": 1})),
            t0,
        );
        assert_eq!(engine.phase(), TurnPhase::Finalizing);

        engine.tick(t0 + Duration::from_secs(29));
        assert_eq!(engine.phase(), TurnPhase::Finalizing);

        engine.tick(t0 + Duration::from_secs(30));
        assert_eq!(engine.phase(), TurnPhase::Idle);
        assert!(engine.timeline().is_empty());
        assert!(engine.history().is_empty());
    }

    #[test]
    fn debug_wrapper_records_are_all_reconciled() {
        let mut engine = engine();
        let now = Instant::now();
        engine.begin_turn();
        engine.handle_envelope(
            &Envelope::new(
                ChannelKind::Debug,
                json!({
                    "type": "task_result",
                    "payload": {
                        "result": [
                            {"retrieve_contexts": {"new_contexts": 2, "total_contexts": 2, "loop_count": 0}},
                            {"reflect": {"sufficient": true, "confidence": 0.8, "loop_count": 1}}
                        ]
                    }
                }),
            ),
            now,
        );
        assert_eq!(
            titles(engine.timeline().events()),
            vec!["Knowledge Base Search", "Reflection"]
        );
    }

    #[test]
    fn user_messages_do_not_arm_the_freeze_join() {
        let mut engine = engine();
        let now = Instant::now();
        engine.begin_turn();
        engine.handle_envelope(
            &custom(json!({"step": "finalize_complete", "contexts_count": 1, "sources_count": 1})),
            now,
        );
        engine.handle_envelope(
            &Envelope::new(
                ChannelKind::Messages,
                json!({"id": "u1", "type": "human", "content": "hi"}),
            ),
            now,
        );
        engine.set_loading(false);
        assert_eq!(engine.phase(), TurnPhase::Finalizing);
        assert!(engine.history().is_empty());
    }

    #[test]
    fn second_turn_starts_clean_but_keeps_history() {
        let mut engine = engine();
        let now = Instant::now();
        engine.begin_turn();
        for envelope in full_turn_envelopes() {
            engine.handle_envelope(&envelope, now);
        }
        engine.handle_envelope(&agent_message("m1"), now);
        engine.set_loading(false);

        engine.begin_turn();
        assert!(engine.timeline().is_empty());
        assert!(engine.turn_state().is_loading);
        assert_eq!(engine.history().len(), 1);

        engine.clear_history();
        assert!(engine.history().is_empty());
    }
}
