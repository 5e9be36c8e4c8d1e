//! Envelope → `ActivityEvent` normalization.
//!
//! Converts one loosely-typed envelope from any channel into at most one
//! timeline event. Pure: all state lives with the caller, and signals that
//! need engine-side follow-up (placeholder scheduling, terminal detection)
//! are reported through [`SideSignals`].

use std::collections::HashSet;

use deepquery_core::ActivityEvent;
use serde_json::{Map, Value};

use crate::step::{
    StepKey, StepPhase, TITLE_CONTINUING_SEARCH, TITLE_FINALIZE_COMPLETE, TITLE_FINALIZE_START,
    TITLE_QUERIES_COMPLETE, TITLE_QUERIES_START, TITLE_REFLECT_COMPLETE, TITLE_REFLECT_START,
    TITLE_RETRIEVE_COMPLETE, TITLE_RETRIEVE_START, TITLE_STATUS_EVALUATING,
    TITLE_STATUS_SEARCHING, TITLE_STATUS_THINKING, TITLE_WEB_RESEARCH,
};
use crate::ChannelKind;

/// Tuning knobs for normalization, sourced from client config.
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Steps whose start-flavored placeholder events are dropped. The
    /// query-generation start is suppressed by default: showing "planning"
    /// before a query exists reads as noise.
    pub suppressed_starts: HashSet<StepKey>,
    /// Character bound on the reasoning excerpt shown for an insufficient
    /// reflection.
    pub reasoning_excerpt_chars: usize,
    pub fast_model: String,
    pub reasoning_model: String,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            suppressed_starts: HashSet::from([StepKey::QueryGeneration]),
            reasoning_excerpt_chars: 80,
            fast_model: "gpt-4o-mini".to_string(),
            reasoning_model: "gpt-4o".to_string(),
        }
    }
}

/// Side outputs of a normalization call, separate from the returned event.
#[derive(Debug, Clone, Copy, Default)]
pub struct SideSignals {
    /// An insufficient reflection was observed; the engine should schedule
    /// a cancellable "Continuing Search" placeholder.
    pub schedule_continuing_search: bool,
    /// A finalization-complete (terminal step) was observed.
    pub saw_terminal_complete: bool,
}

/// Normalize one envelope body into at most one activity event.
///
/// Unrecognized or structurally corrupt bodies yield `None`; missing fields
/// degrade to zero counts and empty text. Never panics.
pub fn normalize(
    channel: ChannelKind,
    body: &Value,
    config: &NormalizerConfig,
    signals: &mut SideSignals,
) -> Option<ActivityEvent> {
    let obj = body.as_object()?;
    match channel {
        ChannelKind::Custom => normalize_custom(obj, config, signals),
        ChannelKind::Update | ChannelKind::Snapshot => normalize_state(obj, config, signals),
        ChannelKind::Debug => {
            // Inner task results are update-shaped; a wrapper usually holds
            // one. The engine iterates `task_result_records` itself when it
            // needs every record.
            let records = task_result_records(body)?;
            records
                .iter()
                .find_map(|record| normalize(ChannelKind::Update, record, config, signals))
        }
        // Message deltas never become activity events; the engine consumes
        // them separately for the freeze join.
        ChannelKind::Messages => None,
    }
}

/// Unwrap a debug-channel `task_result` wrapper into its inner records.
pub fn task_result_records(body: &Value) -> Option<&Vec<Value>> {
    let obj = body.as_object()?;
    if obj.get("type").and_then(Value::as_str) != Some("task_result") {
        return None;
    }
    obj.get("payload")?.get("result")?.as_array()
}

/// The synthetic event appended while the agent loops back after an
/// insufficient reflection.
pub fn continuing_search_event() -> ActivityEvent {
    ActivityEvent::new(TITLE_CONTINUING_SEARCH, "Gathering more information")
}

// ── Custom channel (discrete step events) ───────────────────────────────────

fn normalize_custom(
    obj: &Map<String, Value>,
    config: &NormalizerConfig,
    signals: &mut SideSignals,
) -> Option<ActivityEvent> {
    let step = obj.get("step").and_then(Value::as_str)?;
    let (key, phase) = StepKey::from_custom_step(step)?;
    let loop_count = u32_field(obj, "loop_count").unwrap_or(0);

    match phase {
        StepPhase::Complete => Some(complete_event(key, obj, loop_count, config, signals)),
        StepPhase::Start => {
            if config.suppressed_starts.contains(&key) {
                return None;
            }
            let message = obj.get("message").and_then(Value::as_str);
            Some(start_event(key, obj, loop_count, message))
        }
    }
}

// ── Update / snapshot channels (state objects) ──────────────────────────────

fn normalize_state(
    obj: &Map<String, Value>,
    config: &NormalizerConfig,
    signals: &mut SideSignals,
) -> Option<ActivityEvent> {
    let loop_count = find_u32(obj, "research_loop_count")
        .or_else(|| find_u32(obj, "loop_count"))
        .unwrap_or(0);

    // Rule 1: a completed step payload always beats a coarse status signal
    // present in the same envelope. Snapshots are cumulative, so scan from
    // the newest pipeline stage backwards and report the furthest stage.
    for key in [
        StepKey::Finalization,
        StepKey::Reflection,
        StepKey::Retrieval,
        StepKey::QueryGeneration,
    ] {
        if let Some(payload) = find_object(obj, key.payload_key()) {
            let payload_loop = u32_field(payload, "loop_count").unwrap_or(loop_count);
            return Some(complete_event(key, payload, payload_loop, config, signals));
        }
        if let Some(payload) = find_object(obj, key.legacy_payload_key()) {
            return Some(legacy_complete_event(key, payload, signals));
        }
    }

    // Rule 2: a start-flavored status with no completed payload yet.
    let status = find_str(obj, "step_status")?;
    let key = StepKey::from_status(status)?;
    if config.suppressed_starts.contains(&key) {
        return None;
    }

    if has_cumulative_fields(obj) {
        Some(start_event(key, obj, loop_count, None))
    } else {
        // Status-only signal: a phase name with no payload at all.
        coarse_status_event(key)
    }
}

fn has_cumulative_fields(obj: &Map<String, Value>) -> bool {
    ["research_queries", "all_contexts", "sources", "research_loop_count"]
        .iter()
        .any(|field| find_key(obj, field).is_some())
}

// ── Event builders ──────────────────────────────────────────────────────────

fn complete_event(
    key: StepKey,
    payload: &Map<String, Value>,
    loop_count: u32,
    config: &NormalizerConfig,
    signals: &mut SideSignals,
) -> ActivityEvent {
    match key {
        StepKey::QueryGeneration => {
            let queries = string_list(payload.get("queries"));
            let summary = if queries.is_empty() {
                "Queries ready".to_string()
            } else {
                queries.join(" \u{2022} ")
            };
            ActivityEvent::new(TITLE_QUERIES_COMPLETE, summary)
                .with_round(loop_count + 1)
                .with_model_tag(&config.fast_model)
        }
        StepKey::Retrieval => {
            let new_contexts = u32_field(payload, "new_contexts").unwrap_or(0);
            let total = u32_field(payload, "total_contexts")
                .or_else(|| u32_field(payload, "num_contexts"))
                .unwrap_or(0);
            let event = ActivityEvent::new(
                TITLE_RETRIEVE_COMPLETE,
                format!("Found {new_contexts} new contexts ({total} total gathered)"),
            )
            .with_round(loop_count + 1);
            match u32_field(payload, "sources_count") {
                Some(sources) => event.with_source_count(sources),
                None => event,
            }
        }
        StepKey::Reflection => {
            let sufficient = payload
                .get("sufficient")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let confidence = payload
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            let reasoning = payload
                .get("reasoning")
                .and_then(Value::as_str)
                .unwrap_or("");
            let pct = confidence_percent(confidence);
            let summary = if sufficient {
                format!("Confidence: {pct}% - ready to generate answer")
            } else {
                signals.schedule_continuing_search = true;
                format!(
                    "Confidence: {pct}% - need more research: {}",
                    truncate_chars(reasoning, config.reasoning_excerpt_chars)
                )
            };
            // The feed pre-increments the reflect round before emitting.
            ActivityEvent::new(TITLE_REFLECT_COMPLETE, summary)
                .with_round(loop_count)
                .with_model_tag(&config.reasoning_model)
        }
        StepKey::Finalization => {
            signals.saw_terminal_complete = true;
            let contexts = u32_field(payload, "num_contexts")
                .or_else(|| u32_field(payload, "contexts_count"))
                .unwrap_or(0);
            let sources = u32_field(payload, "num_sources")
                .or_else(|| u32_field(payload, "sources_count"))
                .unwrap_or(0);
            ActivityEvent::new(
                TITLE_FINALIZE_COMPLETE,
                format!("Synthesizing {contexts} contexts from {sources} sources"),
            )
            .with_source_count(sources)
            .with_model_tag(&config.reasoning_model)
        }
    }
}

/// Older web-research payload shapes, mapped into the same title taxonomy.
fn legacy_complete_event(
    key: StepKey,
    payload: &Map<String, Value>,
    signals: &mut SideSignals,
) -> ActivityEvent {
    match key {
        StepKey::QueryGeneration => {
            let queries = string_list(payload.get("search_query"));
            ActivityEvent::new(TITLE_QUERIES_COMPLETE, queries.join(", "))
        }
        StepKey::Retrieval => {
            let sources = payload
                .get("sources_gathered")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let labels: Vec<&str> = sources
                .iter()
                .filter_map(|s| s.get("label").and_then(Value::as_str))
                .take(3)
                .collect();
            let related = if labels.is_empty() {
                "N/A".to_string()
            } else {
                labels.join(", ")
            };
            ActivityEvent::new(
                TITLE_WEB_RESEARCH,
                format!("Gathered {} sources. Related to: {related}", sources.len()),
            )
            .with_source_count(sources.len() as u32)
        }
        StepKey::Reflection => {
            ActivityEvent::new(TITLE_REFLECT_COMPLETE, "Analysing web research results")
        }
        StepKey::Finalization => {
            signals.saw_terminal_complete = true;
            ActivityEvent::new(
                TITLE_FINALIZE_COMPLETE,
                "Composing and presenting the final answer",
            )
        }
    }
}

fn start_event(
    key: StepKey,
    fields: &Map<String, Value>,
    loop_count: u32,
    message: Option<&str>,
) -> ActivityEvent {
    match key {
        StepKey::QueryGeneration => {
            let previous = string_list(find_key(fields, "research_queries"));
            let summary = message.map(str::to_string).unwrap_or_else(|| {
                if previous.is_empty() {
                    "Analyzing the question and planning search strategy".to_string()
                } else {
                    format!("Previous: {}", join_last(&previous, 3))
                }
            });
            ActivityEvent::new(TITLE_QUERIES_START, summary).with_round(loop_count + 1)
        }
        StepKey::Retrieval => {
            let queries = string_list(
                fields
                    .get("queries")
                    .or_else(|| find_key(fields, "research_queries")),
            );
            let summary = message.map(str::to_string).unwrap_or_else(|| {
                if queries.is_empty() {
                    "Querying knowledge base".to_string()
                } else {
                    format!("Querying: {}", join_last(&queries, 3))
                }
            });
            ActivityEvent::new(TITLE_RETRIEVE_START, summary).with_round(loop_count + 1)
        }
        StepKey::Reflection => {
            let contexts = u32_field(fields, "contexts_count")
                .or_else(|| find_len(fields, "all_contexts"))
                .unwrap_or(0);
            let summary = message
                .map(str::to_string)
                .unwrap_or_else(|| format!("Analyzing {contexts} contexts gathered so far"));
            ActivityEvent::new(TITLE_REFLECT_START, summary).with_round(loop_count)
        }
        StepKey::Finalization => {
            let contexts = u32_field(fields, "contexts_count")
                .or_else(|| find_len(fields, "all_contexts"))
                .unwrap_or(0);
            let sources = u32_field(fields, "sources_count")
                .or_else(|| find_len(fields, "sources"))
                .unwrap_or(0);
            let summary = message.map(str::to_string).unwrap_or_else(|| {
                format!("Synthesizing insights from {contexts} contexts across {sources} sources")
            });
            ActivityEvent::new(TITLE_FINALIZE_START, summary)
        }
    }
}

fn coarse_status_event(key: StepKey) -> Option<ActivityEvent> {
    match key {
        StepKey::QueryGeneration => Some(ActivityEvent::new(
            TITLE_STATUS_THINKING,
            "Analyzing the question and planning search strategy",
        )),
        StepKey::Retrieval => Some(ActivityEvent::new(
            TITLE_STATUS_SEARCHING,
            "Querying knowledge base",
        )),
        StepKey::Reflection => Some(ActivityEvent::new(
            TITLE_STATUS_EVALUATING,
            "Assessing research completeness and quality",
        )),
        // Redundant with the finalize-complete payload that follows.
        StepKey::Finalization => None,
    }
}

// ── Field helpers ───────────────────────────────────────────────────────────

/// Confidence rendered as a whole percentage, round-half-up.
pub fn confidence_percent(confidence: f64) -> u32 {
    (confidence.clamp(0.0, 1.0) * 100.0).round() as u32
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}...")
}

fn join_last(items: &[String], n: usize) -> String {
    let start = items.len().saturating_sub(n);
    items[start..].join(" \u{2022} ")
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Look a key up at the top level, or nested one level under a named
/// sub-process key (update bodies wrap node output that way).
fn find_key<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    if let Some(value) = obj.get(key) {
        return Some(value);
    }
    obj.values()
        .filter_map(Value::as_object)
        .find_map(|nested| nested.get(key))
}

fn find_object<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    find_key(obj, key).and_then(Value::as_object)
}

fn find_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    find_key(obj, key).and_then(Value::as_str)
}

fn find_u32(obj: &Map<String, Value>, key: &str) -> Option<u32> {
    find_key(obj, key)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}

fn find_len(obj: &Map<String, Value>, key: &str) -> Option<u32> {
    find_key(obj, key)
        .and_then(Value::as_array)
        .map(|items| items.len() as u32)
}

fn u32_field(obj: &Map<String, Value>, key: &str) -> Option<u32> {
    obj.get(key)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}
