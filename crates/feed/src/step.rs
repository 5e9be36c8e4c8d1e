use serde::{Deserialize, Serialize};

/// The fixed set of agent progress steps recognized across all channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKey {
    QueryGeneration,
    Retrieval,
    Reflection,
    Finalization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Start,
    Complete,
}

impl StepKey {
    /// Parse a custom-channel step string, e.g. `retrieve_complete`.
    pub fn from_custom_step(step: &str) -> Option<(StepKey, StepPhase)> {
        let (key, phase) = match step {
            "generate_queries_start" => (Self::QueryGeneration, StepPhase::Start),
            "generate_queries_complete" => (Self::QueryGeneration, StepPhase::Complete),
            "retrieve_start" => (Self::Retrieval, StepPhase::Start),
            "retrieve_complete" => (Self::Retrieval, StepPhase::Complete),
            "reflect_start" => (Self::Reflection, StepPhase::Start),
            "reflect_complete" => (Self::Reflection, StepPhase::Complete),
            "finalize_start" => (Self::Finalization, StepPhase::Start),
            "finalize_complete" => (Self::Finalization, StepPhase::Complete),
            _ => return None,
        };
        Some((key, phase))
    }

    /// Parse a coarse `step_status` phase name from snapshot/update bodies.
    pub fn from_status(status: &str) -> Option<StepKey> {
        match status {
            "query_generation" => Some(Self::QueryGeneration),
            "retrieval" => Some(Self::Retrieval),
            "reflection" => Some(Self::Reflection),
            "finalized" => Some(Self::Finalization),
            _ => None,
        }
    }

    /// State key carrying this step's completed payload in update/snapshot
    /// bodies.
    pub fn payload_key(&self) -> &'static str {
        match self {
            Self::QueryGeneration => "generate_queries",
            Self::Retrieval => "retrieve_contexts",
            Self::Reflection => "reflect",
            Self::Finalization => "finalize_report",
        }
    }

    /// Older web-research payload key for the same step, still delivered by
    /// some deployments.
    pub fn legacy_payload_key(&self) -> &'static str {
        match self {
            Self::QueryGeneration => "generate_query",
            Self::Retrieval => "web_research",
            Self::Reflection => "reflection",
            Self::Finalization => "finalize_answer",
        }
    }

    /// Canonical name used in config (the start-suppression table).
    pub fn config_name(&self) -> &'static str {
        match self {
            Self::QueryGeneration => "query_generation",
            Self::Retrieval => "retrieval",
            Self::Reflection => "reflection",
            Self::Finalization => "finalization",
        }
    }

    pub fn from_config_name(name: &str) -> Option<StepKey> {
        match name {
            "query_generation" => Some(Self::QueryGeneration),
            "retrieval" => Some(Self::Retrieval),
            "reflection" => Some(Self::Reflection),
            "finalization" => Some(Self::Finalization),
            _ => None,
        }
    }
}

// Closed title taxonomy for timeline entries. The engine relies on
// TITLE_FINALIZE_COMPLETE to detect the terminal step; everything else is
// presentation vocabulary.

pub const TITLE_QUERIES_COMPLETE: &str = "Generating Search Queries";
pub const TITLE_RETRIEVE_COMPLETE: &str = "Knowledge Base Search";
pub const TITLE_REFLECT_COMPLETE: &str = "Reflection";
pub const TITLE_FINALIZE_COMPLETE: &str = "Generating Answer";

pub const TITLE_QUERIES_START: &str = "Planning Searches";
pub const TITLE_RETRIEVE_START: &str = "Searching Knowledge Base";
pub const TITLE_REFLECT_START: &str = "Evaluating Research Quality";
pub const TITLE_FINALIZE_START: &str = "Generating Final Report";

pub const TITLE_STATUS_THINKING: &str = "Thinking";
pub const TITLE_STATUS_SEARCHING: &str = "Searching";
pub const TITLE_STATUS_EVALUATING: &str = "Evaluating";

pub const TITLE_WEB_RESEARCH: &str = "Web Research";
pub const TITLE_CONTINUING_SEARCH: &str = "Continuing Search";
