use serde::{Deserialize, Serialize};

/// One observable step of agent progress, as shown in the activity timeline.
///
/// Immutable once constructed. `title` comes from a closed taxonomy owned by
/// the feed normalizer; `summary` is a bounded human-readable line derived
/// from the step payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub title: String,
    pub summary: String,
    /// Research round (one generate→retrieve→reflect iteration), 1-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_count: Option<u32>,
    /// Model that produced this step, when the feed names one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_tag: Option<String>,
}

impl ActivityEvent {
    pub fn new(title: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            round: None,
            source_count: None,
            model_tag: None,
        }
    }

    pub fn with_round(mut self, round: u32) -> Self {
        self.round = Some(round);
        self
    }

    pub fn with_source_count(mut self, count: u32) -> Self {
        self.source_count = Some(count);
        self
    }

    pub fn with_model_tag(mut self, tag: impl Into<String>) -> Self {
        self.model_tag = Some(tag.into());
        self
    }

    /// Dedup equality: two events are the same observation when title and
    /// summary match. A changed round or model tag alone does not make a
    /// new observation.
    pub fn same_observation(&self, other: &ActivityEvent) -> bool {
        self.title == other.title && self.summary == other.summary
    }
}
