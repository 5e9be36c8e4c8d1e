pub mod normalize;
pub mod step;

pub use normalize::{normalize, task_result_records, NormalizerConfig, SideSignals};
pub use step::{StepKey, StepPhase};

use serde::{Deserialize, Serialize};

/// One logical stream of envelopes from the agent transport.
///
/// Channels are concurrent with respect to each other; only delivery order
/// within a single channel is guaranteed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Full cumulative state object per tick.
    Snapshot,
    /// Partial state delta, possibly nested under a sub-process key.
    Update,
    /// Discrete step events emitted by the research graph.
    Custom,
    /// Debug wrappers (`task_result`) whose inner records are update-shaped.
    Debug,
    /// Raw message stream; carries the answer message and its stable id.
    Messages,
}

impl ChannelKind {
    /// Map an upstream stream-mode name onto a channel.
    pub fn from_stream_mode(mode: &str) -> Option<Self> {
        match mode {
            "values" => Some(Self::Snapshot),
            "updates" => Some(Self::Update),
            "custom" => Some(Self::Custom),
            "debug" => Some(Self::Debug),
            "messages" | "messages-tuple" => Some(Self::Messages),
            _ => None,
        }
    }

    /// Stream-mode name used in the outbound turn request.
    pub fn stream_mode(&self) -> &'static str {
        match self {
            Self::Snapshot => "values",
            Self::Update => "updates",
            Self::Custom => "custom",
            Self::Debug => "debug",
            Self::Messages => "messages",
        }
    }

    pub fn all() -> [ChannelKind; 5] {
        [
            Self::Snapshot,
            Self::Update,
            Self::Custom,
            Self::Debug,
            Self::Messages,
        ]
    }
}

/// One raw envelope delivered on a channel. The body is loosely typed by
/// nature of the upstream agent; the normalizer does all shape checking.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub channel: ChannelKind,
    pub body: serde_json::Value,
}

impl Envelope {
    pub fn new(channel: ChannelKind, body: serde_json::Value) -> Self {
        Self { channel, body }
    }
}
