//! Client-side research-turn engine: envelope reconciliation, follow-tail
//! scroll policy, and turn submission.
//!
//! Everything here is synchronous and clock-injected except the submission
//! seams, which are async because the transport is. The CLI (or any other
//! frontend) owns the event loop and feeds envelopes, scroll samples, and
//! ticks in.

pub mod reconcile;
pub mod scroll;
pub mod submit;

pub use reconcile::{EngineConfig, ReconciliationEngine, TurnPhase, TurnState};
pub use scroll::{ScrollCommand, ScrollConfig, ScrollCoordinator, ScrollIntent, ScrollMetrics};
pub use submit::{
    ConversationStore, SubmissionController, SubmitOutcome, TurnDefaults, TurnTransport,
};
