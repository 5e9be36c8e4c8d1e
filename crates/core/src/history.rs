use std::collections::HashMap;

use crate::activity::ActivityEvent;

/// Durable per-answer activity history.
///
/// Maps a completed agent message id to the frozen timeline that produced
/// it. Write-once per key: the first freeze wins and later freezes for the
/// same id are ignored, which makes terminal-event handling idempotent
/// under duplicate delivery. Entries live until the conversation view is
/// switched or reloaded.
#[derive(Debug, Clone, Default)]
pub struct ActivityHistoryStore {
    entries: HashMap<String, Vec<ActivityEvent>>,
}

impl ActivityHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freeze a timeline snapshot under `answer_id`. Returns whether the
    /// entry was written; a repeat freeze for an existing id is a no-op.
    pub fn freeze(&mut self, answer_id: impl Into<String>, events: Vec<ActivityEvent>) -> bool {
        let answer_id = answer_id.into();
        if self.entries.contains_key(&answer_id) {
            return false;
        }
        self.entries.insert(answer_id, events);
        true
    }

    pub fn get(&self, answer_id: &str) -> Option<&[ActivityEvent]> {
        self.entries.get(answer_id).map(Vec::as_slice)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(title: &str) -> ActivityEvent {
        ActivityEvent::new(title, "summary")
    }

    #[test]
    fn freeze_is_idempotent_first_write_wins() {
        let mut store = ActivityHistoryStore::new();
        assert!(store.freeze("m1", vec![ev("A"), ev("B")]));
        assert!(!store.freeze("m1", vec![ev("C")]));

        let frozen = store.get("m1").unwrap();
        assert_eq!(frozen.len(), 2);
        assert_eq!(frozen[0].title, "A");
    }

    #[test]
    fn get_unknown_id_is_none() {
        let store = ActivityHistoryStore::new();
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn clear_drops_all_entries() {
        let mut store = ActivityHistoryStore::new();
        store.freeze("m1", vec![ev("A")]);
        store.freeze("m2", vec![ev("B")]);
        assert_eq!(store.len(), 2);
        store.clear();
        assert!(store.is_empty());
        assert!(store.get("m1").is_none());
    }
}
