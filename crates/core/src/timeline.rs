use crate::activity::ActivityEvent;

/// The live, in-progress activity timeline for the current turn.
///
/// Append-only and order-preserving, with adjacent-duplicate suppression
/// enforced at insert time: no two consecutive stored events are the same
/// observation (`ActivityEvent::same_observation`). Non-adjacent repeats
/// are retained — this is not a set.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    events: Vec<ActivityEvent>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event unless it repeats the last stored observation.
    /// Returns whether the event was actually inserted.
    pub fn append(&mut self, event: ActivityEvent) -> bool {
        if let Some(last) = self.events.last() {
            if last.same_observation(&event) {
                return false;
            }
        }
        self.events.push(event);
        true
    }

    /// Defensive copy of the current events, for freezing into history.
    pub fn snapshot(&self) -> Vec<ActivityEvent> {
        self.events.clone()
    }

    pub fn events(&self) -> &[ActivityEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(title: &str) -> ActivityEvent {
        ActivityEvent::new(title, format!("{title} summary"))
    }

    #[test]
    fn adjacent_duplicates_are_suppressed() {
        let mut timeline = Timeline::new();
        for title in ["A", "A", "B", "B", "B", "A"] {
            timeline.append(ev(title));
        }
        let titles: Vec<&str> = timeline.events().iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "A"]);
    }

    #[test]
    fn append_reports_suppression() {
        let mut timeline = Timeline::new();
        assert!(timeline.append(ev("A")));
        assert!(!timeline.append(ev("A")));
        assert!(timeline.append(ev("B")));
    }

    #[test]
    fn duplicate_check_uses_title_and_summary_only() {
        let mut timeline = Timeline::new();
        timeline.append(ev("A").with_round(1));
        // Same title+summary with a different round still counts as a repeat.
        assert!(!timeline.append(ev("A").with_round(2)));
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn snapshot_is_independent_of_later_appends() {
        let mut timeline = Timeline::new();
        timeline.append(ev("A"));
        let frozen = timeline.snapshot();
        timeline.append(ev("B"));
        timeline.clear();
        assert_eq!(frozen.len(), 1);
        assert_eq!(frozen[0].title, "A");
    }
}
