//! Follow-tail scroll policy for the activity view.
//!
//! Tracks whether the user has scrolled away from the bottom and decides
//! when content growth should auto-follow versus show a jump-to-bottom
//! affordance. The scrolled-up flag sets immediately on any scroll sample
//! past the threshold, but clears only after the gesture settles, so
//! momentum scrolling near the bottom cannot flap auto-follow back on.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub viewport_height: f64,
}

impl ScrollMetrics {
    pub fn distance_from_bottom(&self) -> f64 {
        (self.scroll_height - self.scroll_top - self.viewport_height).max(0.0)
    }
}

/// Derived scroll state, recomputed on every scroll and growth tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollIntent {
    pub user_has_scrolled_up: bool,
    pub show_jump_affordance: bool,
}

/// Instruction for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollCommand {
    /// Content grew while following the tail; snap to the bottom.
    JumpToBottom,
    /// Explicit user request; animate down.
    AnimateToBottom,
}

#[derive(Debug, Clone)]
pub struct ScrollConfig {
    /// Distance from the bottom past which the user counts as scrolled up.
    pub threshold_px: f64,
    /// Settle window after the last scroll sample before re-evaluating.
    pub debounce: Duration,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            threshold_px: 100.0,
            debounce: Duration::from_millis(150),
        }
    }
}

#[derive(Debug)]
pub struct ScrollCoordinator {
    config: ScrollConfig,
    user_has_scrolled_up: bool,
    show_jump_affordance: bool,
    /// Latest sample and its settle deadline, overwritten by every scroll.
    pending_settle: Option<(Instant, ScrollMetrics)>,
}

impl ScrollCoordinator {
    pub fn new(config: ScrollConfig) -> Self {
        Self {
            config,
            user_has_scrolled_up: false,
            show_jump_affordance: false,
            pending_settle: None,
        }
    }

    pub fn user_has_scrolled_up(&self) -> bool {
        self.user_has_scrolled_up
    }

    pub fn show_jump_affordance(&self) -> bool {
        self.show_jump_affordance
    }

    pub fn intent(&self) -> ScrollIntent {
        ScrollIntent {
            user_has_scrolled_up: self.user_has_scrolled_up,
            show_jump_affordance: self.show_jump_affordance,
        }
    }

    /// One scroll sample. Setting the scrolled-up flag is immediate; the
    /// sample is also queued for the debounced settle check.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics, now: Instant) {
        if metrics.distance_from_bottom() >= self.config.threshold_px {
            self.user_has_scrolled_up = true;
        }
        self.pending_settle = Some((now + self.config.debounce, metrics));
    }

    /// Fire the settle check if its window elapsed. Only a settled position
    /// back within the threshold clears the scrolled-up flag.
    pub fn tick(&mut self, now: Instant) {
        let Some((due, metrics)) = self.pending_settle else {
            return;
        };
        if now < due {
            return;
        }
        self.pending_settle = None;
        if metrics.distance_from_bottom() < self.config.threshold_px {
            self.user_has_scrolled_up = false;
            self.show_jump_affordance = false;
        }
    }

    /// Content grew (new event, streamed tokens). Returns the follow
    /// command when the user is still at the tail; otherwise arms the
    /// jump affordance while a turn is loading.
    pub fn on_content_grew(&mut self, is_loading: bool) -> Option<ScrollCommand> {
        if self.user_has_scrolled_up {
            self.show_jump_affordance = is_loading;
            None
        } else {
            self.show_jump_affordance = false;
            Some(ScrollCommand::JumpToBottom)
        }
    }

    /// The user hit the jump affordance: resume following the tail.
    pub fn scroll_to_bottom_now(&mut self) -> ScrollCommand {
        self.user_has_scrolled_up = false;
        self.show_jump_affordance = false;
        self.pending_settle = None;
        ScrollCommand::AnimateToBottom
    }

    /// Forget all gesture state, e.g. on conversation switch.
    pub fn reset(&mut self) {
        self.user_has_scrolled_up = false;
        self.show_jump_affordance = false;
        self.pending_settle = None;
    }
}

impl Default for ScrollCoordinator {
    fn default() -> Self {
        Self::new(ScrollConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(distance_from_bottom: f64) -> ScrollMetrics {
        ScrollMetrics {
            scroll_top: 1000.0 - distance_from_bottom,
            scroll_height: 1600.0,
            viewport_height: 600.0,
        }
    }

    #[test]
    fn distance_from_bottom_clamps_to_zero() {
        let m = ScrollMetrics {
            scroll_top: 1100.0,
            scroll_height: 1600.0,
            viewport_height: 600.0,
        };
        assert_eq!(m.distance_from_bottom(), 0.0);
    }

    #[test]
    fn scrolling_past_threshold_sets_flag_immediately() {
        let mut scroll = ScrollCoordinator::default();
        let t0 = Instant::now();
        scroll.on_scroll(metrics(150.0), t0);
        assert!(scroll.user_has_scrolled_up());
    }

    #[test]
    fn returning_to_bottom_clears_only_after_settle() {
        let mut scroll = ScrollCoordinator::default();
        let t0 = Instant::now();
        scroll.on_scroll(metrics(150.0), t0);
        scroll.on_scroll(metrics(20.0), t0 + Duration::from_millis(50));

        // Mid-gesture: the settle window has not elapsed.
        scroll.tick(t0 + Duration::from_millis(100));
        assert!(scroll.user_has_scrolled_up());

        scroll.tick(t0 + Duration::from_millis(200));
        assert!(!scroll.user_has_scrolled_up());
    }

    #[test]
    fn settle_uses_the_latest_sample() {
        let mut scroll = ScrollCoordinator::default();
        let t0 = Instant::now();
        scroll.on_scroll(metrics(150.0), t0);
        scroll.on_scroll(metrics(20.0), t0 + Duration::from_millis(40));
        // Scrolled back up before settling; the earlier near-bottom sample
        // must not clear the flag.
        scroll.on_scroll(metrics(300.0), t0 + Duration::from_millis(80));

        scroll.tick(t0 + Duration::from_secs(1));
        assert!(scroll.user_has_scrolled_up());
    }

    #[test]
    fn settled_position_past_threshold_keeps_flag() {
        let mut scroll = ScrollCoordinator::default();
        let t0 = Instant::now();
        scroll.on_scroll(metrics(150.0), t0);
        scroll.tick(t0 + Duration::from_secs(1));
        assert!(scroll.user_has_scrolled_up());
    }

    #[test]
    fn content_growth_follows_tail_when_not_scrolled_up() {
        let mut scroll = ScrollCoordinator::default();
        assert_eq!(scroll.on_content_grew(true), Some(ScrollCommand::JumpToBottom));
        assert!(!scroll.show_jump_affordance());
    }

    #[test]
    fn content_growth_while_scrolled_up_arms_affordance_only_when_loading() {
        let mut scroll = ScrollCoordinator::default();
        scroll.on_scroll(metrics(200.0), Instant::now());

        assert_eq!(scroll.on_content_grew(true), None);
        assert!(scroll.show_jump_affordance());

        // Turn over: growth no longer advertises the affordance.
        assert_eq!(scroll.on_content_grew(false), None);
        assert!(!scroll.show_jump_affordance());
    }

    #[test]
    fn scroll_to_bottom_now_resumes_following() {
        let mut scroll = ScrollCoordinator::default();
        scroll.on_scroll(metrics(200.0), Instant::now());
        scroll.on_content_grew(true);

        assert_eq!(scroll.scroll_to_bottom_now(), ScrollCommand::AnimateToBottom);
        assert!(!scroll.user_has_scrolled_up());
        assert!(!scroll.show_jump_affordance());
        assert_eq!(scroll.on_content_grew(true), Some(ScrollCommand::JumpToBottom));
    }

    #[test]
    fn reset_forgets_gesture_state() {
        let mut scroll = ScrollCoordinator::default();
        let t0 = Instant::now();
        scroll.on_scroll(metrics(200.0), t0);
        scroll.on_content_grew(true);
        scroll.reset();
        assert!(!scroll.user_has_scrolled_up());
        assert!(!scroll.show_jump_affordance());
        // A stale settle deadline must not fire after reset.
        scroll.tick(t0 + Duration::from_secs(1));
        assert!(!scroll.user_has_scrolled_up());
    }
}
