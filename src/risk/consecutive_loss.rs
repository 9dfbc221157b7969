// =============================================================================
// Consecutive Loss Tracker — streak counting with a cooldown window
// =============================================================================
//
// A win clears the streak. Reaching the configured maximum opens a cooldown
// window during which trading is refused; the window expires by wall clock,
// but the streak itself only clears on a win or a reset.
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::clock::Clock;

#[derive(Debug, Clone, Serialize)]
pub struct LossStreakStatus {
    pub consecutive_losses: u32,
    pub max_allowed: u32,
    pub in_cooldown: bool,
    pub cooldown_remaining_minutes: f64,
    pub size_multiplier: f64,
}

pub struct ConsecutiveLossTracker {
    clock: Arc<dyn Clock>,
    max_consecutive: u32,
    cooldown_minutes: i64,

    consecutive: u32,
    cooldown_until: Option<DateTime<Utc>>,
}

impl ConsecutiveLossTracker {
    pub fn new(clock: Arc<dyn Clock>, max_consecutive: u32, cooldown_minutes: i64) -> Self {
        Self {
            clock,
            max_consecutive,
            cooldown_minutes,
            consecutive: 0,
            cooldown_until: None,
        }
    }

    /// Record a closed trade's P&L percentage.
    pub fn update(&mut self, pnl_pct: f64) {
        if pnl_pct < 0.0 {
            self.consecutive += 1;
            warn!(streak = self.consecutive, "consecutive loss recorded");

            if self.consecutive >= self.max_consecutive {
                let until = self.clock.now_utc() + Duration::minutes(self.cooldown_minutes);
                warn!(until = %until, "loss cooldown activated");
                self.cooldown_until = Some(until);
            }
        } else {
            if self.consecutive > 0 {
                info!(streak = self.consecutive, "loss streak ended");
            }
            self.consecutive = 0;
            self.cooldown_until = None;
        }
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// Whether trading should be refused right now (active cooldown window).
    pub fn should_stop(&self) -> bool {
        self.cooldown_until
            .is_some_and(|until| self.clock.now_utc() < until)
    }

    /// Size discount while a streak is building.
    pub fn size_multiplier(&self) -> f64 {
        match self.consecutive {
            0 => 1.0,
            1 => 0.7,
            _ => 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
        self.cooldown_until = None;
        info!("consecutive loss tracker reset");
    }

    pub fn status(&self) -> LossStreakStatus {
        let remaining = self
            .cooldown_until
            .map(|until| {
                let left = until.signed_duration_since(self.clock.now_utc());
                (left.num_seconds() as f64 / 60.0).max(0.0)
            })
            .unwrap_or(0.0);

        LossStreakStatus {
            consecutive_losses: self.consecutive,
            max_allowed: self.max_consecutive,
            in_cooldown: remaining > 0.0,
            cooldown_remaining_minutes: remaining,
            size_multiplier: self.size_multiplier(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_clock::ManualClock;

    fn tracker_with_clock() -> (ConsecutiveLossTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_rfc3339("2024-03-01T08:30:00Z"));
        let tracker = ConsecutiveLossTracker::new(clock.clone(), 2, 15);
        (tracker, clock)
    }

    #[test]
    fn win_clears_streak() {
        let (mut tracker, _) = tracker_with_clock();
        tracker.update(-0.8);
        assert_eq!(tracker.consecutive(), 1);
        tracker.update(0.5);
        assert_eq!(tracker.consecutive(), 0);
        assert!(!tracker.should_stop());
    }

    #[test]
    fn two_losses_open_cooldown() {
        let (mut tracker, _) = tracker_with_clock();
        tracker.update(-1.1);
        assert!(!tracker.should_stop());
        tracker.update(-1.1);
        assert!(tracker.should_stop());
        assert_eq!(tracker.size_multiplier(), 0.0);

        let status = tracker.status();
        assert!(status.in_cooldown);
        assert!(status.cooldown_remaining_minutes > 14.0);
    }

    #[test]
    fn cooldown_expires_by_clock() {
        let (mut tracker, clock) = tracker_with_clock();
        tracker.update(-1.1);
        tracker.update(-1.1);
        assert!(tracker.should_stop());

        clock.advance_minutes(16);
        assert!(!tracker.should_stop());
        // Streak still standing until a win or reset.
        assert_eq!(tracker.consecutive(), 2);
    }

    #[test]
    fn single_loss_discounts_size() {
        let (mut tracker, _) = tracker_with_clock();
        tracker.update(-0.4);
        assert_eq!(tracker.size_multiplier(), 0.7);
    }

    #[test]
    fn reset_clears_everything() {
        let (mut tracker, _) = tracker_with_clock();
        tracker.update(-1.0);
        tracker.update(-1.0);
        tracker.reset();
        assert_eq!(tracker.consecutive(), 0);
        assert!(!tracker.should_stop());
    }
}
