// =============================================================================
// Daily Lock — halts signal work when daily limits are reached
// =============================================================================
//
// Locks when any of:
//   * daily P&L reaches the profit target (bank the day)
//   * daily P&L reaches the loss limit
//   * daily trade count reaches the cap
//
// All counters reset when the IST date rolls over; the rollover check runs
// lazily on every access so a quiet night still resets the books.
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::clock::Clock;

#[derive(Debug, Clone, Serialize)]
pub struct DailyLockStatus {
    pub date: String,
    pub daily_pnl: f64,
    pub daily_trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f64,
    pub is_locked: bool,
    pub lock_reason: Option<String>,
    pub lock_time: Option<DateTime<Utc>>,
}

pub struct DailyLock {
    clock: Arc<dyn Clock>,
    profit_target: f64,
    max_loss: f64,
    max_trades: u32,

    current_date: String,
    daily_pnl: f64,
    daily_trades: u32,
    wins: u32,
    losses: u32,
    is_locked: bool,
    lock_reason: Option<String>,
    lock_time: Option<DateTime<Utc>>,
}

impl DailyLock {
    /// `max_daily_drawdown_pct` is negative by configuration contract; the
    /// lock compares against its magnitude.
    pub fn new(
        clock: Arc<dyn Clock>,
        profit_target: f64,
        max_daily_drawdown_pct: f64,
        max_trades: u32,
    ) -> Self {
        let current_date = clock.today_ist();
        Self {
            clock,
            profit_target,
            max_loss: max_daily_drawdown_pct.abs(),
            max_trades,
            current_date,
            daily_pnl: 0.0,
            daily_trades: 0,
            wins: 0,
            losses: 0,
            is_locked: false,
            lock_reason: None,
            lock_time: None,
        }
    }

    /// Record a closed trade's P&L percentage.
    pub fn update(&mut self, pnl_pct: f64) {
        self.check_date();

        self.daily_pnl += pnl_pct;
        self.daily_trades += 1;
        if pnl_pct > 0.0 {
            self.wins += 1;
        } else {
            self.losses += 1;
        }

        self.check_lock_conditions();
    }

    pub fn is_locked(&mut self) -> bool {
        self.check_date();
        self.is_locked
    }

    pub fn lock_reason(&self) -> Option<&str> {
        self.lock_reason.as_deref()
    }

    pub fn daily_pnl(&self) -> f64 {
        self.daily_pnl
    }

    /// Adjust the trade cap (daily limits shrink after repeated losses).
    pub fn set_max_trades(&mut self, max_trades: u32) {
        self.max_trades = max_trades;
    }

    pub fn reset(&mut self) {
        self.daily_pnl = 0.0;
        self.daily_trades = 0;
        self.wins = 0;
        self.losses = 0;
        self.is_locked = false;
        self.lock_reason = None;
        self.lock_time = None;
        self.current_date = self.clock.today_ist();
        info!(date = %self.current_date, "daily lock reset");
    }

    pub fn status(&mut self) -> DailyLockStatus {
        self.check_date();
        DailyLockStatus {
            date: self.current_date.clone(),
            daily_pnl: self.daily_pnl,
            daily_trades: self.daily_trades,
            wins: self.wins,
            losses: self.losses,
            win_rate: if self.daily_trades > 0 {
                self.wins as f64 / self.daily_trades as f64 * 100.0
            } else {
                0.0
            },
            is_locked: self.is_locked,
            lock_reason: self.lock_reason.clone(),
            lock_time: self.lock_time,
        }
    }

    fn check_date(&mut self) {
        let today = self.clock.today_ist();
        if today != self.current_date {
            info!(from = %self.current_date, to = %today, "date rolled, resetting daily lock");
            self.reset();
        }
    }

    fn check_lock_conditions(&mut self) {
        if self.is_locked {
            return;
        }

        if self.daily_pnl >= self.profit_target {
            self.lock(format!("Profit target reached: {:+.2}%", self.daily_pnl));
        } else if self.daily_pnl <= -self.max_loss {
            self.lock(format!("Max loss reached: {:+.2}%", self.daily_pnl));
        } else if self.daily_trades >= self.max_trades {
            self.lock(format!("Max trades reached: {}", self.daily_trades));
        }
    }

    fn lock(&mut self, reason: String) {
        self.is_locked = true;
        self.lock_time = Some(self.clock.now_utc());
        warn!(reason = %reason, "daily lock activated");
        self.lock_reason = Some(reason);
    }
}
