// =============================================================================
// Drawdown Controller — peak-equity tracking with severity levels
// =============================================================================
//
//   current_drawdown = (peak - balance) / peak * 100
//
// Severity (relative to the configured maximum):
//   CRITICAL >= max | HIGH >= 0.7*max | MODERATE >= 0.4*max | LOW > 0 | NONE
//
// Each level carries a position-size multiplier so sizing can de-risk as
// drawdown deepens.
// =============================================================================

use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DrawdownLevel {
    Critical,
    High,
    Moderate,
    Low,
    None,
}

impl DrawdownLevel {
    pub fn size_multiplier(self) -> f64 {
        match self {
            Self::Critical => 0.0,
            Self::High => 0.3,
            Self::Moderate => 0.6,
            Self::Low => 0.8,
            Self::None => 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DrawdownStatus {
    pub current_drawdown: f64,
    pub daily_drawdown: f64,
    pub max_reached: bool,
    pub peak: f64,
    pub current_balance: f64,
    pub level: DrawdownLevel,
}

pub struct DrawdownController {
    max_drawdown_pct: f64,
    peak: f64,
    current_balance: f64,
    current_drawdown: f64,
    max_reached: bool,
    daily_start_balance: f64,
    daily_drawdown: f64,
}

impl DrawdownController {
    /// `max_daily_drawdown_pct` is negative by configuration contract.
    pub fn new(max_daily_drawdown_pct: f64) -> Self {
        Self {
            max_drawdown_pct: max_daily_drawdown_pct.abs(),
            peak: 0.0,
            current_balance: 0.0,
            current_drawdown: 0.0,
            max_reached: false,
            daily_start_balance: 0.0,
            daily_drawdown: 0.0,
        }
    }

    /// Fold one closed trade's P&L percentage into the equity curve.
    pub fn update(&mut self, pnl_pct: f64) {
        self.current_balance += pnl_pct;

        if self.current_balance > self.peak {
            self.peak = self.current_balance;
        }

        self.current_drawdown = if self.peak > 0.0 {
            (self.peak - self.current_balance) / self.peak * 100.0
        } else {
            0.0
        };

        if self.current_drawdown >= self.max_drawdown_pct {
            if !self.max_reached {
                warn!(
                    drawdown = self.current_drawdown,
                    limit = self.max_drawdown_pct,
                    "maximum drawdown reached"
                );
            }
            self.max_reached = true;
        }

        if self.daily_start_balance > 0.0 {
            self.daily_drawdown =
                (self.daily_start_balance - self.current_balance) / self.daily_start_balance * 100.0;
        }
    }

    pub fn is_max_reached(&self) -> bool {
        self.max_reached
    }

    pub fn current_drawdown(&self) -> f64 {
        self.current_drawdown
    }

    pub fn level(&self) -> DrawdownLevel {
        if self.current_drawdown >= self.max_drawdown_pct {
            DrawdownLevel::Critical
        } else if self.current_drawdown >= self.max_drawdown_pct * 0.7 {
            DrawdownLevel::High
        } else if self.current_drawdown >= self.max_drawdown_pct * 0.4 {
            DrawdownLevel::Moderate
        } else if self.current_drawdown > 0.0 {
            DrawdownLevel::Low
        } else {
            DrawdownLevel::None
        }
    }

    pub fn size_multiplier(&self) -> f64 {
        self.level().size_multiplier()
    }

    /// Start a new trading day from `starting_balance`.
    pub fn reset_daily(&mut self, starting_balance: f64) {
        self.daily_start_balance = starting_balance;
        self.daily_drawdown = 0.0;
    }

    pub fn reset_all(&mut self) {
        self.peak = 0.0;
        self.current_balance = 0.0;
        self.current_drawdown = 0.0;
        self.max_reached = false;
        self.daily_start_balance = 0.0;
        self.daily_drawdown = 0.0;
    }

    pub fn status(&self) -> DrawdownStatus {
        DrawdownStatus {
            current_drawdown: self.current_drawdown,
            daily_drawdown: self.daily_drawdown,
            max_reached: self.max_reached,
            peak: self.peak,
            current_balance: self.current_balance,
            level: self.level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_drawdown_at_fresh_peak() {
        let mut controller = DrawdownController::new(-2.0);
        controller.update(1.0);
        controller.update(0.5);
        assert_eq!(controller.current_drawdown(), 0.0);
        assert_eq!(controller.level(), DrawdownLevel::None);
        assert_eq!(controller.size_multiplier(), 1.0);
    }

    #[test]
    fn drawdown_measured_from_peak() {
        let mut controller = DrawdownController::new(-2.0);
        controller.update(10.0); // peak 10
        controller.update(-0.1);
        // (10 - 9.9) / 10 = 1%
        assert!((controller.current_drawdown() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn levels_scale_with_limit() {
        let mut controller = DrawdownController::new(-2.0);
        controller.update(100.0); // peak 100

        controller.update(-1.0); // 1% of peak => HIGH band (>= 1.4? no: 1.0 < 1.4)
        assert_eq!(controller.level(), DrawdownLevel::Moderate); // >= 0.8

        controller.update(-0.5); // 1.5%
        assert_eq!(controller.level(), DrawdownLevel::High); // >= 1.4

        controller.update(-0.5); // 2.0%
        assert_eq!(controller.level(), DrawdownLevel::Critical);
        assert!(controller.is_max_reached());
        assert_eq!(controller.size_multiplier(), 0.0);
    }

    #[test]
    fn max_reached_is_sticky() {
        let mut controller = DrawdownController::new(-2.0);
        controller.update(100.0);
        controller.update(-2.0);
        assert!(controller.is_max_reached());

        // Recovery does not clear the latch until a reset.
        controller.update(5.0);
        assert!(controller.is_max_reached());

        controller.reset_all();
        assert!(!controller.is_max_reached());
    }

    #[test]
    fn daily_drawdown_from_daily_start() {
        let mut controller = DrawdownController::new(-2.0);
        controller.update(10.0);
        controller.reset_daily(10.0);
        controller.update(-1.0);
        let status = controller.status();
        assert!((status.daily_drawdown - 10.0).abs() < 1e-9); // (10-9)/10*100
    }
}
