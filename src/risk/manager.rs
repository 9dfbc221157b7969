// =============================================================================
// Risk Manager — trade approval and lifecycle governance
// =============================================================================
//
// Owns the per-symbol active-trade map; nothing else mutates it. The engine
// control loop drives three entry points:
//
//   can_trade / approve  — gate and size a candidate signal
//   update               — per-tick R-multiple lifecycle (partial exit at
//                          1R, stop to entry at 0.5R, SL/TP boundary hits)
//   close / check_timeouts — settle a trade and feed the loss/lock trackers
//
// The stop only ever advances toward the trade's favour.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::RuntimeConfig;
use crate::signals::Signal;
use crate::types::{MarketType, SignalGrade, TradeDirection};

use super::consecutive_loss::ConsecutiveLossTracker;
use super::daily_lock::DailyLock;
use super::drawdown::DrawdownController;
use super::position_sizing::{PositionSizer, SizedPosition};

/// Maximum holding time per market character, minutes.
const MAX_HOLDING_CHOPPY_MIN: i64 = 60;
const MAX_HOLDING_DEFAULT_MIN: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TradeAction {
    PartialExit,
    BreakEven,
    SlHit,
    TpHit,
    Timeout,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PartialExit => write!(f, "PARTIAL_EXIT"),
            Self::BreakEven => write!(f, "BREAK_EVEN"),
            Self::SlHit => write!(f, "SL_HIT"),
            Self::TpHit => write!(f, "TP_HIT"),
            Self::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

/// One lifecycle transition, emitted at most once per trade.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent {
    pub symbol: String,
    pub action: TradeAction,
    pub price: f64,
    pub r_multiple: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveTrade {
    pub id: String,
    pub symbol: String,
    pub direction: TradeDirection,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub position: SizedPosition,
    pub market_type: MarketType,
    pub grade: SignalGrade,
    pub score: f64,
    pub rr_ratio: f64,
    pub filters_passed: u32,
    pub opened_at: DateTime<Utc>,
    pub max_holding_minutes: i64,
    pub partial_exit_done: bool,
    pub be_triggered: bool,
}

impl ActiveTrade {
    /// Profit in units of initial risk at `price`.
    pub fn r_multiple(&self, price: f64) -> f64 {
        let risk = match self.direction {
            TradeDirection::Long => self.entry - self.initial_stop(),
            TradeDirection::Short => self.initial_stop() - self.entry,
        };
        if risk <= 0.0 {
            return 0.0;
        }
        match self.direction {
            TradeDirection::Long => (price - self.entry) / risk,
            TradeDirection::Short => (self.entry - price) / risk,
        }
    }

    /// The stop distance the trade was sized with; break-even moves the
    /// live stop but not the R denominator.
    fn initial_stop(&self) -> f64 {
        match self.direction {
            TradeDirection::Long => self.entry * (1.0 - self.position.stop_distance_pct / 100.0),
            TradeDirection::Short => self.entry * (1.0 + self.position.stop_distance_pct / 100.0),
        }
    }
}

/// A settled trade, ready for the journal.
#[derive(Debug, Clone, Serialize)]
pub struct ClosedTrade {
    pub trade: ActiveTrade,
    pub exit_price: f64,
    pub closed_at: DateTime<Utc>,
    pub pnl_pct: f64,
    pub pnl_usd: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskStatus {
    pub active_trades: usize,
    pub active_symbols: Vec<String>,
    pub consecutive_losses: u32,
    pub daily_lock: super::daily_lock::DailyLockStatus,
    pub drawdown: super::drawdown::DrawdownStatus,
}

pub struct RiskManager {
    clock: Arc<dyn Clock>,
    sizer: PositionSizer,
    daily_lock: DailyLock,
    drawdown: DrawdownController,
    loss_tracker: ConsecutiveLossTracker,
    active: HashMap<String, ActiveTrade>,
    max_concurrent: usize,
    break_even_at_r: f64,
    partial_exit_at_r: f64,
}

impl RiskManager {
    pub fn new(config: &RuntimeConfig, clock: Arc<dyn Clock>) -> Self {
        let sizer = PositionSizer::new(
            config.risk_per_trade,
            config.max_position_pct,
            config.min_position,
            config.max_atr_pct,
            config.max_leverage,
        );
        let daily_lock = DailyLock::new(
            clock.clone(),
            config.daily_profit_target,
            config.max_daily_drawdown_pct,
            config.max_signals_per_day.default,
        );
        let loss_tracker = ConsecutiveLossTracker::new(
            clock.clone(),
            config.max_consecutive_losses,
            config.cooldown_minutes,
        );

        Self {
            clock,
            sizer,
            daily_lock,
            drawdown: DrawdownController::new(config.max_daily_drawdown_pct),
            loss_tracker,
            active: HashMap::new(),
            max_concurrent: config.max_concurrent,
            break_even_at_r: config.break_even_at_r,
            partial_exit_at_r: config.partial_exit_at_r,
        }
    }

    // -------------------------------------------------------------------------
    // Gate
    // -------------------------------------------------------------------------

    /// Whether a new trade on `symbol` is currently allowed.
    pub fn can_trade(&mut self, symbol: &str) -> (bool, String) {
        if self.loss_tracker.should_stop() {
            return (
                false,
                format!("Max consecutive losses: {}", self.loss_tracker.consecutive()),
            );
        }

        if self.daily_lock.is_locked() {
            let reason = self.daily_lock.lock_reason().unwrap_or("locked").to_string();
            return (false, format!("Daily lock active: {reason}"));
        }

        if self.drawdown.is_max_reached() {
            return (
                false,
                format!("Max drawdown reached: {:.2}%", self.drawdown.current_drawdown()),
            );
        }

        if self.active.len() >= self.max_concurrent {
            return (false, format!("Max concurrent trades: {}", self.max_concurrent));
        }

        if self.active.contains_key(symbol) {
            return (false, format!("Active trade exists for {symbol}"));
        }

        (true, "OK".to_string())
    }

    // -------------------------------------------------------------------------
    // Approval
    // -------------------------------------------------------------------------

    /// Gate, size, and register a trade for an approved signal. Returns the
    /// stored trade, or `None` with the refusal logged.
    pub fn approve(
        &mut self,
        signal: &Signal,
        account_size: f64,
        fear_index: i64,
    ) -> Option<ActiveTrade> {
        let (allowed, reason) = self.can_trade(&signal.symbol);
        if !allowed {
            debug!(symbol = %signal.symbol, %reason, "trade rejected");
            return None;
        }

        let position = self.sizer.calculate(
            account_size,
            signal.entry,
            signal.stop_loss,
            signal.atr_pct,
            fear_index,
            signal.market_type,
        );
        let mut sized = match position {
            super::position_sizing::PositionSize::Sized(sized) => sized,
            super::position_sizing::PositionSize::Blocked { reason, .. } => {
                debug!(symbol = %signal.symbol, %reason, "position sizing blocked");
                return None;
            }
        };

        // De-risk into drawdown.
        let multiplier = self.drawdown.size_multiplier();
        if multiplier < 1.0 {
            sized.position_usd *= multiplier;
            sized.contracts *= multiplier;
        }

        let max_holding_minutes = if signal.market_type == MarketType::Choppy {
            MAX_HOLDING_CHOPPY_MIN
        } else {
            MAX_HOLDING_DEFAULT_MIN
        };

        let trade = ActiveTrade {
            id: Uuid::new_v4().to_string(),
            symbol: signal.symbol.clone(),
            direction: signal.direction,
            entry: signal.entry,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            position: sized,
            market_type: signal.market_type,
            grade: signal.grade,
            score: signal.score,
            rr_ratio: signal.rr_ratio,
            filters_passed: signal.filters_passed,
            opened_at: self.clock.now_utc(),
            max_holding_minutes,
            partial_exit_done: false,
            be_triggered: false,
        };

        info!(
            symbol = %trade.symbol,
            direction = %trade.direction,
            entry = trade.entry,
            position_usd = trade.position.position_usd,
            risk_usd = trade.position.risk_usd,
            "trade approved"
        );
        self.active.insert(trade.symbol.clone(), trade.clone());
        Some(trade)
    }

    // -------------------------------------------------------------------------
    // Per-tick lifecycle
    // -------------------------------------------------------------------------

    /// Evaluate one price tick against the trade on `symbol`. Returns every
    /// transition that fired, in order.
    pub fn update(&mut self, symbol: &str, current_price: f64) -> Vec<LifecycleEvent> {
        let trade = match self.active.get_mut(symbol) {
            Some(trade) => trade,
            None => return Vec::new(),
        };

        let r = trade.r_multiple(current_price);
        let mut events = Vec::new();

        if r >= self.partial_exit_at_r && !trade.partial_exit_done {
            trade.partial_exit_done = true;
            events.push(LifecycleEvent {
                symbol: symbol.to_string(),
                action: TradeAction::PartialExit,
                price: current_price,
                r_multiple: r,
            });
        }

        if r >= self.break_even_at_r && !trade.be_triggered {
            trade.be_triggered = true;
            // The stop only advances toward the trade's favour.
            trade.stop_loss = match trade.direction {
                TradeDirection::Long => trade.stop_loss.max(trade.entry),
                TradeDirection::Short => trade.stop_loss.min(trade.entry),
            };
            events.push(LifecycleEvent {
                symbol: symbol.to_string(),
                action: TradeAction::BreakEven,
                price: current_price,
                r_multiple: r,
            });
        }

        let stop_hit = match trade.direction {
            TradeDirection::Long => current_price <= trade.stop_loss,
            TradeDirection::Short => current_price >= trade.stop_loss,
        };
        let target_hit = match trade.direction {
            TradeDirection::Long => current_price >= trade.take_profit,
            TradeDirection::Short => current_price <= trade.take_profit,
        };

        if stop_hit {
            events.push(LifecycleEvent {
                symbol: symbol.to_string(),
                action: TradeAction::SlHit,
                price: current_price,
                r_multiple: r,
            });
        } else if target_hit {
            events.push(LifecycleEvent {
                symbol: symbol.to_string(),
                action: TradeAction::TpHit,
                price: current_price,
                r_multiple: r,
            });
        }

        events
    }

    // -------------------------------------------------------------------------
    // Settlement
    // -------------------------------------------------------------------------

    /// Close the trade on `symbol` at `exit_price`, updating every tracker.
    pub fn close(&mut self, symbol: &str, exit_price: f64, reason: &str) -> Option<ClosedTrade> {
        let trade = self.active.remove(symbol)?;

        let pnl_pct = match trade.direction {
            TradeDirection::Long => (exit_price - trade.entry) / trade.entry * 100.0,
            TradeDirection::Short => (trade.entry - exit_price) / trade.entry * 100.0,
        };
        let pnl_usd = trade.position.position_usd * pnl_pct / 100.0;

        self.drawdown.update(pnl_pct);
        self.loss_tracker.update(pnl_pct);
        self.daily_lock.update(pnl_pct);

        if pnl_pct >= 0.0 {
            info!(symbol, pnl_pct, reason, "trade closed");
        } else {
            warn!(symbol, pnl_pct, reason, "trade closed at a loss");
        }

        Some(ClosedTrade {
            trade,
            exit_price,
            closed_at: self.clock.now_utc(),
            pnl_pct,
            pnl_usd,
            reason: reason.to_string(),
        })
    }

    /// Fold an externally settled trade's result into the trackers without
    /// touching the active map (the trade was never held here).
    pub fn record_external_result(&mut self, pnl_pct: f64) {
        self.drawdown.update(pnl_pct);
        self.loss_tracker.update(pnl_pct);
        self.daily_lock.update(pnl_pct);
    }

    /// Symbols whose holding time has expired.
    pub fn check_timeouts(&self) -> Vec<String> {
        let now = self.clock.now_utc();
        self.active
            .values()
            .filter(|trade| {
                let held = now.signed_duration_since(trade.opened_at).num_minutes();
                held > trade.max_holding_minutes
            })
            .map(|trade| trade.symbol.clone())
            .collect()
    }

    // -------------------------------------------------------------------------
    // Accessors / maintenance
    // -------------------------------------------------------------------------

    pub fn has_active(&self, symbol: &str) -> bool {
        self.active.contains_key(symbol)
    }

    pub fn active_symbols(&self) -> Vec<String> {
        self.active.keys().cloned().collect()
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.loss_tracker.consecutive()
    }

    pub fn daily_pnl(&self) -> f64 {
        self.daily_lock.daily_pnl()
    }

    pub fn set_daily_trade_cap(&mut self, cap: u32) {
        self.daily_lock.set_max_trades(cap);
    }

    /// Midnight housekeeping: clear daily counters and rebase the daily
    /// drawdown on the current equity.
    pub fn reset_daily(&mut self) {
        let balance = self.drawdown.status().current_balance;
        self.daily_lock.reset();
        self.loss_tracker.reset();
        self.drawdown.reset_daily(balance);
        info!("risk manager daily reset");
    }

    pub fn status(&mut self) -> RiskStatus {
        RiskStatus {
            active_trades: self.active.len(),
            active_symbols: self.active_symbols(),
            consecutive_losses: self.loss_tracker.consecutive(),
            daily_lock: self.daily_lock.status(),
            drawdown: self.drawdown.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_clock::ManualClock;
    use crate::signals::PriceLevels;
    use crate::types::BtcRegime;

    fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::at_rfc3339("2024-03-01T08:30:00Z"))
    }

    fn manager_with_clock(clock: Arc<ManualClock>) -> RiskManager {
        RiskManager::new(&RuntimeConfig::default(), clock)
    }

    fn long_signal(symbol: &str, clock: &ManualClock) -> Signal {
        Signal {
            symbol: symbol.to_string(),
            direction: TradeDirection::Long,
            entry: 100.0,
            stop_loss: 98.0,
            take_profit: 106.0,
            rr_ratio: 3.0,
            score: 78.0,
            grade: SignalGrade::BPlus,
            confidence: 80.0,
            market_type: MarketType::Trending,
            btc_regime: BtcRegime::Bull,
            structure_strength: crate::types::StructureStrength::Moderate,
            levels: PriceLevels::default(),
            filters_passed: 7,
            key_factors: Vec::new(),
            atr_pct: 1.3,
            timestamp: clock.now_utc(),
            position: None,
        }
    }

    #[test]
    fn approve_registers_active_trade() {
        let clock = manual_clock();
        let mut manager = manager_with_clock(clock.clone());

        let trade = manager
            .approve(&long_signal("ETH/USDT", &clock), 100_000.0, 50)
            .expect("approval expected");

        assert!(manager.has_active("ETH/USDT"));
        assert_eq!(trade.max_holding_minutes, 90);
        assert!(trade.position.position_usd > 0.0);
    }

    #[test]
    fn second_trade_on_same_symbol_refused() {
        let clock = manual_clock();
        let mut manager = manager_with_clock(clock.clone());
        manager.approve(&long_signal("ETH/USDT", &clock), 100_000.0, 50);

        let (allowed, reason) = manager.can_trade("ETH/USDT");
        assert!(!allowed);
        // max_concurrent defaults to 1, so the pool is full before the
        // per-symbol check fires.
        assert!(reason.contains("Max concurrent"));
    }

    #[test]
    fn partial_exit_then_break_even_then_stop_at_entry() {
        let clock = manual_clock();
        let mut manager = manager_with_clock(clock.clone());
        manager
            .approve(&long_signal("ETH/USDT", &clock), 100_000.0, 50)
            .expect("approved");

        // Price reaches 1R: partial exit and break-even fire on one tick.
        let events = manager.update("ETH/USDT", 102.0);
        let actions: Vec<TradeAction> = events.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![TradeAction::PartialExit, TradeAction::BreakEven]);
        assert!((events[0].r_multiple - 1.0).abs() < 1e-9);

        // Stop now sits at entry.
        let dip = manager.update("ETH/USDT", 100.0);
        assert_eq!(dip.len(), 1);
        assert_eq!(dip[0].action, TradeAction::SlHit);

        let closed = manager.close("ETH/USDT", 100.0, "SL_HIT").expect("closed");
        assert!(closed.pnl_pct.abs() < 1e-9, "break-even exit is flat");
    }

    #[test]
    fn transitions_fire_once() {
        let clock = manual_clock();
        let mut manager = manager_with_clock(clock.clone());
        manager.approve(&long_signal("ETH/USDT", &clock), 100_000.0, 50);

        assert_eq!(manager.update("ETH/USDT", 102.0).len(), 2);
        // Same favourable price again: nothing new fires.
        assert!(manager.update("ETH/USDT", 102.5).is_empty());
    }

    #[test]
    fn break_even_alone_at_half_r() {
        let clock = manual_clock();
        let mut manager = manager_with_clock(clock.clone());
        manager.approve(&long_signal("ETH/USDT", &clock), 100_000.0, 50);

        let events = manager.update("ETH/USDT", 101.0); // R = 0.5
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, TradeAction::BreakEven);
    }

    #[test]
    fn stop_never_retreats() {
        let clock = manual_clock();
        let mut manager = manager_with_clock(clock.clone());
        manager.approve(&long_signal("ETH/USDT", &clock), 100_000.0, 50);

        manager.update("ETH/USDT", 102.0); // BE moves stop to 100
        let stop_after_be = manager.active.get("ETH/USDT").unwrap().stop_loss;
        assert_eq!(stop_after_be, 100.0);

        // Nothing later moves it back toward 98.
        manager.update("ETH/USDT", 101.0);
        assert_eq!(manager.active.get("ETH/USDT").unwrap().stop_loss, 100.0);
    }

    #[test]
    fn take_profit_hit_detected() {
        let clock = manual_clock();
        let mut manager = manager_with_clock(clock.clone());
        manager.approve(&long_signal("ETH/USDT", &clock), 100_000.0, 50);

        let events = manager.update("ETH/USDT", 106.5);
        assert!(events.iter().any(|e| e.action == TradeAction::TpHit));
    }

    #[test]
    fn consecutive_losses_lock_out_third_trade() {
        let clock = manual_clock();
        let mut manager = manager_with_clock(clock.clone());

        for (i, symbol) in ["ETH/USDT", "SOL/USDT"].iter().enumerate() {
            manager
                .approve(&long_signal(symbol, &clock), 100_000.0, 50)
                .unwrap_or_else(|| panic!("trade {i} approved"));
            let closed = manager.close(symbol, 98.9, "SL_HIT").expect("closed");
            assert!((closed.pnl_pct - -1.1).abs() < 1e-9);
        }

        assert_eq!(manager.consecutive_losses(), 2);
        let (allowed, reason) = manager.can_trade("DOGE/USDT");
        assert!(!allowed);
        assert_eq!(reason, "Max consecutive losses: 2");

        // The cooldown expires, but -2.2% on the day keeps the daily lock
        // engaged until rollover.
        clock.advance_minutes(16);
        let (allowed, reason) = manager.can_trade("DOGE/USDT");
        assert!(!allowed);
        assert!(reason.contains("Daily lock"));
    }

    #[test]
    fn cooldown_expiry_releases_gate_when_day_is_healthy() {
        let clock = manual_clock();
        let mut manager = manager_with_clock(clock.clone());

        // Two small losses: streak trips, daily lock stays clear.
        for symbol in ["ETH/USDT", "SOL/USDT"] {
            manager
                .approve(&long_signal(symbol, &clock), 100_000.0, 50)
                .expect("approved");
            manager.close(symbol, 99.2, "SL_HIT").expect("closed");
        }

        let (allowed, reason) = manager.can_trade("DOGE/USDT");
        assert!(!allowed);
        assert_eq!(reason, "Max consecutive losses: 2");

        clock.advance_minutes(16);
        let (allowed, _) = manager.can_trade("DOGE/USDT");
        assert!(allowed);
    }

    #[test]
    fn close_updates_daily_pnl_sum() {
        let clock = manual_clock();
        let mut manager = manager_with_clock(clock.clone());

        manager.approve(&long_signal("ETH/USDT", &clock), 100_000.0, 50);
        manager.close("ETH/USDT", 103.0, "TP_HIT");
        assert!((manager.daily_pnl() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn timeouts_flag_overheld_trades() {
        let clock = manual_clock();
        let mut manager = manager_with_clock(clock.clone());
        manager.approve(&long_signal("ETH/USDT", &clock), 100_000.0, 50);

        assert!(manager.check_timeouts().is_empty());
        clock.advance_minutes(91);
        assert_eq!(manager.check_timeouts(), vec!["ETH/USDT".to_string()]);
    }

    #[test]
    fn choppy_trades_time_out_sooner() {
        let clock = manual_clock();
        let mut manager = manager_with_clock(clock.clone());
        let mut signal = long_signal("ETH/USDT", &clock);
        signal.market_type = MarketType::Choppy;

        let trade = manager.approve(&signal, 100_000.0, 50).expect("approved");
        assert_eq!(trade.max_holding_minutes, 60);
    }

    #[test]
    fn short_lifecycle_mirrors_long() {
        let clock = manual_clock();
        let mut manager = manager_with_clock(clock.clone());
        let mut signal = long_signal("ETH/USDT", &clock);
        signal.direction = TradeDirection::Short;
        signal.stop_loss = 102.0;
        signal.take_profit = 94.0;
        manager.approve(&signal, 100_000.0, 50).expect("approved");

        // 1R for the short is 98.0.
        let events = manager.update("ETH/USDT", 98.0);
        let actions: Vec<TradeAction> = events.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![TradeAction::PartialExit, TradeAction::BreakEven]);

        // Bounce back to entry hits the moved stop.
        let events = manager.update("ETH/USDT", 100.0);
        assert_eq!(events[0].action, TradeAction::SlHit);
    }
}
