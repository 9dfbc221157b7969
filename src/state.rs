// =============================================================================
// Shared Engine State — status snapshot for the HTTP surface
// =============================================================================
//
// The engine task writes; the API handlers read. An atomic version counter
// marks every meaningful mutation so pollers can detect change cheaply.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::metrics::MetricsCollector;
use crate::types::{BtcRegime, EngineHealth, MarketType, TradeMode};

/// Recent errors retained for the status payload.
const MAX_RECENT_ERRORS: usize = 50;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    pub at: String,
}

/// Condensed regime view for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct RegimeSummary {
    pub market_type: MarketType,
    pub btc_regime: BtcRegime,
    pub confidence: f64,
    pub trade_mode: TradeMode,
    pub can_trade: bool,
}

impl Default for RegimeSummary {
    fn default() -> Self {
        Self {
            market_type: MarketType::Unknown,
            btc_regime: BtcRegime::Unknown,
            confidence: 0.0,
            trade_mode: TradeMode::Block,
            can_trade: false,
        }
    }
}

pub struct EngineState {
    version: AtomicU64,
    health: RwLock<EngineHealth>,
    regime: RwLock<RegimeSummary>,
    btc_data_ready: RwLock<bool>,
    daily_signals: AtomicU64,
    active_symbols: RwLock<Vec<String>>,
    recent_errors: RwLock<Vec<ErrorRecord>>,
    pub metrics: Arc<MetricsCollector>,
    started_at: std::time::Instant,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub health: EngineHealth,
    pub btc_data_ready: bool,
    pub regime: RegimeSummary,
    pub daily_signals: u64,
    pub active_symbols: Vec<String>,
    pub uptime_secs: u64,
    pub state_version: u64,
    pub recent_errors: Vec<ErrorRecord>,
}

impl EngineState {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self {
            version: AtomicU64::new(1),
            health: RwLock::new(EngineHealth::Starting),
            regime: RwLock::new(RegimeSummary::default()),
            btc_data_ready: RwLock::new(false),
            daily_signals: AtomicU64::new(0),
            active_symbols: RwLock::new(Vec::new()),
            recent_errors: RwLock::new(Vec::new()),
            metrics,
            started_at: std::time::Instant::now(),
        }
    }

    pub fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_health(&self, health: EngineHealth) {
        *self.health.write() = health;
        self.bump_version();
    }

    pub fn health(&self) -> EngineHealth {
        *self.health.read()
    }

    pub fn set_btc_data_ready(&self, ready: bool) {
        *self.btc_data_ready.write() = ready;
        self.bump_version();
    }

    pub fn set_regime(&self, summary: RegimeSummary) {
        *self.regime.write() = summary;
        self.bump_version();
    }

    pub fn set_daily_signals(&self, count: u64) {
        self.daily_signals.store(count, Ordering::Relaxed);
        self.bump_version();
    }

    pub fn set_active_symbols(&self, symbols: Vec<String>) {
        *self.active_symbols.write() = symbols;
        self.bump_version();
    }

    pub fn push_error(&self, message: String) {
        let mut errors = self.recent_errors.write();
        errors.push(ErrorRecord {
            message,
            at: Utc::now().to_rfc3339(),
        });
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        drop(errors);
        self.metrics.record_error();
        self.bump_version();
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            health: self.health(),
            btc_data_ready: *self.btc_data_ready.read(),
            regime: self.regime.read().clone(),
            daily_signals: self.daily_signals.load(Ordering::Relaxed),
            active_symbols: self.active_symbols.read().clone(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            state_version: self.version.load(Ordering::SeqCst),
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}
