// =============================================================================
// Signal Module
// =============================================================================
//
// The `Signal` record is the engine's single outbound product: a graded,
// validated trade recommendation with entry, stop, target, and sizing.

pub mod generator;
pub mod validator;

pub use generator::SignalGenerator;
pub use validator::validate_signal;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::risk::position_sizing::PositionSize;
use crate::types::{BtcRegime, MarketType, SignalGrade, StructureStrength, TradeDirection};

/// Key price levels attached to a signal for context.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PriceLevels {
    pub recent_high: f64,
    pub recent_low: f64,
    pub nearest_resistance: Option<f64>,
    pub nearest_support: Option<f64>,
    pub fib_382: f64,
    pub fib_500: f64,
    pub fib_618: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: TradeDirection,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub rr_ratio: f64,
    /// Final filter score in [0, 100].
    pub score: f64,
    pub grade: SignalGrade,
    /// Blended confidence in [0, 100].
    pub confidence: f64,
    pub market_type: MarketType,
    pub btc_regime: BtcRegime,
    pub structure_strength: StructureStrength,
    pub levels: PriceLevels,
    /// Number of quality filters that passed.
    pub filters_passed: u32,
    pub key_factors: Vec<String>,
    /// ATR as a percentage of entry at generation time (drives sizing).
    pub atr_pct: f64,
    pub timestamp: DateTime<Utc>,
    /// Populated on approval by the risk manager.
    pub position: Option<PositionSize>,
}
