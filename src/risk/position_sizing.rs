// =============================================================================
// Position Sizing — risk-based size with volatility / sentiment / regime
// adjustments
// =============================================================================
//
//   risk_usd     = account * risk_per_trade%
//   position_usd = risk_usd / (stop_distance_pct / 100)
//
// applied multipliers, in order:
//   ATR%:   > 2.5 -> 0.5 | < 0.5 -> 0.7 | > max -> blocked
//   fear:   < 20 -> 0.5 | < 40 -> 0.8 | > 75 -> 0.3 | > 60 -> 0.7
//   market: trending 1.0 | choppy 0.8 | high_vol 0.5 | unknown 0.9
//
// then capped at max_position_pct of the account and floored at
// min_position. The calculation is a pure function of its inputs.
// =============================================================================

use serde::Serialize;

use crate::types::MarketType;

/// Narrowest acceptable stop, percent of entry.
const MIN_STOP_PCT: f64 = 0.1;
/// Widest acceptable stop, percent of entry.
const MAX_STOP_PCT: f64 = 5.0;

/// A computed position, or the reason it was refused.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PositionSize {
    Sized(SizedPosition),
    Blocked { blocked: bool, reason: String },
}

impl PositionSize {
    fn blocked(reason: impl Into<String>) -> Self {
        Self::Blocked {
            blocked: true,
            reason: reason.into(),
        }
    }

    pub fn as_sized(&self) -> Option<&SizedPosition> {
        match self {
            Self::Sized(sized) => Some(sized),
            Self::Blocked { .. } => None,
        }
    }

    pub fn block_reason(&self) -> Option<&str> {
        match self {
            Self::Sized(_) => None,
            Self::Blocked { reason, .. } => Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizedPosition {
    pub position_usd: f64,
    pub contracts: f64,
    pub risk_usd: f64,
    pub risk_pct: f64,
    pub stop_distance_pct: f64,
    pub leverage: f64,
}

pub struct PositionSizer {
    risk_per_trade: f64,
    max_position_pct: f64,
    min_position: f64,
    max_atr_pct: f64,
    max_leverage: f64,
}

impl PositionSizer {
    pub fn new(
        risk_per_trade: f64,
        max_position_pct: f64,
        min_position: f64,
        max_atr_pct: f64,
        max_leverage: u32,
    ) -> Self {
        Self {
            risk_per_trade,
            max_position_pct,
            min_position,
            max_atr_pct,
            max_leverage: max_leverage as f64,
        }
    }

    /// Compute the position for a trade plan. Pure: identical inputs always
    /// produce identical output.
    pub fn calculate(
        &self,
        account_size: f64,
        entry: f64,
        stop_loss: f64,
        atr_pct: f64,
        fear_index: i64,
        market_type: MarketType,
    ) -> PositionSize {
        if account_size <= 0.0 {
            return PositionSize::blocked("Invalid account size");
        }
        if entry <= 0.0 || stop_loss <= 0.0 {
            return PositionSize::blocked("Invalid price levels");
        }
        if entry == stop_loss {
            return PositionSize::blocked("Entry equals stop loss");
        }

        let stop_distance_pct = (entry - stop_loss).abs() / entry * 100.0;
        if stop_distance_pct < MIN_STOP_PCT {
            return PositionSize::blocked(format!("Stop too tight: {stop_distance_pct:.2}%"));
        }
        if stop_distance_pct > MAX_STOP_PCT {
            return PositionSize::blocked(format!("Stop too wide: {stop_distance_pct:.2}%"));
        }

        if atr_pct > self.max_atr_pct {
            return PositionSize::blocked(format!("Volatility too high: ATR {atr_pct:.2}%"));
        }

        let risk_usd = account_size * (self.risk_per_trade / 100.0);
        let mut position_usd = risk_usd / (stop_distance_pct / 100.0);

        position_usd *= atr_multiplier(atr_pct);
        position_usd *= fear_multiplier(fear_index);
        position_usd *= market_multiplier(market_type);

        let max_position = account_size * (self.max_position_pct / 100.0);
        position_usd = position_usd.min(max_position);
        position_usd = position_usd.min(account_size * self.max_leverage);

        if position_usd < self.min_position {
            return PositionSize::blocked(format!("Position too small: ${position_usd:.2}"));
        }

        PositionSize::Sized(SizedPosition {
            position_usd,
            contracts: position_usd / entry,
            risk_usd,
            risk_pct: self.risk_per_trade,
            stop_distance_pct,
            leverage: position_usd / account_size,
        })
    }
}

fn atr_multiplier(atr_pct: f64) -> f64 {
    if atr_pct > 2.5 {
        0.5
    } else if atr_pct < 0.5 {
        0.7
    } else {
        1.0
    }
}

fn fear_multiplier(fear_index: i64) -> f64 {
    if fear_index < 20 {
        0.5
    } else if fear_index < 40 {
        0.8
    } else if fear_index > 75 {
        0.3
    } else if fear_index > 60 {
        0.7
    } else {
        1.0
    }
}

fn market_multiplier(market_type: MarketType) -> f64 {
    match market_type {
        MarketType::Trending => 1.0,
        MarketType::Choppy => 0.8,
        MarketType::HighVol => 0.5,
        MarketType::Unknown => 0.9,
    }
}
