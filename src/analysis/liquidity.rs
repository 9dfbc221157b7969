// =============================================================================
// Liquidity Patterns — sweeps, grabs, order blocks
// =============================================================================
//
//   Sweep — price trades through a known swing level intra-bar and closes
//           back on the opposite side (a fade into resting stops).
//   Grab  — a wick at least half the average bar range with an
//           opposite-colour close.
//   Order block — the last candle before a move whose size is at least
//           1.5x the local average move.
// =============================================================================

use serde::Serialize;

use crate::market_data::Candle;
use crate::types::TradeDirection;

/// Wick threshold as a fraction of the average bar range.
const GRAB_WICK_RATIO: f64 = 0.5;
/// Move-size multiple that qualifies a candle as an order block origin.
const ORDER_BLOCK_MOVE_RATIO: f64 = 1.5;

#[derive(Debug, Clone, Serialize)]
pub struct OrderBlock {
    pub price: f64,
    pub high: f64,
    pub low: f64,
    pub direction: TradeDirection,
    /// Move size relative to the local average move.
    pub strength: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiquidityResult {
    pub sweep: Option<TradeDirection>,
    pub grab: Option<TradeDirection>,
    pub order_block: Option<OrderBlock>,
    pub levels: Vec<f64>,
    pub reason: String,
}

/// Detect liquidity patterns over the trailing `lookback` bars.
pub fn detect_liquidity(candles: &[Candle], lookback: usize) -> LiquidityResult {
    if candles.len() < lookback {
        return LiquidityResult {
            sweep: None,
            grab: None,
            order_block: None,
            levels: Vec::new(),
            reason: "Insufficient data".to_string(),
        };
    }

    let recent = &candles[candles.len() - lookback..];
    let levels = liquidity_levels(recent);
    let sweep = detect_sweep(recent, &levels);
    let grab = detect_grab(recent);
    let order_block = find_order_block(recent);

    let mut parts = Vec::new();
    if let Some(direction) = sweep {
        parts.push(format!("{direction} sweep"));
    }
    if let Some(direction) = grab {
        parts.push(format!("{direction} grab"));
    }
    if order_block.is_some() {
        parts.push("Order block".to_string());
    }

    LiquidityResult {
        sweep,
        grab,
        order_block,
        levels,
        reason: if parts.is_empty() {
            "No liquidity patterns".to_string()
        } else {
            parts.join(", ")
        },
    }
}

/// Swing highs and lows where resting stops cluster, deduplicated and
/// sorted ascending.
fn liquidity_levels(candles: &[Candle]) -> Vec<f64> {
    let mut levels = Vec::new();

    for i in 2..candles.len().saturating_sub(2) {
        let high = candles[i].high;
        if high > candles[i - 1].high
            && high > candles[i - 2].high
            && high > candles[i + 1].high
            && high > candles[i + 2].high
        {
            levels.push(high);
        }

        let low = candles[i].low;
        if low < candles[i - 1].low
            && low < candles[i - 2].low
            && low < candles[i + 1].low
            && low < candles[i + 2].low
        {
            levels.push(low);
        }
    }

    levels.sort_by(|a, b| a.partial_cmp(b).expect("finite prices"));
    levels.dedup();
    levels
}

/// Sweep: the latest bar pierces a level intra-bar and closes back across
/// it, having approached from the other side two bars ago.
fn detect_sweep(candles: &[Candle], levels: &[f64]) -> Option<TradeDirection> {
    if candles.len() < 3 || levels.is_empty() {
        return None;
    }

    let current = &candles[candles.len() - 1];
    let reference = &candles[candles.len() - 3];

    for &level in levels {
        // Stops above resistance taken out, close back below: fade short.
        if level > current.close
            && current.high > level
            && current.close < level
            && reference.close < level
        {
            return Some(TradeDirection::Short);
        }
        // Stops below support flushed, close back above: fade long.
        if level < current.close
            && current.low < level
            && current.close > level
            && reference.close > level
        {
            return Some(TradeDirection::Long);
        }
    }

    None
}

/// Grab: a dominant wick with an opposite-colour close on the latest bar.
fn detect_grab(candles: &[Candle]) -> Option<TradeDirection> {
    if candles.len() < 6 {
        return None;
    }

    let current = &candles[candles.len() - 1];
    let previous = &candles[candles.len() - 6..candles.len() - 1];

    let avg_range = previous.iter().map(Candle::range).sum::<f64>() / previous.len() as f64;
    if avg_range <= 0.0 {
        return None;
    }

    if current.upper_wick() > avg_range * GRAB_WICK_RATIO && current.close < current.open {
        return Some(TradeDirection::Short); // longs grabbed above
    }
    if current.lower_wick() > avg_range * GRAB_WICK_RATIO && current.close > current.open {
        return Some(TradeDirection::Long); // shorts grabbed below
    }

    None
}

/// Scan backwards for the most recent candle that preceded an outsized move.
fn find_order_block(candles: &[Candle]) -> Option<OrderBlock> {
    if candles.len() < 12 {
        return None;
    }

    for i in (candles.len().saturating_sub(11)..candles.len() - 1).rev() {
        let origin = &candles[i];
        let next = &candles[i + 1];

        let move_size = (next.close - origin.close).abs();
        let avg_move = average_move(candles, i);
        if avg_move <= 0.0 {
            continue;
        }

        if move_size > avg_move * ORDER_BLOCK_MOVE_RATIO {
            return Some(OrderBlock {
                price: origin.close,
                high: origin.high,
                low: origin.low,
                direction: if next.close > origin.close {
                    TradeDirection::Long
                } else {
                    TradeDirection::Short
                },
                strength: move_size / avg_move,
            });
        }
    }

    None
}

/// Mean close-to-close move over up to 10 bars before `exclude_idx`.
fn average_move(candles: &[Candle], exclude_idx: usize) -> f64 {
    let start = exclude_idx.saturating_sub(10).max(1);
    if start >= exclude_idx {
        return 0.0;
    }

    let total: f64 = (start..exclude_idx)
        .map(|i| (candles[i].close - candles[i - 1].close).abs())
        .sum();
    total / (exclude_idx - start) as f64
}
