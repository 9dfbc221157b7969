// =============================================================================
// Market Structure — swings, BOS, CHoCH, support/resistance
// =============================================================================
//
// A bar is a swing high when its high strictly exceeds the highs of
// `left_bars` bars to the left and `right_bars` bars to the right; swing lows
// are symmetric.
//
//   BOS   — close breaks the most recent swing high (bullish) or low
//           (bearish), with the previous close still inside.
//   CHoCH — reversal at the latest pivot: prior swing sequence pointing one
//           way, newest swing breaking the other way.
//
// Strength: CHoCH => STRONG, BOS => MODERATE, otherwise WEAK with the
// direction taken from the drift of the last five closes.
// =============================================================================

use serde::Serialize;

use crate::market_data::Candle;
use crate::types::{StructureStrength, TradeDirection};

/// Default swing pivot width on each side.
const SWING_BARS: usize = 2;

/// Swing point values in chronological order.
#[derive(Debug, Clone, Default)]
pub struct SwingPoints {
    pub highs: Vec<f64>,
    pub lows: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructureResult {
    pub direction: TradeDirection,
    pub strength: StructureStrength,
    pub bos_detected: bool,
    pub choch_detected: bool,
    pub swing_high: f64,
    pub swing_low: f64,
    pub reason: String,
}

/// Find swing highs/lows with a `left`/`right` strict-comparison pivot.
pub fn find_swing_points(candles: &[Candle], left: usize, right: usize) -> SwingPoints {
    let mut swings = SwingPoints::default();
    if candles.len() < left + right + 1 {
        return swings;
    }

    for i in left..candles.len() - right {
        let high = candles[i].high;
        let low = candles[i].low;

        let is_high = (1..=left).all(|j| high > candles[i - j].high)
            && (1..=right).all(|j| high > candles[i + j].high);
        if is_high {
            swings.highs.push(high);
        }

        let is_low = (1..=left).all(|j| low < candles[i - j].low)
            && (1..=right).all(|j| low < candles[i + j].low);
        if is_low {
            swings.lows.push(low);
        }
    }

    swings
}

/// Classify the current market structure from an OHLCV window.
pub fn detect_structure(candles: &[Candle]) -> StructureResult {
    if candles.len() < 20 {
        let last = candles.last();
        return StructureResult {
            direction: TradeDirection::Long,
            strength: StructureStrength::Weak,
            bos_detected: false,
            choch_detected: false,
            swing_high: last.map(|c| c.high).unwrap_or(0.0),
            swing_low: last.map(|c| c.low).unwrap_or(0.0),
            reason: "Insufficient data".to_string(),
        };
    }

    let swings = find_swing_points(candles, SWING_BARS, SWING_BARS);
    let last = candles.last().expect("window checked non-empty");

    if swings.highs.is_empty() || swings.lows.is_empty() {
        return StructureResult {
            direction: TradeDirection::Long,
            strength: StructureStrength::Weak,
            bos_detected: false,
            choch_detected: false,
            swing_high: last.high,
            swing_low: last.low,
            reason: "No swing points found".to_string(),
        };
    }

    let (bos_detected, bos_direction) = detect_bos(candles, &swings);
    let (choch_detected, choch_direction) = detect_choch(&swings);

    let (direction, strength, reason) = if choch_detected {
        let direction = choch_direction.expect("choch carries a direction");
        (
            direction,
            StructureStrength::Strong,
            format!("CHoCH to {direction}"),
        )
    } else if bos_detected {
        let direction = bos_direction.expect("bos carries a direction");
        (
            direction,
            StructureStrength::Moderate,
            format!("BOS to {direction}"),
        )
    } else {
        let recent: Vec<f64> = candles[candles.len() - 5..].iter().map(|c| c.close).collect();
        if recent[recent.len() - 1] > recent[0] {
            (
                TradeDirection::Long,
                StructureStrength::Weak,
                "Gradual uptrend".to_string(),
            )
        } else {
            (
                TradeDirection::Short,
                StructureStrength::Weak,
                "Gradual downtrend".to_string(),
            )
        }
    };

    StructureResult {
        direction,
        strength,
        bos_detected,
        choch_detected,
        swing_high: *swings.highs.last().expect("non-empty"),
        swing_low: *swings.lows.last().expect("non-empty"),
        reason,
    }
}

/// Break of structure: current close beyond the most recent swing level with
/// the previous close still inside.
fn detect_bos(candles: &[Candle], swings: &SwingPoints) -> (bool, Option<TradeDirection>) {
    if swings.highs.len() < 2 || swings.lows.len() < 2 || candles.len() < 2 {
        return (false, None);
    }

    let current = candles[candles.len() - 1].close;
    let previous = candles[candles.len() - 2].close;
    let last_high = *swings.highs.last().expect("checked");
    let last_low = *swings.lows.last().expect("checked");

    if current > last_high && previous <= last_high {
        return (true, Some(TradeDirection::Long));
    }
    if current < last_low && previous >= last_low {
        return (true, Some(TradeDirection::Short));
    }

    (false, None)
}

/// Change of character: the newest swing breaks the direction of the two
/// before it.
fn detect_choch(swings: &SwingPoints) -> (bool, Option<TradeDirection>) {
    if swings.highs.len() < 3 || swings.lows.len() < 3 {
        return (false, None);
    }

    let h = &swings.highs[swings.highs.len() - 3..];
    let l = &swings.lows[swings.lows.len() - 3..];

    // Declining highs reversed by a higher latest high.
    if h[0] > h[1] && h[2] > h[1] {
        return (true, Some(TradeDirection::Long));
    }
    // Rising lows reversed by a lower latest low.
    if l[0] < l[1] && l[2] < l[1] {
        return (true, Some(TradeDirection::Short));
    }

    (false, None)
}

// =============================================================================
// Support / resistance levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LevelKind {
    Support,
    Resistance,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Levels {
    /// Strongest supports, lowest first.
    pub support: Vec<f64>,
    /// Strongest resistances, highest first.
    pub resistance: Vec<f64>,
}

/// Local extrema as support/resistance candidates, top `num_levels` each.
pub fn support_resistance(candles: &[Candle], num_levels: usize) -> Levels {
    if candles.len() < 20 {
        return Levels::default();
    }

    let swings = find_swing_points(candles, SWING_BARS, SWING_BARS);

    let mut resistance = swings.highs;
    resistance.sort_by(|a, b| b.partial_cmp(a).expect("finite prices"));
    resistance.truncate(num_levels);

    let mut support = swings.lows;
    support.sort_by(|a, b| a.partial_cmp(b).expect("finite prices"));
    support.truncate(num_levels);

    Levels {
        support,
        resistance,
    }
}

/// Nearest level around `price`: resistance above or support below,
/// whichever is closer. Returns `(kind, level, distance_pct)`.
pub fn nearest_level(price: f64, levels: &Levels) -> Option<(LevelKind, f64, f64)> {
    let mut best: Option<(LevelKind, f64, f64)> = None;

    for &r in &levels.resistance {
        if r > price {
            let distance = r - price;
            if best.as_ref().map_or(true, |(_, _, d)| distance < *d) {
                best = Some((LevelKind::Resistance, r, distance));
            }
        }
    }
    for &s in &levels.support {
        if s < price {
            let distance = price - s;
            if best.as_ref().map_or(true, |(_, _, d)| distance < *d) {
                best = Some((LevelKind::Support, s, distance));
            }
        }
    }

    best.map(|(kind, level, distance)| (kind, level, distance / price * 100.0))
}
