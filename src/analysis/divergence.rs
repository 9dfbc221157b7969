// =============================================================================
// Divergence Detection — price vs RSI / MACD / volume
// =============================================================================
//
// Regular divergence: price prints the window's extreme on the latest bar
// while the indicator refuses to confirm it against the anchor swing.
// The anchor is the earliest swing point inside the lookback window (falling
// back to the window start when the window has no interior swing).
//
// Hidden divergence is the continuation variant: price holds a higher low
// (or lower high) while the indicator makes a deeper extreme.
// =============================================================================

use serde::Serialize;

use crate::indicators::macd::macd_histogram_series;
use crate::indicators::rsi::rsi_series;
use crate::market_data::Candle;
use crate::types::StructureStrength;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DivergenceSide {
    Bullish,
    Bearish,
    None,
}

#[derive(Debug, Clone, Serialize)]
pub struct DivergenceResult {
    pub rsi: DivergenceSide,
    pub macd: DivergenceSide,
    pub volume: DivergenceSide,
    pub hidden: DivergenceSide,
    pub strength: StructureStrength,
    pub reason: String,
}

impl DivergenceResult {
    fn none(reason: &str) -> Self {
        Self {
            rsi: DivergenceSide::None,
            macd: DivergenceSide::None,
            volume: DivergenceSide::None,
            hidden: DivergenceSide::None,
            strength: StructureStrength::Weak,
            reason: reason.to_string(),
        }
    }
}

/// Detect all divergence variants over the trailing `lookback` bars.
pub fn detect_divergences(candles: &[Candle], lookback: usize) -> DivergenceResult {
    if candles.len() < lookback + 5 {
        return DivergenceResult::none("Insufficient data");
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

    let rsi_values = rsi_series(&closes, 14);
    let macd_values = macd_histogram_series(&closes, 12, 26, 9);

    let rsi = detect_regular(&closes, &rsi_values, lookback);
    let macd = detect_regular(&closes, &macd_values, lookback);
    let volume = detect_volume(&closes, &volumes, lookback);
    let hidden = detect_hidden(&closes, &rsi_values, lookback);

    // Weighted count of confirmations across the variants.
    let mut weight = 0.0;
    if rsi != DivergenceSide::None {
        weight += 1.0;
    }
    if macd != DivergenceSide::None {
        weight += 1.0;
    }
    if volume != DivergenceSide::None {
        weight += 0.5;
    }
    if hidden != DivergenceSide::None {
        weight += 0.7;
    }

    let (strength, reason) = if weight >= 2.0 {
        (StructureStrength::Strong, "Multiple divergences detected")
    } else if weight >= 1.0 {
        (StructureStrength::Moderate, "Single divergence detected")
    } else {
        (StructureStrength::Weak, "No divergence detected")
    };

    DivergenceResult {
        rsi,
        macd,
        volume,
        hidden,
        strength,
        reason: reason.to_string(),
    }
}

/// Index of the earliest interior swing low in `window` (2-bar pivot), or 0.
fn earliest_swing_low(window: &[f64]) -> usize {
    for i in 2..window.len().saturating_sub(2) {
        if window[i] < window[i - 1]
            && window[i] < window[i - 2]
            && window[i] < window[i + 1]
            && window[i] < window[i + 2]
        {
            return i;
        }
    }
    0
}

/// Index of the earliest interior swing high in `window` (2-bar pivot), or 0.
fn earliest_swing_high(window: &[f64]) -> usize {
    for i in 2..window.len().saturating_sub(2) {
        if window[i] > window[i - 1]
            && window[i] > window[i - 2]
            && window[i] > window[i + 1]
            && window[i] > window[i + 2]
        {
            return i;
        }
    }
    0
}

/// Regular divergence of `indicator` against closing prices.
fn detect_regular(closes: &[f64], indicator: &[f64], lookback: usize) -> DivergenceSide {
    if closes.len() < lookback || indicator.len() < lookback {
        return DivergenceSide::None;
    }

    let price = &closes[closes.len() - lookback..];
    let ind = &indicator[indicator.len() - lookback..];
    let last = lookback - 1;

    let min_price = price.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_price = price.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    // Bullish: latest bar is the window's lowest low, but the indicator sits
    // above its value at the anchor swing low.
    if price[last] <= min_price {
        let anchor = earliest_swing_low(price);
        if anchor < last && price[last] < price[anchor] && ind[last] > ind[anchor] {
            return DivergenceSide::Bullish;
        }
    }

    // Bearish: latest bar is the window's highest high with a weaker
    // indicator reading than at the anchor swing high.
    if price[last] >= max_price {
        let anchor = earliest_swing_high(price);
        if anchor < last && price[last] > price[anchor] && ind[last] < ind[anchor] {
            return DivergenceSide::Bearish;
        }
    }

    DivergenceSide::None
}

/// Volume divergence: falling price on expanding volume reads bullish
/// (absorption); rising price on fading volume reads bearish (exhaustion).
fn detect_volume(closes: &[f64], volumes: &[f64], lookback: usize) -> DivergenceSide {
    if closes.len() < lookback || volumes.len() < lookback {
        return DivergenceSide::None;
    }

    let price = &closes[closes.len() - lookback..];
    let volume = &volumes[volumes.len() - lookback..];

    let price_change = price[price.len() - 1] - price[0];
    let volume_mean =
        volume[..volume.len() - 1].iter().sum::<f64>() / (volume.len() - 1) as f64;
    let current = volume[volume.len() - 1];

    if volume_mean <= 0.0 {
        return DivergenceSide::None;
    }
    if price_change < 0.0 && current > volume_mean * 1.2 {
        return DivergenceSide::Bullish;
    }
    if price_change > 0.0 && current < volume_mean * 0.8 {
        return DivergenceSide::Bearish;
    }

    DivergenceSide::None
}

/// Hidden divergence: continuation reading from higher-low / lower-high
/// price against a deeper indicator extreme.
fn detect_hidden(closes: &[f64], indicator: &[f64], lookback: usize) -> DivergenceSide {
    if closes.len() < lookback || indicator.len() < lookback {
        return DivergenceSide::None;
    }

    let price = &closes[closes.len() - lookback..];
    let ind = &indicator[indicator.len() - lookback..];
    let last = lookback - 1;

    let low_anchor = earliest_swing_low(price);
    if low_anchor < last && price[last] > price[low_anchor] && ind[last] < ind[low_anchor] {
        return DivergenceSide::Bullish;
    }

    let high_anchor = earliest_swing_high(price);
    if high_anchor < last && price[last] < price[high_anchor] && ind[last] > ind[high_anchor] {
        return DivergenceSide::Bearish;
    }

    DivergenceSide::None
}
