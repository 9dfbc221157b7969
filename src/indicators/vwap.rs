// =============================================================================
// Volume-Weighted Average Price (VWAP)
// =============================================================================
//
//   VWAP = sum(typical_price * volume) / sum(volume)
//
// Neutral contract: empty input returns 0.0; a window with zero total volume
// returns the last close.
// =============================================================================

use crate::market_data::Candle;

/// VWAP over the full window of `candles`.
pub fn calculate_vwap(candles: &[Candle]) -> f64 {
    if candles.is_empty() {
        return 0.0;
    }

    let mut total_pv = 0.0;
    let mut total_volume = 0.0;
    for candle in candles {
        total_pv += candle.typical_price() * candle.volume;
        total_volume += candle.volume;
    }

    if total_volume > 0.0 {
        total_pv / total_volume
    } else {
        candles.last().map(|c| c.close).unwrap_or(0.0)
    }
}
