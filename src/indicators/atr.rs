// =============================================================================
// Average True Range (ATR) — Wilder's smoothing
// =============================================================================
//
// True range per bar: max(high - low, |high - prev_close|, |low - prev_close|).
// Neutral contract: fewer than `period + 1` candles returns 0.0.
// =============================================================================

use crate::market_data::Candle;

/// Most recent ATR of `candles` for the given `period`.
pub fn calculate_atr(candles: &[Candle], period: usize) -> f64 {
    if period == 0 || candles.len() < period + 1 {
        return 0.0;
    }

    let true_ranges: Vec<f64> = candles
        .windows(2)
        .map(|w| {
            let prev_close = w[0].close;
            let high = w[1].high;
            let low = w[1].low;
            (high - low)
                .max((high - prev_close).abs())
                .max((low - prev_close).abs())
        })
        .collect();

    let period_f = period as f64;
    let mut atr = true_ranges[..period].iter().sum::<f64>() / period_f;

    for &tr in &true_ranges[period..] {
        atr = (atr * (period_f - 1.0) + tr) / period_f;
    }

    atr
}

/// ATR as a percentage of the latest close. Zero when the ATR is zero or the
/// latest close is non-positive.
pub fn calculate_atr_pct(candles: &[Candle], period: usize) -> f64 {
    let atr = calculate_atr(candles, period);
    match candles.last() {
        Some(last) if last.close > 0.0 => (atr / last.close) * 100.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: 0,
            open,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn insufficient_data_is_zero() {
        assert_eq!(calculate_atr(&[], 14), 0.0);
        let candles = vec![candle(1.0, 2.0, 0.5, 1.5); 14];
        assert_eq!(calculate_atr(&candles, 14), 0.0);
    }

    #[test]
    fn constant_range_converges_to_range() {
        // Every bar has a 2.0 range and no gaps, so TR == 2.0 throughout.
        let candles: Vec<Candle> = (0..40).map(|_| candle(100.0, 101.0, 99.0, 100.0)).collect();
        let atr = calculate_atr(&candles, 14);
        assert!((atr - 2.0).abs() < 1e-9, "expected 2.0, got {atr}");
    }

    #[test]
    fn gap_widens_true_range() {
        // A large gap between close and the next bar must dominate TR.
        let mut candles: Vec<Candle> = (0..20).map(|_| candle(100.0, 101.0, 99.0, 100.0)).collect();
        candles.push(candle(120.0, 121.0, 119.0, 120.0));
        let atr = calculate_atr(&candles, 14);
        assert!(atr > 2.0, "gap should raise ATR, got {atr}");
    }

    #[test]
    fn atr_pct_relative_to_close() {
        let candles: Vec<Candle> = (0..40).map(|_| candle(100.0, 101.0, 99.0, 100.0)).collect();
        let pct = calculate_atr_pct(&candles, 14);
        assert!((pct - 2.0).abs() < 1e-9);
    }

    #[test]
    fn atr_pct_empty_is_zero() {
        assert_eq!(calculate_atr_pct(&[], 14), 0.0);
    }
}
