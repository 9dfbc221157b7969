// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
//   macd_line = EMA(fast) - EMA(slow)
//   signal    = EMA(signal_period) over the macd_line series
//   histogram = macd_line - signal
//
// Neutral contract: fewer than `slow + signal_period` closes returns all
// zeros.
// =============================================================================

use super::ema::ema_series;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MacdResult {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// MACD with the conventional (12, 26, 9) defaults exposed as parameters.
pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdResult {
    if fast == 0 || slow == 0 || signal_period == 0 || fast >= slow {
        return MacdResult::default();
    }
    if closes.len() < slow + signal_period {
        return MacdResult::default();
    }

    // Align the fast series to the slow one: the slow series starts
    // `slow - fast` elements later.
    let fast_series = ema_series(closes, fast);
    let slow_series = ema_series(closes, slow);
    let offset = slow - fast;

    let macd_line: Vec<f64> = slow_series
        .iter()
        .enumerate()
        .map(|(i, s)| fast_series[i + offset] - s)
        .collect();

    let signal_series = ema_series(&macd_line, signal_period);

    let macd = *macd_line.last().expect("macd series non-empty");
    let signal = signal_series.last().copied().unwrap_or(0.0);

    MacdResult {
        macd,
        signal,
        histogram: macd - signal,
    }
}

/// Histogram series aligned to the tail of the input, for divergence
/// scanning.
pub fn macd_histogram_series(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Vec<f64> {
    if fast == 0 || slow == 0 || signal_period == 0 || fast >= slow {
        return Vec::new();
    }
    if closes.len() < slow + signal_period {
        return Vec::new();
    }

    let fast_series = ema_series(closes, fast);
    let slow_series = ema_series(closes, slow);
    let offset = slow - fast;

    let macd_line: Vec<f64> = slow_series
        .iter()
        .enumerate()
        .map(|(i, s)| fast_series[i + offset] - s)
        .collect();

    let signal_series = ema_series(&macd_line, signal_period);
    let skip = macd_line.len() - signal_series.len();

    signal_series
        .iter()
        .enumerate()
        .map(|(i, sig)| macd_line[i + skip] - sig)
        .collect()
}
