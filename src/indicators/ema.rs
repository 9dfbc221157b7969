// =============================================================================
// Moving Averages — EMA / SMA
// =============================================================================
//
// EMA weighting: multiplier = 2 / (period + 1), seeded with the SMA of the
// first `period` values. With fewer values than the period both functions
// degrade to the plain arithmetic mean of whatever is available, which keeps
// the filter pipeline total.
// =============================================================================

/// Most recent EMA of `values` for the given `period`.
///
/// Fewer than `period` values (or an empty slice) returns the arithmetic
/// mean of the input (0.0 when empty).
pub fn calculate_ema(values: &[f64], period: usize) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    if period == 0 || values.len() < period {
        return values.iter().sum::<f64>() / values.len() as f64;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema = values[..period].iter().sum::<f64>() / period as f64;

    for &value in &values[period..] {
        ema = value * multiplier + ema * (1.0 - multiplier);
    }

    ema
}

/// Full EMA series: one value per input element starting at index
/// `period - 1`. Empty when the input is shorter than the period.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);

    let mut prev = seed;
    for &value in &values[period..] {
        let ema = value * multiplier + prev * (1.0 - multiplier);
        out.push(ema);
        prev = ema;
    }

    out
}

/// SMA over the most recent `period` values; arithmetic mean of the whole
/// input when it is shorter than the period (0.0 when empty).
pub fn calculate_sma(values: &[f64], period: usize) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    if period == 0 || values.len() < period {
        return values.iter().sum::<f64>() / values.len() as f64;
    }
    values[values.len() - period..].iter().sum::<f64>() / period as f64
}
