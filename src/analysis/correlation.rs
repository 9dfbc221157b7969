// =============================================================================
// Correlation — return correlation of a pair against BTC
// =============================================================================
//
// Pearson correlation of close-to-close returns over the lookback window.
// A correlation below 0.3 marks the pair as diverging from BTC, which the
// bonus filter rewards when the pair's own structure disagrees with BTC.
// =============================================================================

use serde::Serialize;

/// Correlation floor below which a pair counts as decoupled from BTC.
pub const DIVERGENCE_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Serialize)]
pub struct CorrelationResult {
    pub btc_correlation: f64,
    pub is_diverging: bool,
    pub reason: String,
}

/// Correlate a pair's closes against BTC closes over `lookback` bars.
/// Insufficient history yields the neutral 0.5 and no divergence claim.
pub fn analyze_correlation(
    pair_closes: &[f64],
    btc_closes: &[f64],
    lookback: usize,
) -> CorrelationResult {
    if pair_closes.len() < lookback + 1 || btc_closes.len() < lookback + 1 || lookback < 2 {
        return CorrelationResult {
            btc_correlation: 0.5,
            is_diverging: false,
            reason: "Insufficient history".to_string(),
        };
    }

    let pair_returns = returns(&pair_closes[pair_closes.len() - lookback - 1..]);
    let btc_returns = returns(&btc_closes[btc_closes.len() - lookback - 1..]);

    let correlation = pearson(&pair_returns, &btc_returns).unwrap_or(0.5);
    let is_diverging = correlation < DIVERGENCE_THRESHOLD;

    CorrelationResult {
        btc_correlation: correlation,
        is_diverging,
        reason: if is_diverging {
            format!("Decoupled from BTC (r={correlation:.2})")
        } else {
            format!("Tracking BTC (r={correlation:.2})")
        },
    }
}

fn returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .map(|w| if w[0] != 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }

    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    if var_a <= 0.0 || var_b <= 0.0 {
        return None;
    }

    let r = cov / (var_a.sqrt() * var_b.sqrt());
    r.is_finite().then_some(r)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_series_fully_correlated() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i as f64 * 0.7).sin() * 3.0).collect();
        let result = analyze_correlation(&closes, &closes, 20);
        assert!((result.btc_correlation - 1.0).abs() < 1e-9);
        assert!(!result.is_diverging);
    }

    #[test]
    fn inverse_series_fully_anticorrelated() {
        let a: Vec<f64> = (0..30).map(|i| 100.0 + (i as f64 * 0.7).sin() * 3.0).collect();
        let b: Vec<f64> = (0..30).map(|i| 100.0 - (i as f64 * 0.7).sin() * 3.0).collect();
        let result = analyze_correlation(&a, &b, 20);
        assert!(result.btc_correlation < -0.9);
        assert!(result.is_diverging);
    }

    #[test]
    fn short_history_is_neutral() {
        let result = analyze_correlation(&[1.0, 2.0], &[1.0, 2.0], 20);
        assert_eq!(result.btc_correlation, 0.5);
        assert!(!result.is_diverging);
    }

    #[test]
    fn flat_series_has_no_defined_correlation() {
        let flat = vec![100.0; 30];
        let moving: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        // Zero variance -> neutral fallback.
        let result = analyze_correlation(&flat, &moving, 20);
        assert_eq!(result.btc_correlation, 0.5);
    }
}
