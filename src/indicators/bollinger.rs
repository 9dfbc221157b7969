// =============================================================================
// Bollinger Bands
// =============================================================================
//
//   middle = SMA(period)
//   upper  = middle + k * stdev(period)
//   lower  = middle - k * stdev(period)
//
// Neutral contract: fewer than `period` closes collapses all three bands to
// the latest close.
// =============================================================================

use super::ema::calculate_sma;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger bands over the most recent `period` closes with `k` standard
/// deviations.
pub fn calculate_bollinger(closes: &[f64], period: usize, k: f64) -> BollingerBands {
    if period == 0 || closes.len() < period {
        let current = closes.last().copied().unwrap_or(0.0);
        return BollingerBands {
            upper: current,
            middle: current,
            lower: current,
        };
    }

    let middle = calculate_sma(closes, period);
    let recent = &closes[closes.len() - period..];
    let variance = recent.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
    let stdev = variance.sqrt();

    BollingerBands {
        upper: middle + k * stdev,
        middle,
        lower: middle - k * stdev,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_collapses_to_last_close() {
        let bands = calculate_bollinger(&[101.0, 102.0], 20, 2.0);
        assert_eq!(bands.upper, 102.0);
        assert_eq!(bands.middle, 102.0);
        assert_eq!(bands.lower, 102.0);
    }

    #[test]
    fn empty_input_is_zero() {
        let bands = calculate_bollinger(&[], 20, 2.0);
        assert_eq!(bands.middle, 0.0);
    }

    #[test]
    fn flat_series_has_zero_width() {
        let closes = vec![100.0; 30];
        let bands = calculate_bollinger(&closes, 20, 2.0);
        assert_eq!(bands.upper, 100.0);
        assert_eq!(bands.middle, 100.0);
        assert_eq!(bands.lower, 100.0);
    }

    #[test]
    fn bands_are_symmetric_around_middle() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i as f64 * 0.9).sin() * 4.0).collect();
        let bands = calculate_bollinger(&closes, 20, 2.0);
        let up = bands.upper - bands.middle;
        let down = bands.middle - bands.lower;
        assert!((up - down).abs() < 1e-9);
        assert!(up > 0.0);
    }

    #[test]
    fn known_two_point_window() {
        // Window [1, 3]: mean 2, variance 1, stdev 1.
        let bands = calculate_bollinger(&[9.0, 1.0, 3.0], 2, 2.0);
        assert!((bands.middle - 2.0).abs() < 1e-10);
        assert!((bands.upper - 4.0).abs() < 1e-10);
        assert!((bands.lower - 0.0).abs() < 1e-10);
    }
}
