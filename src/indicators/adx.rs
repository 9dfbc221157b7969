// =============================================================================
// Average Directional Index (ADX)
// =============================================================================
//
//   +DM = up_move   when up_move > down_move and up_move > 0, else 0
//   -DM = down_move when down_move > up_move and down_move > 0, else 0
//   +DI = smoothed(+DM) / smoothed(TR) * 100
//   -DI = smoothed(-DM) / smoothed(TR) * 100
//   DX  = |+DI - -DI| / (+DI + -DI) * 100
//
// Smoothing uses the most recent `period` bars. Neutral contract: fewer than
// `period + 1` candles returns 20.0 (the ranging/trending boundary).
//
// Interpretation: > 25 trending, < 20 ranging.
// =============================================================================

use crate::market_data::Candle;

/// Most recent ADX of `candles` for the given `period`.
pub fn calculate_adx(candles: &[Candle], period: usize) -> f64 {
    if period == 0 || candles.len() < period + 1 {
        return 20.0;
    }

    let n = candles.len();
    let mut tr_values = Vec::with_capacity(n - 1);
    let mut plus_dm = Vec::with_capacity(n - 1);
    let mut minus_dm = Vec::with_capacity(n - 1);

    for w in candles.windows(2) {
        let prev = &w[0];
        let cur = &w[1];

        let tr = (cur.high - cur.low)
            .max((cur.high - prev.close).abs())
            .max((cur.low - prev.close).abs());
        tr_values.push(tr);

        let up_move = cur.high - prev.high;
        let down_move = prev.low - cur.low;

        plus_dm.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dm.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
    }

    let window = tr_values.len().saturating_sub(period);
    let smoothed_tr: f64 = tr_values[window..].iter().sum::<f64>() / period as f64;
    if smoothed_tr <= 0.0 {
        return 0.0;
    }

    let plus_di = (plus_dm[window..].iter().sum::<f64>() / smoothed_tr) * 100.0;
    let minus_di = (minus_dm[window..].iter().sum::<f64>() / smoothed_tr) * 100.0;

    let di_sum = plus_di + minus_di;
    if di_sum == 0.0 {
        return 0.0;
    }

    (plus_di - minus_di).abs() / di_sum * 100.0
}
