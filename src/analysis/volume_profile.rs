// =============================================================================
// Volume Profile — price bins, POC, value area
// =============================================================================
//
// The window's price range [min_low, max_high] is split into uniform bins;
// each candle's volume is distributed to the bins it overlaps, proportional
// to the overlap of the bin range with the candle's [low, high].
//
//   POC — bin with the highest volume.
//   Value area — the top-volume bins accumulating to 70% of total volume;
//   VAH / VAL are the highest and lowest bounds of that set.
// =============================================================================

use serde::Serialize;

use crate::market_data::Candle;

/// Fraction of total volume contained by the value area.
const VALUE_AREA_FRACTION: f64 = 0.7;

#[derive(Debug, Clone, Serialize)]
pub struct VolumeBin {
    pub low: f64,
    pub high: f64,
    pub volume: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeProfile {
    /// Point of control: centre of the highest-volume bin.
    pub poc: f64,
    /// Value area high.
    pub vah: f64,
    /// Value area low.
    pub val: f64,
    pub bins: Vec<VolumeBin>,
    pub buy_volume_ratio: f64,
    pub sell_volume_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueAreaPosition {
    AboveValueArea,
    InsideValueArea,
    BelowValueArea,
}

impl VolumeProfile {
    pub fn position_of(&self, price: f64) -> ValueAreaPosition {
        if price > self.vah {
            ValueAreaPosition::AboveValueArea
        } else if price < self.val {
            ValueAreaPosition::BelowValueArea
        } else {
            ValueAreaPosition::InsideValueArea
        }
    }

    pub fn is_in_value_area(&self, price: f64) -> bool {
        self.position_of(price) == ValueAreaPosition::InsideValueArea
    }
}

/// Build the volume profile of the trailing `num_periods` candles over
/// `num_bins` uniform price bins. Returns `None` for an empty window or a
/// degenerate price range.
pub fn analyze_profile(
    candles: &[Candle],
    num_periods: usize,
    num_bins: usize,
) -> Option<VolumeProfile> {
    if candles.is_empty() || num_bins == 0 {
        return None;
    }

    let window = &candles[candles.len().saturating_sub(num_periods)..];

    let min_price = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let max_price = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    if !(min_price.is_finite() && max_price.is_finite()) || max_price <= min_price {
        return None;
    }

    let bin_size = (max_price - min_price) / num_bins as f64;
    let mut bins: Vec<VolumeBin> = (0..num_bins)
        .map(|i| VolumeBin {
            low: min_price + i as f64 * bin_size,
            high: min_price + (i + 1) as f64 * bin_size,
            volume: 0.0,
            buy_volume: 0.0,
            sell_volume: 0.0,
        })
        .collect();

    let mut total_buy = 0.0;
    let mut total_sell = 0.0;

    for candle in window {
        let range = candle.range();
        if range <= 0.0 {
            continue;
        }
        let bullish = candle.is_bullish();

        for bin in bins.iter_mut() {
            let overlap = candle.high.min(bin.high) - candle.low.max(bin.low);
            if overlap <= 0.0 {
                continue;
            }
            let share = candle.volume * (overlap / range);
            bin.volume += share;
            if bullish {
                bin.buy_volume += share;
                total_buy += share;
            } else {
                bin.sell_volume += share;
                total_sell += share;
            }
        }
    }

    let total_volume: f64 = bins.iter().map(|b| b.volume).sum();
    if total_volume <= 0.0 {
        return None;
    }

    let poc_bin = bins
        .iter()
        .max_by(|a, b| a.volume.partial_cmp(&b.volume).expect("finite volume"))
        .expect("bins non-empty");
    let poc = (poc_bin.low + poc_bin.high) / 2.0;

    // Accumulate top-volume bins until the value-area fraction is covered.
    let mut order: Vec<usize> = (0..bins.len()).collect();
    order.sort_by(|&a, &b| {
        bins[b]
            .volume
            .partial_cmp(&bins[a].volume)
            .expect("finite volume")
    });

    let target = total_volume * VALUE_AREA_FRACTION;
    let mut accumulated = 0.0;
    let mut vah = f64::NEG_INFINITY;
    let mut val = f64::INFINITY;
    for &idx in &order {
        if accumulated >= target {
            break;
        }
        accumulated += bins[idx].volume;
        vah = vah.max(bins[idx].high);
        val = val.min(bins[idx].low);
    }

    Some(VolumeProfile {
        poc,
        vah,
        val,
        bins,
        buy_volume_ratio: total_buy / total_volume,
        sell_volume_ratio: total_sell / total_volume,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            open_time: 0,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn empty_window_is_none() {
        assert!(analyze_profile(&[], 50, 20).is_none());
    }

    #[test]
    fn poc_lands_on_heavy_traffic_zone() {
        // Heavy volume near 100, light wings near 90 / 110.
        let mut candles = Vec::new();
        for _ in 0..20 {
            candles.push(candle(100.0, 101.0, 99.0, 100.5, 100.0));
        }
        candles.push(candle(90.0, 91.0, 89.0, 90.5, 1.0));
        candles.push(candle(110.0, 111.0, 109.0, 110.5, 1.0));

        let profile = analyze_profile(&candles, 50, 22).expect("profile");
        assert!(
            (profile.poc - 100.0).abs() < 2.0,
            "POC should sit near 100, got {}",
            profile.poc
        );
    }

    #[test]
    fn value_area_is_proper_subset_not_full_range() {
        let mut candles = Vec::new();
        for _ in 0..20 {
            candles.push(candle(100.0, 101.0, 99.0, 100.5, 100.0));
        }
        candles.push(candle(90.0, 91.0, 89.0, 90.5, 1.0));
        candles.push(candle(110.0, 111.0, 109.0, 110.5, 1.0));

        let profile = analyze_profile(&candles, 50, 22).expect("profile");
        // The 70% area must hug the heavy zone and exclude the thin wings.
        assert!(profile.vah < 111.0);
        assert!(profile.val > 89.0);
        assert!(profile.vah > profile.val);
        assert!(profile.is_in_value_area(100.0));
        assert!(!profile.is_in_value_area(89.5));
    }

    #[test]
    fn position_classification() {
        let candles: Vec<Candle> = (0..30)
            .map(|i| {
                let base = 100.0 + (i % 5) as f64 * 0.2;
                candle(base, base + 0.5, base - 0.5, base + 0.1, 10.0)
            })
            .collect();
        let profile = analyze_profile(&candles, 50, 20).expect("profile");

        assert_eq!(profile.position_of(profile.vah + 10.0), ValueAreaPosition::AboveValueArea);
        assert_eq!(profile.position_of(profile.val - 10.0), ValueAreaPosition::BelowValueArea);
        assert_eq!(profile.position_of(profile.poc), ValueAreaPosition::InsideValueArea);
    }

    #[test]
    fn buy_sell_split_follows_candle_colour() {
        let candles = vec![
            candle(100.0, 102.0, 99.0, 101.0, 30.0), // bullish
            candle(101.0, 102.0, 99.5, 100.0, 10.0), // bearish
        ];
        let profile = analyze_profile(&candles, 50, 10).expect("profile");
        assert!(profile.buy_volume_ratio > profile.sell_volume_ratio);
        assert!((profile.buy_volume_ratio + profile.sell_volume_ratio - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_volume_window_is_none() {
        let candles = vec![candle(100.0, 101.0, 99.0, 100.5, 0.0); 10];
        assert!(analyze_profile(&candles, 50, 10).is_none());
    }
}
