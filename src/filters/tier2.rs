// =============================================================================
// Tier 2 — weighted quality filters
// =============================================================================
//
// Nine filters, each scoring up to its configured weight (weights total 100):
//
//   mtf_confirmation 20 | volume_profile 15 | rsi_divergence 15
//   funding_rate 10 | open_interest 10 | ema_stack 10 | atr_percent 10
//   vwap_position 5 | support_resistance 5
//
// The summed score over the maximum possible gives the percentage compared
// against the market-type threshold. Missing data scores (false, 0,
// "Insufficient data") — filters fail closed, they never raise.
// =============================================================================

use std::collections::{BTreeMap, HashMap};

use crate::analysis::{
    analyze_profile, detect_divergences, nearest_level, support_resistance, DivergenceSide,
    LevelKind,
};
use crate::indicators::{calculate_atr_pct, calculate_ema, calculate_vwap};
use crate::types::{MarketType, TradeDirection};

use super::{DataBundle, QualityOutcome};

/// Volume-profile window and bin count.
const PROFILE_PERIODS: usize = 50;
const PROFILE_BINS: usize = 20;
/// Funding above this magnitude (percent) is considered crowded.
const FUNDING_NEUTRAL_PCT: f64 = 0.01;

pub struct Tier2Filters {
    weights: HashMap<String, f64>,
    min_atr_pct: f64,
    max_atr_pct: f64,
}

impl Tier2Filters {
    pub fn new(weights: HashMap<String, f64>, min_atr_pct: f64, max_atr_pct: f64) -> Self {
        Self {
            weights,
            min_atr_pct,
            max_atr_pct,
        }
    }

    fn weight(&self, name: &str, fallback: f64) -> f64 {
        self.weights.get(name).copied().unwrap_or(fallback)
    }

    /// Run all nine filters. Returns (passed, percentage, outcomes).
    pub fn evaluate_all(
        &self,
        direction: Option<TradeDirection>,
        market_type: MarketType,
        bundle: &DataBundle,
    ) -> (bool, f64, BTreeMap<String, QualityOutcome>) {
        let mut results = BTreeMap::new();
        let mut total = 0.0;
        let mut max_total = 0.0;

        let mut record =
            |name: &str, weight: f64, outcome: (bool, f64, String), results: &mut BTreeMap<String, QualityOutcome>| {
                let (passed, score, message) = outcome;
                let score = score.min(weight);
                total += score;
                max_total += weight;
                results.insert(
                    name.to_string(),
                    QualityOutcome {
                        passed,
                        score,
                        weight,
                        message,
                    },
                );
            };

        let w = self.weight("mtf_confirmation", 20.0);
        record("mtf_confirmation", w, check_mtf(bundle, direction, w), &mut results);

        let w = self.weight("volume_profile", 15.0);
        record("volume_profile", w, check_volume_profile(bundle, w), &mut results);

        let w = self.weight("funding_rate", 10.0);
        record("funding_rate", w, check_funding(bundle, direction, w), &mut results);

        let w = self.weight("open_interest", 10.0);
        record("open_interest", w, check_open_interest(bundle, w), &mut results);

        let w = self.weight("rsi_divergence", 15.0);
        record("rsi_divergence", w, check_rsi_divergence(bundle, direction, w), &mut results);

        let w = self.weight("ema_stack", 10.0);
        record("ema_stack", w, check_ema_stack(bundle, direction, w), &mut results);

        let w = self.weight("atr_percent", 10.0);
        record(
            "atr_percent",
            w,
            check_atr_percent(bundle, self.min_atr_pct, self.max_atr_pct, w),
            &mut results,
        );

        let w = self.weight("vwap_position", 5.0);
        record("vwap_position", w, check_vwap(bundle, direction, w), &mut results);

        let w = self.weight("support_resistance", 5.0);
        record("support_resistance", w, check_sr(bundle, direction, w), &mut results);

        let percentage = if max_total > 0.0 {
            total / max_total * 100.0
        } else {
            0.0
        };
        let passed = percentage >= market_type.tier2_threshold();

        (passed, percentage, results)
    }
}

// =============================================================================
// Individual filters
// =============================================================================

fn check_mtf(bundle: &DataBundle, direction: Option<TradeDirection>, w: f64) -> (bool, f64, String) {
    if bundle.ohlcv_15m.len() < 10 || bundle.ohlcv_1h.len() < 10 {
        return (false, 0.0, "Insufficient data".to_string());
    }

    let trend_of = |closes: &[crate::market_data::Candle]| {
        let last = closes[closes.len() - 1].close;
        let earlier = closes[closes.len() - 5].close;
        if last > earlier { 1 } else { -1 }
    };

    let trend_15m = trend_of(&bundle.ohlcv_15m);
    let trend_1h = trend_of(&bundle.ohlcv_1h);

    if trend_15m != trend_1h {
        return (false, w * 0.25, "TF conflict".to_string());
    }

    match direction {
        Some(direction) => {
            let wanted = if direction == TradeDirection::Long { 1 } else { -1 };
            if trend_15m == wanted {
                (true, w, "All TF aligned with direction".to_string())
            } else {
                (true, w * 0.75, "TF aligned but opposite direction".to_string())
            }
        }
        None => (true, w, "All TF aligned".to_string()),
    }
}

fn check_volume_profile(bundle: &DataBundle, w: f64) -> (bool, f64, String) {
    if bundle.ohlcv_15m.len() < 20 {
        return (false, 0.0, "Insufficient data".to_string());
    }

    let profile = match analyze_profile(&bundle.ohlcv_15m, PROFILE_PERIODS, PROFILE_BINS) {
        Some(profile) => profile,
        None => return (false, 0.0, "Insufficient data".to_string()),
    };

    let price = bundle.current_price;
    if profile.is_in_value_area(price) {
        (true, w, format!("Price in value area (POC: {:.2})", profile.poc))
    } else if price < profile.val {
        (true, w * 2.0 / 3.0, "Price below VA, near support".to_string())
    } else {
        (true, w * 2.0 / 3.0, "Price above VA, near resistance".to_string())
    }
}

fn check_funding(bundle: &DataBundle, direction: Option<TradeDirection>, w: f64) -> (bool, f64, String) {
    let funding_pct = bundle.funding_rate * 100.0;

    if funding_pct.abs() > FUNDING_NEUTRAL_PCT {
        match direction {
            Some(TradeDirection::Long) if funding_pct > 0.0 => {
                (false, 0.0, format!("High positive funding ({funding_pct:.3}%)"))
            }
            Some(TradeDirection::Short) if funding_pct < 0.0 => {
                (false, 0.0, format!("High negative funding ({funding_pct:.3}%)"))
            }
            _ => (true, w, format!("Funding supports trade ({funding_pct:.3}%)")),
        }
    } else {
        (true, w, format!("Funding neutral ({funding_pct:.3}%)"))
    }
}

fn check_open_interest(bundle: &DataBundle, w: f64) -> (bool, f64, String) {
    if bundle.open_interest > 0.0 {
        (true, w, "OI positive".to_string())
    } else {
        (true, w / 2.0, "OI data unavailable".to_string())
    }
}

fn check_rsi_divergence(
    bundle: &DataBundle,
    direction: Option<TradeDirection>,
    w: f64,
) -> (bool, f64, String) {
    if bundle.ohlcv_15m.len() < 20 {
        return (false, 0.0, "Insufficient data".to_string());
    }

    let result = detect_divergences(&bundle.ohlcv_15m, 20);

    match (direction, result.rsi) {
        (Some(TradeDirection::Long), DivergenceSide::Bullish) => {
            (true, w, "Bullish RSI divergence".to_string())
        }
        (Some(TradeDirection::Short), DivergenceSide::Bearish) => {
            (true, w, "Bearish RSI divergence".to_string())
        }
        (_, DivergenceSide::Bullish) => (true, w * 2.0 / 3.0, "RSI divergence: bullish".to_string()),
        (_, DivergenceSide::Bearish) => (true, w * 2.0 / 3.0, "RSI divergence: bearish".to_string()),
        _ => (false, w / 3.0, "No RSI divergence".to_string()),
    }
}

fn check_ema_stack(bundle: &DataBundle, direction: Option<TradeDirection>, w: f64) -> (bool, f64, String) {
    if bundle.ohlcv_1h.len() < 50 {
        return (false, 0.0, "Insufficient data".to_string());
    }

    let closes: Vec<f64> = bundle.ohlcv_1h[bundle.ohlcv_1h.len() - 50..]
        .iter()
        .map(|c| c.close)
        .collect();
    let ema9 = calculate_ema(&closes, 9);
    let ema21 = calculate_ema(&closes, 21);
    let ema200 = calculate_ema(&closes, 200);

    let bullish = ema9 > ema21 && ema21 > ema200;
    let bearish = ema9 < ema21 && ema21 < ema200;

    match direction {
        Some(TradeDirection::Long) if bullish => (true, w, "Bullish EMA stack".to_string()),
        Some(TradeDirection::Short) if bearish => (true, w, "Bearish EMA stack".to_string()),
        _ if bullish => (true, w * 0.7, "Bullish stack (opposite direction)".to_string()),
        _ if bearish => (true, w * 0.7, "Bearish stack (opposite direction)".to_string()),
        _ => (false, w * 0.3, "No clear EMA stack".to_string()),
    }
}

fn check_atr_percent(bundle: &DataBundle, min_pct: f64, max_pct: f64, w: f64) -> (bool, f64, String) {
    if bundle.ohlcv_15m.len() < 15 {
        return (false, 0.0, "Insufficient data".to_string());
    }

    let atr_pct = calculate_atr_pct(&bundle.ohlcv_15m, 14);

    if (min_pct..=max_pct).contains(&atr_pct) {
        (true, w, format!("ATR {atr_pct:.2}% in range"))
    } else if atr_pct < min_pct {
        (false, w / 2.0, format!("ATR too low: {atr_pct:.2}%"))
    } else {
        (false, w / 2.0, format!("ATR too high: {atr_pct:.2}%"))
    }
}

fn check_vwap(bundle: &DataBundle, direction: Option<TradeDirection>, w: f64) -> (bool, f64, String) {
    if bundle.ohlcv_15m.len() < 20 {
        return (false, 0.0, "Insufficient data".to_string());
    }

    let vwap = calculate_vwap(&bundle.ohlcv_15m);
    let price = bundle.current_price;
    if vwap <= 0.0 {
        return (false, 0.0, "Insufficient data".to_string());
    }

    match direction {
        Some(TradeDirection::Long) if price > vwap => {
            (true, w, format!("Price above VWAP (+{:.2}%)", (price / vwap - 1.0) * 100.0))
        }
        Some(TradeDirection::Short) if price < vwap => {
            (true, w, format!("Price below VWAP (-{:.2}%)", (1.0 - price / vwap) * 100.0))
        }
        _ if ((price - vwap) / vwap).abs() < 0.01 => {
            (true, w * 0.6, "Price near VWAP".to_string())
        }
        _ => (false, w * 0.2, "Price away from VWAP".to_string()),
    }
}

fn check_sr(bundle: &DataBundle, direction: Option<TradeDirection>, w: f64) -> (bool, f64, String) {
    if bundle.ohlcv_1h.len() < 20 {
        return (false, 0.0, "Insufficient data".to_string());
    }

    let levels = support_resistance(&bundle.ohlcv_1h, 3);
    match nearest_level(bundle.current_price, &levels) {
        Some((LevelKind::Support, _, distance)) if direction == Some(TradeDirection::Long) => {
            (true, w, format!("Near support ({distance:.2}%)"))
        }
        Some((LevelKind::Resistance, _, distance)) if direction == Some(TradeDirection::Short) => {
            (true, w, format!("Near resistance ({distance:.2}%)"))
        }
        Some((kind, _, distance)) => {
            let side = match kind {
                LevelKind::Support => "support",
                LevelKind::Resistance => "resistance",
            };
            (true, w * 0.6, format!("Near {side} ({distance:.2}%)"))
        }
        None => (false, w * 0.2, "No clear S/R levels".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::market_data::Candle;

    fn candle(close: f64, volume: f64) -> Candle {
        Candle {
            open_time: 0,
            open: close - 0.2,
            high: close + 0.6,
            low: close - 0.6,
            close,
            volume,
        }
    }

    fn filters() -> Tier2Filters {
        let config = RuntimeConfig::default();
        Tier2Filters::new(config.tier2_filters.clone(), config.min_atr_pct, config.max_atr_pct)
    }

    /// A bundle engineered to score well for a LONG: aligned trends, decent
    /// ATR, supportive funding, positive OI.
    fn quality_long_bundle() -> DataBundle {
        let ohlcv_15m: Vec<Candle> = (0..60)
            .map(|i| candle(100.0 + i as f64 * 0.5, 10.0 + i as f64 * 0.05))
            .collect();
        let ohlcv_1h: Vec<Candle> = (0..60)
            .map(|i| candle(95.0 + i as f64 * 0.6, 40.0))
            .collect();
        let ohlcv_4h: Vec<Candle> = (0..40).map(|i| candle(90.0 + i as f64, 100.0)).collect();
        let current_price = ohlcv_15m.last().unwrap().close;

        DataBundle {
            symbol: "ETH/USDT".to_string(),
            ohlcv_5m: ohlcv_15m.clone(),
            ohlcv_15m,
            ohlcv_1h,
            ohlcv_4h,
            btc_1h: Vec::new(),
            funding_rate: 0.00005, // 0.005% — neutral
            open_interest: 1_000.0,
            orderbook: Default::default(),
            current_price,
        }
    }

    #[test]
    fn weights_sum_matches_config() {
        let config = RuntimeConfig::default();
        let total: f64 = config.tier2_filters.values().sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn quality_long_bundle_clears_trending_threshold() {
        let (passed, score, results) =
            filters().evaluate_all(Some(TradeDirection::Long), MarketType::Trending, &quality_long_bundle());
        assert!(passed, "score {score}, results: {results:#?}");
        assert!(score >= 60.0);
        assert_eq!(results.len(), 9);
    }

    #[test]
    fn scores_never_exceed_weights() {
        let (_, _, results) =
            filters().evaluate_all(Some(TradeDirection::Long), MarketType::Trending, &quality_long_bundle());
        for (name, outcome) in &results {
            assert!(
                outcome.score <= outcome.weight + 1e-9,
                "{name} scored {} over weight {}",
                outcome.score,
                outcome.weight
            );
        }
    }

    #[test]
    fn empty_bundle_scores_low_without_panicking() {
        let (passed, score, results) =
            filters().evaluate_all(None, MarketType::Trending, &DataBundle::default());
        assert!(!passed);
        assert!(score < 60.0);
        assert!(!results["mtf_confirmation"].passed);
        assert_eq!(results["mtf_confirmation"].message, "Insufficient data");
    }

    #[test]
    fn crowded_funding_fails_for_longs() {
        let mut bundle = quality_long_bundle();
        bundle.funding_rate = 0.0005; // 0.05% — crowded longs
        let (_, _, results) =
            filters().evaluate_all(Some(TradeDirection::Long), MarketType::Trending, &bundle);
        assert!(!results["funding_rate"].passed);
        assert_eq!(results["funding_rate"].score, 0.0);
    }

    #[test]
    fn crowded_funding_supports_shorts() {
        let mut bundle = quality_long_bundle();
        bundle.funding_rate = 0.0005;
        let (_, _, results) =
            filters().evaluate_all(Some(TradeDirection::Short), MarketType::Trending, &bundle);
        assert!(results["funding_rate"].passed);
        assert!(results["funding_rate"].message.contains("supports"));
    }

    #[test]
    fn atr_band_boundaries_are_inclusive() {
        // Flat 0.4%-range bars put ATR% exactly at the lower bound.
        let ohlcv_15m: Vec<Candle> = (0..40)
            .map(|_| Candle {
                open_time: 0,
                open: 100.0,
                high: 100.2,
                low: 99.8,
                close: 100.0,
                volume: 10.0,
            })
            .collect();
        let atr_pct = calculate_atr_pct(&ohlcv_15m, 14);
        assert!((atr_pct - 0.4).abs() < 1e-9);

        let outcome = check_atr_percent(
            &DataBundle {
                ohlcv_15m: ohlcv_15m.clone(),
                current_price: 100.0,
                ..Default::default()
            },
            0.4,
            3.0,
            10.0,
        );
        assert!(outcome.0, "exactly at the minimum must pass: {}", outcome.2);

        // Just under the bound fails.
        let outcome = check_atr_percent(
            &DataBundle {
                ohlcv_15m,
                current_price: 100.0,
                ..Default::default()
            },
            0.41,
            3.0,
            10.0,
        );
        assert!(!outcome.0);
    }

    #[test]
    fn excessive_atr_fails_high_vol_style() {
        // ~3.5% range bars: ATR% above the 3.0 cap.
        let ohlcv_15m: Vec<Candle> = (0..40)
            .map(|_| Candle {
                open_time: 0,
                open: 100.0,
                high: 101.75,
                low: 98.25,
                close: 100.0,
                volume: 10.0,
            })
            .collect();
        let bundle = DataBundle {
            ohlcv_15m,
            current_price: 100.0,
            ..Default::default()
        };
        let (passed, _, message) = check_atr_percent(&bundle, 0.4, 3.0, 10.0);
        assert!(!passed);
        assert!(message.contains("ATR too high"));
    }

    #[test]
    fn conflicting_timeframes_fail_mtf() {
        let mut bundle = quality_long_bundle();
        // Invert the 1h series into a downtrend.
        bundle.ohlcv_1h = (0..60).map(|i| candle(150.0 - i as f64 * 0.6, 40.0)).collect();
        let (_, _, results) =
            filters().evaluate_all(Some(TradeDirection::Long), MarketType::Trending, &bundle);
        assert!(!results["mtf_confirmation"].passed);
        assert_eq!(results["mtf_confirmation"].message, "TF conflict");
    }

    #[test]
    fn vwap_rewards_longs_above() {
        let (_, _, results) =
            filters().evaluate_all(Some(TradeDirection::Long), MarketType::Trending, &quality_long_bundle());
        // Uptrend: latest price above the window VWAP.
        assert!(results["vwap_position"].passed);
        assert!(results["vwap_position"].message.contains("above VWAP"));
    }
}
