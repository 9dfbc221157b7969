// =============================================================================
// Signal Generator — from a passing filter result to a concrete trade plan
// =============================================================================
//
// Direction comes from primary-timeframe structure; stop and target are ATR
// multiples from the market-type profile:
//
//   trending  SL 1.5x / TP 3.0x
//   choppy    SL 1.2x / TP 1.8x
//   high_vol  SL 1.0x / TP 2.5x
//
// The reward:risk ratio must meet the profile's floor (inclusive), and the
// assembled signal must survive validation before it leaves this module.
// =============================================================================

use std::sync::Arc;

use tracing::{debug, warn};

use crate::analysis::detect_structure;
use crate::clock::Clock;
use crate::config::RuntimeConfig;
use crate::filters::{DataBundle, FilterResult};
use crate::indicators::calculate_atr;
use crate::regime::BtcRegimeResult;
use crate::types::{MarketType, TradeDirection};

use super::validator::validate_signal;
use super::{PriceLevels, Signal};

pub struct SignalGenerator {
    config: RuntimeConfig,
    clock: Arc<dyn Clock>,
}

impl SignalGenerator {
    pub fn new(config: RuntimeConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Build a signal from a passing filter result. Returns `None` when the
    /// trade plan cannot be constructed (no data, flat ATR, RR below the
    /// floor) or fails validation.
    pub fn generate(
        &self,
        bundle: &DataBundle,
        filter_result: &FilterResult,
        market_type: MarketType,
        btc_regime: &BtcRegimeResult,
    ) -> Option<Signal> {
        let ohlcv = &bundle.ohlcv_15m;
        let last = match ohlcv.last() {
            Some(last) => last,
            None => {
                warn!(symbol = %bundle.symbol, "no primary-timeframe data");
                return None;
            }
        };
        let entry = last.close;

        let structure = detect_structure(ohlcv);
        let direction = structure.direction;

        let atr = calculate_atr(ohlcv, self.config.atr_period);
        if atr <= 0.0 || entry <= 0.0 {
            debug!(symbol = %bundle.symbol, "flat ATR, no risk frame");
            return None;
        }

        let profile = self.config.market_profile(market_type);
        let (stop_loss, take_profit) = match direction {
            TradeDirection::Long => (entry - atr * profile.sl_mult, entry + atr * profile.tp_mult),
            TradeDirection::Short => (entry + atr * profile.sl_mult, entry - atr * profile.tp_mult),
        };

        let rr_ratio = (take_profit - entry).abs() / (entry - stop_loss).abs();
        if rr_ratio < profile.min_rr {
            debug!(
                symbol = %bundle.symbol,
                rr_ratio,
                min_rr = profile.min_rr,
                "reward:risk below the profile floor"
            );
            return None;
        }

        let filters_passed = filter_result
            .tier2
            .values()
            .filter(|outcome| outcome.passed)
            .count() as u32;

        let signal = Signal {
            symbol: bundle.symbol.clone(),
            direction,
            entry,
            stop_loss,
            take_profit,
            rr_ratio,
            score: filter_result.score,
            grade: filter_result.grade,
            confidence: blend_confidence(filter_result.score, btc_regime.confidence),
            market_type,
            btc_regime: btc_regime.regime,
            structure_strength: structure.strength,
            levels: price_levels(bundle, entry),
            filters_passed,
            key_factors: key_factors(filter_result, &structure.strength.to_string()),
            atr_pct: atr / entry * 100.0,
            timestamp: self.clock.now_utc(),
            position: None,
        };

        match validate_signal(&signal, profile.min_rr, self.clock.now_utc()) {
            Ok(()) => Some(signal),
            Err(errors) => {
                debug!(symbol = %signal.symbol, ?errors, "signal failed validation");
                None
            }
        }
    }
}

/// Filter score dominates; BTC-regime confidence tempers it.
fn blend_confidence(score: f64, btc_confidence: f64) -> f64 {
    (score * 0.6 + btc_confidence * 0.4).clamp(0.0, 100.0)
}

/// Recent extremes, nearest untouched levels, and the mid Fibonacci
/// retracements of the last 20 primary bars.
fn price_levels(bundle: &DataBundle, current: f64) -> PriceLevels {
    let window = &bundle.ohlcv_15m[bundle.ohlcv_15m.len().saturating_sub(20)..];

    let recent_high = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let recent_low = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let diff = recent_high - recent_low;

    let nearest_resistance = window
        .iter()
        .map(|c| c.high)
        .filter(|h| *h > current)
        .fold(None::<f64>, |acc, h| Some(acc.map_or(h, |a| a.min(h))));
    let nearest_support = window
        .iter()
        .map(|c| c.low)
        .filter(|l| *l < current)
        .fold(None::<f64>, |acc, l| Some(acc.map_or(l, |a| a.max(l))));

    PriceLevels {
        recent_high,
        recent_low,
        nearest_resistance,
        nearest_support,
        fib_382: recent_high - diff * 0.382,
        fib_500: recent_high - diff * 0.5,
        fib_618: recent_high - diff * 0.618,
    }
}

/// Structure strength, the top two quality filters by score, and any bonus
/// hits — at most four entries.
fn key_factors(filter_result: &FilterResult, structure: &str) -> Vec<String> {
    let mut factors = vec![format!("Structure: {structure}")];

    let mut passed: Vec<(&String, f64)> = filter_result
        .tier2
        .iter()
        .filter(|(_, outcome)| outcome.passed)
        .map(|(name, outcome)| (name, outcome.score))
        .collect();
    passed.sort_by(|a, b| b.1.partial_cmp(&a.1).expect("finite scores"));
    for (name, _) in passed.into_iter().take(2) {
        factors.push(name.replace('_', " "));
    }

    let bonuses: Vec<&str> = filter_result
        .tier3
        .iter()
        .filter(|(_, outcome)| outcome.bonus > 0.0)
        .map(|(name, _)| name.as_str())
        .take(2)
        .collect();
    if !bonuses.is_empty() {
        factors.push(format!("+{}", bonuses.join(", ")));
    }

    factors.truncate(4);
    factors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_clock::ManualClock;
    use crate::filters::{FilterResult, QualityOutcome};
    use crate::market_data::Candle;
    use crate::types::{BtcRegime, SignalGrade, StructureStrength, TradeMode, TrendDirection};
    use std::collections::BTreeMap;

    fn generator() -> SignalGenerator {
        SignalGenerator::new(
            RuntimeConfig::default(),
            Arc::new(ManualClock::at_rfc3339("2024-03-01T08:30:00Z")),
        )
    }

    fn regime() -> BtcRegimeResult {
        BtcRegimeResult {
            regime: BtcRegime::StrongBull,
            confidence: 85.0,
            direction: TrendDirection::Up,
            strength: StructureStrength::Strong,
            can_trade: true,
            trade_mode: TradeMode::Trend,
            reason: None,
            adx: 28.0,
            total_score: 16.0,
        }
    }

    fn passing_filter_result() -> FilterResult {
        let mut tier2 = BTreeMap::new();
        tier2.insert(
            "mtf_confirmation".to_string(),
            QualityOutcome {
                passed: true,
                score: 20.0,
                weight: 20.0,
                message: "All TF aligned".to_string(),
            },
        );
        tier2.insert(
            "ema_stack".to_string(),
            QualityOutcome {
                passed: true,
                score: 10.0,
                weight: 10.0,
                message: "Bullish EMA stack".to_string(),
            },
        );
        FilterResult {
            passed: true,
            tier1: BTreeMap::new(),
            tier2,
            tier3: BTreeMap::new(),
            score: 78.0,
            grade: SignalGrade::BPlus,
            reason: "All filters passed".to_string(),
        }
    }

    /// Breakout bundle whose structure reads LONG with a usable ATR.
    fn long_bundle() -> DataBundle {
        let mut ohlcv_15m = Vec::new();
        for cycle in 0..10 {
            let lift = cycle as f64 * 0.1;
            for (high, low, close) in [
                (102.0, 100.0, 101.0),
                (104.0, 101.0, 103.0),
                (103.0, 100.5, 101.5),
                (102.5, 100.0, 100.8),
            ] {
                ohlcv_15m.push(Candle {
                    open_time: 0,
                    open: close - 0.3 + lift,
                    high: high + lift,
                    low: low + lift,
                    close: close + lift,
                    volume: 10.0,
                });
            }
        }
        ohlcv_15m.push(Candle {
            open_time: 0,
            open: 102.0,
            high: 107.2,
            low: 101.8,
            close: 106.8,
            volume: 14.0,
        });

        DataBundle {
            symbol: "ETH/USDT".to_string(),
            ohlcv_15m,
            current_price: 106.8,
            ..Default::default()
        }
    }

    #[test]
    fn trending_long_uses_profile_multipliers() {
        let generator = generator();
        let bundle = long_bundle();
        let signal = generator
            .generate(&bundle, &passing_filter_result(), MarketType::Trending, &regime())
            .expect("signal expected");

        assert_eq!(signal.direction, TradeDirection::Long);
        assert_eq!(signal.entry, 106.8);

        let atr = calculate_atr(&bundle.ohlcv_15m, 14);
        assert!((signal.stop_loss - (106.8 - 1.5 * atr)).abs() < 1e-9);
        assert!((signal.take_profit - (106.8 + 3.0 * atr)).abs() < 1e-9);
        assert!((signal.rr_ratio - 2.0).abs() < 1e-9);
        assert!(signal.stop_loss < signal.entry && signal.entry < signal.take_profit);
    }

    #[test]
    fn choppy_profile_tightens_stops() {
        let generator = generator();
        let bundle = long_bundle();
        let signal = generator
            .generate(&bundle, &passing_filter_result(), MarketType::Choppy, &regime())
            .expect("signal expected");

        let atr = calculate_atr(&bundle.ohlcv_15m, 14);
        assert!((signal.stop_loss - (106.8 - 1.2 * atr)).abs() < 1e-9);
        assert!((signal.take_profit - (106.8 + 1.8 * atr)).abs() < 1e-9);
        assert!((signal.rr_ratio - 1.5).abs() < 1e-9);
    }

    #[test]
    fn empty_bundle_yields_nothing() {
        let generator = generator();
        assert!(generator
            .generate(&DataBundle::default(), &passing_filter_result(), MarketType::Trending, &regime())
            .is_none());
    }

    #[test]
    fn rr_floor_is_inclusive() {
        // trending profile: 3.0 / 1.5 = 2.0 >= min_rr 1.5 — passes. Raise
        // the floor above 2.0 and the same plan must be rejected.
        let mut config = RuntimeConfig::default();
        config
            .market_configs
            .get_mut("trending")
            .expect("profile exists")
            .min_rr = 2.5;
        let generator = SignalGenerator::new(
            config,
            Arc::new(ManualClock::at_rfc3339("2024-03-01T08:30:00Z")),
        );
        assert!(generator
            .generate(&long_bundle(), &passing_filter_result(), MarketType::Trending, &regime())
            .is_none());

        // Exactly at the floor passes (2.0 / 2.0).
        let mut config = RuntimeConfig::default();
        config
            .market_configs
            .get_mut("trending")
            .expect("profile exists")
            .min_rr = 2.0;
        let generator = SignalGenerator::new(
            config,
            Arc::new(ManualClock::at_rfc3339("2024-03-01T08:30:00Z")),
        );
        assert!(generator
            .generate(&long_bundle(), &passing_filter_result(), MarketType::Trending, &regime())
            .is_some());
    }

    #[test]
    fn key_factors_rank_top_quality_filters() {
        let generator = generator();
        let signal = generator
            .generate(&long_bundle(), &passing_filter_result(), MarketType::Trending, &regime())
            .expect("signal expected");

        assert!(signal.key_factors.len() <= 4);
        assert!(signal.key_factors[0].starts_with("Structure:"));
        assert!(signal.key_factors.contains(&"mtf confirmation".to_string()));
    }

    #[test]
    fn confidence_blends_score_and_regime() {
        let generator = generator();
        let signal = generator
            .generate(&long_bundle(), &passing_filter_result(), MarketType::Trending, &regime())
            .expect("signal expected");
        // 0.6 * 78 + 0.4 * 85 = 80.8
        assert!((signal.confidence - 80.8).abs() < 1e-9);
    }

    #[test]
    fn levels_bracket_current_price() {
        let generator = generator();
        let signal = generator
            .generate(&long_bundle(), &passing_filter_result(), MarketType::Trending, &regime())
            .expect("signal expected");

        assert!(signal.levels.recent_high >= signal.entry);
        assert!(signal.levels.recent_low < signal.entry);
        assert!(signal.levels.fib_382 > signal.levels.fib_500);
        assert!(signal.levels.fib_500 > signal.levels.fib_618);
    }
}
