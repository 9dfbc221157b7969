// =============================================================================
// Filter Orchestrator — tiered sieve with short-circuit semantics
// =============================================================================
//
// Tier 1 failure ends evaluation at grade D. A Tier-2 percentage under the
// market-type threshold ends at grade C. Otherwise Tier-3 bonuses are added
// (clamped to 100), the grade is assigned, and the result passes only at
// grade B or better.
//
// The orchestrator never returns an error; the `passed` field of the
// returned result is authoritative.
// =============================================================================

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::RuntimeConfig;
use crate::regime::BtcRegimeResult;
use crate::session::AvoidWindow;
use crate::types::{MarketType, SignalGrade, TradeDirection};

use super::tier1::Tier1Filters;
use super::tier2::Tier2Filters;
use super::tier3::Tier3Filters;
use super::{DataBundle, FilterResult};

/// Evaluation counters surfaced in the status snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FilterStats {
    pub total_evaluations: u64,
    pub tier1_passed: u64,
    pub tier2_passed: u64,
    pub approved: u64,
}

pub struct FilterOrchestrator {
    tier2: Tier2Filters,
    avoid_windows: Vec<AvoidWindow>,
    clock: Arc<dyn Clock>,
    stats: parking_lot::Mutex<FilterStats>,
}

impl FilterOrchestrator {
    pub fn new(config: &RuntimeConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            tier2: Tier2Filters::new(
                config.tier2_filters.clone(),
                config.min_atr_pct,
                config.max_atr_pct,
            ),
            avoid_windows: config.avoid_windows.clone(),
            clock,
            stats: parking_lot::Mutex::new(FilterStats::default()),
        }
    }

    pub fn stats(&self) -> FilterStats {
        *self.stats.lock()
    }

    /// Evaluate all tiers for one symbol. Pure with respect to the bundle:
    /// the same inputs always produce the same result.
    pub fn evaluate(
        &self,
        direction: Option<TradeDirection>,
        market_type: MarketType,
        btc_regime: &BtcRegimeResult,
        bundle: &DataBundle,
    ) -> FilterResult {
        self.stats.lock().total_evaluations += 1;
        let symbol = &bundle.symbol;

        // ── Tier 1: mandatory gates ─────────────────────────────────────
        let (tier1_passed, tier1) = Tier1Filters::evaluate_all(
            direction,
            btc_regime,
            bundle,
            self.clock.as_ref(),
            &self.avoid_windows,
        );

        if !tier1_passed {
            let failed: Vec<&str> = tier1
                .iter()
                .filter(|(_, outcome)| !outcome.passed)
                .map(|(name, _)| name.as_str())
                .collect();
            let reason = format!("Tier1 filters failed: {}", failed.join(", "));
            debug!(%symbol, %reason, "evaluation rejected at tier 1");

            return FilterResult {
                passed: false,
                tier1,
                tier2: Default::default(),
                tier3: Default::default(),
                score: 0.0,
                grade: SignalGrade::D,
                reason,
            };
        }
        self.stats.lock().tier1_passed += 1;

        // ── Tier 2: weighted quality score ──────────────────────────────
        let (tier2_passed, tier2_score, tier2) =
            self.tier2.evaluate_all(direction, market_type, bundle);

        if !tier2_passed {
            let threshold = market_type.tier2_threshold();
            let reason =
                format!("Tier2 score too low: {tier2_score:.1}% (need {threshold:.0}%)");
            debug!(%symbol, %reason, "evaluation rejected at tier 2");

            return FilterResult {
                passed: false,
                tier1,
                tier2,
                tier3: Default::default(),
                score: tier2_score,
                grade: SignalGrade::C,
                reason,
            };
        }
        self.stats.lock().tier2_passed += 1;

        // ── Tier 3: bonuses ─────────────────────────────────────────────
        let (bonus, tier3) = Tier3Filters::evaluate_all(direction, bundle);
        let final_score = (tier2_score + bonus).min(100.0);
        let grade = SignalGrade::from_score(final_score);

        let passed = grade.can_trade();
        let reason = if passed {
            self.stats.lock().approved += 1;
            info!(%symbol, score = final_score, %grade, "filters approved");
            format!("All filters passed. Score: {final_score:.0}% ({grade})")
        } else {
            debug!(%symbol, %grade, "final grade below tradable");
            format!("Final grade too low: {grade} (need B or better)")
        };

        FilterResult {
            passed,
            tier1,
            tier2,
            tier3,
            score: final_score,
            grade,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_clock::ManualClock;
    use crate::exchange::OrderBook;
    use crate::market_data::Candle;
    use crate::types::{BtcRegime, StructureStrength, TradeMode, TrendDirection};

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

    /// IST 14:00 — London session.
    fn london_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::at_rfc3339("2024-03-01T08:30:00Z"))
    }

    fn orchestrator() -> FilterOrchestrator {
        FilterOrchestrator::new(&RuntimeConfig::default(), london_clock())
    }

    fn bull_regime() -> BtcRegimeResult {
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

    /// Strong-bull breakout bundle: range with pivots, breakout close on
    /// expanding volume, supportive book and futures data.
    fn approval_bundle() -> DataBundle {
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
        // Breakout above the prior swing highs on 1.4x volume.
        ohlcv_15m.push(Candle {
            open_time: 0,
            open: 102.0,
            high: 107.2,
            low: 101.8,
            close: 106.8,
            volume: 14.0,
        });
        let current_price = 106.8;

        let ohlcv_1h: Vec<Candle> = (0..60).map(|i| candle(95.0 + i as f64 * 0.4, 40.0)).collect();
        let ohlcv_4h: Vec<Candle> = (0..40).map(|i| candle(80.0 + i as f64 * 0.8, 100.0)).collect();
        let btc_1h: Vec<Candle> = (0..60).map(|i| candle(40_000.0 + i as f64 * 30.0, 500.0)).collect();

        DataBundle {
            symbol: "ETH/USDT".to_string(),
            ohlcv_5m: ohlcv_15m.clone(),
            ohlcv_15m,
            ohlcv_1h,
            ohlcv_4h,
            btc_1h,
            funding_rate: 0.00005,
            open_interest: 12_000.0,
            orderbook: OrderBook {
                bids: vec![(106.7, 500.0); 5],  // ~$53k per level
                asks: vec![(106.73, 500.0); 5], // 0.03% spread
            },
            current_price,
        }
    }

    #[test]
    fn strong_bull_breakout_is_approved() {
        let orchestrator = orchestrator();
        let result = orchestrator.evaluate(
            Some(TradeDirection::Long),
            MarketType::Trending,
            &bull_regime(),
            &approval_bundle(),
        );

        assert!(result.passed, "reason: {}", result.reason);
        assert!(result.score >= 60.0);
        assert!(result.grade.can_trade());
        assert!(result.tier1.values().all(|gate| gate.passed));

        let stats = orchestrator.stats();
        assert_eq!(stats.total_evaluations, 1);
        assert_eq!(stats.approved, 1);
    }

    #[test]
    fn blocked_regime_short_circuits_at_tier1() {
        let orchestrator = orchestrator();
        let mut regime = bull_regime();
        regime.can_trade = false;
        regime.trade_mode = TradeMode::Block;
        regime.reason = Some("Choppy + weak ADX 16.0".to_string());

        let result = orchestrator.evaluate(
            None,
            MarketType::Choppy,
            &regime,
            &approval_bundle(),
        );

        assert!(!result.passed);
        assert_eq!(result.grade, SignalGrade::D);
        assert!(result.reason.contains("Tier1 filters failed"));
        assert!(result.reason.contains("btc_regime"));
        assert!(result.tier2.is_empty(), "tier 2 must not run after tier-1 failure");
        assert_eq!(orchestrator.stats().tier1_passed, 0);
    }

    #[test]
    fn high_vol_threshold_rejects_marginal_score() {
        let orchestrator = orchestrator();
        // Degrade the bundle: no orderbook, no OI, conflicting 1h trend, and
        // wide ATR via tall bars.
        let mut bundle = approval_bundle();
        bundle.orderbook = OrderBook::default();
        bundle.open_interest = 0.0;
        bundle.ohlcv_1h = (0..60).map(|i| candle(150.0 - i as f64 * 0.4, 40.0)).collect();
        for candle in bundle.ohlcv_15m.iter_mut() {
            let mid = candle.close;
            candle.high = mid * 1.02;
            candle.low = mid * 0.98; // ~4% range -> ATR% above the cap
        }

        let result = orchestrator.evaluate(
            Some(TradeDirection::Long),
            MarketType::HighVol,
            &bull_regime(),
            &bundle,
        );

        assert!(!result.passed);
        assert_eq!(result.grade, SignalGrade::C);
        assert!(result.reason.contains("need 65%"), "reason: {}", result.reason);
        assert!(!result.tier2["atr_percent"].passed);
    }

    #[test]
    fn identical_input_yields_identical_result() {
        let orchestrator = orchestrator();
        let bundle = approval_bundle();
        let regime = bull_regime();

        let a = orchestrator.evaluate(Some(TradeDirection::Long), MarketType::Trending, &regime, &bundle);
        let b = orchestrator.evaluate(Some(TradeDirection::Long), MarketType::Trending, &regime, &bundle);

        assert_eq!(a.passed, b.passed);
        assert_eq!(a.score, b.score);
        assert_eq!(a.grade, b.grade);
        assert_eq!(a.reason, b.reason);
    }

    #[test]
    fn passed_implies_all_invariants() {
        let orchestrator = orchestrator();
        let result = orchestrator.evaluate(
            Some(TradeDirection::Long),
            MarketType::Trending,
            &bull_regime(),
            &approval_bundle(),
        );

        if result.passed {
            assert!(result.tier1.values().all(|g| g.passed));
            assert!(result.score >= MarketType::Trending.tier2_threshold());
            assert!(result.grade.can_trade());
        }
    }
}
