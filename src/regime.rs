// =============================================================================
// Market Regime Detection — coarse market type + detailed BTC regime
// =============================================================================
//
// Coarse type (first match wins):
//   1. HIGH_VOL — 1h ATR% > 3.0
//   2. TRENDING — 15m ADX > 25
//   3. CHOPPY   — otherwise
//   (UNKNOWN when the 15m series holds fewer than 30 candles)
//
// Detailed BTC regime blends three sub-scores, each on [-20, +20]:
//   0.40 * ema_alignment(15m, 1h, 4h)   weights 0.6 / 1.0 / 1.4
//   0.35 * structure(4h)                HH/HL pattern score
//   0.25 * momentum(15m)                RSI-centred, volume-scaled
//
// Classification by total score; confidence is a function of ADX. The
// tradability gate applies the configured confidence/ADX floors per regime
// family.
// =============================================================================

use serde::Serialize;

use crate::analysis::find_swing_points;
use crate::config::BtcRegimeConfig;
use crate::indicators::{calculate_adx, calculate_atr_pct, calculate_ema, calculate_rsi};
use crate::market_data::Candle;
use crate::types::{BtcRegime, MarketType, StructureStrength, TradeDirection, TrendDirection, TradeMode};

/// 1h ATR% above this is a high-volatility market.
const HIGH_VOL_ATR_PCT: f64 = 3.0;
/// 15m ADX above this is a trending market.
const TRENDING_ADX: f64 = 25.0;
/// Minimum 15m candles for any regime claim.
const MIN_CANDLES: usize = 30;
/// Bounded history of coarse classifications.
const HISTORY_SIZE: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct BtcRegimeResult {
    pub regime: BtcRegime,
    pub confidence: f64,
    pub direction: TrendDirection,
    pub strength: StructureStrength,
    pub can_trade: bool,
    pub trade_mode: TradeMode,
    pub reason: Option<String>,
    pub adx: f64,
    pub total_score: f64,
}

impl BtcRegimeResult {
    pub fn unknown(reason: &str) -> Self {
        Self {
            regime: BtcRegime::Unknown,
            confidence: 0.0,
            direction: TrendDirection::Sideways,
            strength: StructureStrength::Weak,
            can_trade: false,
            trade_mode: TradeMode::Block,
            reason: Some(reason.to_string()),
            adx: 0.0,
            total_score: 0.0,
        }
    }
}

pub struct RegimeDetector {
    config: BtcRegimeConfig,
    history: Vec<MarketType>,
}

impl RegimeDetector {
    pub fn new(config: BtcRegimeConfig) -> Self {
        Self {
            config,
            history: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Coarse market type
    // -------------------------------------------------------------------------

    /// Classify the coarse market type from BTC 15m and 1h windows.
    pub fn detect_market_type(&mut self, btc_15m: &[Candle], btc_1h: &[Candle]) -> MarketType {
        if btc_15m.len() < MIN_CANDLES {
            return MarketType::Unknown;
        }

        let adx = calculate_adx(btc_15m, 14);
        let atr_pct = if btc_1h.len() < 15 {
            1.0
        } else {
            calculate_atr_pct(btc_1h, 14)
        };

        let market = if atr_pct > HIGH_VOL_ATR_PCT {
            MarketType::HighVol
        } else if adx > TRENDING_ADX {
            MarketType::Trending
        } else {
            MarketType::Choppy
        };

        self.history.push(market);
        if self.history.len() > HISTORY_SIZE {
            self.history.remove(0);
        }

        market
    }

    /// Recent coarse classifications, newest last.
    pub fn history(&self) -> &[MarketType] {
        &self.history
    }

    // -------------------------------------------------------------------------
    // Detailed BTC regime
    // -------------------------------------------------------------------------

    pub fn detect_btc_regime(
        &self,
        btc_15m: &[Candle],
        btc_1h: &[Candle],
        btc_4h: &[Candle],
    ) -> BtcRegimeResult {
        if btc_15m.len() < MIN_CANDLES {
            return BtcRegimeResult::unknown("Insufficient BTC history");
        }

        let ema_score = ema_alignment_score(btc_15m, btc_1h, btc_4h);
        let structure_score = structure_score(btc_4h);
        let momentum_score = momentum_score(btc_15m);

        let total =
            (ema_score * 0.40 + structure_score * 0.35 + momentum_score * 0.25).clamp(-20.0, 20.0);

        let adx = calculate_adx(btc_15m, 14);
        let (regime, confidence) = classify(total, adx);
        let (can_trade, trade_mode, reason) = self.tradability(regime, confidence, adx);

        let (direction, strength) = if total > 3.0 {
            (
                TrendDirection::Up,
                if total.abs() > 15.0 {
                    StructureStrength::Strong
                } else {
                    StructureStrength::Moderate
                },
            )
        } else if total < -3.0 {
            (
                TrendDirection::Down,
                if total.abs() > 15.0 {
                    StructureStrength::Strong
                } else {
                    StructureStrength::Moderate
                },
            )
        } else {
            (TrendDirection::Sideways, StructureStrength::Weak)
        };

        BtcRegimeResult {
            regime,
            confidence,
            direction,
            strength,
            can_trade,
            trade_mode,
            reason,
            adx,
            total_score: total,
        }
    }

    fn tradability(
        &self,
        regime: BtcRegime,
        confidence: f64,
        adx: f64,
    ) -> (bool, TradeMode, Option<String>) {
        if regime == BtcRegime::Unknown {
            return (false, TradeMode::Block, Some("Unknown regime".to_string()));
        }

        if confidence < self.config.hard_block_confidence {
            return (
                false,
                TradeMode::Block,
                Some(format!("Confidence {confidence:.0}% too low")),
            );
        }

        if regime == BtcRegime::Choppy {
            if confidence < self.config.choppy_min_confidence {
                return (
                    false,
                    TradeMode::Block,
                    Some(format!("Choppy + low confidence {confidence:.0}%")),
                );
            }
            if adx < self.config.choppy_adx_min {
                return (
                    false,
                    TradeMode::Block,
                    Some(format!("Choppy + weak ADX {adx:.1}")),
                );
            }
            return (true, TradeMode::Range, None);
        }

        // Trend family: bull/bear, strong or not.
        if confidence < self.config.trend_min_confidence {
            return (
                false,
                TradeMode::Block,
                Some(format!("Trend + low confidence {confidence:.0}%")),
            );
        }
        if adx < self.config.trend_adx_min {
            return (
                false,
                TradeMode::Block,
                Some(format!("Trend + weak ADX {adx:.1}")),
            );
        }
        (true, TradeMode::Trend, None)
    }

    /// Confidence for a specific trade direction: full when aligned with the
    /// regime, halved (and strength-scaled) against it.
    pub fn confidence_for_direction(
        &self,
        direction: TradeDirection,
        regime: &BtcRegimeResult,
    ) -> f64 {
        if !regime.can_trade {
            return 0.0;
        }

        let aligned = matches!(
            (direction, regime.direction),
            (TradeDirection::Long, TrendDirection::Up)
                | (TradeDirection::Short, TrendDirection::Down)
        );
        if aligned {
            return regime.confidence;
        }

        let base = regime.confidence / 2.0;
        match regime.strength {
            StructureStrength::Strong => base / 2.0,
            StructureStrength::Moderate => base * 0.7,
            StructureStrength::Weak => base,
        }
    }
}

// =============================================================================
// Sub-scores
// =============================================================================

/// EMA-stack alignment across 15m / 1h / 4h, clamped to [-20, +20].
fn ema_alignment_score(tf_15m: &[Candle], tf_1h: &[Candle], tf_4h: &[Candle]) -> f64 {
    let mut score: f64 = 0.0;

    for (candles, weight) in [(tf_15m, 0.6), (tf_1h, 1.0), (tf_4h, 1.4)] {
        if candles.len() < 30 {
            continue;
        }
        let closes: Vec<f64> = candles[candles.len() - 30..].iter().map(|c| c.close).collect();
        let ema9 = calculate_ema(&closes, 9);
        let ema21 = calculate_ema(&closes, 21);
        let ema200 = calculate_ema(&closes, 200);

        if ema9 > ema21 && ema21 > ema200 {
            score += 8.0 * weight;
        } else if ema9 < ema21 && ema21 < ema200 {
            score -= 8.0 * weight;
        } else if ema9 > ema21 {
            score += 3.0 * weight;
        } else if ema9 < ema21 {
            score -= 3.0 * weight;
        }
    }

    score.clamp(-20.0, 20.0)
}

/// 4h swing-pattern score: HH∧HL +15, LH∧LL -15, single +8/-8, default +3
/// when swings exist but form no pattern bias.
fn structure_score(tf_4h: &[Candle]) -> f64 {
    if tf_4h.len() < 20 {
        return 0.0;
    }

    let window = &tf_4h[tf_4h.len() - 20..];
    let swings = find_swing_points(window, 2, 2);

    if swings.highs.len() < 2 || swings.lows.len() < 2 {
        return 3.0;
    }

    let highs = &swings.highs[swings.highs.len() - 2..];
    let lows = &swings.lows[swings.lows.len() - 2..];

    let hh = highs[1] > highs[0];
    let hl = lows[1] > lows[0];
    let lh = highs[1] < highs[0];
    let ll = lows[1] < lows[0];

    if hh && hl {
        15.0
    } else if lh && ll {
        -15.0
    } else if hh || hl {
        8.0
    } else if lh || ll {
        -8.0
    } else {
        0.0
    }
}

/// 15m momentum: RSI distance from the 40/60 band, volume-scaled, clamped to
/// [-10, +10].
fn momentum_score(tf_15m: &[Candle]) -> f64 {
    if tf_15m.len() < 15 {
        return 0.0;
    }

    let closes: Vec<f64> = tf_15m.iter().map(|c| c.close).collect();
    let rsi = calculate_rsi(&closes, 14);

    let mut score = if rsi > 60.0 {
        (rsi - 60.0) / 40.0 * 8.0
    } else if rsi < 40.0 {
        -(40.0 - rsi) / 40.0 * 8.0
    } else {
        0.0
    };

    if tf_15m.len() >= 5 {
        let volumes: Vec<f64> = tf_15m[tf_15m.len() - 5..].iter().map(|c| c.volume).collect();
        let avg = volumes[..4].iter().sum::<f64>() / 4.0;
        if avg > 0.0 {
            let ratio = volumes[4] / avg;
            if ratio > 1.2 {
                score *= 1.2;
            } else if ratio < 0.8 {
                score *= 0.8;
            }
        }
    }

    score.clamp(-10.0, 10.0)
}

/// Regime bucket + ADX-derived confidence for a total score.
fn classify(total: f64, adx: f64) -> (BtcRegime, f64) {
    let adx_conf = if adx > 25.0 {
        (adx * 2.5).min(100.0)
    } else if adx > 20.0 {
        (adx * 2.2).min(80.0)
    } else {
        (adx * 2.0).min(60.0)
    };

    if total >= 15.0 {
        (BtcRegime::StrongBull, (adx_conf + 15.0).min(100.0))
    } else if total >= 5.0 {
        (BtcRegime::Bull, adx_conf)
    } else if total <= -15.0 {
        (BtcRegime::StrongBear, (adx_conf + 15.0).min(100.0))
    } else if total <= -5.0 {
        (BtcRegime::Bear, adx_conf)
    } else {
        (BtcRegime::Choppy, adx_conf.min(70.0))
    }
}
