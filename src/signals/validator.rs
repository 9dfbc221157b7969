// =============================================================================
// Signal Validation — invariants enforced before emission
// =============================================================================
//
//   * entry positive, stop and target each at least 0.01% away from entry
//   * LONG  => stop < entry < target (SHORT symmetric)
//   * reward:risk at least the market profile's floor, at most 10
//   * score and confidence inside [0, 100]
//   * age at emission no more than 5 minutes
//
// A rejected signal is dropped and logged by the caller; validation itself
// never logs.
// =============================================================================

use chrono::{DateTime, Duration, Utc};

use crate::types::TradeDirection;

use super::Signal;

/// Minimum relative distance of stop/target from entry.
const MIN_LEVEL_DISTANCE: f64 = 0.0001; // 0.01%
/// Sanity ceiling on reward:risk.
const MAX_RR: f64 = 10.0;
/// Maximum signal age at emission.
const MAX_AGE_SECS: i64 = 300;

/// Validate `signal` against all emission invariants. Returns every
/// violation, not just the first.
pub fn validate_signal(
    signal: &Signal,
    min_rr: f64,
    now: DateTime<Utc>,
) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if signal.entry <= 0.0 {
        errors.push(format!("entry must be positive, got {}", signal.entry));
    } else {
        let sl_distance = (signal.entry - signal.stop_loss).abs() / signal.entry;
        if sl_distance < MIN_LEVEL_DISTANCE {
            errors.push("stop loss indistinguishable from entry".to_string());
        }
        let tp_distance = (signal.entry - signal.take_profit).abs() / signal.entry;
        if tp_distance < MIN_LEVEL_DISTANCE {
            errors.push("take profit indistinguishable from entry".to_string());
        }
    }

    match signal.direction {
        TradeDirection::Long => {
            if !(signal.stop_loss < signal.entry && signal.entry < signal.take_profit) {
                errors.push("LONG requires stop < entry < target".to_string());
            }
        }
        TradeDirection::Short => {
            if !(signal.take_profit < signal.entry && signal.entry < signal.stop_loss) {
                errors.push("SHORT requires target < entry < stop".to_string());
            }
        }
    }

    if signal.rr_ratio < min_rr {
        errors.push(format!(
            "reward:risk {:.2} below the {min_rr:.2} floor",
            signal.rr_ratio
        ));
    }
    if signal.rr_ratio > MAX_RR {
        errors.push(format!("reward:risk {:.2} fails sanity ceiling", signal.rr_ratio));
    }

    if !(0.0..=100.0).contains(&signal.score) {
        errors.push(format!("score {} outside [0, 100]", signal.score));
    }
    if !(0.0..=100.0).contains(&signal.confidence) {
        errors.push(format!("confidence {} outside [0, 100]", signal.confidence));
    }

    let age = now.signed_duration_since(signal.timestamp);
    if age > Duration::seconds(MAX_AGE_SECS) {
        errors.push(format!("signal is {}s old, limit {MAX_AGE_SECS}s", age.num_seconds()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::PriceLevels;
    use crate::types::{BtcRegime, MarketType, SignalGrade, StructureStrength};

    fn base_signal() -> Signal {
        Signal {
            symbol: "ETH/USDT".to_string(),
            direction: TradeDirection::Long,
            entry: 100.0,
            stop_loss: 98.0,
            take_profit: 104.0,
            rr_ratio: 2.0,
            score: 78.0,
            grade: SignalGrade::BPlus,
            confidence: 80.0,
            market_type: MarketType::Trending,
            btc_regime: BtcRegime::Bull,
            structure_strength: StructureStrength::Moderate,
            levels: PriceLevels::default(),
            filters_passed: 7,
            key_factors: Vec::new(),
            atr_pct: 1.2,
            timestamp: DateTime::parse_from_rfc3339("2024-03-01T08:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
            position: None,
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T08:31:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn valid_long_passes() {
        assert!(validate_signal(&base_signal(), 1.5, now()).is_ok());
    }

    #[test]
    fn valid_short_passes() {
        let mut signal = base_signal();
        signal.direction = TradeDirection::Short;
        signal.stop_loss = 102.0;
        signal.take_profit = 96.0;
        assert!(validate_signal(&signal, 1.5, now()).is_ok());
    }

    #[test]
    fn stop_equal_to_entry_rejected() {
        let mut signal = base_signal();
        signal.stop_loss = signal.entry;
        let errors = validate_signal(&signal, 1.5, now()).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("stop loss")));
    }

    #[test]
    fn inverted_long_levels_rejected() {
        let mut signal = base_signal();
        signal.stop_loss = 102.0; // stop above entry on a LONG
        let errors = validate_signal(&signal, 1.5, now()).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("LONG requires")));
    }

    #[test]
    fn rr_floor_strictly_enforced() {
        let mut signal = base_signal();
        signal.rr_ratio = 1.499;
        assert!(validate_signal(&signal, 1.5, now()).is_err());

        signal.rr_ratio = 1.5;
        assert!(validate_signal(&signal, 1.5, now()).is_ok());
    }

    #[test]
    fn stale_signal_rejected() {
        let signal = base_signal();
        let stale_now = DateTime::parse_from_rfc3339("2024-03-01T08:36:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let errors = validate_signal(&signal, 1.5, stale_now).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("old")));
    }

    #[test]
    fn age_limit_boundary_inclusive() {
        let signal = base_signal();
        // Exactly 300 s old still passes.
        let at_limit = signal.timestamp + Duration::seconds(300);
        assert!(validate_signal(&signal, 1.5, at_limit).is_ok());

        let over_limit = signal.timestamp + Duration::seconds(301);
        assert!(validate_signal(&signal, 1.5, over_limit).is_err());
    }

    #[test]
    fn multiple_violations_all_reported() {
        let mut signal = base_signal();
        signal.entry = -1.0;
        signal.rr_ratio = 20.0;
        signal.score = 150.0;
        let errors = validate_signal(&signal, 1.5, now()).unwrap_err();
        assert!(errors.len() >= 3, "got {errors:?}");
    }
}
