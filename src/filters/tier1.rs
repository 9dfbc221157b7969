// =============================================================================
// Tier 1 — mandatory gates
// =============================================================================
//
// All five must pass before any quality scoring happens:
//   1. BTC regime   — tradable, not opposite the candidate direction,
//                     confidence at least 20%.
//   2. Structure    — primary timeframe shows more than weak structure, or a
//                     confirmed break of structure.
//   3. Volume       — current bar at least 0.7x the mean of the previous 4.
//   4. Liquidity    — spread <= 0.1%, top-5 depth >= $10k per side; a missing
//                     orderbook passes by policy (the exchange feed is
//                     optional here, price action is not).
//   5. Session      — IST hour inside a trading window and outside every
//                     avoid window.
// =============================================================================

use std::collections::BTreeMap;

use crate::analysis::detect_structure;
use crate::clock::Clock;
use crate::regime::BtcRegimeResult;
use crate::session::{self, AvoidWindow, SessionCheck};
use crate::types::{StructureStrength, TradeDirection, TrendDirection};

use super::{DataBundle, GateOutcome};

/// Minimum BTC-regime confidence for any trade.
const MIN_BTC_CONFIDENCE: f64 = 20.0;
/// Current volume must be at least this multiple of the recent mean.
const MIN_VOLUME_RATIO: f64 = 0.7;
/// Maximum tolerated best-bid/ask spread, percent.
const MAX_SPREAD_PCT: f64 = 0.1;
/// Minimum notional depth across the top 5 levels, per side.
const MIN_DEPTH_USD: f64 = 10_000.0;

pub struct Tier1Filters;

impl Tier1Filters {
    /// Run all gates. Returns the overall verdict and the per-gate outcomes.
    pub fn evaluate_all(
        direction: Option<TradeDirection>,
        btc_regime: &BtcRegimeResult,
        bundle: &DataBundle,
        clock: &dyn Clock,
        avoid_windows: &[AvoidWindow],
    ) -> (bool, BTreeMap<String, GateOutcome>) {
        let mut results = BTreeMap::new();

        let (passed, message) = check_btc_regime(btc_regime, direction);
        results.insert("btc_regime".to_string(), GateOutcome { passed, message });

        let (passed, message) = check_structure(bundle);
        results.insert("structure".to_string(), GateOutcome { passed, message });

        let (passed, message) = check_volume(bundle);
        results.insert("volume".to_string(), GateOutcome { passed, message });

        let (passed, message) = check_liquidity(bundle);
        results.insert("liquidity".to_string(), GateOutcome { passed, message });

        let (passed, message) = check_session(clock, avoid_windows);
        results.insert("session".to_string(), GateOutcome { passed, message });

        let all_passed = results.values().all(|r| r.passed);
        (all_passed, results)
    }
}

fn check_btc_regime(
    regime: &BtcRegimeResult,
    direction: Option<TradeDirection>,
) -> (bool, String) {
    if !regime.can_trade {
        let reason = regime.reason.as_deref().unwrap_or("blocked");
        return (false, format!("BTC regime blocks: {reason}"));
    }

    if let Some(direction) = direction {
        if direction == TradeDirection::Long && regime.direction == TrendDirection::Down {
            return (false, "BTC DOWN but trying LONG".to_string());
        }
        if direction == TradeDirection::Short && regime.direction == TrendDirection::Up {
            return (false, "BTC UP but trying SHORT".to_string());
        }
    }

    if regime.confidence < MIN_BTC_CONFIDENCE {
        return (
            false,
            format!("BTC confidence too low: {:.0}%", regime.confidence),
        );
    }

    (
        true,
        format!("BTC {} ({:.0}%)", regime.regime, regime.confidence),
    )
}

fn check_structure(bundle: &DataBundle) -> (bool, String) {
    if bundle.ohlcv_15m.len() < 20 {
        return (false, "Insufficient data for structure".to_string());
    }

    let structure = detect_structure(&bundle.ohlcv_15m);
    if structure.strength == StructureStrength::Weak && !structure.bos_detected {
        return (false, "Structure too weak".to_string());
    }

    (
        true,
        format!("Structure: {} ({})", structure.direction, structure.strength),
    )
}

fn check_volume(bundle: &DataBundle) -> (bool, String) {
    if bundle.ohlcv_15m.len() < 20 {
        return (false, "Insufficient data for volume check".to_string());
    }

    let volumes: Vec<f64> = bundle.ohlcv_15m[bundle.ohlcv_15m.len() - 5..]
        .iter()
        .map(|c| c.volume)
        .collect();
    let average = volumes[..4].iter().sum::<f64>() / 4.0;
    if average <= 0.0 {
        return (false, "No recent volume".to_string());
    }

    let ratio = volumes[4] / average;
    if ratio < MIN_VOLUME_RATIO {
        return (false, format!("Volume too low: {ratio:.1}x average"));
    }

    (true, format!("Volume: {ratio:.1}x average"))
}

fn check_liquidity(bundle: &DataBundle) -> (bool, String) {
    let book = &bundle.orderbook;
    if book.is_empty() {
        return (true, "No orderbook data - allowing".to_string());
    }

    let spread = match book.spread_pct() {
        Some(spread) => spread,
        None => return (true, "No orderbook data - allowing".to_string()),
    };
    if spread > MAX_SPREAD_PCT {
        return (false, format!("Spread too wide: {spread:.3}%"));
    }

    let (bid_depth, ask_depth) = book.depth_usd(5);
    if bid_depth < MIN_DEPTH_USD || ask_depth < MIN_DEPTH_USD {
        return (false, "Insufficient market depth".to_string());
    }

    (true, format!("Spread: {spread:.3}%"))
}

fn check_session(clock: &dyn Clock, avoid_windows: &[AvoidWindow]) -> (bool, String) {
    match session::check_session(clock, avoid_windows) {
        SessionCheck::Active(session) => (true, format!("Active session: {session}")),
        SessionCheck::Avoided(label) => (false, format!("Avoid window: {label}")),
        SessionCheck::Closed => (false, "No active session".to_string()),
    }
}
