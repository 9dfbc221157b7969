// =============================================================================
// Tier 3 — additive bonus filters
// =============================================================================
//
// Bonuses on top of the Tier-2 percentage (final score clamps at 100):
//
//   whale_movement +5 | liquidity_grab +8 | iceberg_detection +5
//   news_sentiment +3 (stub) | correlation_break +4 | fibonacci_level +2
//
// Bonuses only ever add; a filter that finds nothing contributes zero.
// =============================================================================

use std::collections::BTreeMap;

use crate::analysis::correlation::DIVERGENCE_THRESHOLD;
use crate::analysis::{analyze_correlation, detect_liquidity};
use crate::types::TradeDirection;

use super::{BonusOutcome, DataBundle};

/// Resting order larger than this notional counts as whale interest.
const WHALE_ORDER_USD: f64 = 50_000.0;
/// Order sizes within this relative tolerance count as the same clip.
const ICEBERG_SIZE_TOLERANCE: f64 = 0.1;
/// Price must sit within this fraction of the swing range of a fib level.
const FIB_PROXIMITY: f64 = 0.02;

pub struct Tier3Filters;

impl Tier3Filters {
    /// Run every bonus filter. Returns (total_bonus, outcomes).
    pub fn evaluate_all(
        direction: Option<TradeDirection>,
        bundle: &DataBundle,
    ) -> (f64, BTreeMap<String, BonusOutcome>) {
        let mut results = BTreeMap::new();
        let mut total = 0.0;

        let mut record = |name: &str, max_bonus: f64, outcome: (f64, String)| {
            let (bonus, message) = outcome;
            let bonus = bonus.min(max_bonus);
            total += bonus;
            results.insert(
                name.to_string(),
                BonusOutcome {
                    bonus,
                    max_bonus,
                    message,
                },
            );
        };

        record("whale_movement", 5.0, check_whales(bundle));
        record("liquidity_grab", 8.0, check_grab(bundle, direction));
        record("iceberg_detection", 5.0, check_iceberg(bundle));
        record("news_sentiment", 3.0, (0.0, "News sentiment check disabled".to_string()));
        record("correlation_break", 4.0, check_correlation_break(bundle, direction));
        record("fibonacci_level", 2.0, check_fibonacci(bundle, direction));

        (total, results)
    }
}

/// Large resting orders on one side of the book.
fn check_whales(bundle: &DataBundle) -> (f64, String) {
    let book = &bundle.orderbook;
    if book.is_empty() {
        return (0.0, "No orderbook data".to_string());
    }

    let large_bids = book
        .bids
        .iter()
        .filter(|(price, size)| price * size > WHALE_ORDER_USD)
        .count();
    let large_asks = book
        .asks
        .iter()
        .filter(|(price, size)| price * size > WHALE_ORDER_USD)
        .count();

    match (large_bids > 0, large_asks > 0) {
        (true, false) => (5.0, format!("Whale accumulation detected ({large_bids} large bids)")),
        (false, true) => (5.0, format!("Whale distribution detected ({large_asks} large asks)")),
        (true, true) => (3.0, "Whale activity on both sides".to_string()),
        (false, false) => (0.0, "No significant whale movement".to_string()),
    }
}

/// Liquidity grab on the 5m window, rewarded fully when it agrees with the
/// candidate direction.
fn check_grab(bundle: &DataBundle, direction: Option<TradeDirection>) -> (f64, String) {
    if bundle.ohlcv_5m.len() < 10 {
        return (0.0, "Insufficient data".to_string());
    }

    let result = detect_liquidity(&bundle.ohlcv_5m, 10);
    match (result.grab, direction) {
        (Some(grab), Some(direction)) if grab == direction => {
            let side = if grab == TradeDirection::Long { "bullish" } else { "bearish" };
            (8.0, format!("Liquidity grab detected ({side})"))
        }
        (Some(grab), _) => (5.0, format!("Liquidity grab: {grab}")),
        (None, _) => (0.0, "No liquidity grab".to_string()),
    }
}

/// Repeating same-size clips near the top of the book.
fn check_iceberg(bundle: &DataBundle) -> (f64, String) {
    let book = &bundle.orderbook;
    if book.is_empty() {
        return (0.0, "No orderbook data".to_string());
    }

    let has_iceberg = |orders: &[(f64, f64)]| {
        if orders.len() < 5 {
            return false;
        }
        let reference = orders[0].1;
        if reference <= 0.0 {
            return false;
        }
        let similar = orders
            .iter()
            .take(10)
            .filter(|(_, size)| ((size - reference) / reference).abs() < ICEBERG_SIZE_TOLERANCE)
            .count();
        similar > 3
    };

    match (has_iceberg(&book.bids), has_iceberg(&book.asks)) {
        (true, false) => (5.0, "Iceberg buy orders detected".to_string()),
        (false, true) => (5.0, "Iceberg sell orders detected".to_string()),
        (true, true) => (3.0, "Iceberg orders on both sides".to_string()),
        (false, false) => (0.0, "No iceberg orders detected".to_string()),
    }
}

/// Decoupling from BTC on the 1h timeframe.
fn check_correlation_break(bundle: &DataBundle, direction: Option<TradeDirection>) -> (f64, String) {
    if bundle.ohlcv_1h.len() < 21 || bundle.btc_1h.len() < 21 {
        return (0.0, "Insufficient correlation data".to_string());
    }

    let pair_closes: Vec<f64> = bundle.ohlcv_1h.iter().map(|c| c.close).collect();
    let btc_closes: Vec<f64> = bundle.btc_1h.iter().map(|c| c.close).collect();
    let result = analyze_correlation(&pair_closes, &btc_closes, 20);

    if result.is_diverging {
        if direction.is_some() && result.btc_correlation < DIVERGENCE_THRESHOLD {
            (
                4.0,
                format!("Breaking correlation with BTC (r={:.2})", result.btc_correlation),
            )
        } else {
            (2.0, "Correlation breaking".to_string())
        }
    } else {
        (0.0, format!("Normal correlation (r={:.2})", result.btc_correlation))
    }
}

/// Proximity to a Fibonacci retracement of the recent 4h swing.
fn check_fibonacci(bundle: &DataBundle, direction: Option<TradeDirection>) -> (f64, String) {
    if bundle.ohlcv_4h.len() < 20 {
        return (0.0, "Insufficient data".to_string());
    }

    let window = &bundle.ohlcv_4h[bundle.ohlcv_4h.len() - 20..];
    let swing_high = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let swing_low = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let diff = swing_high - swing_low;
    if diff <= 0.0 {
        return (0.0, "No swing range".to_string());
    }

    let current = bundle.current_price;
    let threshold = diff * FIB_PROXIMITY;

    for ratio in [0.236, 0.382, 0.5, 0.618, 0.786] {
        let level = swing_high - diff * ratio;
        if (current - level).abs() < threshold {
            let label = format!("At Fibonacci {:.1}%", ratio * 100.0);
            return match direction {
                Some(TradeDirection::Long) if ratio >= 0.5 => (2.0, format!("{label} support")),
                Some(TradeDirection::Short) if ratio <= 0.382 => (2.0, format!("{label} resistance")),
                _ => (1.0, label),
            };
        }
    }

    (0.0, "Not at Fibonacci level".to_string())
}
