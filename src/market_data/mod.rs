// =============================================================================
// Market Data Module
// =============================================================================
//
// Candle model, the per-(symbol, timeframe) cache, and the WebSocket kline
// feed. The cache follows a single-writer (feed task) / many-reader
// (analysis paths take snapshots) discipline.

pub mod cache;
pub mod feed;

pub use cache::{CandleCache, CandleKey};
pub use feed::{CandleEvent, CandleSink, FeedManager};

use serde::{Deserialize, Serialize};

/// A single OHLCV candle.
///
/// `open_time` is the exchange's bar-open timestamp in milliseconds; within a
/// series, consecutive open times differ by exactly the timeframe duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn body_size(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.close.max(self.open)
    }

    pub fn lower_wick(&self) -> f64 {
        self.close.min(self.open) - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Duration of a timeframe label in milliseconds, e.g. "15m" -> 900 000.
pub fn timeframe_ms(tf: &str) -> Option<i64> {
    let (value, unit) = tf.split_at(tf.len().checked_sub(1)?);
    let value: i64 = value.parse().ok()?;
    let unit_ms = match unit {
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => return None,
    };
    Some(value * unit_ms)
}

/// Convert a boundary symbol ("BTC/USDT") to the exchange stream code
/// ("btcusdt"). Boundary keys keep the slash form; only the wire layer uses
/// the compact code.
pub fn stream_code(symbol: &str) -> String {
    symbol.replace('/', "").to_lowercase()
}

/// Convert an exchange symbol ("BTCUSDT") back to boundary form
/// ("BTC/USDT"). The quote asset is assumed to be USDT.
pub fn boundary_symbol(exchange_symbol: &str) -> String {
    let upper = exchange_symbol.to_uppercase();
    match upper.strip_suffix("USDT") {
        Some(base) if !base.is_empty() => format!("{base}/USDT"),
        _ => upper,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_durations() {
        assert_eq!(timeframe_ms("1m"), Some(60_000));
        assert_eq!(timeframe_ms("15m"), Some(900_000));
        assert_eq!(timeframe_ms("1h"), Some(3_600_000));
        assert_eq!(timeframe_ms("4h"), Some(14_400_000));
        assert_eq!(timeframe_ms("1d"), Some(86_400_000));
        assert_eq!(timeframe_ms("weird"), None);
        assert_eq!(timeframe_ms(""), None);
    }

    #[test]
    fn symbol_conversions() {
        assert_eq!(stream_code("BTC/USDT"), "btcusdt");
        assert_eq!(boundary_symbol("BTCUSDT"), "BTC/USDT");
        assert_eq!(boundary_symbol("renderusdt"), "RENDER/USDT");
    }

    #[test]
    fn candle_anatomy() {
        let candle = Candle {
            open_time: 0,
            open: 100.0,
            high: 110.0,
            low: 95.0,
            close: 104.0,
            volume: 50.0,
        };
        assert_eq!(candle.body_size(), 4.0);
        assert_eq!(candle.range(), 15.0);
        assert_eq!(candle.upper_wick(), 6.0);
        assert_eq!(candle.lower_wick(), 5.0);
        assert!(candle.is_bullish());
        assert!((candle.typical_price() - 103.0).abs() < 1e-9);
    }
}
