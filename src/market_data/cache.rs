// =============================================================================
// CandleCache — bounded ring buffer per (symbol, timeframe)
// =============================================================================
//
// Update semantics:
//   * Same `open_time` as the latest candle  -> replace in place (intra-candle
//     update from the stream).
//   * Newer `open_time`                      -> append, evicting the oldest
//     when the ring exceeds its capacity.
//   * Older `open_time`                      -> dropped (stale replay).
//
// All operations are total and non-blocking; a missing key yields an empty
// snapshot. The feed task is the only writer; analysis paths read snapshots
// concurrently.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Candle;

/// Composite key identifying one candle series.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CandleKey {
    pub symbol: String,
    pub timeframe: String,
}

impl CandleKey {
    pub fn new(symbol: impl Into<String>, timeframe: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: timeframe.into(),
        }
    }
}

impl std::fmt::Display for CandleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

struct Series {
    ring: VecDeque<Candle>,
    last_update: Instant,
}

/// Thread-safe candle store for all (symbol, timeframe) pairs.
pub struct CandleCache {
    series: RwLock<HashMap<CandleKey, Series>>,
    capacity: usize,
}

impl CandleCache {
    /// Create a cache retaining at most `capacity` candles per key.
    pub fn new(capacity: usize) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Atomically replace an entire series (used when seeding from REST).
    /// Input candles must already be in ascending `open_time` order; any
    /// overflow beyond capacity keeps the newest candles.
    pub fn set_series(&self, key: CandleKey, candles: Vec<Candle>) {
        let start = candles.len().saturating_sub(self.capacity);
        let ring: VecDeque<Candle> = candles[start..].iter().cloned().collect();

        debug!(key = %key, count = ring.len(), "series seeded");
        self.series.write().insert(
            key,
            Series {
                ring,
                last_update: Instant::now(),
            },
        );
    }

    /// Merge one candle into the series for `key`.
    ///
    /// Returns `true` when the candle was applied (replace or append) and
    /// `false` when it was dropped as stale.
    pub fn update(&self, key: CandleKey, candle: Candle) -> bool {
        let mut map = self.series.write();
        let series = map.entry(key).or_insert_with(|| Series {
            ring: VecDeque::with_capacity(self.capacity + 1),
            last_update: Instant::now(),
        });

        let last_open_time = series.ring.back().map(|c| c.open_time);
        let applied = match last_open_time {
            Some(last) if last == candle.open_time => {
                *series.ring.back_mut().expect("ring non-empty") = candle;
                true
            }
            Some(last) if last > candle.open_time => false,
            _ => {
                series.ring.push_back(candle);
                while series.ring.len() > self.capacity {
                    series.ring.pop_front();
                }
                true
            }
        };

        if applied {
            series.last_update = Instant::now();
        }
        applied
    }

    /// Snapshot of the series (oldest first), optionally limited to the most
    /// recent `limit` candles. Missing key -> empty vec.
    pub fn get_series(&self, key: &CandleKey, limit: Option<usize>) -> Vec<Candle> {
        let map = self.series.read();
        match map.get(key) {
            Some(series) => {
                let len = series.ring.len();
                let start = match limit {
                    Some(limit) => len.saturating_sub(limit),
                    None => 0,
                };
                series.ring.iter().skip(start).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Number of candles currently held for `key`.
    pub fn len(&self, key: &CandleKey) -> usize {
        self.series.read().get(key).map_or(0, |s| s.ring.len())
    }

    /// Close price of the latest candle, if any.
    pub fn last_close(&self, key: &CandleKey) -> Option<f64> {
        self.series
            .read()
            .get(key)
            .and_then(|s| s.ring.back())
            .map(|c| c.close)
    }

    /// Whether the series has not been touched within `max_age`. A missing
    /// key is always stale.
    pub fn is_stale(&self, key: &CandleKey, max_age: Duration) -> bool {
        match self.series.read().get(key) {
            Some(series) => series.last_update.elapsed() > max_age,
            None => true,
        }
    }
}
