// =============================================================================
// Kline Feed — multiplexed WebSocket subscription with dedup + reconnect
// =============================================================================
//
// One logical subscription covers every configured (symbol, timeframe) pair
// via the combined-stream endpoint. Incoming klines are merged into the
// cache, then forwarded to the `CandleSink` exactly once per closed
// (symbol, timeframe, open_time) triple — the dedup set keeps that guarantee
// across reconnects, where the exchange replays the last closed bar.
//
// Reconnect policy: exponential backoff (base 5 s, factor 2). The attempt
// counter resets after a healthy connection; when it exceeds the retry cap
// the feed returns a fatal error to its supervisor instead of looping
// forever — the engine then degrades rather than crash the process.
// =============================================================================

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::cache::{CandleCache, CandleKey};
use super::{boundary_symbol, stream_code, Candle};

/// Futures combined-stream endpoint.
const STREAM_BASE: &str = "wss://fstream.binance.com";

/// WebSocket read timeout; a silent socket longer than this triggers a
/// reconnect.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on remembered closed-candle triples.
const DEDUP_CAPACITY: usize = 4096;

/// A parsed kline update.
#[derive(Debug, Clone)]
pub struct CandleEvent {
    /// Boundary-form symbol, e.g. "BTC/USDT".
    pub symbol: String,
    pub timeframe: String,
    pub candle: Candle,
    pub is_closed: bool,
}

/// Receiver of candle events. The engine implements this; the feed holds it
/// as a trait object, which keeps ownership one-directional (engine owns
/// feed, feed only knows the sink interface).
pub trait CandleSink: Send + Sync {
    fn on_candle(&self, event: CandleEvent);
}

// =============================================================================
// Dedup set
// =============================================================================

/// Remembers closed-candle triples so a replayed bar after reconnect does not
/// fire a second close event. Bounded FIFO eviction.
pub struct DedupSet {
    seen: HashSet<(String, String, i64)>,
    order: VecDeque<(String, String, i64)>,
    capacity: usize,
}

impl DedupSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Returns `true` when this triple is new (and records it).
    pub fn insert(&mut self, symbol: &str, timeframe: &str, open_time: i64) -> bool {
        let key = (symbol.to_string(), timeframe.to_string(), open_time);
        if self.seen.contains(&key) {
            return false;
        }
        self.seen.insert(key.clone());
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
        true
    }
}

// =============================================================================
// FeedManager
// =============================================================================

pub struct FeedManager {
    cache: Arc<CandleCache>,
    sink: Arc<dyn CandleSink>,
    pairs: Vec<String>,
    timeframes: Vec<String>,
    reconnect_delay: Duration,
    max_retries: u32,
    ping_interval: Duration,
    dedup: Mutex<DedupSet>,
}

impl FeedManager {
    pub fn new(
        cache: Arc<CandleCache>,
        sink: Arc<dyn CandleSink>,
        pairs: Vec<String>,
        timeframes: Vec<String>,
        reconnect_delay_secs: u64,
        max_retries: u32,
        ping_interval_secs: u64,
    ) -> Self {
        Self {
            cache,
            sink,
            pairs,
            timeframes,
            reconnect_delay: Duration::from_secs(reconnect_delay_secs),
            max_retries,
            ping_interval: Duration::from_secs(ping_interval_secs),
            dedup: Mutex::new(DedupSet::new(DEDUP_CAPACITY)),
        }
    }

    /// Combined-stream URL covering all (symbol, timeframe) pairs.
    fn stream_url(&self) -> String {
        let mut streams = Vec::new();
        for pair in &self.pairs {
            let code = stream_code(pair);
            for tf in &self.timeframes {
                streams.push(format!("{code}@kline_{tf}"));
            }
        }
        format!("{STREAM_BASE}/stream?streams={}", streams.join("/"))
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1).min(16));
        self.reconnect_delay.saturating_mul(factor as u32)
    }

    /// Run the feed until the retry budget is exhausted. Returns `Err` only
    /// on that fatal condition; the caller decides what degradation means.
    /// A successful connection restores the full retry budget.
    pub async fn run(&self) -> Result<()> {
        let mut attempt: u32 = 0;

        loop {
            let url = self.stream_url();
            info!(
                streams = self.pairs.len() * self.timeframes.len(),
                "connecting kline stream"
            );

            match connect_async(&url).await {
                Ok((ws, _response)) => {
                    info!("kline stream connected");
                    attempt = 0;
                    if let Err(e) = self.pump(ws).await {
                        warn!(error = %e, "kline stream dropped");
                    }
                    tokio::time::sleep(self.reconnect_delay).await;
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(anyhow::Error::from(e).context(format!(
                            "kline feed exhausted {} reconnect attempts",
                            self.max_retries
                        )));
                    }
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        error = %e,
                        attempt,
                        max = self.max_retries,
                        delay_secs = delay.as_secs(),
                        "kline connect failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One connection lifetime: pump messages, ping on interval.
    async fn pump(
        &self,
        ws: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) -> Result<()> {
        let (mut write, mut read) = ws.split();
        let mut ping = tokio::time::interval(self.ping_interval);
        ping.tick().await; // first tick is immediate

        loop {
            tokio::select! {
                _ = ping.tick() => {
                    write
                        .send(Message::Ping(Vec::new()))
                        .await
                        .context("failed to send ping")?;
                }
                msg = tokio::time::timeout(READ_TIMEOUT, read.next()) => {
                    let msg = msg.context("kline stream read timed out")?;
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.handle_text(&text) {
                                warn!(error = %e, "failed to handle kline message");
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        // Pong / Binary / Ping frames need no action;
                        // tungstenite answers pings automatically.
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
            }
        }
    }

    /// Parse one text frame, merge into the cache, and forward to the sink.
    /// Closed candles pass the dedup gate first.
    pub fn handle_text(&self, text: &str) -> Result<()> {
        let event = parse_kline_message(text)?;
        let key = CandleKey::new(event.symbol.clone(), event.timeframe.clone());

        if !self.cache.update(key, event.candle.clone()) {
            debug!(symbol = %event.symbol, tf = %event.timeframe, "stale candle dropped");
            return Ok(());
        }

        if event.is_closed {
            let fresh = self.dedup.lock().insert(
                &event.symbol,
                &event.timeframe,
                event.candle.open_time,
            );
            if !fresh {
                debug!(
                    symbol = %event.symbol,
                    tf = %event.timeframe,
                    open_time = event.candle.open_time,
                    "duplicate closed candle suppressed"
                );
                return Ok(());
            }
        }

        self.sink.on_candle(event);
        Ok(())
    }
}

// =============================================================================
// Message parsing
// =============================================================================

/// Parse a kline frame. Supports both the combined-stream envelope
/// (`{"stream": ..., "data": {...}}`) and the direct payload.
pub fn parse_kline_message(text: &str) -> Result<CandleEvent> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse kline JSON")?;

    let data = if root.get("data").is_some() {
        &root["data"]
    } else {
        &root
    };

    let symbol = boundary_symbol(data["s"].as_str().context("missing field s")?);
    let k = &data["k"];

    let timeframe = k["i"].as_str().context("missing field k.i")?.to_string();
    let open_time = k["t"].as_i64().context("missing field k.t")?;
    let is_closed = k["x"].as_bool().context("missing field k.x")?;

    let candle = Candle {
        open_time,
        open: parse_string_f64(&k["o"], "k.o")?,
        high: parse_string_f64(&k["h"], "k.h")?,
        low: parse_string_f64(&k["l"], "k.l")?,
        close: parse_string_f64(&k["c"], "k.c")?,
        volume: parse_string_f64(&k["v"], "k.v")?,
    };

    Ok(CandleEvent {
        symbol,
        timeframe,
        candle,
        is_closed,
    })
}

/// The exchange sends numeric values as JSON strings inside kline objects.
fn parse_string_f64(val: &serde_json::Value, name: &str) -> Result<f64> {
    match val {
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .with_context(|| format!("failed to parse {name} as f64: {s}")),
        serde_json::Value::Number(n) => n
            .as_f64()
            .with_context(|| format!("field {name} is not a valid f64")),
        _ => anyhow::bail!("field {name} has unexpected JSON type"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    fn kline_json(symbol: &str, tf: &str, open_time: i64, close: f64, closed: bool) -> String {
        format!(
            r#"{{"stream":"{}@kline_{tf}","data":{{"e":"kline","s":"{symbol}","k":{{
                "t":{open_time},"T":{},"i":"{tf}",
                "o":"{close}","h":"{}","l":"{}","c":"{close}","v":"123.4",
                "x":{closed}
            }}}}}}"#,
            symbol.to_lowercase(),
            open_time + 899_999,
            close + 1.0,
            close - 1.0,
        )
    }

    #[derive(Default)]
    struct RecordingSink {
        events: PlMutex<Vec<(String, String, i64, bool)>>,
    }

    impl CandleSink for RecordingSink {
        fn on_candle(&self, event: CandleEvent) {
            self.events.lock().push((
                event.symbol,
                event.timeframe,
                event.candle.open_time,
                event.is_closed,
            ));
        }
    }

    fn feed_with_sink() -> (FeedManager, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let feed = FeedManager::new(
            Arc::new(CandleCache::new(100)),
            sink.clone(),
            vec!["BTC/USDT".to_string()],
            vec!["15m".to_string()],
            5,
            10,
            20,
        );
        (feed, sink)
    }

    #[test]
    fn parses_combined_stream_frame() {
        let json = kline_json("BTCUSDT", "15m", 1_700_000_000_000, 37_000.0, false);
        let event = parse_kline_message(&json).expect("should parse");
        assert_eq!(event.symbol, "BTC/USDT");
        assert_eq!(event.timeframe, "15m");
        assert_eq!(event.candle.open_time, 1_700_000_000_000);
        assert!((event.candle.close - 37_000.0).abs() < f64::EPSILON);
        assert!(!event.is_closed);
    }

    #[test]
    fn rejects_malformed_frame() {
        assert!(parse_kline_message("{}").is_err());
        assert!(parse_kline_message("not json").is_err());
    }

    #[test]
    fn stream_url_lists_all_pairs() {
        let (feed, _) = feed_with_sink();
        let url = feed.stream_url();
        assert!(url.starts_with("wss://fstream.binance.com/stream?streams="));
        assert!(url.contains("btcusdt@kline_15m"));
    }

    #[test]
    fn backoff_grows_exponentially() {
        let (feed, _) = feed_with_sink();
        assert_eq!(feed.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(feed.backoff_delay(2), Duration::from_secs(10));
        assert_eq!(feed.backoff_delay(3), Duration::from_secs(20));
    }

    #[test]
    fn closed_candle_fires_sink_once_across_replay() {
        let (feed, sink) = feed_with_sink();
        let json = kline_json("BTCUSDT", "15m", 1_700_000_000_000, 37_000.0, true);

        feed.handle_text(&json).unwrap();
        // Reconnect replays the same closed bar.
        feed.handle_text(&json).unwrap();

        let events = sink.events.lock();
        let closes: Vec<_> = events.iter().filter(|e| e.3).collect();
        assert_eq!(closes.len(), 1, "close event must fire exactly once");
    }

    #[test]
    fn open_updates_pass_through_and_cache_tracks_latest() {
        let (feed, sink) = feed_with_sink();

        feed.handle_text(&kline_json("BTCUSDT", "15m", 0, 100.0, false))
            .unwrap();
        feed.handle_text(&kline_json("BTCUSDT", "15m", 0, 101.0, false))
            .unwrap();

        assert_eq!(sink.events.lock().len(), 2);
        let key = CandleKey::new("BTC/USDT", "15m");
        assert_eq!(feed.cache.len(&key), 1);
        assert_eq!(feed.cache.last_close(&key), Some(101.0));
    }

    #[test]
    fn dedup_set_evicts_oldest() {
        let mut dedup = DedupSet::new(2);
        assert!(dedup.insert("BTC/USDT", "15m", 1));
        assert!(dedup.insert("BTC/USDT", "15m", 2));
        assert!(dedup.insert("BTC/USDT", "15m", 3)); // evicts open_time 1
        assert!(dedup.insert("BTC/USDT", "15m", 1)); // forgotten, accepted again
        assert!(!dedup.insert("BTC/USDT", "15m", 3));
    }
}
