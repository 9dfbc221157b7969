// =============================================================================
// Futures REST Client — market data endpoints with rate limiting
// =============================================================================
//
// All endpoints used here are public market-data routes; the engine is
// advisory and never places orders. Concurrency is capped at 10 in-flight
// requests by a semaphore, and an HTTP 429 response triggers a single
// 10-second sleep-and-retry before the error propagates.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::market_data::Candle;

const FUTURES_BASE: &str = "https://fapi.binance.com";
const FEAR_GREED_URL: &str = "https://api.alternative.me/fng/?limit=1";

/// Maximum concurrent REST requests.
const MAX_IN_FLIGHT: usize = 10;
/// Sleep before the single retry after a rate-limit response.
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(10);
/// Maximum klines per request accepted by the exchange.
const MAX_KLINE_LIMIT: usize = 1000;

/// Depth snapshot, both sides sorted best-first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

impl OrderBook {
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() || self.asks.is_empty()
    }

    /// Best-bid/ask spread as a percentage of the bid.
    pub fn spread_pct(&self) -> Option<f64> {
        let (bid, _) = self.bids.first()?;
        let (ask, _) = self.asks.first()?;
        if *bid <= 0.0 {
            return None;
        }
        Some((ask - bid) / bid * 100.0)
    }

    /// Notional depth (price * size) of the top `levels` on each side.
    pub fn depth_usd(&self, levels: usize) -> (f64, f64) {
        let bid: f64 = self.bids.iter().take(levels).map(|(p, q)| p * q).sum();
        let ask: f64 = self.asks.iter().take(levels).map(|(p, q)| p * q).sum();
        (bid, ask)
    }
}

pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    limiter: Semaphore,
}

impl RestClient {
    pub fn new() -> Self {
        Self::with_base_url(FUTURES_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Self {
            client,
            base_url: base_url.into(),
            limiter: Semaphore::new(MAX_IN_FLIGHT),
        }
    }

    /// GET a JSON document, retrying once after a 10 s sleep when the
    /// exchange answers 429.
    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .expect("request limiter never closes");

        for attempt in 0..2 {
            let resp = self
                .client
                .get(url)
                .send()
                .await
                .with_context(|| format!("GET {url} failed"))?;

            if resp.status().as_u16() == 429 && attempt == 0 {
                warn!(url, "rate limited, sleeping before retry");
                tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
                continue;
            }

            let status = resp.status();
            let body: serde_json::Value = resp
                .json()
                .await
                .with_context(|| format!("failed to parse response from {url}"))?;

            if !status.is_success() {
                anyhow::bail!("GET {url} returned {status}: {body}");
            }
            return Ok(body);
        }

        unreachable!("retry loop always returns")
    }

    /// Fetch `limit` klines (<= 1000) in ascending time order.
    pub async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
        since: Option<i64>,
    ) -> Result<Vec<Candle>> {
        let exchange_symbol = symbol.replace('/', "").to_uppercase();
        let limit = limit.min(MAX_KLINE_LIMIT);

        let mut url = format!(
            "{}/fapi/v1/klines?symbol={exchange_symbol}&interval={timeframe}&limit={limit}",
            self.base_url
        );
        if let Some(start) = since {
            url.push_str(&format!("&startTime={start}"));
        }

        let body = self.get_json(&url).await?;
        let rows = body.as_array().context("klines response is not an array")?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            let cols = row.as_array().context("kline row is not an array")?;
            if cols.len() < 6 {
                anyhow::bail!("kline row has {} columns, expected >= 6", cols.len());
            }
            candles.push(Candle {
                open_time: cols[0].as_i64().context("kline open time")?,
                open: value_f64(&cols[1]).context("kline open")?,
                high: value_f64(&cols[2]).context("kline high")?,
                low: value_f64(&cols[3]).context("kline low")?,
                close: value_f64(&cols[4]).context("kline close")?,
                volume: value_f64(&cols[5]).context("kline volume")?,
            });
        }

        debug!(symbol, timeframe, count = candles.len(), "klines fetched");
        Ok(candles)
    }

    /// Fetch the order book, both sides sorted best-first by the exchange.
    pub async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook> {
        let exchange_symbol = symbol.replace('/', "").to_uppercase();
        let url = format!(
            "{}/fapi/v1/depth?symbol={exchange_symbol}&limit={depth}",
            self.base_url
        );

        let body = self.get_json(&url).await?;
        let parse_side = |side: &str| -> Result<Vec<(f64, f64)>> {
            body[side]
                .as_array()
                .with_context(|| format!("depth response missing {side}"))?
                .iter()
                .map(|level| {
                    let pair = level.as_array().context("depth level is not an array")?;
                    if pair.len() < 2 {
                        anyhow::bail!("depth level has {} fields, expected 2", pair.len());
                    }
                    Ok((
                        value_f64(&pair[0]).context("depth price")?,
                        value_f64(&pair[1]).context("depth size")?,
                    ))
                })
                .collect()
        };

        Ok(OrderBook {
            bids: parse_side("bids")?,
            asks: parse_side("asks")?,
        })
    }

    /// Latest funding rate as a per-interval decimal (e.g. 0.0001).
    pub async fn fetch_funding_rate(&self, symbol: &str) -> Result<f64> {
        let exchange_symbol = symbol.replace('/', "").to_uppercase();
        let url = format!(
            "{}/fapi/v1/fundingRate?symbol={exchange_symbol}&limit=1",
            self.base_url
        );

        let body = self.get_json(&url).await?;
        let entry = body
            .as_array()
            .and_then(|arr| arr.first())
            .context("funding rate response is empty")?;

        value_f64(&entry["fundingRate"]).context("funding rate field")
    }

    /// Current open interest in base-asset units.
    pub async fn fetch_open_interest(&self, symbol: &str) -> Result<f64> {
        let exchange_symbol = symbol.replace('/', "").to_uppercase();
        let url = format!(
            "{}/fapi/v1/openInterest?symbol={exchange_symbol}",
            self.base_url
        );

        let body = self.get_json(&url).await?;
        value_f64(&body["openInterest"]).context("open interest field")
    }

    /// Fear & Greed index in [0, 100] from the third-party endpoint. Any
    /// failure falls back to the neutral 50.
    pub async fn fetch_fear_greed(&self) -> i64 {
        let result: Result<i64> = async {
            let body = self.get_json(FEAR_GREED_URL).await?;
            let value = body["data"][0]["value"]
                .as_str()
                .context("fear/greed value missing")?
                .parse::<i64>()
                .context("fear/greed value is not an integer")?;
            Ok(value)
        }
        .await;

        match result {
            Ok(value) => value.clamp(0, 100),
            Err(e) => {
                warn!(error = %e, "fear/greed fetch failed, defaulting to neutral");
                50
            }
        }
    }
}

impl Default for RestClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Exchange numerics arrive as JSON strings or numbers depending on the
/// endpoint.
fn value_f64(val: &serde_json::Value) -> Result<f64> {
    match val {
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .with_context(|| format!("failed to parse {s:?} as f64")),
        serde_json::Value::Number(n) => n.as_f64().context("JSON number out of f64 range"),
        other => anyhow::bail!("unexpected JSON type: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_f64_accepts_strings_and_numbers() {
        assert_eq!(value_f64(&serde_json::json!("37020.5")).unwrap(), 37020.5);
        assert_eq!(value_f64(&serde_json::json!(42)).unwrap(), 42.0);
        assert!(value_f64(&serde_json::json!(null)).is_err());
        assert!(value_f64(&serde_json::json!("abc")).is_err());
    }

    #[test]
    fn orderbook_spread_and_depth() {
        let book = OrderBook {
            bids: vec![(100.0, 2.0), (99.5, 4.0)],
            asks: vec![(100.1, 1.0), (100.5, 3.0)],
        };
        let spread = book.spread_pct().unwrap();
        assert!((spread - 0.1).abs() < 1e-9, "expected ~0.1%, got {spread}");

        let (bid_depth, ask_depth) = book.depth_usd(5);
        assert!((bid_depth - (200.0 + 398.0)).abs() < 1e-9);
        assert!((ask_depth - (100.1 + 301.5)).abs() < 1e-9);
    }

    #[test]
    fn orderbook_empty_detection() {
        assert!(OrderBook::default().is_empty());
        let book = OrderBook {
            bids: vec![(1.0, 1.0)],
            asks: vec![],
        };
        assert!(book.is_empty());
        assert_eq!(book.spread_pct(), None);
    }
}
