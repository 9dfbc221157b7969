// =============================================================================
// Runtime Configuration — engine settings with atomic save
// =============================================================================
//
// Every tunable parameter lives here. Persistence uses an atomic tmp + rename
// pattern to prevent corruption on crash. All fields carry `#[serde(default)]`
// so that adding new fields never breaks loading an older config file.
//
// `validate()` runs exactly once at startup and aggregates every violation
// into a single error so the operator sees the full report, not just the
// first broken field.
// =============================================================================

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::session::AvoidWindow;
use crate::types::MarketType;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_pairs() -> Vec<String> {
    vec![
        "BTC/USDT".to_string(),
        "ETH/USDT".to_string(),
        "DOGE/USDT".to_string(),
        "SOL/USDT".to_string(),
        "RENDER/USDT".to_string(),
        "ZRO/USDT".to_string(),
    ]
}

fn default_timeframes() -> Vec<String> {
    vec![
        "5m".to_string(),
        "15m".to_string(),
        "1h".to_string(),
        "4h".to_string(),
    ]
}

fn default_primary_tf() -> String {
    "15m".to_string()
}

fn default_account_size() -> f64 {
    100_000.0
}

fn default_risk_per_trade() -> f64 {
    1.0
}

fn default_max_leverage() -> u32 {
    15
}

fn default_max_concurrent() -> usize {
    1
}

fn default_atr_period() -> usize {
    14
}

fn default_atr_sl_mult() -> f64 {
    1.5
}

fn default_atr_tp_mult() -> f64 {
    3.0
}

fn default_min_atr_pct() -> f64 {
    0.4
}

fn default_max_atr_pct() -> f64 {
    3.0
}

fn default_max_daily_drawdown_pct() -> f64 {
    -2.0
}

fn default_daily_profit_target() -> f64 {
    3.0
}

fn default_max_consecutive_losses() -> u32 {
    2
}

fn default_break_even_at_r() -> f64 {
    0.5
}

fn default_partial_exit_at_r() -> f64 {
    1.0
}

fn default_cooldown_minutes() -> i64 {
    15
}

fn default_max_position_pct() -> f64 {
    20.0
}

fn default_min_position() -> f64 {
    100.0
}

fn default_min_tier2_score() -> f64 {
    60.0
}

fn default_min_signal_score() -> f64 {
    60.0
}

fn default_cache_size() -> usize {
    100
}

fn default_ws_reconnect_delay_secs() -> u64 {
    5
}

fn default_ws_max_retries() -> u32 {
    10
}

fn default_ws_ping_interval_secs() -> u64 {
    20
}

fn default_tier1_filters() -> Vec<String> {
    vec![
        "btc_regime".to_string(),
        "structure".to_string(),
        "volume".to_string(),
        "liquidity".to_string(),
        "session".to_string(),
    ]
}

fn default_tier2_weights() -> HashMap<String, f64> {
    let mut w = HashMap::new();
    w.insert("mtf_confirmation".to_string(), 20.0);
    w.insert("volume_profile".to_string(), 15.0);
    w.insert("funding_rate".to_string(), 10.0);
    w.insert("open_interest".to_string(), 10.0);
    w.insert("rsi_divergence".to_string(), 15.0);
    w.insert("ema_stack".to_string(), 10.0);
    w.insert("atr_percent".to_string(), 10.0);
    w.insert("vwap_position".to_string(), 5.0);
    w.insert("support_resistance".to_string(), 5.0);
    w
}

fn default_tier3_filters() -> Vec<String> {
    vec![
        "whale_movement".to_string(),
        "liquidity_grab".to_string(),
        "iceberg_detection".to_string(),
        "news_sentiment".to_string(),
        "correlation_break".to_string(),
        "fibonacci_level".to_string(),
    ]
}

fn default_max_signals_per_day() -> SignalLimits {
    SignalLimits::default()
}

fn default_market_configs() -> HashMap<String, MarketProfile> {
    let mut m = HashMap::new();
    m.insert(
        "trending".to_string(),
        MarketProfile {
            min_score: 60.0,
            min_rr: 1.5,
            max_signals: 5,
            position_size: 1.0,
            sl_mult: 1.5,
            tp_mult: 3.0,
        },
    );
    m.insert(
        "choppy".to_string(),
        MarketProfile {
            min_score: 55.0,
            min_rr: 1.2,
            max_signals: 3,
            position_size: 0.8,
            sl_mult: 1.2,
            tp_mult: 1.8,
        },
    );
    m.insert(
        "high_vol".to_string(),
        MarketProfile {
            min_score: 65.0,
            min_rr: 2.0,
            max_signals: 2,
            position_size: 0.5,
            sl_mult: 1.0,
            tp_mult: 2.5,
        },
    );
    m.insert(
        "unknown".to_string(),
        MarketProfile {
            min_score: 60.0,
            min_rr: 1.5,
            max_signals: 2,
            position_size: 0.9,
            sl_mult: 1.5,
            tp_mult: 3.0,
        },
    );
    m
}

fn default_btc_regime_config() -> BtcRegimeConfig {
    BtcRegimeConfig::default()
}

fn default_journal_dir() -> String {
    "trade_logs".to_string()
}

// =============================================================================
// Nested config blocks
// =============================================================================

/// Per-market-type trade profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketProfile {
    pub min_score: f64,
    pub min_rr: f64,
    pub max_signals: u32,
    pub position_size: f64,
    pub sl_mult: f64,
    pub tp_mult: f64,
}

/// Daily signal caps keyed by market type, with an override that kicks in
/// after two consecutive losses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalLimits {
    pub trending: u32,
    pub choppy: u32,
    pub high_vol: u32,
    pub default: u32,
    pub after_2_losses: u32,
}

impl Default for SignalLimits {
    fn default() -> Self {
        Self {
            trending: 5,
            choppy: 3,
            high_vol: 2,
            default: 4,
            after_2_losses: 1,
        }
    }
}

impl SignalLimits {
    pub fn for_market(&self, market: MarketType) -> u32 {
        match market {
            MarketType::Trending => self.trending,
            MarketType::Choppy => self.choppy,
            MarketType::HighVol => self.high_vol,
            MarketType::Unknown => self.default,
        }
    }
}

/// Confidence/ADX thresholds that gate BTC-regime tradability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BtcRegimeConfig {
    pub hard_block_confidence: f64,
    pub choppy_min_confidence: f64,
    pub choppy_adx_min: f64,
    pub trend_min_confidence: f64,
    pub trend_adx_min: f64,
}

impl Default for BtcRegimeConfig {
    fn default() -> Self {
        Self {
            hard_block_confidence: 8.0,
            choppy_min_confidence: 15.0,
            choppy_adx_min: 18.0,
            trend_min_confidence: 20.0,
            trend_adx_min: 20.0,
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Trading pairs in boundary form, e.g. "BTC/USDT".
    #[serde(default = "default_pairs")]
    pub pairs: Vec<String>,

    /// Subscribed timeframes; must include the primary timeframe.
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<String>,

    /// Timeframe whose candle closes drive signal evaluation.
    #[serde(default = "default_primary_tf")]
    pub primary_tf: String,

    #[serde(default = "default_account_size")]
    pub account_size: f64,

    /// Risk per trade as a percentage of the account (0 < x <= 5).
    #[serde(default = "default_risk_per_trade")]
    pub risk_per_trade: f64,

    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_max_signals_per_day")]
    pub max_signals_per_day: SignalLimits,

    #[serde(default = "default_atr_period")]
    pub atr_period: usize,

    #[serde(default = "default_atr_sl_mult")]
    pub atr_sl_mult: f64,

    #[serde(default = "default_atr_tp_mult")]
    pub atr_tp_mult: f64,

    #[serde(default = "default_min_atr_pct")]
    pub min_atr_pct: f64,

    #[serde(default = "default_max_atr_pct")]
    pub max_atr_pct: f64,

    /// Negative percentage; daily lock trips at or below this P&L.
    #[serde(default = "default_max_daily_drawdown_pct")]
    pub max_daily_drawdown_pct: f64,

    /// Positive percentage; daily lock trips at or above this P&L.
    #[serde(default = "default_daily_profit_target")]
    pub daily_profit_target: f64,

    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,

    #[serde(default = "default_break_even_at_r")]
    pub break_even_at_r: f64,

    #[serde(default = "default_partial_exit_at_r")]
    pub partial_exit_at_r: f64,

    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,

    /// Maximum position as a percentage of the account.
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: f64,

    /// Smallest position worth emitting, in USD.
    #[serde(default = "default_min_position")]
    pub min_position: f64,

    #[serde(default = "default_tier1_filters")]
    pub tier1_filters: Vec<String>,

    /// Tier-2 filter weights; must total 100.
    #[serde(default = "default_tier2_weights")]
    pub tier2_filters: HashMap<String, f64>,

    #[serde(default = "default_tier3_filters")]
    pub tier3_filters: Vec<String>,

    #[serde(default = "default_min_tier2_score")]
    pub min_tier2_score: f64,

    #[serde(default = "default_min_signal_score")]
    pub min_signal_score: f64,

    #[serde(default = "default_market_configs")]
    pub market_configs: HashMap<String, MarketProfile>,

    #[serde(default = "default_btc_regime_config")]
    pub btc_regime: BtcRegimeConfig,

    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    #[serde(default = "default_ws_reconnect_delay_secs")]
    pub ws_reconnect_delay_secs: u64,

    #[serde(default = "default_ws_max_retries")]
    pub ws_max_retries: u32,

    #[serde(default = "default_ws_ping_interval_secs")]
    pub ws_ping_interval_secs: u64,

    #[serde(default)]
    pub avoid_windows: Vec<AvoidWindow>,

    #[serde(default = "default_journal_dir")]
    pub journal_dir: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        serde_json::from_str("{}").expect("all fields carry defaults")
    }
}

impl RuntimeConfig {
    /// Load from a JSON file, falling back to defaults when the file does not
    /// exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&raw).context("failed to parse config JSON")?;
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Save atomically: write to `<path>.tmp`, then rename over the target.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("tmp");

        let json = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to rename {} over {}", tmp.display(), path.display()))?;
        Ok(())
    }

    /// Validate the configuration, aggregating every violation into one
    /// report. Called once at startup; a failure aborts the process.
    pub fn validate(&self) -> Result<()> {
        let mut problems: Vec<String> = Vec::new();

        if self.pairs.is_empty() {
            problems.push("pairs must not be empty".to_string());
        }
        for pair in &self.pairs {
            if !pair.contains('/') {
                problems.push(format!("pair {pair:?} is not in BASE/QUOTE form"));
            }
        }
        if !self.timeframes.contains(&self.primary_tf) {
            problems.push(format!(
                "primary_tf {:?} is not in timeframes {:?}",
                self.primary_tf, self.timeframes
            ));
        }
        if self.account_size <= 0.0 {
            problems.push(format!("account_size must be positive, got {}", self.account_size));
        }
        if !(0.0 < self.risk_per_trade && self.risk_per_trade <= 5.0) {
            problems.push(format!(
                "risk_per_trade must be in (0, 5], got {}",
                self.risk_per_trade
            ));
        }
        if !(1..=20).contains(&self.max_leverage) {
            problems.push(format!("max_leverage must be in 1..=20, got {}", self.max_leverage));
        }
        if self.min_atr_pct >= self.max_atr_pct {
            problems.push(format!(
                "min_atr_pct {} must be below max_atr_pct {}",
                self.min_atr_pct, self.max_atr_pct
            ));
        }
        if self.max_daily_drawdown_pct >= 0.0 {
            problems.push(format!(
                "max_daily_drawdown_pct must be negative, got {}",
                self.max_daily_drawdown_pct
            ));
        }
        if self.cache_size < 50 {
            problems.push(format!("cache_size must be at least 50, got {}", self.cache_size));
        }

        let weight_total: f64 = self.tier2_filters.values().sum();
        if (weight_total - 100.0).abs() > 1e-9 {
            problems.push(format!("tier2_filters weights must total 100, got {weight_total}"));
        }

        for market in ["trending", "choppy", "high_vol", "unknown"] {
            match self.market_configs.get(market) {
                None => problems.push(format!("market_configs missing entry for {market:?}")),
                Some(profile) => {
                    if profile.min_rr <= 0.0 {
                        problems.push(format!("market_configs.{market}.min_rr must be positive"));
                    }
                    if profile.sl_mult <= 0.0 || profile.tp_mult <= 0.0 {
                        problems.push(format!(
                            "market_configs.{market} ATR multipliers must be positive"
                        ));
                    }
                }
            }
        }

        for window in &self.avoid_windows {
            if window.start_hour >= window.end_hour || window.end_hour > 24 {
                problems.push(format!(
                    "avoid window {:?} has an invalid hour range {}..{}",
                    window.label, window.start_hour, window.end_hour
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("invalid configuration:\n  - {}", problems.join("\n  - "))
        }
    }

    /// Profile for a market type, falling back to the trending profile.
    pub fn market_profile(&self, market: MarketType) -> &MarketProfile {
        self.market_configs
            .get(&market.to_string())
            .or_else(|| self.market_configs.get("trending"))
            .expect("market_configs validated at startup")
    }
}
