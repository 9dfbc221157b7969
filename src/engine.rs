// =============================================================================
// Engine — tick-driven control loop
// =============================================================================
//
// One task owns the whole decision path. The feed delivers candle events
// through the sink into a bounded channel; this loop consumes them:
//
//   closed primary candle -> regime refresh (>= 60 s old, or the BTC close
//   itself) -> gates (BTC-ready latch, daily caps, cooldown, risk) -> data
//   bundle (cache snapshots + rate-limited REST) -> filters -> generator ->
//   risk approval -> notifier.
//
//   open primary tick -> lifecycle update for any active trade on the
//   symbol (partial exit / break-even / SL / TP), settlement on exit.
//
// A one-minute maintenance tick handles trade timeouts and the IST-midnight
// daily reset. When the feed exhausts its reconnect budget the engine turns
// degraded: signal work stops, the HTTP surface keeps answering.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::RuntimeConfig;
use crate::exchange::RestClient;
use crate::filters::{DataBundle, FilterOrchestrator};
use crate::journal::{TradeJournal, TradeRecord};
use crate::market_data::{CandleCache, CandleEvent, CandleKey, CandleSink};
use crate::notify::{AlertLevel, Notifier};
use crate::regime::{BtcRegimeResult, RegimeDetector};
use crate::risk::{ClosedTrade, LifecycleEvent, RiskManager, TradeAction};
use crate::signals::SignalGenerator;
use crate::state::{EngineState, RegimeSummary};
use crate::types::{EngineHealth, MarketType};

/// The regime anchor symbol.
const BTC_SYMBOL: &str = "BTC/USDT";
/// Minimum BTC primary candles before any signal work.
const BTC_READY_CANDLES: usize = 50;
/// Regime refresh cadence outside BTC closes.
const REGIME_REFRESH_SECS: u64 = 60;
/// Fear & Greed cache lifetime.
const FEAR_CACHE_SECS: u64 = 900;
/// Candle event channel depth.
const EVENT_QUEUE_CAPACITY: usize = 1024;
/// Maintenance tick period.
const MAINTENANCE_SECS: u64 = 60;
/// Seed retry budget for the BTC primary series.
const SEED_MAX_ATTEMPTS: u32 = 10;

/// Commands accepted on the webhook surface.
#[derive(Debug, Clone)]
pub enum WebhookCommand {
    /// A trade settled externally; fold its result into the risk trackers.
    TradeResult { symbol: String, pnl_pct: f64 },
    /// Operator-injected signal request; logged and alerted, never traded
    /// automatically.
    ManualSignal { symbol: String },
    /// Config changed on disk; requires a restart to take effect.
    ConfigUpdate,
}

/// Sink handed to the feed: enqueues into the engine's event channel.
pub struct EngineSink {
    tx: mpsc::Sender<CandleEvent>,
}

impl CandleSink for EngineSink {
    fn on_candle(&self, event: CandleEvent) {
        if let Err(e) = self.tx.try_send(event) {
            warn!(error = %e, "engine event queue full, candle dropped");
        }
    }
}

pub struct Engine {
    config: RuntimeConfig,
    clock: Arc<dyn Clock>,
    cache: Arc<CandleCache>,
    rest: Arc<RestClient>,
    orchestrator: FilterOrchestrator,
    generator: SignalGenerator,
    risk: RiskManager,
    regime_detector: RegimeDetector,
    journal: Arc<TradeJournal>,
    notifier: Notifier,
    state: Arc<EngineState>,

    rx: mpsc::Receiver<CandleEvent>,
    tx: mpsc::Sender<CandleEvent>,
    command_rx: mpsc::Receiver<WebhookCommand>,
    command_tx: mpsc::Sender<WebhookCommand>,

    market_type: MarketType,
    btc_regime: BtcRegimeResult,
    last_regime_refresh: Option<Instant>,
    btc_data_ready: bool,
    last_signal_time: HashMap<String, DateTime<Utc>>,
    daily_signals: u32,
    last_reset_date: String,
    fear_cache: Option<(i64, Instant)>,
}

impl Engine {
    pub fn new(
        config: RuntimeConfig,
        clock: Arc<dyn Clock>,
        cache: Arc<CandleCache>,
        rest: Arc<RestClient>,
        journal: Arc<TradeJournal>,
        notifier: Notifier,
        state: Arc<EngineState>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(32);
        let last_reset_date = clock.today_ist();

        Self {
            orchestrator: FilterOrchestrator::new(&config, clock.clone()),
            generator: SignalGenerator::new(config.clone(), clock.clone()),
            risk: RiskManager::new(&config, clock.clone()),
            regime_detector: RegimeDetector::new(config.btc_regime.clone()),
            config,
            clock,
            cache,
            rest,
            journal,
            notifier,
            state,
            rx,
            tx,
            command_rx,
            command_tx,
            market_type: MarketType::Unknown,
            btc_regime: BtcRegimeResult::unknown("not yet computed"),
            last_regime_refresh: None,
            btc_data_ready: false,
            last_signal_time: HashMap::new(),
            daily_signals: 0,
            last_reset_date,
            fear_cache: None,
        }
    }

    /// The sink the feed writes into.
    pub fn sink(&self) -> Arc<EngineSink> {
        Arc::new(EngineSink {
            tx: self.tx.clone(),
        })
    }

    /// Producer end of the webhook command queue (held by the HTTP surface).
    pub fn command_sender(&self) -> mpsc::Sender<WebhookCommand> {
        self.command_tx.clone()
    }

    // -------------------------------------------------------------------------
    // Startup: REST seeding
    // -------------------------------------------------------------------------

    /// Backfill every (symbol, timeframe) series, with a dedicated retry
    /// budget for the BTC primary series the readiness latch depends on.
    pub async fn seed(&mut self) -> Result<()> {
        info!("seeding candle cache from REST");

        for pair in self.config.pairs.clone() {
            for tf in self.config.timeframes.clone() {
                match self
                    .rest
                    .fetch_ohlcv(&pair, &tf, self.config.cache_size, None)
                    .await
                {
                    Ok(candles) if !candles.is_empty() => {
                        self.cache.set_series(CandleKey::new(&pair, &tf), candles);
                    }
                    Ok(_) => warn!(%pair, %tf, "empty seed response"),
                    Err(e) => warn!(%pair, %tf, error = %e, "seed fetch failed"),
                }
            }
        }

        // The BTC primary series gates all signal work; force-fetch it until
        // it holds enough history.
        let btc_key = CandleKey::new(BTC_SYMBOL, &self.config.primary_tf);
        let mut attempt = 0u32;
        while self.cache.len(&btc_key) < BTC_READY_CANDLES {
            attempt += 1;
            if attempt > SEED_MAX_ATTEMPTS {
                anyhow::bail!(
                    "BTC primary series still short after {SEED_MAX_ATTEMPTS} attempts"
                );
            }
            let backoff = Duration::from_secs((5 * (attempt as u64 + 1)).min(30));
            warn!(attempt, backoff_secs = backoff.as_secs(), "re-fetching BTC history");
            tokio::time::sleep(backoff).await;

            match self
                .rest
                .fetch_ohlcv(BTC_SYMBOL, &self.config.primary_tf, self.config.cache_size, None)
                .await
            {
                Ok(candles) if !candles.is_empty() => {
                    self.cache.set_series(btc_key.clone(), candles);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "BTC seed fetch failed"),
            }
        }

        self.set_btc_ready();
        self.refresh_regime();
        self.state.set_health(EngineHealth::Running);
        info!("cache seeded, engine running");
        Ok(())
    }

    fn set_btc_ready(&mut self) {
        self.btc_data_ready = true;
        self.state.set_btc_data_ready(true);
    }

    // -------------------------------------------------------------------------
    // Main loop
    // -------------------------------------------------------------------------

    pub async fn run(mut self) {
        let mut maintenance = tokio::time::interval(Duration::from_secs(MAINTENANCE_SECS));
        maintenance.tick().await; // immediate first tick

        loop {
            tokio::select! {
                event = self.rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            error!("candle event channel closed, engine stopping");
                            return;
                        }
                    }
                }
                command = self.command_rx.recv() => {
                    if let Some(command) = command {
                        self.handle_command(command);
                    }
                }
                _ = maintenance.tick() => {
                    self.run_maintenance();
                }
            }
        }
    }

    fn handle_command(&mut self, command: WebhookCommand) {
        match command {
            WebhookCommand::TradeResult { symbol, pnl_pct } => {
                info!(%symbol, pnl_pct, "external trade result received");
                self.risk.record_external_result(pnl_pct);
                self.state.metrics.record_trade(pnl_pct, 0.0, 0.0);
            }
            WebhookCommand::ManualSignal { symbol } => {
                info!(%symbol, "manual signal request received");
                self.notifier.send_alert(
                    AlertLevel::Info,
                    "Manual signal request",
                    &format!("Operator requested evaluation of {symbol}"),
                );
            }
            WebhookCommand::ConfigUpdate => {
                warn!("config update received; restart required to apply");
                self.notifier.send_alert(
                    AlertLevel::Warning,
                    "Config update",
                    "New configuration staged; restart to apply",
                );
            }
        }
    }

    async fn handle_event(&mut self, event: CandleEvent) {
        if event.timeframe != self.config.primary_tf {
            return; // cache already updated by the feed
        }

        if event.is_closed {
            self.handle_primary_close(&event.symbol).await;
        } else {
            self.handle_open_tick(&event.symbol, event.candle.close);
        }
    }

    // -------------------------------------------------------------------------
    // Open-tick lifecycle
    // -------------------------------------------------------------------------

    fn handle_open_tick(&mut self, symbol: &str, price: f64) {
        if !self.risk.has_active(symbol) {
            return;
        }

        let events = self.risk.update(symbol, price);
        for event in events {
            self.notifier.send_trade_update(&event);
            match event.action {
                TradeAction::SlHit | TradeAction::TpHit => {
                    self.settle(symbol, price, &event.action.to_string());
                }
                TradeAction::PartialExit | TradeAction::BreakEven | TradeAction::Timeout => {}
            }
        }
    }

    fn settle(&mut self, symbol: &str, price: f64, reason: &str) {
        let locked_before = self.risk.status().daily_lock.is_locked;
        let closed = match self.risk.close(symbol, price, reason) {
            Some(closed) => closed,
            None => return,
        };

        self.state.metrics.record_trade(closed.pnl_pct, closed.pnl_usd, closed.trade.rr_ratio);
        self.state.set_active_symbols(self.risk.active_symbols());

        // One alert on the lock transition, not on every subsequent refusal.
        let status = self.risk.status();
        if !locked_before && status.daily_lock.is_locked {
            let reason = status
                .daily_lock
                .lock_reason
                .unwrap_or_else(|| "limit reached".to_string());
            self.notifier
                .send_alert(AlertLevel::Warning, "Daily lock engaged", &reason);
        }

        let journal = self.journal.clone();
        let date = self.clock.today_ist();
        let record = trade_record(&closed);
        let state = self.state.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = journal.append(&date, &record) {
                error!(error = %e, "failed to journal trade");
                state.push_error(format!("journal append failed: {e}"));
            }
        });
    }

    // -------------------------------------------------------------------------
    // Closed-candle signal path
    // -------------------------------------------------------------------------

    async fn handle_primary_close(&mut self, symbol: &str) {
        if self.state.health() == EngineHealth::Degraded {
            debug!(symbol, "degraded, discarding close event");
            return;
        }

        if !self.btc_data_ready {
            let btc_key = CandleKey::new(BTC_SYMBOL, &self.config.primary_tf);
            if symbol == BTC_SYMBOL && self.cache.len(&btc_key) >= BTC_READY_CANDLES {
                info!("BTC history complete, signal work unlocked");
                self.set_btc_ready();
            } else {
                debug!(symbol, "BTC history not ready, discarding close event");
                return;
            }
        }

        let needs_refresh = symbol == BTC_SYMBOL
            || self
                .last_regime_refresh
                .map_or(true, |at| at.elapsed().as_secs() >= REGIME_REFRESH_SECS);
        if needs_refresh {
            self.refresh_regime();
        }

        if let Some(reason) = self.signal_gate(symbol) {
            debug!(symbol, %reason, "signal work skipped");
            return;
        }

        let bundle = self.assemble_bundle(symbol).await;
        let fear_index = self.fear_index().await;

        let filter_result =
            self.orchestrator
                .evaluate(None, self.market_type, &self.btc_regime, &bundle);
        if !filter_result.passed {
            debug!(symbol, reason = %filter_result.reason, "filters rejected");
            return;
        }

        let signal = match self.generator.generate(
            &bundle,
            &filter_result,
            self.market_type,
            &self.btc_regime,
        ) {
            Some(signal) => signal,
            None => return,
        };

        let trade = match self
            .risk
            .approve(&signal, self.config.account_size, fear_index)
        {
            Some(trade) => trade,
            None => return,
        };

        let mut signal = signal;
        signal.position = Some(crate::risk::PositionSize::Sized(trade.position.clone()));

        info!(
            symbol,
            direction = %signal.direction,
            entry = signal.entry,
            score = signal.score,
            grade = %signal.grade,
            "signal emitted"
        );
        self.notifier.send_signal(signal);
        self.state.metrics.record_signal();
        self.daily_signals += 1;
        self.state.set_daily_signals(self.daily_signals as u64);
        self.state.set_active_symbols(self.risk.active_symbols());
        self.last_signal_time
            .insert(symbol.to_string(), self.clock.now_utc());
    }

    /// Pre-filter gates: daily cap, per-symbol cooldown, risk breakers.
    /// Returns the refusal reason, or `None` when signal work may proceed.
    fn signal_gate(&mut self, symbol: &str) -> Option<String> {
        let limit = self.daily_signal_limit();
        if self.daily_signals >= limit {
            return Some(format!("daily signal limit reached ({limit})"));
        }

        if let Some(last) = self.last_signal_time.get(symbol) {
            let elapsed = self
                .clock
                .now_utc()
                .signed_duration_since(*last)
                .num_minutes();
            if elapsed < self.config.cooldown_minutes {
                return Some(format!(
                    "cooldown {elapsed}/{} minutes",
                    self.config.cooldown_minutes
                ));
            }
        }

        let (allowed, reason) = self.risk.can_trade(symbol);
        if !allowed {
            return Some(reason);
        }

        None
    }

    fn daily_signal_limit(&self) -> u32 {
        if self.risk.consecutive_losses() >= 2 {
            return self.config.max_signals_per_day.after_2_losses;
        }
        self.config.max_signals_per_day.for_market(self.market_type)
    }

    // -------------------------------------------------------------------------
    // Regime + data assembly
    // -------------------------------------------------------------------------

    fn refresh_regime(&mut self) {
        let btc_15m = self
            .cache
            .get_series(&CandleKey::new(BTC_SYMBOL, "15m"), None);
        let btc_1h = self.cache.get_series(&CandleKey::new(BTC_SYMBOL, "1h"), None);
        let btc_4h = self.cache.get_series(&CandleKey::new(BTC_SYMBOL, "4h"), None);

        self.market_type = self.regime_detector.detect_market_type(&btc_15m, &btc_1h);
        self.btc_regime = self
            .regime_detector
            .detect_btc_regime(&btc_15m, &btc_1h, &btc_4h);
        self.last_regime_refresh = Some(Instant::now());

        self.risk
            .set_daily_trade_cap(self.config.max_signals_per_day.for_market(self.market_type));

        info!(
            market = %self.market_type,
            regime = %self.btc_regime.regime,
            confidence = self.btc_regime.confidence,
            mode = %self.btc_regime.trade_mode,
            "regime refreshed"
        );
        self.state.set_regime(RegimeSummary {
            market_type: self.market_type,
            btc_regime: self.btc_regime.regime,
            confidence: self.btc_regime.confidence,
            trade_mode: self.btc_regime.trade_mode,
            can_trade: self.btc_regime.can_trade,
        });
    }

    async fn assemble_bundle(&mut self, symbol: &str) -> DataBundle {
        let series = |tf: &str| self.cache.get_series(&CandleKey::new(symbol, tf), None);
        let ohlcv_15m = series("15m");
        let current_price = ohlcv_15m.last().map(|c| c.close).unwrap_or(0.0);

        // The three REST lookups are independent; fire them together.
        let (funding, open_interest, orderbook) = tokio::join!(
            self.rest.fetch_funding_rate(symbol),
            self.rest.fetch_open_interest(symbol),
            self.rest.fetch_order_book(symbol, 20),
        );

        DataBundle {
            symbol: symbol.to_string(),
            ohlcv_5m: series("5m"),
            ohlcv_15m,
            ohlcv_1h: series("1h"),
            ohlcv_4h: series("4h"),
            btc_1h: self.cache.get_series(&CandleKey::new(BTC_SYMBOL, "1h"), None),
            funding_rate: funding.unwrap_or_else(|e| {
                debug!(symbol, error = %e, "funding fetch failed");
                0.0
            }),
            open_interest: open_interest.unwrap_or_else(|e| {
                debug!(symbol, error = %e, "open interest fetch failed");
                0.0
            }),
            orderbook: orderbook.unwrap_or_else(|e| {
                debug!(symbol, error = %e, "orderbook fetch failed");
                Default::default()
            }),
            current_price,
        }
    }

    async fn fear_index(&mut self) -> i64 {
        if let Some((value, at)) = self.fear_cache {
            if at.elapsed().as_secs() < FEAR_CACHE_SECS {
                return value;
            }
        }
        let value = self.rest.fetch_fear_greed().await;
        self.fear_cache = Some((value, Instant::now()));
        value
    }

    // -------------------------------------------------------------------------
    // Maintenance
    // -------------------------------------------------------------------------

    fn run_maintenance(&mut self) {
        // Timed-out trades settle at their latest cached price.
        for symbol in self.risk.check_timeouts() {
            let key = CandleKey::new(&symbol, &self.config.primary_tf);
            let price = self.cache.last_close(&key).unwrap_or(0.0);
            if price <= 0.0 {
                warn!(%symbol, "no price available for timeout close");
                continue;
            }
            self.notifier.send_trade_update(&LifecycleEvent {
                symbol: symbol.clone(),
                action: TradeAction::Timeout,
                price,
                r_multiple: 0.0,
            });
            self.settle(&symbol, price, "TIMEOUT");
        }

        // IST midnight rollover.
        let today = self.clock.today_ist();
        if today != self.last_reset_date {
            info!(from = %self.last_reset_date, to = %today, "daily reset");
            self.last_reset_date = today;
            self.daily_signals = 0;
            self.state.set_daily_signals(0);
            self.risk.reset_daily();
            self.notifier
                .send_alert(AlertLevel::Info, "Daily reset", "Counters cleared for the new day");
        }
    }
}

fn trade_record(closed: &ClosedTrade) -> TradeRecord {
    TradeRecord {
        timestamp: closed.closed_at.to_rfc3339(),
        symbol: closed.trade.symbol.clone(),
        direction: closed.trade.direction.to_string(),
        entry: closed.trade.entry,
        exit: closed.exit_price,
        stop_loss: closed.trade.stop_loss,
        take_profit: closed.trade.take_profit,
        position_usd: closed.trade.position.position_usd,
        pnl_pct: closed.pnl_pct,
        pnl_usd: closed.pnl_usd,
        rr_ratio: closed.trade.rr_ratio,
        market_type: closed.trade.market_type.to_string(),
        grade: closed.trade.grade.to_string(),
        filters_passed: closed.trade.filters_passed,
        score: closed.trade.score,
        reason: closed.reason.clone(),
    }
}
