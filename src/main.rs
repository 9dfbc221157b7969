// =============================================================================
// Meridian Signal Engine — Main Entry Point
// =============================================================================
//
// Advisory futures signal engine: seeds the candle cache over REST, streams
// klines over WebSocket, and emits graded signals to the notification queue.
// It never places orders.
//
// Startup order matters: logging first, then config validation (abort on
// contract violation), then shared state, then the engine seed, and only
// after the BTC history is in place does the feed start.
// =============================================================================

mod analysis;
mod api;
mod clock;
mod config;
mod engine;
mod exchange;
mod filters;
mod indicators;
mod journal;
mod market_data;
mod metrics;
mod notify;
mod regime;
mod risk;
mod session;
mod signals;
mod state;
mod types;

use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::rest::ApiContext;
use crate::clock::SystemClock;
use crate::config::RuntimeConfig;
use crate::engine::Engine;
use crate::exchange::RestClient;
use crate::journal::TradeJournal;
use crate::market_data::{CandleCache, FeedManager};
use crate::metrics::MetricsCollector;
use crate::notify::{AlertLevel, Notifier, OutboundEvent};
use crate::state::EngineState;
use crate::types::EngineHealth;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Full engine plus the HTTP status surface.
    Web,
    /// Engine only, no HTTP listener.
    Worker,
}

#[derive(Debug, Parser)]
#[command(name = "meridian-bot", about = "Advisory crypto-futures signal engine")]
struct Args {
    #[arg(long, value_enum, default_value = "web")]
    mode: Mode,

    /// Path to the runtime config JSON.
    #[arg(long, default_value = "runtime_config.json")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();
    let args = Args::parse();

    // ── 1. Logging, configured once before any component exists ─────────
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Ok(log_dir) = std::env::var("MERIDIAN_LOG_DIR") {
        let appender = tracing_appender::rolling::daily(log_dir, "meridian.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        // Keep the guard alive for the process lifetime.
        Box::leak(Box::new(guard));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Meridian signal engine starting");

    // ── 2. Configuration ─────────────────────────────────────────────────
    let mut config = RuntimeConfig::load(&args.config)?;

    if let Ok(pairs) = std::env::var("MERIDIAN_PAIRS") {
        config.pairs = pairs
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }

    // Contract violations abort the process with the aggregated report.
    config.validate()?;
    info!(pairs = ?config.pairs, primary_tf = %config.primary_tf, "configuration validated");

    // ── 3. Shared components ─────────────────────────────────────────────
    let clock = Arc::new(SystemClock);
    let cache = Arc::new(CandleCache::new(config.cache_size));
    let rest = Arc::new(RestClient::new());
    let journal = Arc::new(TradeJournal::new(&config.journal_dir)?);
    let metrics = Arc::new(MetricsCollector::new());
    let state = Arc::new(EngineState::new(metrics));
    let (notifier, mut outbound_rx) = Notifier::channel();

    // ── 4. Notification consumer ─────────────────────────────────────────
    // Delivery is an external collaborator; this drain logs every event so
    // a downstream transport can be attached without touching the engine.
    tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            match event {
                OutboundEvent::Signal(signal) => info!(
                    symbol = %signal.symbol,
                    direction = %signal.direction,
                    entry = signal.entry,
                    stop = signal.stop_loss,
                    target = signal.take_profit,
                    grade = %signal.grade,
                    "SIGNAL"
                ),
                OutboundEvent::TradeUpdate(update) => info!(
                    symbol = %update.symbol,
                    action = %update.action,
                    price = update.price,
                    r = update.r_multiple,
                    "TRADE UPDATE"
                ),
                OutboundEvent::Alert(alert) => info!(
                    level = ?alert.level,
                    title = %alert.title,
                    message = %alert.message,
                    "ALERT"
                ),
            }
        }
    });

    // ── 5. Engine construction and seeding ───────────────────────────────
    let mut engine = Engine::new(
        config.clone(),
        clock,
        cache.clone(),
        rest,
        journal,
        notifier.clone(),
        state.clone(),
    );

    if let Err(e) = engine.seed().await {
        error!(error = %e, "cache seeding failed");
        notifier.send_alert(AlertLevel::Critical, "Startup failed", &format!("{e:#}"));
        return Err(e);
    }

    // ── 6. Feed, supervised ──────────────────────────────────────────────
    let feed = FeedManager::new(
        cache,
        engine.sink(),
        config.pairs.clone(),
        config.timeframes.clone(),
        config.ws_reconnect_delay_secs,
        config.ws_max_retries,
        config.ws_ping_interval_secs,
    );
    let feed_state = state.clone();
    let feed_notifier = notifier.clone();
    tokio::spawn(async move {
        if let Err(e) = feed.run().await {
            // Retry budget exhausted: degrade instead of crashing. The HTTP
            // surface keeps answering.
            error!(error = %e, "kline feed failed permanently");
            feed_state.set_health(EngineHealth::Degraded);
            feed_state.push_error(format!("feed failed: {e:#}"));
            feed_notifier.send_alert(
                AlertLevel::Critical,
                "Feed degraded",
                "Market data feed exhausted its reconnect budget; signal work halted",
            );
        }
    });

    // ── 7. HTTP surface (web mode) ───────────────────────────────────────
    if args.mode == Mode::Web {
        let webhook_secret = std::env::var("MERIDIAN_WEBHOOK_SECRET").unwrap_or_default();
        if webhook_secret.is_empty() {
            warn!("MERIDIAN_WEBHOOK_SECRET not set; webhook requests will be rejected");
        }

        let context = ApiContext {
            state: state.clone(),
            commands: engine.command_sender(),
            webhook_secret,
        };
        let bind_addr =
            std::env::var("MERIDIAN_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string());

        tokio::spawn(async move {
            let app = api::router(context);
            match tokio::net::TcpListener::bind(&bind_addr).await {
                Ok(listener) => {
                    info!(addr = %bind_addr, "HTTP surface listening");
                    if let Err(e) = axum::serve(listener, app).await {
                        error!(error = %e, "HTTP surface failed");
                    }
                }
                Err(e) => error!(addr = %bind_addr, error = %e, "failed to bind HTTP surface"),
            }
        });
    }

    // ── 8. Control loop until shutdown ───────────────────────────────────
    notifier.send_alert(AlertLevel::Success, "Engine online", "All subsystems running");

    tokio::select! {
        _ = engine.run() => {
            error!("engine loop exited unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("shutdown signal received");
        }
    }

    info!("Meridian signal engine stopped");
    Ok(())
}
