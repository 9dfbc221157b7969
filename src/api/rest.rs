// =============================================================================
// REST Endpoints — status, health, metrics, webhook
// =============================================================================
//
//   GET  /                   full status snapshot
//   GET  /health             liveness + readiness flags
//   GET  /metrics            performance counters and ratios
//   POST /webhook/:secret    {type: trade_result | manual_signal |
//                             config_update, ...}
//
// Handlers only read shared state or enqueue commands; the engine stays the
// single writer.
// =============================================================================

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::engine::WebhookCommand;
use crate::state::EngineState;

use super::auth::{secret_matches, signature_matches};

/// Shared context for all handlers.
#[derive(Clone)]
pub struct ApiContext {
    pub state: Arc<EngineState>,
    pub commands: mpsc::Sender<WebhookCommand>,
    pub webhook_secret: String,
}

/// Build the router with CORS and shared context.
pub fn router(context: ApiContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(status))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/webhook/:secret", post(webhook))
        .layer(cors)
        .with_state(context)
}

async fn status(State(context): State<ApiContext>) -> impl IntoResponse {
    Json(context.state.snapshot())
}

async fn health(State(context): State<ApiContext>) -> impl IntoResponse {
    let snapshot = context.state.snapshot();
    Json(serde_json::json!({
        "status": snapshot.health,
        "btc_data_ready": snapshot.btc_data_ready,
        "uptime_secs": snapshot.uptime_secs,
        "state_version": snapshot.state_version,
    }))
}

async fn metrics(State(context): State<ApiContext>) -> impl IntoResponse {
    Json(context.state.metrics.snapshot())
}

/// Accepted webhook payloads.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WebhookPayload {
    TradeResult { symbol: String, pnl_pct: f64 },
    ManualSignal { symbol: String },
    ConfigUpdate {},
}

async fn webhook(
    State(context): State<ApiContext>,
    Path(secret): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if !secret_matches(&secret, &context.webhook_secret) {
        warn!("webhook called with an invalid secret");
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({"error": "invalid secret"})),
        );
    }

    // Optional HMAC signature over the raw body; reject when present but
    // wrong.
    if let Some(signature) = headers.get("x-webhook-signature").and_then(|v| v.to_str().ok()) {
        if !signature_matches(&context.webhook_secret, &body, signature) {
            warn!("webhook signature mismatch");
            return (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({"error": "invalid signature"})),
            );
        }
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": format!("invalid payload: {e}")})),
            );
        }
    };

    let command = match payload {
        WebhookPayload::TradeResult { symbol, pnl_pct } => {
            WebhookCommand::TradeResult { symbol, pnl_pct }
        }
        WebhookPayload::ManualSignal { symbol } => WebhookCommand::ManualSignal { symbol },
        WebhookPayload::ConfigUpdate {} => WebhookCommand::ConfigUpdate,
    };

    match context.commands.try_send(command) {
        Ok(()) => {
            info!("webhook command accepted");
            (StatusCode::ACCEPTED, Json(serde_json::json!({"status": "accepted"})))
        }
        Err(e) => {
            warn!(error = %e, "webhook command queue full");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"error": "command queue full"})),
            )
        }
    }
}
