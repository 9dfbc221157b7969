// =============================================================================
// Outbound Notification Queue — signals, trade updates, alerts
// =============================================================================
//
// The engine is the only producer; delivery (Telegram, Slack, whatever) is a
// separate consumer draining the bounded channel. A full queue drops the
// event with a warning rather than stall the control loop.
// =============================================================================

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::risk::{LifecycleEvent, TradeAction};
use crate::signals::Signal;

/// Outbound queue depth.
const QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeUpdate {
    pub symbol: String,
    pub action: TradeAction,
    pub price: f64,
    pub r_multiple: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
}

/// Everything the engine pushes outward.
#[derive(Debug, Clone, Serialize)]
pub enum OutboundEvent {
    Signal(Box<Signal>),
    TradeUpdate(TradeUpdate),
    Alert(Alert),
}

#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<OutboundEvent>,
}

impl Notifier {
    /// Create the notifier and its consumer end.
    pub fn channel() -> (Self, mpsc::Receiver<OutboundEvent>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        (Self { tx }, rx)
    }

    fn push(&self, event: OutboundEvent) {
        if let Err(e) = self.tx.try_send(event) {
            warn!(error = %e, "notifier queue full, event dropped");
        }
    }

    pub fn send_signal(&self, signal: Signal) {
        self.push(OutboundEvent::Signal(Box::new(signal)));
    }

    pub fn send_trade_update(&self, event: &LifecycleEvent) {
        self.push(OutboundEvent::TradeUpdate(TradeUpdate {
            symbol: event.symbol.clone(),
            action: event.action,
            price: event.price,
            r_multiple: event.r_multiple,
        }));
    }

    pub fn send_alert(&self, level: AlertLevel, title: &str, message: &str) {
        self.push(OutboundEvent::Alert(Alert {
            level,
            title: title.to_string(),
            message: message.to_string(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (notifier, mut rx) = Notifier::channel();

        notifier.send_alert(AlertLevel::Info, "startup", "engine online");
        notifier.send_trade_update(&LifecycleEvent {
            symbol: "ETH/USDT".to_string(),
            action: TradeAction::BreakEven,
            price: 101.0,
            r_multiple: 0.5,
        });

        match rx.recv().await.expect("alert") {
            OutboundEvent::Alert(alert) => {
                assert_eq!(alert.level, AlertLevel::Info);
                assert_eq!(alert.title, "startup");
            }
            other => panic!("expected alert, got {other:?}"),
        }
        match rx.recv().await.expect("update") {
            OutboundEvent::TradeUpdate(update) => {
                assert_eq!(update.action, TradeAction::BreakEven);
                assert_eq!(update.symbol, "ETH/USDT");
            }
            other => panic!("expected trade update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (notifier, rx) = Notifier::channel();
        // Overfill without draining; sends must not block or panic.
        for i in 0..(QUEUE_CAPACITY + 10) {
            notifier.send_alert(AlertLevel::Info, "flood", &format!("event {i}"));
        }
        drop(rx);
        // A send after the receiver is gone is also just a warning.
        notifier.send_alert(AlertLevel::Warning, "late", "receiver gone");
    }
}
