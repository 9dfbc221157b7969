// =============================================================================
// Metrics Collector — engine performance counters and ratios
// =============================================================================
//
// Counts signals / trades / errors and derives win rate, profit factor,
// Sharpe ratio, and maximum drawdown from the closed-trade P&L series.
// Sharpe is annualized over 365 days (crypto trades every calendar day).
// =============================================================================

use parking_lot::RwLock;
use serde::Serialize;

/// Trading days per year for annualization.
const ANNUALIZATION_DAYS: f64 = 365.0;
/// Closed-trade history retained for ratio computation.
const MAX_TRADE_HISTORY: usize = 1000;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TradeSample {
    pub pnl_pct: f64,
    pub pnl_usd: f64,
    pub rr_ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub signals_generated: u64,
    pub trades_closed: u64,
    pub errors: u64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown_pct: f64,
    pub best_trade_pct: f64,
    pub worst_trade_pct: f64,
}

#[derive(Default)]
struct Inner {
    signals_generated: u64,
    trades_closed: u64,
    errors: u64,
    trades: Vec<TradeSample>,
}

#[derive(Default)]
pub struct MetricsCollector {
    inner: RwLock<Inner>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_signal(&self) {
        self.inner.write().signals_generated += 1;
    }

    pub fn record_error(&self) {
        self.inner.write().errors += 1;
    }

    pub fn record_trade(&self, pnl_pct: f64, pnl_usd: f64, rr_ratio: f64) {
        let mut inner = self.inner.write();
        inner.trades_closed += 1;
        inner.trades.push(TradeSample {
            pnl_pct,
            pnl_usd,
            rr_ratio,
        });
        if inner.trades.len() > MAX_TRADE_HISTORY {
            inner.trades.remove(0);
        }
    }

    pub fn signals_generated(&self) -> u64 {
        self.inner.read().signals_generated
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read();
        let pnls: Vec<f64> = inner.trades.iter().map(|t| t.pnl_pct).collect();

        MetricsSnapshot {
            signals_generated: inner.signals_generated,
            trades_closed: inner.trades_closed,
            errors: inner.errors,
            win_rate: win_rate(&pnls),
            profit_factor: profit_factor(&pnls),
            sharpe_ratio: sharpe(&pnls),
            max_drawdown_pct: max_drawdown(&pnls),
            best_trade_pct: pnls.iter().copied().fold(0.0, f64::max),
            worst_trade_pct: pnls.iter().copied().fold(0.0, f64::min),
        }
    }
}

fn win_rate(pnls: &[f64]) -> f64 {
    if pnls.is_empty() {
        return 0.0;
    }
    let wins = pnls.iter().filter(|p| **p > 0.0).count();
    wins as f64 / pnls.len() as f64 * 100.0
}

/// Gross profit over gross loss; the conventional "all wins" sentinel is
/// infinity, reported as a large finite cap for serialization.
fn profit_factor(pnls: &[f64]) -> f64 {
    let gross_profit: f64 = pnls.iter().filter(|p| **p > 0.0).sum();
    let gross_loss: f64 = pnls.iter().filter(|p| **p < 0.0).map(|p| -p).sum();

    if gross_loss == 0.0 {
        if gross_profit > 0.0 {
            return 999.0;
        }
        return 0.0;
    }
    gross_profit / gross_loss
}

fn sharpe(pnls: &[f64]) -> f64 {
    if pnls.len() < 2 {
        return 0.0;
    }

    let n = pnls.len() as f64;
    let mean = pnls.iter().sum::<f64>() / n;
    let variance = pnls.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
    let stdev = variance.sqrt();
    if stdev == 0.0 {
        return 0.0;
    }

    mean / stdev * ANNUALIZATION_DAYS.sqrt()
}

/// Worst peak-to-trough fall of the cumulative P&L curve, in percentage
/// points.
fn max_drawdown(pnls: &[f64]) -> f64 {
    let mut equity = 0.0;
    let mut peak = 0.0;
    let mut worst = 0.0;

    for pnl in pnls {
        equity += pnl;
        if equity > peak {
            peak = equity;
        }
        let drawdown = peak - equity;
        if drawdown > worst {
            worst = drawdown;
        }
    }

    worst
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = MetricsCollector::new();
        metrics.record_signal();
        metrics.record_signal();
        metrics.record_error();
        metrics.record_trade(2.0, 400.0, 2.0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.signals_generated, 2);
        assert_eq!(snapshot.trades_closed, 1);
        assert_eq!(snapshot.errors, 1);
    }

    #[test]
    fn win_rate_over_mixed_trades() {
        let metrics = MetricsCollector::new();
        for pnl in [2.0, -1.0, 1.0, -0.5] {
            metrics.record_trade(pnl, 0.0, 2.0);
        }
        let snapshot = metrics.snapshot();
        assert!((snapshot.win_rate - 50.0).abs() < 1e-9);
    }

    #[test]
    fn profit_factor_ratio() {
        // Gross profit 3.0, gross loss 1.5 -> 2.0.
        assert!((profit_factor(&[2.0, -1.0, 1.0, -0.5]) - 2.0).abs() < 1e-9);
        assert_eq!(profit_factor(&[1.0, 2.0]), 999.0);
        assert_eq!(profit_factor(&[]), 0.0);
    }

    #[test]
    fn sharpe_positive_for_steady_gains() {
        let pnls = [0.5, 0.6, 0.4, 0.7, 0.5, 0.6];
        assert!(sharpe(&pnls) > 0.0);
        // Flat series has no deviation.
        assert_eq!(sharpe(&[0.5, 0.5, 0.5]), 0.0);
    }

    #[test]
    fn drawdown_tracks_worst_valley() {
        // Equity: 2, 1, 3, 0.5 -> peak 3, trough 0.5 => 2.5.
        let dd = max_drawdown(&[2.0, -1.0, 2.0, -2.5]);
        assert!((dd - 2.5).abs() < 1e-9);
        assert_eq!(max_drawdown(&[1.0, 1.0]), 0.0);
    }

    #[test]
    fn best_and_worst_trades() {
        let metrics = MetricsCollector::new();
        for pnl in [2.0, -1.3, 0.7] {
            metrics.record_trade(pnl, 0.0, 2.0);
        }
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.best_trade_pct, 2.0);
        assert_eq!(snapshot.worst_trade_pct, -1.3);
    }
}
