// =============================================================================
// Trade Journal — append-only CSV per date with a JSON mirror
// =============================================================================
//
// One `trades_YYYY-MM-DD.csv` per IST date, headers written on first touch,
// plus a `trades_YYYY-MM-DD.json` array carrying the same records for
// consumers that prefer structured data. Appends are small and synchronous;
// the engine runs them off the control loop.
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One settled trade as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: String,
    pub symbol: String,
    pub direction: String,
    pub entry: f64,
    pub exit: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub position_usd: f64,
    pub pnl_pct: f64,
    pub pnl_usd: f64,
    pub rr_ratio: f64,
    pub market_type: String,
    pub grade: String,
    pub filters_passed: u32,
    pub score: f64,
    pub reason: String,
}

/// Aggregate statistics over a set of records.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JournalStats {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub total_pnl_pct: f64,
    pub avg_rr: f64,
    pub best_trade_pct: f64,
    pub worst_trade_pct: f64,
}

pub struct TradeJournal {
    dir: PathBuf,
}

impl TradeJournal {
    /// Open (creating if needed) a journal directory.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create journal dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn csv_path(&self, date: &str) -> PathBuf {
        self.dir.join(format!("trades_{date}.csv"))
    }

    fn json_path(&self, date: &str) -> PathBuf {
        self.dir.join(format!("trades_{date}.json"))
    }

    /// Append one record to the date's CSV and JSON files.
    pub fn append(&self, date: &str, record: &TradeRecord) -> Result<()> {
        self.append_csv(date, record)?;
        self.append_json(date, record)?;
        debug!(symbol = %record.symbol, pnl_pct = record.pnl_pct, "trade journaled");
        Ok(())
    }

    fn append_csv(&self, date: &str, record: &TradeRecord) -> Result<()> {
        let path = self.csv_path(date);
        let fresh = !path.exists();

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(fresh)
            .from_writer(file);
        writer.serialize(record).context("failed to write CSV record")?;
        writer.flush().context("failed to flush CSV")?;
        Ok(())
    }

    fn append_json(&self, date: &str, record: &TradeRecord) -> Result<()> {
        let path = self.json_path(date);

        let mut records: Vec<TradeRecord> = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            Vec::new()
        };
        records.push(record.clone());

        let json = serde_json::to_string_pretty(&records).context("failed to serialize journal")?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// All records for one date (empty when no file exists).
    pub fn records_for(&self, date: &str) -> Vec<TradeRecord> {
        let path = self.json_path(date);
        if !path.exists() {
            return Vec::new();
        }
        std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    /// Aggregate statistics for one date.
    pub fn stats_for(&self, date: &str) -> JournalStats {
        stats_over(&self.records_for(date))
    }

    /// Aggregate statistics across every journaled date.
    pub fn stats_all_time(&self) -> JournalStats {
        let mut all = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if let Some(date) = name
                    .strip_prefix("trades_")
                    .and_then(|n| n.strip_suffix(".json"))
                {
                    all.extend(self.records_for(date));
                }
            }
        }
        stats_over(&all)
    }
}

fn stats_over(records: &[TradeRecord]) -> JournalStats {
    if records.is_empty() {
        return JournalStats::default();
    }

    let wins = records.iter().filter(|r| r.pnl_pct > 0.0).count();
    let total_pnl: f64 = records.iter().map(|r| r.pnl_pct).sum();
    let avg_rr = records.iter().map(|r| r.rr_ratio).sum::<f64>() / records.len() as f64;

    JournalStats {
        total_trades: records.len(),
        wins,
        losses: records.len() - wins,
        win_rate: wins as f64 / records.len() as f64 * 100.0,
        total_pnl_pct: total_pnl,
        avg_rr,
        best_trade_pct: records.iter().map(|r| r.pnl_pct).fold(f64::NEG_INFINITY, f64::max),
        worst_trade_pct: records.iter().map(|r| r.pnl_pct).fold(f64::INFINITY, f64::min),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(symbol: &str, pnl_pct: f64) -> TradeRecord {
        TradeRecord {
            timestamp: "2024-03-01T10:00:00Z".to_string(),
            symbol: symbol.to_string(),
            direction: "LONG".to_string(),
            entry: 100.0,
            exit: 100.0 + pnl_pct,
            stop_loss: 98.0,
            take_profit: 106.0,
            position_usd: 20_000.0,
            pnl_pct,
            pnl_usd: 20_000.0 * pnl_pct / 100.0,
            rr_ratio: 2.0,
            market_type: "trending".to_string(),
            grade: "B+".to_string(),
            filters_passed: 7,
            score: 78.0,
            reason: "TP_HIT".to_string(),
        }
    }

    #[test]
    fn csv_written_with_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let journal = TradeJournal::new(dir.path()).unwrap();

        journal.append("2024-03-01", &record("ETH/USDT", 2.0)).unwrap();
        journal.append("2024-03-01", &record("SOL/USDT", -1.0)).unwrap();

        let csv = std::fs::read_to_string(dir.path().join("trades_2024-03-01.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3, "one header + two records");
        assert!(lines[0].starts_with("timestamp,symbol,direction"));
        assert!(lines[1].contains("ETH/USDT"));
        assert!(lines[2].contains("SOL/USDT"));
    }

    #[test]
    fn json_mirror_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let journal = TradeJournal::new(dir.path()).unwrap();

        journal.append("2024-03-01", &record("ETH/USDT", 2.0)).unwrap();
        journal.append("2024-03-01", &record("SOL/USDT", -1.0)).unwrap();

        let records = journal.records_for("2024-03-01");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].symbol, "SOL/USDT");
    }

    #[test]
    fn dates_are_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let journal = TradeJournal::new(dir.path()).unwrap();

        journal.append("2024-03-01", &record("ETH/USDT", 2.0)).unwrap();
        journal.append("2024-03-02", &record("SOL/USDT", 1.0)).unwrap();

        assert_eq!(journal.records_for("2024-03-01").len(), 1);
        assert_eq!(journal.records_for("2024-03-02").len(), 1);
        assert_eq!(journal.records_for("2024-03-03").len(), 0);
    }

    #[test]
    fn daily_stats() {
        let dir = tempfile::tempdir().unwrap();
        let journal = TradeJournal::new(dir.path()).unwrap();

        journal.append("2024-03-01", &record("ETH/USDT", 2.0)).unwrap();
        journal.append("2024-03-01", &record("SOL/USDT", -1.0)).unwrap();
        journal.append("2024-03-01", &record("DOGE/USDT", 0.5)).unwrap();

        let stats = journal.stats_for("2024-03-01");
        assert_eq!(stats.total_trades, 3);
        assert_eq!(stats.wins, 2);
        assert_eq!(stats.losses, 1);
        assert!((stats.win_rate - 66.666).abs() < 0.01);
        assert!((stats.total_pnl_pct - 1.5).abs() < 1e-9);
        assert_eq!(stats.best_trade_pct, 2.0);
        assert_eq!(stats.worst_trade_pct, -1.0);
    }

    #[test]
    fn all_time_stats_span_dates() {
        let dir = tempfile::tempdir().unwrap();
        let journal = TradeJournal::new(dir.path()).unwrap();

        journal.append("2024-03-01", &record("ETH/USDT", 2.0)).unwrap();
        journal.append("2024-03-02", &record("SOL/USDT", -1.0)).unwrap();

        let stats = journal.stats_all_time();
        assert_eq!(stats.total_trades, 2);
        assert!((stats.total_pnl_pct - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_journal_stats_are_zero() {
        let dir = tempfile::tempdir().unwrap();
        let journal = TradeJournal::new(dir.path()).unwrap();
        let stats = journal.stats_for("2024-03-01");
        assert_eq!(stats.total_trades, 0);
        assert_eq!(stats.win_rate, 0.0);
    }
}
