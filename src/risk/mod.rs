// =============================================================================
// Risk Module
// =============================================================================
//
// Capital protection around the signal stream: position sizing, the daily
// lock, drawdown control, consecutive-loss cooldown, and the lifecycle
// manager that owns every active trade.

pub mod consecutive_loss;
pub mod daily_lock;
pub mod drawdown;
pub mod manager;
pub mod position_sizing;

pub use consecutive_loss::ConsecutiveLossTracker;
pub use daily_lock::DailyLock;
pub use drawdown::DrawdownController;
pub use manager::{ActiveTrade, ClosedTrade, LifecycleEvent, RiskManager, TradeAction};
pub use position_sizing::{PositionSize, PositionSizer, SizedPosition};
