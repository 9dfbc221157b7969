// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free functions over candle / close-price slices. Each
// function is total: insufficient input yields the documented neutral value
// (RSI 50, ADX 20, ATR 0, EMA arithmetic mean) instead of an error, so the
// filter pipeline can fail closed without branching on data length at every
// call site.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod vwap;

pub use adx::calculate_adx;
pub use atr::{calculate_atr, calculate_atr_pct};
pub use bollinger::{calculate_bollinger, BollingerBands};
pub use ema::{calculate_ema, calculate_sma, ema_series};
pub use macd::{calculate_macd, MacdResult};
pub use rsi::calculate_rsi;
pub use vwap::calculate_vwap;
