// =============================================================================
// Market Analysis Module
// =============================================================================
//
// Pure OHLCV analysis: swing structure, divergences, liquidity patterns,
// volume profile, and cross-pair correlation. No state is retained; every
// function maps a candle window to a result record.

pub mod correlation;
pub mod divergence;
pub mod liquidity;
pub mod structure;
pub mod volume_profile;

pub use correlation::{analyze_correlation, CorrelationResult};
pub use divergence::{detect_divergences, DivergenceResult, DivergenceSide};
pub use liquidity::{detect_liquidity, LiquidityResult};
pub use structure::{
    detect_structure, find_swing_points, nearest_level, support_resistance, LevelKind, Levels,
    StructureResult, SwingPoints,
};
pub use volume_profile::{analyze_profile, ValueAreaPosition, VolumeProfile};
