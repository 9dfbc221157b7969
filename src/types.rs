// =============================================================================
// Shared types used across the Meridian signal engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Coarse market regime derived from BTC ADX / ATR%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    Trending,
    Choppy,
    HighVol,
    Unknown,
}

impl MarketType {
    /// Tier-2 percentage threshold for this market type.
    pub fn tier2_threshold(self) -> f64 {
        match self {
            Self::Trending => 60.0,
            Self::Choppy => 55.0,
            Self::HighVol => 65.0,
            Self::Unknown => 60.0,
        }
    }
}

impl std::fmt::Display for MarketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trending => write!(f, "trending"),
            Self::Choppy => write!(f, "choppy"),
            Self::HighVol => write!(f, "high_vol"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    Long,
    Short,
}

impl TradeDirection {
    pub fn opposite(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

impl std::fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Letter grade assigned to a signal by its final score.
///
/// Modelled as a tagged enum with a single classification function so that
/// grades are ordered and never compared as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalGrade {
    D,
    C,
    B,
    BPlus,
    A,
    APlus,
}

impl SignalGrade {
    /// Classify a final score in [0, 100] into a grade bucket.
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Self::APlus
        } else if score >= 80.0 {
            Self::A
        } else if score >= 70.0 {
            Self::BPlus
        } else if score >= 60.0 {
            Self::B
        } else if score >= 50.0 {
            Self::C
        } else {
            Self::D
        }
    }

    /// A signal is only eligible for emission at B or better.
    pub fn can_trade(self) -> bool {
        self >= Self::B
    }
}

impl std::fmt::Display for SignalGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::APlus => write!(f, "A+"),
            Self::A => write!(f, "A"),
            Self::BPlus => write!(f, "B+"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
            Self::D => write!(f, "D"),
        }
    }
}

/// Detailed BTC regime classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BtcRegime {
    StrongBull,
    Bull,
    Choppy,
    Bear,
    StrongBear,
    Unknown,
}

impl BtcRegime {
    pub fn is_trend(self) -> bool {
        matches!(
            self,
            Self::StrongBull | Self::Bull | Self::Bear | Self::StrongBear
        )
    }
}

impl std::fmt::Display for BtcRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StrongBull => write!(f, "strong_bull"),
            Self::Bull => write!(f, "bull"),
            Self::Choppy => write!(f, "choppy"),
            Self::Bear => write!(f, "bear"),
            Self::StrongBear => write!(f, "strong_bear"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Directional bias of the BTC regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Up,
    Down,
    Sideways,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
            Self::Sideways => write!(f, "SIDEWAYS"),
        }
    }
}

/// Strength label shared by structure analysis and regime output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructureStrength {
    Strong,
    Moderate,
    Weak,
}

impl std::fmt::Display for StructureStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strong => write!(f, "STRONG"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::Weak => write!(f, "WEAK"),
        }
    }
}

/// How the BTC regime allows the engine to trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeMode {
    Trend,
    Range,
    Block,
}

impl std::fmt::Display for TradeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trend => write!(f, "TREND"),
            Self::Range => write!(f, "RANGE"),
            Self::Block => write!(f, "BLOCK"),
        }
    }
}

/// Engine health as reported by `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineHealth {
    Starting,
    Running,
    Degraded,
}

impl std::fmt::Display for EngineHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}
