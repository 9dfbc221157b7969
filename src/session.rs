// =============================================================================
// Trading session windows — IST hour gating
// =============================================================================
//
// Sessions (IST hours, end exclusive):
//   Asia     07–11
//   London   13–17
//   New York 17–22
//   Overlap  22–24
//
// Hours outside every window (the 00–07 dead zone and the 11–13 gap) are not
// tradable. Avoid windows take precedence over session windows.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::clock::Clock;

/// Named IST trading session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Session {
    Asia,
    London,
    NewYork,
    Overlap,
}

impl Session {
    /// IST hour window for this session: `[start, end)`.
    pub fn hours(self) -> (u32, u32) {
        match self {
            Self::Asia => (7, 11),
            Self::London => (13, 17),
            Self::NewYork => (17, 22),
            Self::Overlap => (22, 24),
        }
    }

    const ALL: [Session; 4] = [Self::Asia, Self::London, Self::NewYork, Self::Overlap];
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Asia => write!(f, "asia"),
            Self::London => write!(f, "london"),
            Self::NewYork => write!(f, "ny"),
            Self::Overlap => write!(f, "overlap"),
        }
    }
}

/// An operator-configured window during which signals are suppressed,
/// e.g. around a scheduled macro release. `(start_hour, end_hour, label)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvoidWindow {
    pub start_hour: u32,
    pub end_hour: u32,
    pub label: String,
}

/// Outcome of the session gate.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCheck {
    Active(Session),
    Avoided(String),
    Closed,
}

/// Resolve the session gate for the current IST hour.
pub fn check_session(clock: &dyn Clock, avoid: &[AvoidWindow]) -> SessionCheck {
    let hour = clock.now_ist().format("%H").to_string().parse::<u32>().unwrap_or(0);

    for window in avoid {
        if window.start_hour <= hour && hour < window.end_hour {
            return SessionCheck::Avoided(window.label.clone());
        }
    }

    for session in Session::ALL {
        let (start, end) = session.hours();
        if start <= hour && hour < end {
            return SessionCheck::Active(session);
        }
    }

    SessionCheck::Closed
}
