// =============================================================================
// Clock abstraction — injectable time source
// =============================================================================
//
// All time-dependent logic (session gating, cooldown windows, daily rollover,
// signal-age validation) reads the current time through this trait so that
// tests can drive it deterministically.
// =============================================================================

use chrono::{DateTime, FixedOffset, Utc};

/// IST offset (+05:30) used by session gating and daily rollover.
pub fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).expect("IST offset is valid")
}

/// Injectable time source.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current time in IST.
    fn now_ist(&self) -> DateTime<FixedOffset> {
        self.now_utc().with_timezone(&ist_offset())
    }

    /// Today's date in IST as `YYYY-MM-DD`.
    fn today_ist(&self) -> String {
        self.now_ist().format("%Y-%m-%d").to_string()
    }
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for deterministic tests.
#[cfg(test)]
pub mod test_clock {
    use super::*;
    use parking_lot::Mutex;

    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn at(now: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(now),
            }
        }

        /// Parse an RFC 3339 timestamp, e.g. `2024-03-01T09:30:00Z`.
        pub fn at_rfc3339(s: &str) -> Self {
            Self::at(
                DateTime::parse_from_rfc3339(s)
                    .expect("valid rfc3339 timestamp")
                    .with_timezone(&Utc),
            )
        }

        pub fn set(&self, now: DateTime<Utc>) {
            *self.now.lock() = now;
        }

        pub fn advance_minutes(&self, minutes: i64) {
            let mut now = self.now.lock();
            *now += chrono::Duration::minutes(minutes);
        }
    }

    impl Clock for ManualClock {
        fn now_utc(&self) -> DateTime<Utc> {
            *self.now.lock()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_clock::ManualClock;
    use super::*;

    #[test]
    fn ist_conversion() {
        // 09:30 UTC == 15:00 IST
        let clock = ManualClock::at_rfc3339("2024-03-01T09:30:00Z");
        let ist = clock.now_ist();
        assert_eq!(ist.format("%H:%M").to_string(), "15:00");
    }

    #[test]
    fn ist_date_rolls_before_utc() {
        // 19:00 UTC is already the next day in IST (00:30).
        let clock = ManualClock::at_rfc3339("2024-03-01T19:00:00Z");
        assert_eq!(clock.today_ist(), "2024-03-02");
    }

    #[test]
    fn advance_moves_time() {
        let clock = ManualClock::at_rfc3339("2024-03-01T00:00:00Z");
        clock.advance_minutes(90);
        assert_eq!(
            clock.now_utc().format("%H:%M").to_string(),
            "01:30"
        );
    }
}
