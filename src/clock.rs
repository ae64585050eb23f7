//! Time source abstraction.
//!
//! Thresholds in the reaper and interval checks in the migration scheduler are
//! all computed against a `Clock`, so tests can pin "now" with `FixedClock`.

use std::sync::RwLock;

use chrono::{NaiveDateTime, TimeDelta, Utc};

/// Provides the current UTC time as a naive timestamp (the column type used
/// by every table this service touches).
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

/// Manually driven clock for tests and dry runs.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard = now;
    }

    pub fn advance(&self, delta: TimeDelta) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard += delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_fixed_clock_advances() {
        let clock = FixedClock::new(noon());
        clock.advance(TimeDelta::minutes(61));
        assert_eq!(clock.now(), noon() + TimeDelta::minutes(61));
    }

    #[test]
    fn test_fixed_clock_set() {
        let clock = FixedClock::new(noon());
        let later = noon() + TimeDelta::days(1);
        clock.set(later);
        assert_eq!(clock.now(), later);
    }
}
