use chrono::{NaiveDate, Utc};
use std::sync::Mutex;

/// Format used in archive keys and the last-checked marker.
pub const DATE_STAMP_FORMAT: &str = "%Y%m%d";

/// Source of "today" for day-guard and archive decisions.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Calendar date in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Settable clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    date: Mutex<NaiveDate>,
}

impl FixedClock {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date: Mutex::new(date),
        }
    }

    pub fn set(&self, date: NaiveDate) {
        match self.date.lock() {
            Ok(mut d) => *d = date,
            Err(poisoned) => *poisoned.into_inner() = date,
        }
    }

    /// Move the clock forward by `days`.
    pub fn advance_days(&self, days: u64) {
        let next = self.today() + chrono::Days::new(days);
        self.set(next);
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        match self.date.lock() {
            Ok(d) => *d,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// `YYYYMMDD` rendering of `date`.
pub fn date_stamp(date: NaiveDate) -> String {
    date.format(DATE_STAMP_FORMAT).to_string()
}

/// Parse a `YYYYMMDD` stamp.
pub fn parse_date_stamp(stamp: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(stamp.trim(), DATE_STAMP_FORMAT).ok()
}
