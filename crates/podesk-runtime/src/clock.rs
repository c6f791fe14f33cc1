use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use podesk_schemas::YearMonth;

/// Source of "now". Injected so scans and transitions are reproducible.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Paris;

/// The desk's business calendar.
///
/// Timestamps are stored in UTC; "today" (for intake) and the allocation
/// period are taken in the desk's local timezone, so an order created at
/// 00:30 Paris time on 1 March belongs to March even though it is still
/// February in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    tz: Tz,
}

impl Calendar {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    pub fn period(&self, now: DateTime<Utc>) -> YearMonth {
        YearMonth::from_date(self.today(now))
    }
}

impl Default for Calendar {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEZONE)
    }
}
