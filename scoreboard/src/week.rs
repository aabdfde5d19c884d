//! Week keys: the Monday of a week, formatted `DD/MM/YY`.

use chrono::{Datelike, Days, Local, NaiveDate};

const WEEK_KEY_FORMAT: &str = "%d/%m/%y";

/// Source of "today" for the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    /// The local calendar date at call time.
    Local,
    /// A pinned date (tests, backfills).
    Fixed(NaiveDate),
}

impl Clock {
    pub fn today(self) -> NaiveDate {
        match self {
            Clock::Local => Local::now().date_naive(),
            Clock::Fixed(date) => date,
        }
    }

    pub fn week_key(self) -> String {
        week_key(self.today())
    }
}

/// Key of the week containing `date`.
pub fn week_key(date: NaiveDate) -> String {
    let offset = u64::from(date.weekday().num_days_from_monday());
    let monday = date.checked_sub_days(Days::new(offset)).unwrap_or(date);
    monday.format(WEEK_KEY_FORMAT).to_string()
}

/// Parse a week key back into its Monday, if well-formed.
pub fn parse_week_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, WEEK_KEY_FORMAT).ok()
}
