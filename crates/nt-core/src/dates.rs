//! Reference dates for resolving relative time expressions
//!
//! A [`DateContext`] is a snapshot taken once per request. It must never be
//! cached across requests: "today" has to reflect the moment the query was
//! received.

use chrono::{Datelike, Days, Local, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Calendar dates derived from the reference day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DateContext {
    pub today: NaiveDate,
    pub yesterday: NaiveDate,
    /// Monday of the current ISO week
    pub week_start: NaiveDate,
    /// Sunday of the current ISO week
    pub week_end: NaiveDate,
    pub month_start: NaiveDate,
    pub month_end: NaiveDate,
    /// Jan 1 or Jul 1
    pub semester_start: NaiveDate,
    /// Jun 30 or Dec 31
    pub semester_end: NaiveDate,
    /// Monday of the previous ISO week
    pub last_week_start: NaiveDate,
    /// Sunday of the previous ISO week
    pub last_week_end: NaiveDate,
}

impl DateContext {
    /// Compute the context for a given reference day
    pub fn for_date(today: NaiveDate) -> Self {
        let week_start = today - Days::new(u64::from(today.weekday().num_days_from_monday()));
        let week_end = week_start + Days::new(6);

        let month_start = today - Days::new(u64::from(today.day0()));
        let month_end = month_start + Months::new(1) - Days::new(1);

        let semester_start = month_start - Months::new(today.month0() % 6);
        let semester_end = semester_start + Months::new(6) - Days::new(1);

        let last_week_end = week_start - Days::new(1);
        let last_week_start = last_week_end - Days::new(6);

        Self {
            today,
            yesterday: today - Days::new(1),
            week_start,
            week_end,
            month_start,
            month_end,
            semester_start,
            semester_end,
            last_week_start,
            last_week_end,
        }
    }

    /// Context for the current local date
    pub fn now() -> Self {
        Self::for_date(Local::now().date_naive())
    }

    pub fn tomorrow(&self) -> NaiveDate {
        self.today + Days::new(1)
    }
}

// ============================================================================
// Tests
// ============================================================================
