//! Relative and explicit time expressions
//!
//! Expressions are recognized without a reference date and resolved later
//! against the request's [`DateContext`], so the same tagged query always
//! resolves the same way for the same day.

use chrono::{Datelike, Days, Months, NaiveDate};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;

use nt_core::DateContext;

use crate::vocab::{self, MONTHS};

/// Day of a month, optionally pinned to a year
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CalendarDay {
    pub day: u32,
    pub month: u32,
    pub year: Option<i32>,
}

impl CalendarDay {
    fn resolve(&self, default_year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year.unwrap_or(default_year), self.month, self.day)
    }
}

/// A time expression found in a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeExpr {
    Today,
    Yesterday,
    Tomorrow,
    ThisWeek,
    LastWeek,
    ThisMonth,
    ThisSemester,
    Day(CalendarDay),
    Range(CalendarDay, CalendarDay),
    Month { month: u32, year: Option<i32> },
}

impl TimeExpr {
    /// Inclusive date range the expression denotes.
    ///
    /// Returns `None` for impossible calendar dates (e.g. 31/02). A reversed
    /// explicit range is reordered.
    pub fn resolve(&self, ctx: &DateContext) -> Option<(NaiveDate, NaiveDate)> {
        let year = ctx.today.year();
        match *self {
            Self::Today => Some((ctx.today, ctx.today)),
            Self::Yesterday => Some((ctx.yesterday, ctx.yesterday)),
            Self::Tomorrow => Some((ctx.tomorrow(), ctx.tomorrow())),
            Self::ThisWeek => Some((ctx.week_start, ctx.week_end)),
            Self::LastWeek => Some((ctx.last_week_start, ctx.last_week_end)),
            Self::ThisMonth => Some((ctx.month_start, ctx.month_end)),
            Self::ThisSemester => Some((ctx.semester_start, ctx.semester_end)),
            Self::Day(day) => day.resolve(year).map(|d| (d, d)),
            Self::Range(from, to) => {
                // "entre 01/09 e 15/09/2024": the start borrows the end's year
                let from_year = from.year.or(to.year).unwrap_or(year);
                let from = from.resolve(from_year)?;
                let to = to.resolve(year)?;
                Some(if from <= to { (from, to) } else { (to, from) })
            }
            Self::Month { month, year: pinned } => {
                let start = NaiveDate::from_ymd_opt(pinned.unwrap_or(year), month, 1)?;
                let end = start.checked_add_months(Months::new(1))? - Days::new(1);
                Some((start, end))
            }
        }
    }

    /// Whether the expression came from literal dates rather than a
    /// relative phrase
    pub fn is_explicit(&self) -> bool {
        matches!(self, Self::Day(_) | Self::Range(..) | Self::Month { .. })
    }
}

/// A time expression with its byte span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeMatch {
    pub start: usize,
    pub end: usize,
    pub expr: TimeExpr,
}

const DATE: &str = r"\d{4}-\d{1,2}-\d{1,2}|\d{1,2}/\d{1,2}(?:/\d{4})?";

static MONTH_NAMES: Lazy<String> = Lazy::new(|| {
    MONTHS
        .iter()
        .map(|(name, _)| vocab::accent_insensitive(name))
        .collect::<Vec<_>>()
        .join("|")
});

type Builder = fn(&Captures) -> Option<TimeExpr>;

fn rule(source: impl Into<String>, build: Builder) -> (String, Builder) {
    (source.into(), build)
}

static PATTERNS: Lazy<Vec<(Regex, Builder)>> = Lazy::new(|| {
    let months = MONTH_NAMES.as_str();
    let sources = [
        rule(r"\bhoje\b", |_| Some(TimeExpr::Today)),
        rule(r"\bontem\b", |_| Some(TimeExpr::Yesterday)),
        rule(r"\bamanh[ãa]\b", |_| Some(TimeExpr::Tomorrow)),
        rule(
            r"\b(?:n?esta|n?essa|desta|dessa)\s+semana\b|\bsemana\s+atual\b",
            |_| Some(TimeExpr::ThisWeek),
        ),
        rule(
            r"\b(?:[úu]ltima|ult\.?)\s+semana\b|\bsemana\s+(?:passada|anterior)\b",
            |_| Some(TimeExpr::LastWeek),
        ),
        rule(
            r"\b(?:n?este|n?esse|deste|desse)\s+m[êe]s\b|\bm[êe]s\s+atual\b",
            |_| Some(TimeExpr::ThisMonth),
        ),
        rule(
            r"\b(?:n?este|n?esse|deste|desse)\s+semestre\b|\bsemestre\s+atual\b",
            |_| Some(TimeExpr::ThisSemester),
        ),
        rule(
            format!(
                r"\b(?:entre|de|desde)\s+(?:o\s+dia\s+)?({DATE})\s+(?:e|a|at[ée])\s+(?:o\s+dia\s+)?({DATE})\b"
            ),
            |caps| {
                Some(TimeExpr::Range(
                    parse_date(caps.get(1)?.as_str())?,
                    parse_date(caps.get(2)?.as_str())?,
                ))
            },
        ),
        rule(
            format!(
                r"\b(?:entre|de|desde)\s+(?:os\s+dias\s+|o\s+dia\s+)?(\d{{1,2}})\s+(?:e|a|at[ée])\s+(?:o\s+dia\s+)?(\d{{1,2}})\s+de\s+({months})(?:\s+de\s+(\d{{4}}))?\b"
            ),
            |caps| {
                let month = vocab::month_number(caps.get(3)?.as_str())?;
                let year = caps.get(4).and_then(|m| m.as_str().parse().ok());
                let day = |i: usize| -> Option<CalendarDay> {
                    Some(CalendarDay {
                        day: caps.get(i)?.as_str().parse().ok()?,
                        month,
                        year,
                    })
                };
                Some(TimeExpr::Range(day(1)?, day(2)?))
            },
        ),
        rule(
            format!(r"\b(?:dia\s+)?(\d{{1,2}})\s+de\s+({months})(?:\s+de\s+(\d{{4}}))?\b"),
            |caps| {
                Some(TimeExpr::Day(CalendarDay {
                    day: caps.get(1)?.as_str().parse().ok()?,
                    month: vocab::month_number(caps.get(2)?.as_str())?,
                    year: caps.get(3).and_then(|m| m.as_str().parse().ok()),
                }))
            },
        ),
        rule(
            format!(
                r"\b(?:em|no\s+m[êe]s\s+de|durante|de)\s+({months})(?:\s+de\s+(\d{{4}}))?\b"
            ),
            |caps| {
                Some(TimeExpr::Month {
                    month: vocab::month_number(caps.get(1)?.as_str())?,
                    year: caps.get(2).and_then(|m| m.as_str().parse().ok()),
                })
            },
        ),
        rule(
            format!(r"\b(?:em\s+|no\s+dia\s+|dia\s+)?({DATE})\b"),
            |caps| Some(TimeExpr::Day(parse_date(caps.get(1)?.as_str())?)),
        ),
    ];

    sources
        .into_iter()
        .filter_map(|(source, build)| {
            Regex::new(&format!("(?i){source}"))
                .map(|regex| (regex, build))
                .map_err(|e| tracing::error!("invalid time pattern {source}: {e}"))
                .ok()
        })
        .collect()
});

/// Every time expression candidate in `text`, overlapping candidates included
pub fn scan(text: &str) -> Vec<TimeMatch> {
    let mut found = Vec::new();
    for (regex, build) in PATTERNS.iter() {
        for caps in regex.captures_iter(text) {
            let (Some(whole), Some(expr)) = (caps.get(0), build(&caps)) else {
                continue;
            };
            found.push(TimeMatch {
                start: whole.start(),
                end: whole.end(),
                expr,
            });
        }
    }
    found
}

/// Parse `AAAA-MM-DD`, `DD/MM/AAAA` or `DD/MM`
pub fn parse_date(text: &str) -> Option<CalendarDay> {
    let parts: Vec<&str> = text.split(['-', '/']).collect();
    let (day, month, year) = match parts.as_slice() {
        [y, m, d] if text.contains('-') => (*d, *m, Some(*y)),
        [d, m, y] => (*d, *m, Some(*y)),
        [d, m] => (*d, *m, None),
        _ => return None,
    };

    let day = CalendarDay {
        day: day.parse().ok()?,
        month: month.parse().ok()?,
        year: match year {
            Some(y) => Some(y.parse().ok()?),
            None => None,
        },
    };
    // 2000 is a leap year, so 29/02 without a year is accepted here
    day.resolve(2000).map(|_| day)
}
