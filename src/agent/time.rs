//! Relative date-range resolution for natural-language questions.
//!
//! All ranges are inclusive `[start, end]` calendar days. Weeks start on
//! Monday. Month names without a year resolve to their most recent
//! occurrence that is not in the future.

use chrono::{Datelike, Duration, Months, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Phrase the range was resolved from ("last week", "march 2024", ...)
    pub label: String,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate, label: impl Into<String>) -> Self {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        Self { start, end, label: label.into() }
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn describe(&self) -> String {
        if self.start == self.end {
            format!("{} ({})", self.label, self.start)
        } else {
            format!("{} ({} to {})", self.label, self.start, self.end)
        }
    }
}

const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sep|sept|oct|nov|dec";

lazy_static! {
    static ref ISO_DATE: Regex = Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").unwrap();
    static ref MONTH_DAY_YEAR: Regex = Regex::new(&format!(
        r"^({MONTHS})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?(?:,?\s+(\d{{4}}))?$"
    ))
    .unwrap();
    static ref DAY_MONTH_YEAR: Regex = Regex::new(&format!(
        r"^(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({MONTHS})\.?(?:,?\s+(\d{{4}}))?$"
    ))
    .unwrap();
    static ref MONTH_YEAR: Regex =
        Regex::new(&format!(r"^({MONTHS})\.?(?:,?\s+(\d{{4}}))?$")).unwrap();

    static ref BETWEEN: Regex = Regex::new(&format!(
        r"\b(?:from|between)\s+(?P<a>\d{{4}}-\d{{1,2}}-\d{{1,2}}|(?:{m})\.?(?:\s+\d{{1,2}}(?:st|nd|rd|th)?)?(?:,?\s+\d{{4}})?|\d{{1,2}}(?:st|nd|rd|th)?\s+(?:{m})(?:,?\s+\d{{4}})?)\s+(?:to|until|till|through|and|-)\s+(?P<b>\d{{4}}-\d{{1,2}}-\d{{1,2}}|(?:{m})\.?(?:\s+\d{{1,2}}(?:st|nd|rd|th)?)?(?:,?\s+\d{{4}})?|\d{{1,2}}(?:st|nd|rd|th)?\s+(?:{m})(?:,?\s+\d{{4}})?)\b",
        m = MONTHS
    ))
    .unwrap();
    static ref SINCE: Regex = Regex::new(&format!(
        r"\bsince\s+(?P<a>\d{{4}}-\d{{1,2}}-\d{{1,2}}|(?:{m})\.?(?:\s+\d{{1,2}}(?:st|nd|rd|th)?)?(?:,?\s+\d{{4}})?|\d{{1,2}}(?:st|nd|rd|th)?\s+(?:{m})(?:,?\s+\d{{4}})?)\b",
        m = MONTHS
    ))
    .unwrap();
    static ref LAST_N: Regex =
        Regex::new(r"\b(?:last|past|previous)\s+(\d{1,3})\s+(day|week|month)s?\b").unwrap();
    static ref RELATIVE: Regex = Regex::new(
        r"\b(today|yesterday|(?:this|current|last|previous|past)\s+(?:week|month|quarter|year))\b"
    )
    .unwrap();
    static ref IN_MONTH: Regex = Regex::new(&format!(
        r"\b(?:in|during|for|of)\s+((?:{MONTHS})\.?(?:,?\s+\d{{4}})?)\b"
    ))
    .unwrap();
    static ref MONTH_WITH_YEAR: Regex =
        Regex::new(&format!(r"\b((?:{MONTHS})\.?,?\s+\d{{4}})\b")).unwrap();
    // Full names only; "may" and the short forms are ordinary words too.
    static ref BARE_MONTH: Regex = Regex::new(
        r"\b(january|february|march|april|june|july|august|september|october|november|december)\b"
    )
    .unwrap();
}

pub fn month_number(name: &str) -> Option<u32> {
    let name = name.trim_end_matches('.');
    let n = match name {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sep" | "sept" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(n)
}

pub fn month_start(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

pub fn month_end(year: i32, month: u32) -> Option<NaiveDate> {
    month_start(year, month)?
        .checked_add_months(Months::new(1))?
        .pred_opt()
}

fn quarter_start(date: NaiveDate) -> Option<NaiveDate> {
    let first_month = ((date.month() - 1) / 3) * 3 + 1;
    month_start(date.year(), first_month)
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Which end of a period an open expression such as "march" stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Start,
    End,
}

/// Parses a single date expression. A missing year picks the most recent
/// occurrence not after `today`.
fn parse_date_expr(expr: &str, today: NaiveDate, edge: Edge) -> Option<NaiveDate> {
    let expr = expr.trim().trim_end_matches(',');

    if let Some(c) = ISO_DATE.captures(expr) {
        return NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
    }

    let day_and_month = MONTH_DAY_YEAR
        .captures(expr)
        .map(|c| (c.get(1), c.get(2), c.get(3)))
        .or_else(|| {
            DAY_MONTH_YEAR
                .captures(expr)
                .map(|c| (c.get(2), c.get(1), c.get(3)))
        });
    if let Some((month, day, year)) = day_and_month {
        let month = month_number(month?.as_str())?;
        let day: u32 = day?.as_str().parse().ok()?;
        return match year {
            Some(y) => NaiveDate::from_ymd_opt(y.as_str().parse().ok()?, month, day),
            None => {
                let candidate = NaiveDate::from_ymd_opt(today.year(), month, day)?;
                if candidate > today {
                    NaiveDate::from_ymd_opt(today.year() - 1, month, day)
                } else {
                    Some(candidate)
                }
            }
        };
    }

    if let Some(c) = MONTH_YEAR.captures(expr) {
        let month = month_number(&c[1])?;
        let year = match c.get(2) {
            Some(y) => y.as_str().parse().ok()?,
            None => most_recent_year(month, today),
        };
        return match edge {
            Edge::Start => month_start(year, month),
            Edge::End => month_end(year, month),
        };
    }

    None
}

fn has_explicit_year(expr: &str) -> bool {
    expr.split(|c: char| !c.is_ascii_digit()).any(|part| part.len() == 4)
}

fn most_recent_year(month: u32, today: NaiveDate) -> i32 {
    if month > today.month() {
        today.year() - 1
    } else {
        today.year()
    }
}

fn resolve_relative(phrase: &str, today: NaiveDate) -> Option<DateRange> {
    let normalized = phrase.replace("current", "this").replace("previous", "last").replace("past", "last");
    let range = match normalized.as_str() {
        "today" => DateRange::new(today, today, phrase),
        "yesterday" => {
            let d = today.pred_opt()?;
            DateRange::new(d, d, phrase)
        }
        "this week" => DateRange::new(week_start(today), today, phrase),
        "last week" => {
            let start = week_start(today) - Duration::days(7);
            DateRange::new(start, start + Duration::days(6), phrase)
        }
        "this month" => DateRange::new(month_start(today.year(), today.month())?, today, phrase),
        "last month" => {
            let prev = month_start(today.year(), today.month())?.pred_opt()?;
            DateRange::new(month_start(prev.year(), prev.month())?, prev, phrase)
        }
        "this quarter" => DateRange::new(quarter_start(today)?, today, phrase),
        "last quarter" => {
            let end = quarter_start(today)?.pred_opt()?;
            DateRange::new(quarter_start(end)?, end, phrase)
        }
        "this year" => DateRange::new(NaiveDate::from_ymd_opt(today.year(), 1, 1)?, today, phrase),
        "last year" => DateRange::new(
            NaiveDate::from_ymd_opt(today.year() - 1, 1, 1)?,
            NaiveDate::from_ymd_opt(today.year() - 1, 12, 31)?,
            phrase,
        ),
        _ => return None,
    };
    Some(range)
}

/// Resolves the first date range mentioned in `text`, relative to `today`.
pub fn resolve_date_range(text: &str, today: NaiveDate) -> Option<DateRange> {
    let lower = text.to_lowercase();

    if let Some(c) = BETWEEN.captures(&lower) {
        let start = parse_date_expr(&c["a"], today, Edge::Start);
        let end = parse_date_expr(&c["b"], today, Edge::End);
        if let (Some(mut start), Some(end)) = (start, end) {
            // "from november to february" spans the year boundary.
            if start > end && !has_explicit_year(&c["a"]) {
                start = start.with_year(start.year() - 1).unwrap_or(start);
            }
            return Some(DateRange::new(start, end, c.get(0)?.as_str().trim()));
        }
    }

    if let Some(c) = SINCE.captures(&lower) {
        if let Some(start) = parse_date_expr(&c["a"], today, Edge::Start) {
            return Some(DateRange::new(start, today.max(start), c.get(0)?.as_str().trim()));
        }
    }

    if let Some(c) = LAST_N.captures(&lower) {
        let n: u32 = c[1].parse().ok()?;
        if n == 0 {
            return None;
        }
        let start = match &c[2] {
            "day" => today - Duration::days(n as i64 - 1),
            "week" => today - Duration::days(7 * n as i64 - 1),
            _ => today.checked_sub_months(Months::new(n))?.succ_opt()?,
        };
        return Some(DateRange::new(start, today, c.get(0)?.as_str()));
    }

    if let Some(c) = RELATIVE.captures(&lower) {
        let phrase = c[1].split_whitespace().collect::<Vec<_>>().join(" ");
        if let Some(range) = resolve_relative(&phrase, today) {
            return Some(range);
        }
    }

    let month_phrase = IN_MONTH
        .captures(&lower)
        .map(|c| c[1].to_string())
        .or_else(|| MONTH_WITH_YEAR.captures(&lower).map(|c| c[1].to_string()))
        .or_else(|| BARE_MONTH.captures(&lower).map(|c| c[1].to_string()));
    if let Some(phrase) = month_phrase {
        let start = parse_date_expr(&phrase, today, Edge::Start)?;
        let end = parse_date_expr(&phrase, today, Edge::End)?.min(today.max(start));
        return Some(DateRange::new(start, end, phrase.trim()));
    }

    None
}
