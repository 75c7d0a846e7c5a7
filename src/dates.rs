// src/dates.rs
// Deterministic date/time normalization (C5).
//
// Every app renders timestamps its own way, and the same app renders them
// differently depending on age ("2:41 PM" today, "Yesterday at 2:41 PM",
// "Mon 2:41 PM" this week, "Mar 3" this year, "Mar 3, 2023" older). None of
// these carry a timezone, so everything here resolves against a caller-
// supplied `reference` instant and the local timezone; a string the parser
// cannot place unambiguously resolves to `None` rather than a guess.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Weekday};
use regex::Regex;
use std::sync::LazyLock;

/// Parse a free-form timestamp string as rendered by one of the harvested
/// applications, resolved relative to `reference` (normally "now").
///
/// Returns `None` rather than a wrong date when the string doesn't match
/// any known pattern — callers must never persist a fabricated timestamp.
pub fn parse_app_timestamp(text: &str, reference: DateTime<Local>) -> Option<DateTime<Local>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    parse_relative_today_prefixed(text, reference)
        .or_else(|| parse_relative_today(text, reference))
        .or_else(|| parse_relative_yesterday(text, reference))
        .or_else(|| parse_weekday_time(text, reference))
        .or_else(|| parse_month_day_comma_time(text, reference))
        .or_else(|| parse_month_day_time(text, reference))
        .or_else(|| parse_month_day_year(text, reference))
        .or_else(|| parse_month_day_year_time(text, reference))
        .or_else(|| parse_month_day_year_bare_time(text, reference))
        .or_else(|| parse_iso_like(text))
        .or_else(|| parse_slack_absolute(text, reference))
        .or_else(|| parse_whatsapp_absolute(text, reference))
        .or_else(|| parse_whatsapp_month_day_time(text, reference))
        .or_else(|| parse_relative_minutes(text, reference))
}

/// Parse a bare "h:mm AM/PM"-style time with no date, for combining with
/// a date captured separately by a caller's own regex (the calendar
/// event patterns' end-time group, §6).
pub fn parse_bare_time(text: &str) -> Option<NaiveTime> {
    parse_time_of_day(text)
}

static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d{1,2}):(\d{2})(?::(\d{2}))?(?:\s*(AM|PM))?$").unwrap());

/// "2:41 PM" or Slack's seconds-bearing "3:02:40 PM".
fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    let caps = TIME_RE.captures(s.trim())?;
    let mut hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(2)?.as_str().parse().ok()?;
    let second: u32 = caps.get(3).map_or(Ok(0), |m| m.as_str().parse())?;
    if let Some(meridiem) = caps.get(4) {
        let is_pm = meridiem.as_str().eq_ignore_ascii_case("PM");
        if hour == 12 {
            hour = 0;
        }
        if is_pm {
            hour += 12;
        }
    }
    NaiveTime::from_hms_opt(hour, minute, second)
}

/// "Today at 3:02 PM" / "Today at 3:02:40 PM" (Slack style, explicit
/// prefix rather than a bare time-of-day).
fn parse_relative_today_prefixed(text: &str, reference: DateTime<Local>) -> Option<DateTime<Local>> {
    let lower = text.to_ascii_lowercase();
    let rest = lower.strip_prefix("today")?;
    let rest = rest.trim_start_matches(" at").trim();
    let time = parse_time_of_day(rest)?;
    combine(reference, reference.date_naive(), time)
}

static RELATIVE_MINUTES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^(\d+)\s*m$").unwrap());

/// Relative "7m" → `now − 7 minutes`.
fn parse_relative_minutes(text: &str, reference: DateTime<Local>) -> Option<DateTime<Local>> {
    let caps = RELATIVE_MINUTES_RE.captures(text.trim())?;
    let minutes: i64 = caps.get(1)?.as_str().parse().ok()?;
    Some(reference - Duration::minutes(minutes))
}

fn combine(_reference: DateTime<Local>, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Local>> {
    let naive = NaiveDateTime::new(date, time);
    match Local.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => Some(dt),
        chrono::LocalResult::Ambiguous(dt, _) => Some(dt),
        chrono::LocalResult::None => None,
    }
}

/// "2:41 PM" / "14:41" — today.
fn parse_relative_today(text: &str, reference: DateTime<Local>) -> Option<DateTime<Local>> {
    let time = parse_time_of_day(text)?;
    combine(reference, reference.date_naive(), time)
}

/// "Yesterday at 2:41 PM" (Slack/Teams style).
fn parse_relative_yesterday(text: &str, reference: DateTime<Local>) -> Option<DateTime<Local>> {
    let lower = text.to_ascii_lowercase();
    let rest = lower.strip_prefix("yesterday")?;
    let rest = rest.trim_start_matches(" at").trim();
    let time = parse_time_of_day(rest)?;
    let date = reference.date_naive() - Duration::days(1);
    combine(reference, date, time)
}

const WEEKDAYS: [(&str, Weekday); 7] = [
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
];

/// "Mon 2:41 PM", "Monday at 2:41 PM" — most recent matching day within the
/// last 7 days (never today, never the future).
fn parse_weekday_time(text: &str, reference: DateTime<Local>) -> Option<DateTime<Local>> {
    let lower = text.to_ascii_lowercase();
    let (name, rest) = lower.split_once(char::is_whitespace)?;
    let target = WEEKDAYS
        .iter()
        .find(|(full, _)| *full == name || full.starts_with(name) && name.len() >= 3)
        .map(|(_, wd)| *wd)?;
    let rest = rest.trim_start_matches("at").trim();
    let time = parse_time_of_day(rest)?;

    let mut date = reference.date_naive() - Duration::days(1);
    for _ in 0..7 {
        if date.weekday() == target {
            return combine(reference, date, time);
        }
        date -= Duration::days(1);
    }
    None
}

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

fn month_index(token: &str) -> Option<u32> {
    let lower = token.to_ascii_lowercase();
    let prefix = &lower[..lower.len().min(3)];
    MONTHS.iter().position(|m| *m == prefix).map(|i| i as u32 + 1)
}

static MONTH_DAY_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^([A-Za-z]{3,9})\s+(\d{1,2})(?:,)?\s+at\s+(.+)$").unwrap());

/// "Mar 3 at 2:41 PM" (this year, no year rendered).
fn parse_month_day_time(text: &str, reference: DateTime<Local>) -> Option<DateTime<Local>> {
    let caps = MONTH_DAY_TIME_RE.captures(text)?;
    let month = month_index(caps.get(1)?.as_str())?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let time = parse_time_of_day(caps.get(3)?.as_str())?;

    let mut year = reference.year();
    let mut date = NaiveDate::from_ymd_opt(year, month, day)?;
    if date > reference.date_naive() {
        year -= 1;
        date = NaiveDate::from_ymd_opt(year, month, day)?;
    }
    combine(reference, date, time)
}

static MONTH_DAY_COMMA_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^([A-Za-z]{3,9})\s+(\d{1,2}),\s+(.+)$").unwrap());

/// "NOV 07, 4:27 AM" — month/day with no year, comma before the time
/// instead of "at". Year is inferred from `reference`; if the resolved
/// instant would be in the future, it's shifted back one year.
fn parse_month_day_comma_time(text: &str, reference: DateTime<Local>) -> Option<DateTime<Local>> {
    let caps = MONTH_DAY_COMMA_TIME_RE.captures(text)?;
    let month = month_index(caps.get(1)?.as_str())?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    // A bare 4-digit group here is a year, not a time-of-day — that case
    // belongs to `parse_month_day_year_time`, not this pattern.
    let time_part = caps.get(3)?.as_str();
    if time_part.trim().chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let time = parse_time_of_day(time_part)?;

    let mut year = reference.year();
    let mut date = NaiveDate::from_ymd_opt(year, month, day)?;
    let mut candidate = combine(reference, date, time)?;
    if candidate > reference {
        year -= 1;
        date = NaiveDate::from_ymd_opt(year, month, day)?;
        candidate = combine(reference, date, time)?;
    }
    Some(candidate)
}

static MONTH_DAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^([A-Za-z]{3,9})\s+(\d{1,2})$").unwrap());

/// "Mar 3" — date only, this year (or last, if that would be a future
/// date), midnight local time.
fn parse_month_day_year(text: &str, reference: DateTime<Local>) -> Option<DateTime<Local>> {
    let caps = MONTH_DAY_RE.captures(text)?;
    let month = month_index(caps.get(1)?.as_str())?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;

    let mut year = reference.year();
    let mut date = NaiveDate::from_ymd_opt(year, month, day)?;
    if date > reference.date_naive() {
        year -= 1;
        date = NaiveDate::from_ymd_opt(year, month, day)?;
    }
    combine(reference, date, NaiveTime::from_hms_opt(0, 0, 0)?)
}

static MONTH_DAY_YEAR_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([A-Za-z]{3,9})\s+(\d{1,2}),\s+(\d{4})(?:,?\s+at\s+(.+))?$").unwrap()
});

/// "Mar 3, 2023" or "Mar 3, 2023, at 2:41 PM" (explicit year — Outlook,
/// Mail, Notion timestamps beyond the current year).
fn parse_month_day_year_time(text: &str, reference: DateTime<Local>) -> Option<DateTime<Local>> {
    let caps = MONTH_DAY_YEAR_TIME_RE.captures(text)?;
    let month = month_index(caps.get(1)?.as_str())?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year: i32 = caps.get(3)?.as_str().parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = match caps.get(4) {
        Some(m) => parse_time_of_day(m.as_str())?,
        None => NaiveTime::from_hms_opt(0, 0, 0)?,
    };
    combine(reference, date, time)
}

static MONTH_DAY_YEAR_BARE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([A-Za-z]{3,9})\s+(\d{1,2}),\s+(\d{4})\s+(\d{1,2}:\d{2}\s*[AP]M)$").unwrap()
});

/// "March 3, 2023 2:00 PM" — explicit year, bare time with no "at"
/// separator (the Outlook/Teams calendar-cell and Teams message regexes'
/// datetime group, §6 — distinct from `parse_month_day_year_time`, which
/// requires "at").
fn parse_month_day_year_bare_time(text: &str, reference: DateTime<Local>) -> Option<DateTime<Local>> {
    let caps = MONTH_DAY_YEAR_BARE_TIME_RE.captures(text)?;
    let month = month_index(caps.get(1)?.as_str())?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year: i32 = caps.get(3)?.as_str().parse().ok()?;
    let time = parse_time_of_day(caps.get(4)?.as_str())?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    combine(reference, date, time)
}

/// RFC 3339 / ISO 8601, when an app happens to expose a machine-readable
/// attribute alongside its rendered label (e.g. a `datetime` attribute).
fn parse_iso_like(text: &str) -> Option<DateTime<Local>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Local))
}

static SLACK_ABSOLUTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^([A-Za-z]{3,9})\s+(\d{1,2})(?:st|nd|rd|th)?,\s+(\d{4})$").unwrap());

/// Slack's "March 3rd, 2023" divider format.
fn parse_slack_absolute(text: &str, _reference: DateTime<Local>) -> Option<DateTime<Local>> {
    let caps = SLACK_ABSOLUTE_RE.captures(text)?;
    let month = month_index(caps.get(1)?.as_str())?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year: i32 = caps.get(3)?.as_str().parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    combine(_reference, date, NaiveTime::from_hms_opt(0, 0, 0)?)
}

static WHATSAPP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[?(\d{1,2})/(\d{1,2})/(\d{2,4}),?\s+(\d{1,2}:\d{2}(?:\s*[AP]M)?)\]?$").unwrap());

/// WhatsApp's "3/14/24, 2:41 PM" (locale-dependent month/day order assumed
/// US style, matching the desktop export format this parser targets).
fn parse_whatsapp_absolute(text: &str, reference: DateTime<Local>) -> Option<DateTime<Local>> {
    let caps = WHATSAPP_RE.captures(text)?;
    let month: u32 = caps.get(1)?.as_str().parse().ok()?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year_raw: i32 = caps.get(3)?.as_str().parse().ok()?;
    let year = if year_raw < 100 { 2000 + year_raw } else { year_raw };
    let time = parse_time_of_day(caps.get(4)?.as_str())?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    combine(reference, date, time)
}

static WHATSAPP_MONTH_DAY_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^([A-Za-z]{3,9})\s+(\d{1,2})\s+(\d{1,2}:\d{2}\s*[AP]M)$").unwrap());

/// WhatsApp's "November 7 4:27 AM" — full month name, no comma, no year
/// (current year, or the prior year if that would be in the future).
fn parse_whatsapp_month_day_time(text: &str, reference: DateTime<Local>) -> Option<DateTime<Local>> {
    let caps = WHATSAPP_MONTH_DAY_TIME_RE.captures(text)?;
    let month = month_index(caps.get(1)?.as_str())?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let time = parse_time_of_day(caps.get(3)?.as_str())?;

    let mut year = reference.year();
    let mut date = NaiveDate::from_ymd_opt(year, month, day)?;
    let mut candidate = combine(reference, date, time)?;
    if candidate > reference {
        year -= 1;
        date = NaiveDate::from_ymd_opt(year, month, day)?;
        candidate = combine(reference, date, time)?;
    }
    Some(candidate)
}
