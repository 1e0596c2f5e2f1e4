//! Free-text timestamp resolution
//!
//! Best-effort recovery of when a message was produced, from the message
//! text itself. Rungs, first hit wins: ISO date/time, month-name date,
//! relative "N units ago", bare clock time (read as today). Returns `None`
//! when nothing parses; callers rank such candidates lowest.
//!
//! Naive times carry no zone information and are interpreted as UTC.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

static RE_ISO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})-(\d{2})-(\d{2})(?:[T ](\d{2}):(\d{2})(?::(\d{2}))?)?").unwrap()
});

static RE_MONTH_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december)\s+(\d{1,2}),?\s+(\d{4})\b").unwrap()
});

static RE_RELATIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*(second|minute|hour)s?\s+ago").unwrap());

static RE_CLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2}):(\d{2})\s*(AM|PM)\b").unwrap());

/// Resolve a timestamp from free text, relative to `now`.
pub fn resolve_timestamp(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(ts) = parse_iso(text) {
        return Some(ts);
    }
    if let Some(ts) = parse_month_date(text) {
        return Some(ts);
    }
    if let Some(ts) = parse_relative(text, now) {
        return Some(ts);
    }
    parse_clock(text, now)
}

fn parse_iso(text: &str) -> Option<DateTime<Utc>> {
    let caps = RE_ISO.captures(text)?;
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    let day: u32 = caps.get(3)?.as_str().parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    let time = match (caps.get(4), caps.get(5)) {
        (Some(h), Some(m)) => {
            let hour: u32 = h.as_str().parse().ok()?;
            let minute: u32 = m.as_str().parse().ok()?;
            let second: u32 = caps
                .get(6)
                .and_then(|s| s.as_str().parse().ok())
                .unwrap_or(0);
            NaiveTime::from_hms_opt(hour, minute, second)?
        }
        _ => NaiveTime::from_hms_opt(0, 0, 0)?,
    };

    Some(NaiveDateTime::new(date, time).and_utc())
}

fn parse_month_date(text: &str) -> Option<DateTime<Utc>> {
    let caps = RE_MONTH_DATE.captures(text)?;
    let month = match caps.get(1)?.as_str().to_lowercase().as_str() {
        "january" => 1,
        "february" => 2,
        "march" => 3,
        "april" => 4,
        "may" => 5,
        "june" => 6,
        "july" => 7,
        "august" => 8,
        "september" => 9,
        "october" => 10,
        "november" => 11,
        "december" => 12,
        _ => return None,
    };
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year: i32 = caps.get(3)?.as_str().parse().ok()?;

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(NaiveDateTime::new(date, NaiveTime::from_hms_opt(0, 0, 0)?).and_utc())
}

fn parse_relative(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let caps = RE_RELATIVE.captures(text)?;
    let amount: i64 = caps.get(1)?.as_str().parse().ok()?;
    let offset = match caps.get(2)?.as_str().to_lowercase().as_str() {
        "second" => Duration::seconds(amount),
        "minute" => Duration::minutes(amount),
        "hour" => Duration::hours(amount),
        _ => return None,
    };
    Some(now - offset)
}

fn parse_clock(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let caps = RE_CLOCK.captures(text)?;
    let mut hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(2)?.as_str().parse().ok()?;
    let meridiem = caps.get(3)?.as_str().to_uppercase();

    if hour > 12 || minute > 59 {
        return None;
    }
    if meridiem == "PM" && hour != 12 {
        hour += 12;
    }
    if meridiem == "AM" && hour == 12 {
        hour = 0;
    }

    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    Some(NaiveDateTime::new(now.date_naive(), time).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .expect("valid test time")
            .and_utc()
    }

    #[test]
    fn resolves_iso_datetime() {
        let now = at("2024-03-01 10:00:00");
        let ts = resolve_timestamp("sent 2024-02-29 14:03:22 by the portal", now);
        assert_eq!(ts, Some(at("2024-02-29 14:03:22")));
    }

    #[test]
    fn resolves_iso_date_as_midnight() {
        let now = at("2024-03-01 10:00:00");
        let ts = resolve_timestamp("dated 2024-02-29, see below", now);
        assert_eq!(ts, Some(at("2024-02-29 00:00:00")));
    }

    #[test]
    fn resolves_month_name_date() {
        let now = at("2024-03-01 10:00:00");
        let ts = resolve_timestamp("received February 29, 2024", now);
        assert_eq!(ts, Some(at("2024-02-29 00:00:00")));
    }

    #[test]
    fn resolves_relative_expressions() {
        let now = at("2024-03-01 10:00:00");
        assert_eq!(
            resolve_timestamp("5 minutes ago", now),
            Some(at("2024-03-01 09:55:00"))
        );
        assert_eq!(
            resolve_timestamp("about 2 hours ago", now),
            Some(at("2024-03-01 08:00:00"))
        );
    }

    #[test]
    fn resolves_clock_time_as_today() {
        let now = at("2024-03-01 10:00:00");
        assert_eq!(
            resolve_timestamp("at 2:45 PM", now),
            Some(at("2024-03-01 14:45:00"))
        );
        assert_eq!(
            resolve_timestamp("12:10 AM", now),
            Some(at("2024-03-01 00:10:00"))
        );
    }

    #[test]
    fn unresolvable_text_yields_none() {
        let now = at("2024-03-01 10:00:00");
        assert_eq!(resolve_timestamp("your code is 483920", now), None);
    }
}
