//! Permissive timestamp parsing.
//!
//! Every timestamp entering the system goes through here. Values with an
//! explicit offset are converted to UTC; values without one are taken as UTC.
//! The result is always a timezone-naive UTC instant. Unparsable input yields
//! `None` so call sites can fall back to their own default.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %I:%M %p",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%B %d %Y %H:%M:%S",
    "%B %d %Y %H:%M",
    "%B %d %Y %I:%M %p",
    "%B %d %Y %I%p",
    "%d %B %Y %H:%M:%S",
    "%d %B %Y %H:%M",
    "%d %B %Y %I:%M %p",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%B %d %Y", "%d %B %Y", "%d.%m.%Y", "%m/%d/%Y",
];

const WEEKDAYS: &[&str] = &[
    "mon", "monday", "tue", "tues", "tuesday", "wed", "wednesday", "thu", "thur", "thurs",
    "thursday", "fri", "friday", "sat", "saturday", "sun", "sunday",
];

static ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").expect("valid regex"));

static OFFSET_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:utc|gmt)?([+-])(\d{1,2})(?::?(\d{2}))?$").expect("valid regex")
});

static ATTACHED_OFFSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.*\d:\d{2}(?::\d{2}(?:\.\d+)?)?)(z|[+-]\d{2}:?\d{2})$").expect("valid regex")
});

/// Converts any zoned timestamp into the naive-UTC form used at rest.
pub fn to_naive_utc<Tz: TimeZone>(value: DateTime<Tz>) -> NaiveDateTime {
    value.with_timezone(&Utc).naive_utc()
}

/// Parses a structured or free-text timestamp carried in a JSON payload.
pub fn parse_json_datetime(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::String(text) => parse_datetime(text),
        Value::Number(number) => {
            let raw = number.as_i64()?;
            // Millisecond epochs are 13 digits for any date this side of 2286.
            let seconds = if raw.abs() >= 100_000_000_000 { raw / 1000 } else { raw };
            DateTime::<Utc>::from_timestamp(seconds, 0).map(to_naive_utc)
        }
        _ => None,
    }
}

/// Permissive parse of a user or remote timestamp, normalised to naive UTC.
pub fn parse_datetime(input: &str) -> Option<NaiveDateTime> {
    let trimmed = input.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(to_naive_utc(parsed));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(to_naive_utc(parsed));
    }

    let normalized = ORDINAL.replace_all(&trimmed.replace(',', " "), "$1").into_owned();
    let mut tokens: Vec<String> = normalized
        .split_whitespace()
        .filter(|t| !t.eq_ignore_ascii_case("at"))
        .map(str::to_string)
        .collect();

    if tokens
        .first()
        .is_some_and(|t| WEEKDAYS.contains(&t.trim_end_matches('.').to_lowercase().as_str()))
    {
        tokens.remove(0);
    }

    let offset = split_offset(&mut tokens);
    let body = tokens.join(" ");
    if body.is_empty() {
        return None;
    }

    let naive = parse_naive(&body)?;
    match offset {
        Some(offset) => offset
            .from_local_datetime(&naive)
            .single()
            .map(to_naive_utc),
        None => Some(naive),
    }
}

fn parse_naive(body: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(body, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(body, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Removes a trailing timezone designator from `tokens` and returns its offset.
fn split_offset(tokens: &mut Vec<String>) -> Option<FixedOffset> {
    let last = tokens.last()?.clone();
    let upper = last.to_uppercase();

    if matches!(upper.as_str(), "UTC" | "GMT" | "UT" | "Z") {
        tokens.pop();
        return FixedOffset::east_opt(0);
    }

    if tokens.len() > 1 {
        if let Some(caps) = OFFSET_TOKEN.captures(&last) {
            tokens.pop();
            return offset_from_parts(&caps[1], &caps[2], caps.get(3).map(|m| m.as_str()));
        }
    }

    if let Some(caps) = ATTACHED_OFFSET.captures(&last) {
        let time = caps[1].to_string();
        let designator = caps[2].to_string();
        if let Some(slot) = tokens.last_mut() {
            *slot = time;
        }
        if designator.eq_ignore_ascii_case("z") {
            return FixedOffset::east_opt(0);
        }
        let digits = designator[1..].replace(':', "");
        return offset_from_parts(&designator[..1], &digits[..2], Some(&digits[2..]));
    }

    None
}

fn offset_from_parts(sign: &str, hours: &str, minutes: Option<&str>) -> Option<FixedOffset> {
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.map(str::parse).transpose().ok()?.unwrap_or(0);
    let seconds = hours * 3600 + minutes * 60;
    if sign == "-" {
        FixedOffset::west_opt(seconds)
    } else {
        FixedOffset::east_opt(seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn parses_chat_style_deadline_as_utc() {
        assert_eq!(
            parse_datetime("Nov 11, 2025, 22:33 UTC"),
            Some(at(2025, 11, 11, 22, 33))
        );
        assert_eq!(
            parse_datetime("\"Dec 31, 2024, 23:59 UTC\""),
            Some(at(2024, 12, 31, 23, 59))
        );
    }

    #[test]
    fn converts_explicit_offsets_to_utc() {
        assert_eq!(
            parse_datetime("2025-11-11T22:33:00+03:00"),
            Some(at(2025, 11, 11, 19, 33))
        );
        assert_eq!(
            parse_datetime("Nov 11 2025 22:33 +0200"),
            Some(at(2025, 11, 11, 20, 33))
        );
        assert_eq!(
            parse_datetime("2025-11-11 22:33-05:00"),
            Some(at(2025, 11, 12, 3, 33))
        );
        assert_eq!(
            parse_datetime("2025-11-11T22:33:00Z"),
            Some(at(2025, 11, 11, 22, 33))
        );
    }

    #[test]
    fn naive_input_is_taken_as_utc() {
        assert_eq!(
            parse_datetime("2025-03-01 08:15"),
            Some(at(2025, 3, 1, 8, 15))
        );
        assert_eq!(
            parse_datetime("Tuesday, March 4th 2025 at 9:00"),
            Some(at(2025, 3, 4, 9, 0))
        );
        assert_eq!(parse_datetime("2025-03-01"), Some(at(2025, 3, 1, 0, 0)));
        assert_eq!(parse_datetime("14.02.2026 18:00"), Some(at(2026, 2, 14, 18, 0)));
    }

    #[test]
    fn garbage_yields_none() {
        assert_eq!(parse_datetime(""), None);
        assert_eq!(parse_datetime("next tuesday-ish"), None);
        assert_eq!(parse_datetime("UTC"), None);
    }

    #[test]
    fn json_values_accept_strings_and_epochs() {
        assert_eq!(
            parse_json_datetime(&Value::from("2025-11-11T22:33:00Z")),
            Some(at(2025, 11, 11, 22, 33))
        );
        assert_eq!(
            parse_json_datetime(&Value::from(1_762_900_380_i64)),
            Some(at(2025, 11, 11, 22, 33))
        );
        assert_eq!(parse_json_datetime(&Value::Null), None);
    }
}
