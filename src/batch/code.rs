//! Batch schedule code parsing
//!
//! Grammar: `<DAYCODE>:<HOUR>:<MINUTE>[(<SUFFIX>)]`, for example `WF:2:30(U)`.
//! Hours are afternoon/evening hours: `12` stays `12`, `1`-`11` become `13`-`23`.

use crate::error::ErrorKind;
use chrono::Weekday;
use chrono::Weekday::{Fri, Mon, Sat, Sun, Thu, Tue, Wed};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

static SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<body>.*?)\s*\((?P<suffix>[^()]*)\)\s*$").expect("suffix pattern"));

/// Known day codes, multi-day combinations first
const DAY_CODES: &[(&str, &[Weekday])] = &[
    ("MWF", &[Mon, Wed, Fri]),
    ("MW", &[Mon, Wed]),
    ("MF", &[Mon, Fri]),
    ("WF", &[Wed, Fri]),
    ("TT", &[Tue, Thu]),
    ("SS", &[Sat, Sun]),
    ("M", &[Mon]),
    ("T", &[Tue]),
    ("W", &[Wed]),
    ("TH", &[Thu]),
    ("F", &[Fri]),
    ("SA", &[Sat]),
    ("SU", &[Sun]),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchCodeError {
    #[error("invalid batch code '{code}': expected <days>:<hour>:<minute>[(<suffix>)]")]
    InvalidFormat { code: String },

    #[error("unknown day code '{day_code}' in '{code}'; supported codes: {supported}")]
    UnknownDayCode {
        code: String,
        day_code: String,
        supported: String,
    },

    #[error("invalid time in batch code '{code}': {reason}")]
    InvalidTime { code: String, reason: String },
}

impl BatchCodeError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Wall-clock class time on a 24-hour clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassTime {
    pub hour: u8,
    pub minute: u8,
}

impl ClassTime {
    /// Hour as written in a batch code (`1`-`12`)
    #[must_use]
    pub fn twelve_hour(self) -> u8 {
        if self.hour > 12 {
            self.hour - 12
        } else {
            self.hour
        }
    }
}

impl fmt::Display for ClassTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Structured form of a batch schedule code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedBatchCode {
    /// Canonical code with the suffix re-attached verbatim
    pub normalized_code: String,
    pub day_code: String,
    pub days: Vec<Weekday>,
    pub time: ClassTime,
    pub suffix: Option<String>,
}

impl ParsedBatchCode {
    /// Lower-case full weekday names, Monday first
    #[must_use]
    pub fn day_names(&self) -> Vec<&'static str> {
        self.days.iter().map(|d| weekday_name(*d)).collect()
    }
}

#[must_use]
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Mon => "monday",
        Tue => "tuesday",
        Wed => "wednesday",
        Thu => "thursday",
        Fri => "friday",
        Sat => "saturday",
        Sun => "sunday",
    }
}

/// Day codes accepted by [`parse_batch_code`]
#[must_use]
pub fn supported_day_codes() -> Vec<&'static str> {
    DAY_CODES.iter().map(|(code, _)| *code).collect()
}

/// Parse a raw batch code into days, time and suffix
///
/// # Errors
///
/// - `InvalidFormat` when the code does not split into three `:` parts
/// - `UnknownDayCode` when the day part is not a known code
/// - `InvalidTime` when hour or minute are out of range
pub fn parse_batch_code(raw: &str) -> Result<ParsedBatchCode, BatchCodeError> {
    let trimmed = raw.trim();
    let (body, suffix) = match SUFFIX.captures(trimmed) {
        Some(caps) => (
            caps.name("body").map_or("", |m| m.as_str()),
            caps.name("suffix").map(|m| m.as_str().to_string()),
        ),
        None => (trimmed, None),
    };

    let parts: Vec<&str> = body.split(':').map(str::trim).collect();
    let [day_part, hour_part, minute_part] = parts.as_slice() else {
        return Err(BatchCodeError::InvalidFormat {
            code: raw.to_string(),
        });
    };

    let day_code = day_part.to_ascii_uppercase();
    let days = DAY_CODES
        .iter()
        .find(|(code, _)| *code == day_code)
        .map(|(_, days)| days.to_vec())
        .ok_or_else(|| BatchCodeError::UnknownDayCode {
            code: raw.to_string(),
            day_code: day_part.to_string(),
            supported: supported_day_codes().join(", "),
        })?;

    let time = parse_time(raw, hour_part, minute_part)?;

    let mut normalized_code = format!("{day_code}:{}:{:02}", time.twelve_hour(), time.minute);
    if let Some(suffix) = &suffix {
        normalized_code.push('(');
        normalized_code.push_str(suffix);
        normalized_code.push(')');
    }

    Ok(ParsedBatchCode {
        normalized_code,
        day_code,
        days,
        time,
        suffix,
    })
}

/// Whether `raw` is a well-formed batch code
#[must_use]
pub fn is_valid_batch_code(raw: &str) -> bool {
    parse_batch_code(raw).is_ok()
}

fn parse_time(raw: &str, hour: &str, minute: &str) -> Result<ClassTime, BatchCodeError> {
    let invalid = |reason: String| BatchCodeError::InvalidTime {
        code: raw.to_string(),
        reason,
    };

    let hour: u8 = hour
        .parse()
        .map_err(|_| invalid(format!("hour '{hour}' is not a number")))?;
    if !(1..=12).contains(&hour) {
        return Err(invalid(format!("hour {hour} is outside 1-12")));
    }

    if minute.is_empty() || minute.len() > 2 || !minute.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid(format!("minute '{minute}' is not a two-digit number")));
    }
    let minute: u8 = minute
        .parse()
        .map_err(|_| invalid(format!("minute '{minute}' is not a number")))?;
    if minute > 59 {
        return Err(invalid(format!("minute {minute} is outside 0-59")));
    }

    let hour = if hour == 12 { 12 } else { hour + 12 };
    Ok(ClassTime { hour, minute })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_suffix() {
        let parsed = parse_batch_code("WF:2:30(U)").unwrap();
        assert_eq!(parsed.normalized_code, "WF:2:30(U)");
        assert_eq!(parsed.day_names(), vec!["wednesday", "friday"]);
        assert_eq!(parsed.time.to_string(), "14:30");
        assert_eq!(parsed.suffix.as_deref(), Some("U"));
    }

    #[test]
    fn test_parse_weekend_code() {
        let parsed = parse_batch_code("SS:4:30").unwrap();
        assert_eq!(parsed.days, vec![Sat, Sun]);
        assert_eq!(parsed.time.to_string(), "16:30");
        assert_eq!(parsed.suffix, None);
    }

    #[test]
    fn test_noon_stays_noon() {
        let parsed = parse_batch_code("TT:12:00").unwrap();
        assert_eq!(parsed.time.to_string(), "12:00");
        let parsed = parse_batch_code("m:11:5").unwrap();
        assert_eq!(parsed.time.to_string(), "23:05");
        assert_eq!(parsed.normalized_code, "M:11:05");
    }

    #[test]
    fn test_suffix_kept_verbatim() {
        let parsed = parse_batch_code(" ss:6:00 (Online B) ").unwrap();
        assert_eq!(parsed.normalized_code, "SS:6:00(Online B)");
    }

    #[test]
    fn test_too_few_parts() {
        let err = parse_batch_code("WF:2").unwrap_err();
        assert!(matches!(err, BatchCodeError::InvalidFormat { .. }));
        let err = parse_batch_code("").unwrap_err();
        assert!(matches!(err, BatchCodeError::InvalidFormat { .. }));
    }

    #[test]
    fn test_unknown_day_code_lists_supported() {
        let err = parse_batch_code("XY:2:30").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("XY"));
        assert!(message.contains("WF"));
        assert!(message.contains("SS"));
    }

    #[test]
    fn test_invalid_time() {
        assert!(matches!(parse_batch_code("WF:13:00"), Err(BatchCodeError::InvalidTime { .. })));
        assert!(matches!(parse_batch_code("WF:2:75"), Err(BatchCodeError::InvalidTime { .. })));
        assert!(matches!(parse_batch_code("WF:two:00"), Err(BatchCodeError::InvalidTime { .. })));
        assert!(!is_valid_batch_code("WF:0:30"));
        assert!(is_valid_batch_code("WF:02:30"));
    }
}
