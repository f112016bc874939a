//! Date coercion for spreadsheet cells
//!
//! Numeric cells are Excel serial dates. Text cells are tried against the
//! formats seen in the sheets; anything unparseable or containing a
//! placeholder token is treated as absent.

use chrono::{Days, NaiveDate, NaiveDateTime};

/// Tokens marking a date that has not been decided yet
const PLACEHOLDER_TOKENS: &[&str] = &["pending", "tbd", "tba", "need to start", "not started", "n/a"];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d %b %Y",
    "%d-%b-%Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// Convert an Excel serial day number to a date
///
/// The epoch is 1900-01-01 shifted back two days to absorb Excel's
/// phantom 1900-02-29 and its 1-based numbering, so every serial from
/// March 1900 onward lands on the same day Excel shows. Fractional parts
/// (time of day) are dropped.
#[must_use]
pub fn excel_serial_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > 2_958_465.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    // fraction is the time of day
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let days = serial.trunc() as u64;
    epoch.checked_add_days(Days::new(days))
}

/// Whether a cell holds a "not yet known" marker instead of a date
#[must_use]
pub fn is_placeholder(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    PLACEHOLDER_TOKENS.iter().any(|token| lowered.contains(token))
}

/// Interpret a spreadsheet cell as a date, or `None` when it is not one
#[must_use]
pub fn coerce_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() || is_placeholder(value) {
        return None;
    }

    if let Ok(serial) = value.parse::<f64>() {
        return excel_serial_date(serial);
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
                .map(|dt| dt.date())
        })
}
