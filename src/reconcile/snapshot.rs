//! Authoritative student rows
//!
//! One row per student. Payment cycles are spread across columns: the first
//! cycle uses the bare names (`dueDate`, `paymentStatus`, `paidDate`,
//! `paidAmount`), later cycles append their index (`dueDate2`, ...).
//! Headers are matched case-insensitively with punctuation ignored.

use crate::fees::{CycleStatus, PaymentCycle};
use crate::model::{parse_level_code, Level, Stage};
use crate::reconcile::dates::coerce_date;
use crate::reconcile::ReconcileError;
use chrono::NaiveDate;
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Upper bound on cycle column groups read from one header
const MAX_CYCLES: usize = 240;

const NAME: &[&str] = &["name", "studentname"];
const PHONE: &[&str] = &["phone", "phonenumber", "mobile", "contact"];
const EMAIL: &[&str] = &["email", "emailid", "emailaddress"];
const STATUS: &[&str] = &["status", "studentstatus"];
const STUDENT_START: &[&str] = &["studentstartdate", "startdate", "joiningdate"];
const LEVEL: &[&str] = &["level", "levelcode"];
const DURATION: &[&str] = &["duration", "durationmonths"];
const BATCH_CODE: &[&str] = &["batchcode", "batch"];
const TIMING: &[&str] = &["timing", "timings"];
const BATCH_START: &[&str] = &["batchstartdate"];

const DUE_DATE: &[&str] = &["duedate"];
const PAYMENT_STATUS: &[&str] = &["paymentstatus", "feestatus"];
const PAID_DATE: &[&str] = &["paiddate", "paymentdate"];
const PAID_AMOUNT: &[&str] = &["paidamount", "amount"];

const INACTIVE_TOKENS: &[&str] = &["inactive", "dropped", "left", "discontinued", "stopped", "quit"];

/// Normalized facts about one student from the authoritative source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthoritativeStudent {
    /// 1-based source line (header is line 1)
    pub line: usize,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub status: Option<String>,
    pub student_start_date: Option<NaiveDate>,
    /// Raw level code such as `B2`
    pub level_code: Option<String>,
    pub duration_months: Option<u32>,
    pub batch_code: Option<String>,
    pub timing: Option<String>,
    pub batch_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub cycles: Vec<PaymentCycle>,
}

impl AuthoritativeStudent {
    /// Bare student with no optional facts
    #[must_use]
    pub fn named(line: usize, name: impl Into<String>) -> Self {
        Self {
            line,
            name: name.into(),
            phone: None,
            email: None,
            status: None,
            student_start_date: None,
            level_code: None,
            duration_months: None,
            batch_code: None,
            timing: None,
            batch_start_date: None,
            cycles: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.as_deref().map_or(true, |status| {
            let lowered = status.to_ascii_lowercase();
            !INACTIVE_TOKENS.iter().any(|token| lowered.contains(token))
        })
    }

    /// Stage and level from the level code
    ///
    /// # Errors
    ///
    /// `InvalidLevel` when a code is present but malformed.
    pub fn stage_level(&self) -> Result<Option<(Stage, Level)>, ReconcileError> {
        match self.level_code.as_deref() {
            None => Ok(None),
            Some(code) => parse_level_code(code)
                .map(Some)
                .ok_or_else(|| ReconcileError::InvalidLevel(code.to_string())),
        }
    }
}

/// A full authoritative row set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthoritativeSnapshot {
    pub students: Vec<AuthoritativeStudent>,
    /// Rows dropped because they carried no name
    pub skipped_rows: usize,
    /// SHA-256 of the source content, hex encoded
    pub checksum: String,
}

impl AuthoritativeSnapshot {
    /// Build a snapshot from already-normalized students
    #[must_use]
    pub fn new(students: Vec<AuthoritativeStudent>) -> Self {
        let canonical = serde_json::to_vec(&students).unwrap_or_default();
        Self {
            checksum: calculate_checksum(&canonical),
            students,
            skipped_rows: 0,
        }
    }

    /// Read a CSV file
    ///
    /// # Errors
    ///
    /// `Io` when the file cannot be read; see [`Self::from_csv_bytes`].
    pub fn from_path(path: &Path) -> Result<Self, ReconcileError> {
        let data = fs::read(path).map_err(|source| ReconcileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_csv_bytes(&data)
    }

    /// Parse CSV content with a header row
    ///
    /// # Errors
    ///
    /// `MissingColumn` when there is no name column, `Csv` on malformed input.
    pub fn from_csv_bytes(data: &[u8]) -> Result<Self, ReconcileError> {
        let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
        let checksum = calculate_checksum(data);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(data);

        let columns = Columns::new(reader.headers()?);
        if columns.find(NAME, "").is_none() {
            return Err(ReconcileError::MissingColumn("name".to_string()));
        }
        let cycle_suffixes = columns.cycle_suffixes();
        debug!("authoritative header has {} payment cycle group(s)", cycle_suffixes.len());

        let mut students = Vec::new();
        let mut skipped_rows = 0;
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            let line = index + 2;
            let cell = |aliases: &[&str], suffix: &str| -> Option<String> {
                columns
                    .find(aliases, suffix)
                    .and_then(|i| record.get(i))
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            };

            let Some(name) = cell(NAME, "") else {
                skipped_rows += 1;
                continue;
            };

            let mut student = AuthoritativeStudent::named(line, name);
            student.phone = cell(PHONE, "");
            student.email = cell(EMAIL, "");
            student.status = cell(STATUS, "");
            student.student_start_date = cell(STUDENT_START, "").as_deref().and_then(coerce_date);
            student.level_code = cell(LEVEL, "");
            student.duration_months = cell(DURATION, "").as_deref().and_then(parse_duration);
            student.batch_code = cell(BATCH_CODE, "");
            student.timing = cell(TIMING, "");
            student.batch_start_date = cell(BATCH_START, "").as_deref().and_then(coerce_date);

            for suffix in cycle_suffixes.iter().map(String::as_str) {
                let due_date = cell(DUE_DATE, suffix).as_deref().and_then(coerce_date);
                let status = cell(PAYMENT_STATUS, suffix)
                    .as_deref()
                    .map_or(CycleStatus::Pending, CycleStatus::parse);
                let paid_date = cell(PAID_DATE, suffix).as_deref().and_then(coerce_date);
                let amount_cell = cell(PAID_AMOUNT, suffix);
                let amount = amount_cell.as_deref().and_then(parse_amount);
                if amount_cell.is_some() && amount.is_none() {
                    warn!("line {line}: unreadable paid amount {amount_cell:?} ignored");
                }

                if due_date.is_none() && paid_date.is_none() && amount.is_none() && !status.carries_payment() {
                    continue;
                }
                student.cycles.push(PaymentCycle {
                    due_date,
                    status,
                    paid_date,
                    amount,
                });
            }
            students.push(student);
        }

        Ok(Self {
            students,
            skipped_rows,
            checksum,
        })
    }
}

/// SHA-256 of `content` as lower-case hex
#[must_use]
pub fn calculate_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Header lookup keyed by normalized column name
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &csv::StringRecord) -> Self {
        let mut index = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            index.entry(normalize_header(header)).or_insert(i);
        }
        Self { index }
    }

    fn find(&self, aliases: &[&str], suffix: &str) -> Option<usize> {
        aliases.iter().find_map(|alias| {
            self.index.get(&format!("{alias}{suffix}")).copied().or_else(|| {
                // the first cycle may also be written with an explicit `1`
                if suffix.is_empty() {
                    self.index.get(&format!("{alias}1")).copied()
                } else {
                    None
                }
            })
        })
    }

    fn has_cycle(&self, suffix: &str) -> bool {
        [DUE_DATE, PAYMENT_STATUS, PAID_DATE, PAID_AMOUNT]
            .iter()
            .any(|aliases| self.find(aliases, suffix).is_some())
    }

    fn cycle_suffixes(&self) -> Vec<String> {
        let mut suffixes = Vec::new();
        if self.has_cycle("") {
            suffixes.push(String::new());
        }
        for n in 2..=MAX_CYCLES {
            let suffix = n.to_string();
            if !self.has_cycle(&suffix) {
                break;
            }
            suffixes.push(suffix);
        }
        suffixes
    }
}

fn normalize_header(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Leading integer of a duration cell (`6`, `6 months`)
fn parse_duration(raw: &str) -> Option<u32> {
    let digits: String = raw.trim().chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok().filter(|months| *months > 0)
}

/// Money cell with currency symbols and separators removed
fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok().filter(|amount| *amount >= Decimal::ZERO)
}
