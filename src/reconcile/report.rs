//! Reconciliation report
//!
//! The report names batches by code and students by name and source line,
//! never by generated ids, so a dry run and a live run over the same input
//! produce the same findings.

use crate::error::ErrorKind;
use crate::fees::{FeeMonth, MatchPass};
use crate::model::BatchStatus;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One diverging field: stored value versus authoritative value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl FieldChange {
    pub fn new(field: &str, from: Option<impl fmt::Display>, to: Option<impl fmt::Display>) -> Self {
        Self {
            field: field.to_string(),
            from: from.map(|v| v.to_string()),
            to: to.map(|v| v.to_string()),
        }
    }
}

/// Record `field` when `from != to`
pub(crate) fn push_change<T: PartialEq + fmt::Display>(
    changes: &mut Vec<FieldChange>,
    field: &str,
    from: Option<T>,
    to: Option<T>,
) {
    if from != to {
        changes.push(FieldChange::new(field, from, to));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordAction {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for RecordAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordAction::Created => f.write_str("created"),
            RecordAction::Updated => f.write_str("updated"),
            RecordAction::Unchanged => f.write_str("unchanged"),
        }
    }
}

/// Resolution of one batch code seen in the input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Code as written in the source
    pub source_code: String,
    /// Display code after allocation
    pub code: String,
    pub status: BatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    pub action: RecordAction,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub changes: Vec<FieldChange>,
}

/// A divergence between stored and authoritative state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum FeeIssue {
    /// Student matched on name only, contacts did not match
    NameOnlyMatch,
    /// A stored student shares this row's email or phone under another name
    ContactNameConflict { contact: String, stored_name: String },
    /// No stored student matched; one is (or would be) created
    StudentWillBeCreated,
    /// Expected month has no stored record
    MissingMonth { month: FeeMonth },
    /// Stored record outside the expected months
    UnexpectedMonth { month: FeeMonth },
    /// Payment fact with no record in its due or paid month
    UnmatchedPayment {
        #[serde(skip_serializing_if = "Option::is_none")]
        due_date: Option<NaiveDate>,
        #[serde(skip_serializing_if = "Option::is_none")]
        paid_date: Option<NaiveDate>,
    },
    /// Matched on the payment-date month because the due-date month had no record
    MatchedByPaidDate { month: FeeMonth },
    /// Source says paid but the stored record is not fully paid
    PaidNotMarked { month: FeeMonth },
    /// Payment date recorded with no payment status or amount
    PaymentDateWithoutAmount { paid_date: NaiveDate },
    /// Partial payment without an amount; nothing is recorded for it
    PartialAmountUnknown {
        #[serde(skip_serializing_if = "Option::is_none")]
        month: Option<FeeMonth>,
    },
    /// Reported amount differs from the fee amount of a paid month
    AmountMismatch {
        month: FeeMonth,
        expected: Decimal,
        reported: Decimal,
    },
    /// Records are kept on a student whose batch cannot anchor billing
    RecordsWithoutBillableBatch { count: usize },
}

impl FeeIssue {
    /// From a payment-match pass; only the fallback pass is worth reporting
    #[must_use]
    pub fn from_match(pass: MatchPass, month: FeeMonth) -> Option<Self> {
        match pass {
            MatchPass::DueMonth => None,
            MatchPass::PaidMonth => Some(FeeIssue::MatchedByPaidDate { month }),
        }
    }
}

impl fmt::Display for FeeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeeIssue::NameOnlyMatch => write!(f, "matched on name only"),
            FeeIssue::ContactNameConflict { contact, stored_name } => {
                write!(f, "{contact} belongs to '{stored_name}', not matched")
            }
            FeeIssue::StudentWillBeCreated => write!(f, "no stored student, creating one"),
            FeeIssue::MissingMonth { month } => write!(f, "no stored record for {month}"),
            FeeIssue::UnexpectedMonth { month } => write!(f, "stored record for {month} is outside the cycle"),
            FeeIssue::UnmatchedPayment { due_date, paid_date } => write!(
                f,
                "payment (due {}, paid {}) matches no month",
                display_date(*due_date),
                display_date(*paid_date)
            ),
            FeeIssue::MatchedByPaidDate { month } => write!(f, "{month} matched by payment date"),
            FeeIssue::PaidNotMarked { month } => write!(f, "{month} is paid but not marked paid"),
            FeeIssue::PaymentDateWithoutAmount { paid_date } => {
                write!(f, "payment date {paid_date} has no paid amount")
            }
            FeeIssue::PartialAmountUnknown { month } => match month {
                Some(month) => write!(f, "partial payment for {month} has no amount"),
                None => write!(f, "partial payment has no amount"),
            },
            FeeIssue::AmountMismatch {
                month,
                expected,
                reported,
            } => write!(f, "{month} paid {reported}, fee is {expected}"),
            FeeIssue::RecordsWithoutBillableBatch { count } => {
                write!(f, "{count} record(s) kept without a billable batch")
            }
        }
    }
}

fn display_date(date: Option<NaiveDate>) -> String {
    date.map_or_else(|| "-".to_string(), |d| d.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentAction {
    Created,
    Updated,
    Unchanged,
    Failed,
}

impl fmt::Display for StudentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StudentAction::Created => f.write_str("created"),
            StudentAction::Updated => f.write_str("updated"),
            StudentAction::Unchanged => f.write_str("unchanged"),
            StudentAction::Failed => f.write_str("failed"),
        }
    }
}

/// Findings for one authoritative student
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentOutcome {
    pub line: usize,
    pub name: String,
    pub action: StudentAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_code: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub changes: Vec<FieldChange>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub issues: Vec<FeeIssue>,
    pub deleted: usize,
    pub created: usize,
    pub credit_deposited: Decimal,
    pub credit_applied: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl StudentOutcome {
    #[must_use]
    pub fn new(line: usize, name: &str) -> Self {
        Self {
            line,
            name: name.to_string(),
            action: StudentAction::Unchanged,
            batch_code: None,
            changes: Vec::new(),
            issues: Vec::new(),
            deleted: 0,
            created: 0,
            credit_deposited: Decimal::ZERO,
            credit_applied: Decimal::ZERO,
            error: None,
            error_kind: None,
        }
    }

    #[must_use]
    pub fn failed(line: usize, name: &str, message: String, kind: ErrorKind) -> Self {
        Self {
            action: StudentAction::Failed,
            error: Some(message),
            error_kind: Some(kind),
            ..Self::new(line, name)
        }
    }
}

/// Closing counts of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTally {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunTally {
    pub fn record(&mut self, outcome: &StudentOutcome) {
        self.processed += 1;
        if outcome.action == StudentAction::Failed {
            self.failed += 1;
        } else {
            self.succeeded += 1;
        }
    }
}

impl fmt::Display for RunTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} succeeded, {} failed, {} skipped",
            self.processed, self.succeeded, self.failed, self.skipped
        )
    }
}

/// Full output of a reconciliation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub dry_run: bool,
    pub today: NaiveDate,
    pub snapshot_checksum: String,
    pub batches: Vec<BatchOutcome>,
    pub students: Vec<StudentOutcome>,
    pub tally: RunTally,
}

impl ReconciliationReport {
    #[must_use]
    pub fn new(dry_run: bool, today: NaiveDate, snapshot_checksum: String) -> Self {
        Self {
            dry_run,
            today,
            snapshot_checksum,
            batches: Vec::new(),
            students: Vec::new(),
            tally: RunTally::default(),
        }
    }

    /// Every issue in the run, with the student it belongs to
    pub fn issues(&self) -> impl Iterator<Item = (&StudentOutcome, &FeeIssue)> {
        self.students
            .iter()
            .flat_map(|student| student.issues.iter().map(move |issue| (student, issue)))
    }

    pub fn push_student(&mut self, outcome: StudentOutcome) {
        self.tally.record(&outcome);
        self.students.push(outcome);
    }
}
