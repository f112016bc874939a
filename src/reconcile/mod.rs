//! Reconciliation against an authoritative snapshot
//!
//! - [`AuthoritativeSnapshot`]: normalized student rows read from CSV
//! - [`ReconciliationDriver`]: plans, and in live mode applies, the changes
//!   that bring stored state in line with the snapshot
//! - [`rederive_batch_codes`]: group re-allocation of batch display codes
//! - [`ReconciliationReport`]: findings, identical in dry and live runs

pub mod dates;
pub mod driver;
pub mod error;
mod plan;
pub mod report;
pub mod snapshot;

pub use dates::{coerce_date, excel_serial_date};
pub use driver::{rederive_batch_codes, CodeChange, ReconciliationDriver};
pub use error::ReconcileError;
pub use report::{
    BatchOutcome, FeeIssue, FieldChange, RecordAction, ReconciliationReport, RunTally, StudentAction,
    StudentOutcome,
};
pub use snapshot::{AuthoritativeSnapshot, AuthoritativeStudent};
