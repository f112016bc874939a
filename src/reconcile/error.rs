//! Reconciliation errors

use crate::batch::BatchCodeError;
use crate::credit::CreditError;
use crate::enrollment::EnrollmentError;
use crate::error::ErrorKind;
use crate::fees::FeeError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to read authoritative rows: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("authoritative rows have no '{0}' column")]
    MissingColumn(String),

    #[error("level code '{0}' is not <B|I|A><1-3>")]
    InvalidLevel(String),

    #[error("student '{0}' has no level code and no stored stage/level")]
    MissingLevel(String),

    #[error(transparent)]
    BatchCode(#[from] BatchCodeError),

    #[error(transparent)]
    Fee(#[from] FeeError),

    #[error(transparent)]
    Credit(#[from] CreditError),

    #[error(transparent)]
    Enrollment(#[from] EnrollmentError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::Csv(_)
            | ReconcileError::MissingColumn(_)
            | ReconcileError::InvalidLevel(_)
            | ReconcileError::MissingLevel(_) => ErrorKind::Validation,
            ReconcileError::Io { .. } => ErrorKind::Storage,
            ReconcileError::BatchCode(e) => e.kind(),
            ReconcileError::Fee(e) => e.kind(),
            ReconcileError::Credit(e) => e.kind(),
            ReconcileError::Enrollment(e) => e.kind(),
            ReconcileError::Store(e) => e.kind(),
        }
    }
}
