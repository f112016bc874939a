//! Store error type

use crate::error::ErrorKind;
use std::fmt;

/// Persistence error returned by every [`LedgerStore`](crate::store::LedgerStore) call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Referenced row does not exist
    NotFound(String),
    /// Unique key already taken (fee month per student, login, batch code)
    Duplicate(String),
    /// Commit or rollback without an open transaction
    TransactionClosed,
    /// Snapshot file could not be read or written
    Io(String),
    /// Other storage errors
    Other(String),
}

impl StoreError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Duplicate(_) => ErrorKind::Conflict,
            StoreError::NotFound(_)
            | StoreError::TransactionClosed
            | StoreError::Io(_)
            | StoreError::Other(_) => ErrorKind::Storage,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(what) => {
                write!(f, "Not found: {what}")
            }
            StoreError::Duplicate(key) => {
                write!(f, "Duplicate key: {key}")
            }
            StoreError::TransactionClosed => {
                write!(f, "No transaction is open")
            }
            StoreError::Io(msg) => {
                write!(f, "Snapshot I/O error: {msg}")
            }
            StoreError::Other(msg) => {
                write!(f, "Store error: {msg}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}
