//! Error taxonomy shared by every engine error type

use serde::{Deserialize, Serialize};
use std::fmt;

/// Class of failure, used to decide between fail-fast and log-and-continue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected before any mutation: malformed code, missing contact, incompatible batch
    Validation,
    /// No active course or level fee entry
    Configuration,
    /// Duplicate key without an automatic resolution policy
    Conflict,
    /// Persistence failure
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Storage => "storage",
        };
        f.write_str(name)
    }
}
