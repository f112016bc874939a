//! Fee generation errors

use crate::error::ErrorKind;
use crate::model::{Level, Stage, StudentId};
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeeError {
    /// No active fee entries exist for the stage at all
    #[error("no active course fee table is configured for the {stage} stage")]
    CourseNotConfigured { stage: Stage },

    /// The stage is configured but the level has no fee entry
    #[error("no fee entry is configured for {stage} level {level}")]
    LevelNotConfigured { stage: Stage, level: Level },

    #[error("student {0} not found")]
    StudentNotFound(StudentId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FeeError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            FeeError::CourseNotConfigured { .. } | FeeError::LevelNotConfigured { .. } => {
                ErrorKind::Configuration
            }
            FeeError::StudentNotFound(_) => ErrorKind::Validation,
            FeeError::Store(e) => e.kind(),
        }
    }
}
