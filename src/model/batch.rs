//! Scheduled class batches

use crate::batch::ClassTime;
use crate::model::{BatchId, Level, Stage};
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Draft,
    Active,
    Ended,
}

impl BatchStatus {
    /// Sort rank used when ordering batches that share a base code
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            BatchStatus::Active => 0,
            BatchStatus::Ended => 1,
            BatchStatus::Draft => 2,
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchStatus::Draft => "draft",
            BatchStatus::Active => "active",
            BatchStatus::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// One weekly class slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub day: Weekday,
    pub time: ClassTime,
}

/// A scheduled class batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    /// Unique display code, possibly carrying an ordinal suffix (`WF:2:30-II`)
    pub code: String,
    /// Normalized schedule code the display code was derived from
    pub base_code: String,
    pub stage: Stage,
    pub level: Level,
    pub schedule: Vec<ScheduleEntry>,
    pub status: BatchStatus,
    /// Meaningful only when the batch is not a draft
    pub start_date: Option<NaiveDate>,
    /// Free-text timing note carried over from the source sheet
    #[serde(default)]
    pub timing: Option<String>,
}

impl Batch {
    /// Date that may anchor fee generation; drafts never do
    #[must_use]
    pub fn anchor_date(&self) -> Option<NaiveDate> {
        match self.status {
            BatchStatus::Draft => None,
            BatchStatus::Active | BatchStatus::Ended => self.start_date,
        }
    }

    #[must_use]
    pub fn is_billable(&self) -> bool {
        self.anchor_date().is_some()
    }

    #[must_use]
    pub fn identity(&self) -> BatchIdentity {
        BatchIdentity {
            start_date: self.start_date,
            stage: self.stage,
            level: self.level,
        }
    }

    #[must_use]
    pub fn accepts(&self, stage: Stage, level: Level) -> bool {
        self.stage == stage && self.level == level
    }
}

/// Attributes that make two batches with the same code the same logical batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchIdentity {
    pub start_date: Option<NaiveDate>,
    pub stage: Stage,
    pub level: Level,
}
