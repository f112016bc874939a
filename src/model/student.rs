//! Students, their backing identity accounts and the acting administrator

use crate::model::{AdminId, BatchId, Level, Stage, StudentId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An enrolled student
///
/// A student always carries at least one contact channel. When `batch_id` is
/// set, `stage`/`level` match the referenced batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub stage: Stage,
    pub level: Level,
    pub batch_id: Option<BatchId>,
    pub enrollment_date: NaiveDate,
    /// When absent, `enrollment_date` is the effective cycle start
    pub fee_cycle_start_date: Option<NaiveDate>,
    pub is_active: bool,
}

impl Student {
    #[must_use]
    pub fn has_contact(&self) -> bool {
        has_value(self.email.as_deref()) || has_value(self.phone.as_deref())
    }

    /// Login used for the identity account: email first, phone otherwise
    #[must_use]
    pub fn login(&self) -> Option<String> {
        self.email
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim().to_ascii_lowercase())
            .or_else(|| {
                self.phone
                    .as_deref()
                    .map(normalize_phone)
                    .filter(|v| !v.is_empty())
            })
    }
}

fn has_value(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// Strip everything but digits and a leading `+`
#[must_use]
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        if c.is_ascii_digit() || (i == 0 && c == '+') {
            out.push(c);
        }
    }
    out
}

/// Login account created together with a student
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityAccount {
    pub id: Uuid,
    pub student_id: StudentId,
    pub login: String,
    pub created_by: AdminId,
    pub created_at: DateTime<Utc>,
}

/// Administrator that mutations are attributed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminIdentity {
    pub id: AdminId,
    pub email: String,
    pub name: String,
}
