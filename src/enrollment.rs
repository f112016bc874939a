//! Single-student enrollment
//!
//! Creating a student always creates its identity account in the same
//! transaction. When the student is attached to a billable batch, the
//! initial obligations are generated and any credit is applied before the
//! transaction commits; a configuration error rolls the whole enrollment back.

use crate::context::RunContext;
use crate::credit::{CreditError, CreditLedger};
use crate::error::ErrorKind;
use crate::fees::{resolve_cycle_start, FeeCycleEngine, FeeError};
use crate::model::{Batch, BatchId, FeeRecord, IdentityAccount, Level, Stage, Student};
use crate::store::{with_transaction, LedgerStore, StoreError};
use chrono::{NaiveDate, Utc};
use log::info;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

#[derive(Debug, Error)]
pub enum EnrollmentError {
    #[error("student name is empty")]
    MissingName,

    #[error("student '{name}' has neither an email nor a phone number")]
    MissingContact { name: String },

    #[error("batch '{batch_code}' is {batch_stage} level {batch_level}, student is {stage} level {level}")]
    IncompatibleBatch {
        batch_code: String,
        batch_stage: Stage,
        batch_level: Level,
        stage: Stage,
        level: Level,
    },

    #[error("batch {0} not found")]
    BatchNotFound(BatchId),

    #[error(transparent)]
    Fee(#[from] FeeError),

    #[error(transparent)]
    Credit(#[from] CreditError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EnrollmentError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            EnrollmentError::MissingName
            | EnrollmentError::MissingContact { .. }
            | EnrollmentError::IncompatibleBatch { .. }
            | EnrollmentError::BatchNotFound(_) => ErrorKind::Validation,
            EnrollmentError::Fee(e) => e.kind(),
            EnrollmentError::Credit(e) => e.kind(),
            EnrollmentError::Store(e) => e.kind(),
        }
    }
}

/// Input for creating a student
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub stage: Stage,
    pub level: Level,
    pub batch_id: Option<BatchId>,
    pub enrollment_date: NaiveDate,
    /// Personal start date when it differs from the enrollment date
    pub start_date: Option<NaiveDate>,
    pub is_active: bool,
}

/// Everything written by a successful enrollment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub student: Student,
    pub account: IdentityAccount,
    pub fee_records: Vec<FeeRecord>,
    pub credit_applied: Decimal,
}

/// Validate `new` and build the student record to insert
///
/// When `batch` can anchor billing, the cycle start is the later of the
/// student's own start and the batch start.
///
/// # Errors
///
/// `MissingName`, `MissingContact` or `IncompatibleBatch`.
pub fn build_student(new: &NewStudent, batch: Option<&Batch>) -> Result<Student, EnrollmentError> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(EnrollmentError::MissingName);
    }

    let own_start = new.start_date.unwrap_or(new.enrollment_date);
    let fee_cycle_start_date = match batch {
        Some(batch) => {
            if !batch.accepts(new.stage, new.level) {
                return Err(EnrollmentError::IncompatibleBatch {
                    batch_code: batch.code.clone(),
                    batch_stage: batch.stage,
                    batch_level: batch.level,
                    stage: new.stage,
                    level: new.level,
                });
            }
            resolve_cycle_start(Some(own_start), batch.anchor_date())
        }
        None => new.start_date,
    };

    let student = Student {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: clean(new.email.as_deref()),
        phone: clean(new.phone.as_deref()),
        stage: new.stage,
        level: new.level,
        batch_id: batch.map(|b| b.id),
        enrollment_date: new.enrollment_date,
        fee_cycle_start_date,
        is_active: new.is_active,
    };
    if !student.has_contact() {
        return Err(EnrollmentError::MissingContact {
            name: student.name,
        });
    }
    Ok(student)
}

fn clean(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Insert a student and its identity account as one unit
///
/// # Errors
///
/// `MissingContact` when no login can be derived; `Store(Duplicate)` when
/// the login is taken. Neither record persists on error.
pub fn register_student(
    store: &dyn LedgerStore,
    context: &RunContext,
    student: &Student,
) -> Result<IdentityAccount, EnrollmentError> {
    let login = student.login().ok_or_else(|| EnrollmentError::MissingContact {
        name: student.name.clone(),
    })?;
    let account = IdentityAccount {
        id: Uuid::new_v4(),
        student_id: student.id,
        login,
        created_by: context.acting_admin().id,
        created_at: Utc::now(),
    };

    with_transaction(store, || -> Result<(), EnrollmentError> {
        store.insert_student(student)?;
        store.insert_identity_account(&account)?;
        Ok(())
    })?;
    Ok(account)
}

/// Creates students together with their initial obligations
pub struct EnrollmentService<'a> {
    store: &'a dyn LedgerStore,
    engine: FeeCycleEngine<'a>,
}

impl<'a> EnrollmentService<'a> {
    #[must_use]
    pub fn new(store: &'a dyn LedgerStore, engine: FeeCycleEngine<'a>) -> Self {
        Self { store, engine }
    }

    /// Validate and persist a new student
    ///
    /// # Errors
    ///
    /// Validation errors before any write; configuration and storage errors
    /// roll back everything written so far.
    pub fn enroll(&self, context: &RunContext, new: &NewStudent) -> Result<Enrollment, EnrollmentError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::enrollment_span(&new.name).entered();

        let store = self.store;
        let batch = match new.batch_id {
            Some(batch_id) => Some(store.batch(batch_id)?.ok_or(EnrollmentError::BatchNotFound(batch_id))?),
            None => None,
        };
        let student = build_student(new, batch.as_ref())?;
        self.engine.fee_table().lookup(student.stage, student.level)?;

        let enrollment = with_transaction(store, || -> Result<Enrollment, EnrollmentError> {
            let account = register_student(store, context, &student)?;
            let fee_records = self.engine.generate_obligations(store, &student, context.today())?;
            let credit_applied = if fee_records.is_empty() {
                Decimal::ZERO
            } else {
                CreditLedger::new(store)
                    .apply_credits_to_obligations(student.id, context.today())?
                    .total_applied
            };
            Ok(Enrollment {
                student: student.clone(),
                account,
                fee_records,
                credit_applied,
            })
        })?;

        info!(
            "enrolled '{}' ({} level {}) with {} fee record(s)",
            enrollment.student.name,
            enrollment.student.stage,
            enrollment.student.level,
            enrollment.fee_records.len()
        );
        Ok(enrollment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AdminIdentity, BatchStatus, CourseFee, CourseFeeTable};
    use crate::store::InMemoryStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn context() -> RunContext {
        let admin = AdminIdentity {
            id: Uuid::new_v4(),
            email: "admin@feeguard.local".to_string(),
            name: "System Administrator".to_string(),
        };
        RunContext::new(admin, date(2026, 4, 1), false)
    }

    fn fees() -> CourseFeeTable {
        CourseFeeTable::new(vec![CourseFee {
            stage: Stage::Intermediate,
            level: Level::new(2).unwrap(),
            fee_amount: Decimal::from(1500),
            duration_months: None,
            active: true,
        }])
    }

    fn active_batch(stage: Stage, level: u8, start: NaiveDate) -> Batch {
        Batch {
            id: Uuid::new_v4(),
            code: "TT:6:00".to_string(),
            base_code: "TT:6:00".to_string(),
            stage,
            level: Level::new(level).unwrap(),
            schedule: Vec::new(),
            status: BatchStatus::Active,
            start_date: Some(start),
            timing: None,
        }
    }

    fn new_student(email: Option<&str>, batch_id: Option<BatchId>) -> NewStudent {
        NewStudent {
            name: " Kiran ".to_string(),
            email: email.map(str::to_string),
            phone: None,
            stage: Stage::Intermediate,
            level: Level::new(2).unwrap(),
            batch_id,
            enrollment_date: date(2026, 2, 10),
            start_date: None,
            is_active: true,
        }
    }

    #[test]
    fn test_enroll_generates_from_later_start() {
        let store = InMemoryStore::new();
        let table = fees();
        let service = EnrollmentService::new(&store, FeeCycleEngine::new(&table));
        let batch = active_batch(Stage::Intermediate, 2, date(2026, 1, 20));
        store.insert_batch(&batch).unwrap();

        let enrollment = service
            .enroll(&context(), &new_student(Some("kiran@example.com"), Some(batch.id)))
            .unwrap();

        assert_eq!(enrollment.student.name, "Kiran");
        assert_eq!(enrollment.student.fee_cycle_start_date, Some(date(2026, 2, 10)));
        assert_eq!(enrollment.account.login, "kiran@example.com");
        let months: Vec<String> = enrollment.fee_records.iter().map(|r| r.fee_month.to_string()).collect();
        assert_eq!(months, vec!["2026-02", "2026-03", "2026-04"]);
    }

    #[test]
    fn test_missing_contact_rejected() {
        let store = InMemoryStore::new();
        let table = fees();
        let service = EnrollmentService::new(&store, FeeCycleEngine::new(&table));

        let err = service.enroll(&context(), &new_student(None, None)).unwrap_err();
        assert!(matches!(err, EnrollmentError::MissingContact { .. }));
        assert!(store.students().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_login_rolls_back_student() {
        let store = InMemoryStore::new();
        let table = fees();
        let service = EnrollmentService::new(&store, FeeCycleEngine::new(&table));
        service
            .enroll(&context(), &new_student(Some("kiran@example.com"), None))
            .unwrap();

        let err = service
            .enroll(&context(), &new_student(Some("KIRAN@example.com"), None))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(store.students().unwrap().len(), 1);
        assert_eq!(store.identity_accounts().len(), 1);
    }

    #[test]
    fn test_incompatible_batch_rejected() {
        let store = InMemoryStore::new();
        let table = fees();
        let service = EnrollmentService::new(&store, FeeCycleEngine::new(&table));
        let batch = active_batch(Stage::Beginner, 1, date(2026, 1, 20));
        store.insert_batch(&batch).unwrap();

        let err = service
            .enroll(&context(), &new_student(Some("kiran@example.com"), Some(batch.id)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(store.students().unwrap().is_empty());
    }
}
