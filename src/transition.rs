//! Mid-course stage, level and batch transitions
//!
//! A transition discards the student's unpaid upcoming obligations, moves the
//! cycle start to the effective date and regenerates under the new fee
//! entry. Paid and overdue history is never touched.

use crate::credit::{CreditError, CreditLedger};
use crate::error::ErrorKind;
use crate::fees::{FeeCycleEngine, FeeError};
use crate::model::{Batch, BatchId, FeeRecordId, Level, Stage, StudentId};
use crate::store::{with_transaction, LedgerStore, StoreError};
use chrono::NaiveDate;
use log::info;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error(
        "batch '{batch_code}' is {batch_stage} level {batch_level}, cannot move student to {stage} level {level}"
    )]
    IncompatibleBatch {
        batch_code: String,
        batch_stage: Stage,
        batch_level: Level,
        stage: Stage,
        level: Level,
    },

    #[error("student {0} not found")]
    StudentNotFound(StudentId),

    #[error("batch {0} not found")]
    BatchNotFound(BatchId),

    #[error(transparent)]
    Fee(#[from] FeeError),

    #[error(transparent)]
    Credit(#[from] CreditError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TransitionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransitionError::IncompatibleBatch { .. }
            | TransitionError::StudentNotFound(_)
            | TransitionError::BatchNotFound(_) => ErrorKind::Validation,
            TransitionError::Fee(e) => e.kind(),
            TransitionError::Credit(e) => e.kind(),
            TransitionError::Store(e) => e.kind(),
        }
    }
}

/// Requested destination for a student
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRequest {
    pub student_id: StudentId,
    pub stage: Stage,
    pub level: Level,
    /// Destination batch; `None` detaches the student
    pub batch_id: Option<BatchId>,
}

/// Audit summary of a completed transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionOutcome {
    pub deleted: usize,
    pub created: usize,
    pub effective_date: NaiveDate,
    /// Credit consumed by the regenerated records
    pub credit_applied: Decimal,
}

/// Moves students between stages, levels and batches
pub struct TransitionHandler<'a> {
    store: &'a dyn LedgerStore,
    engine: FeeCycleEngine<'a>,
}

impl<'a> TransitionHandler<'a> {
    #[must_use]
    pub fn new(store: &'a dyn LedgerStore, engine: FeeCycleEngine<'a>) -> Self {
        Self { store, engine }
    }

    /// Apply a transition as of `today`
    ///
    /// Validation runs before any write. Deletion, the student update,
    /// regeneration and credit application then happen in one transaction,
    /// so a failure at any step leaves the store unchanged.
    ///
    /// # Errors
    ///
    /// - `IncompatibleBatch` when the batch's stage/level differ from the request
    /// - `StudentNotFound` / `BatchNotFound` for unknown ids
    /// - fee configuration and storage errors from regeneration
    pub fn transition(
        &self,
        request: &TransitionRequest,
        today: NaiveDate,
    ) -> Result<TransitionOutcome, TransitionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::transition_span(request.student_id).entered();

        let store = self.store;
        let mut student = store
            .student(request.student_id)?
            .ok_or(TransitionError::StudentNotFound(request.student_id))?;
        let batch = match request.batch_id {
            Some(batch_id) => Some(store.batch(batch_id)?.ok_or(TransitionError::BatchNotFound(batch_id))?),
            None => None,
        };
        if let Some(batch) = &batch {
            check_compatible(batch, request.stage, request.level)?;
        }
        // Surface missing fee configuration before anything is deleted
        self.engine.fee_table().lookup(request.stage, request.level)?;

        let effective_date = batch
            .as_ref()
            .and_then(Batch::anchor_date)
            .map_or(today, |start| start.max(today));
        let billable = batch.as_ref().is_some_and(Batch::is_billable);

        let outcome = with_transaction(store, || -> Result<TransitionOutcome, TransitionError> {
            let stale: Vec<FeeRecordId> = store
                .fee_records(student.id)?
                .iter()
                .filter(|r| r.is_untouched() && r.due_date >= today)
                .map(|r| r.id)
                .collect();
            let deleted = store.delete_fee_records(&stale)?;

            student.stage = request.stage;
            student.level = request.level;
            student.batch_id = request.batch_id;
            if billable {
                student.fee_cycle_start_date = Some(effective_date);
            }
            store.update_student(&student)?;

            let created = self.engine.generate_obligations(store, &student, today)?.len();
            let credit_applied = if billable {
                CreditLedger::new(store)
                    .apply_credits_to_obligations(student.id, today)?
                    .total_applied
            } else {
                Decimal::ZERO
            };

            Ok(TransitionOutcome {
                deleted,
                created,
                effective_date,
                credit_applied,
            })
        })?;

        info!(
            "student '{}' moved to {} level {} from {}: {} record(s) deleted, {} created",
            student.name, request.stage, request.level, outcome.effective_date, outcome.deleted, outcome.created
        );
        Ok(outcome)
    }
}

fn check_compatible(batch: &Batch, stage: Stage, level: Level) -> Result<(), TransitionError> {
    if batch.accepts(stage, level) {
        Ok(())
    } else {
        Err(TransitionError::IncompatibleBatch {
            batch_code: batch.code.clone(),
            batch_stage: batch.stage,
            batch_level: batch.level,
            stage,
            level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::FeeMonth;
    use crate::model::{BatchStatus, CourseFee, CourseFeeTable, FeeRecord, Student};
    use crate::store::InMemoryStore;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn level(n: u8) -> Level {
        Level::new(n).unwrap()
    }

    fn fees() -> CourseFeeTable {
        CourseFeeTable::new(vec![
            CourseFee {
                stage: Stage::Beginner,
                level: level(1),
                fee_amount: Decimal::from(1000),
                duration_months: None,
                active: true,
            },
            CourseFee {
                stage: Stage::Beginner,
                level: level(2),
                fee_amount: Decimal::from(1200),
                duration_months: None,
                active: true,
            },
        ])
    }

    fn batch(code: &str, lvl: u8, start: NaiveDate) -> Batch {
        Batch {
            id: Uuid::new_v4(),
            code: code.to_string(),
            base_code: code.to_string(),
            stage: Stage::Beginner,
            level: level(lvl),
            schedule: Vec::new(),
            status: BatchStatus::Active,
            start_date: Some(start),
            timing: None,
        }
    }

    fn record(student_id: StudentId, month: u32, paid: i64) -> FeeRecord {
        let fee_month = FeeMonth::new(2026, month).unwrap();
        FeeRecord {
            id: Uuid::new_v4(),
            student_id,
            fee_month,
            due_date: fee_month.first_day() + chrono::Days::new(4),
            fee_amount: Decimal::from(1000),
            paid_amount: Decimal::from(paid),
            payment_date: (paid > 0).then(|| fee_month.first_day()),
            stage: Stage::Beginner,
            level: level(1),
        }
    }

    /// Student in B1 with Jan paid, Feb overdue, Mar and Apr upcoming
    fn seeded() -> (InMemoryStore, Student, Batch) {
        let store = InMemoryStore::new();
        let old = batch("WF:2:30", 1, date(2026, 1, 5));
        let student = Student {
            id: Uuid::new_v4(),
            name: "Meera".to_string(),
            email: Some("meera@example.com".to_string()),
            phone: None,
            stage: Stage::Beginner,
            level: level(1),
            batch_id: Some(old.id),
            enrollment_date: date(2026, 1, 5),
            fee_cycle_start_date: Some(date(2026, 1, 5)),
            is_active: true,
        };
        store.insert_batch(&old).unwrap();
        store.insert_student(&student).unwrap();
        store.insert_fee_record(&record(student.id, 1, 1000)).unwrap();
        store.insert_fee_record(&record(student.id, 2, 0)).unwrap();
        store.insert_fee_record(&record(student.id, 3, 0)).unwrap();
        store.insert_fee_record(&record(student.id, 4, 0)).unwrap();
        (store, student, old)
    }

    #[test]
    fn test_transition_replaces_upcoming_obligations() {
        let (store, student, _) = seeded();
        let table = fees();
        let handler = TransitionHandler::new(&store, FeeCycleEngine::new(&table));
        let target = batch("SS:4:30", 2, date(2026, 3, 1));
        store.insert_batch(&target).unwrap();
        let today = date(2026, 3, 3);

        let outcome = handler
            .transition(
                &TransitionRequest {
                    student_id: student.id,
                    stage: Stage::Beginner,
                    level: level(2),
                    batch_id: Some(target.id),
                },
                today,
            )
            .unwrap();

        assert_eq!(outcome.deleted, 2);
        assert_eq!(outcome.effective_date, today);
        assert_eq!(outcome.created, 1);

        let records = store.fee_records(student.id).unwrap();
        let stale_old = records
            .iter()
            .filter(|r| r.level == level(1) && r.is_untouched() && r.due_date >= today)
            .count();
        assert_eq!(stale_old, 0);

        let history: Vec<&FeeRecord> = records.iter().filter(|r| r.level == level(1)).collect();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].paid_amount, Decimal::from(1000));
        assert_eq!(history[1].fee_month, FeeMonth::new(2026, 2).unwrap());

        let march = records.iter().find(|r| r.level == level(2)).unwrap();
        assert_eq!(march.fee_month, FeeMonth::new(2026, 3).unwrap());
        assert_eq!(march.fee_amount, Decimal::from(1200));

        let moved = store.student(student.id).unwrap().unwrap();
        assert_eq!(moved.batch_id, Some(target.id));
        assert_eq!(moved.fee_cycle_start_date, Some(today));
    }

    #[test]
    fn test_future_batch_start_is_effective_date() {
        let (store, student, _) = seeded();
        let table = fees();
        let handler = TransitionHandler::new(&store, FeeCycleEngine::new(&table));
        let target = batch("SS:4:30", 2, date(2026, 5, 10));
        store.insert_batch(&target).unwrap();

        let outcome = handler
            .transition(
                &TransitionRequest {
                    student_id: student.id,
                    stage: Stage::Beginner,
                    level: level(2),
                    batch_id: Some(target.id),
                },
                date(2026, 3, 3),
            )
            .unwrap();

        assert_eq!(outcome.effective_date, date(2026, 5, 10));
        assert_eq!(outcome.created, 0);
    }

    #[test]
    fn test_incompatible_batch_changes_nothing() {
        let (store, student, _) = seeded();
        let table = fees();
        let handler = TransitionHandler::new(&store, FeeCycleEngine::new(&table));
        let target = batch("SS:4:30", 1, date(2026, 3, 1));
        store.insert_batch(&target).unwrap();
        let before = store.fee_records(student.id).unwrap();

        let err = handler
            .transition(
                &TransitionRequest {
                    student_id: student.id,
                    stage: Stage::Beginner,
                    level: level(2),
                    batch_id: Some(target.id),
                },
                date(2026, 3, 3),
            )
            .unwrap_err();

        assert!(matches!(err, TransitionError::IncompatibleBatch { .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(store.fee_records(student.id).unwrap(), before);
        assert_eq!(store.student(student.id).unwrap().unwrap(), student);
    }

    #[test]
    fn test_unconfigured_level_changes_nothing() {
        let (store, student, _) = seeded();
        let table = fees();
        let handler = TransitionHandler::new(&store, FeeCycleEngine::new(&table));
        let before = store.fee_records(student.id).unwrap();

        let err = handler
            .transition(
                &TransitionRequest {
                    student_id: student.id,
                    stage: Stage::Beginner,
                    level: level(3),
                    batch_id: None,
                },
                date(2026, 3, 3),
            )
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(store.fee_records(student.id).unwrap(), before);
    }
}
