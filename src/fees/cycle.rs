//! Monthly obligation generation

use crate::fees::{months_between, FeeError, FeeMonth};
use crate::model::{Batch, CourseFeeTable, FeeRecord, Student};
use crate::store::{LedgerStore, StoreError};
use chrono::{Datelike, Days, NaiveDate};
use log::{debug, info};
use rust_decimal::Decimal;
use std::collections::HashSet;
use uuid::Uuid;

/// Hard upper bound on months walked in one generation pass
pub const DEFAULT_MAX_GENERATION_MONTHS: u32 = 100;

/// Date a student's billing months are counted from
#[must_use]
pub fn effective_cycle_start(student: &Student) -> NaiveDate {
    student.fee_cycle_start_date.unwrap_or(student.enrollment_date)
}

/// Later of a student's own start date and the batch start date
///
/// A student never owes fees for months before they personally joined,
/// even when the batch started earlier.
#[must_use]
pub fn resolve_cycle_start(
    student_start: Option<NaiveDate>,
    batch_start: Option<NaiveDate>,
) -> Option<NaiveDate> {
    match (student_start, batch_start) {
        (Some(student), Some(batch)) => Some(student.max(batch)),
        (student, batch) => student.or(batch),
    }
}

/// Due date for `month`: the cycle start's day of month, clamped to the month's length
#[must_use]
pub fn due_date(month: FeeMonth, cycle_start: NaiveDate) -> NaiveDate {
    let day = cycle_start.day().min(month.last_day().day());
    month.first_day() + Days::new(u64::from(day - 1))
}

/// Obligations left for a student who joined `student_start` into a course of
/// `total_duration` months that began `batch_start`. Never less than one.
#[must_use]
pub fn remaining_obligations(total_duration: u32, batch_start: NaiveDate, student_start: NaiveDate) -> u32 {
    let elapsed = u32::try_from(months_between(batch_start, student_start).max(0)).unwrap_or(0);
    total_duration.saturating_sub(elapsed).max(1)
}

/// Generates monthly fee obligations from a course fee table
#[derive(Debug, Clone, Copy)]
pub struct FeeCycleEngine<'a> {
    fee_table: &'a CourseFeeTable,
    max_months: u32,
}

impl<'a> FeeCycleEngine<'a> {
    #[must_use]
    pub fn new(fee_table: &'a CourseFeeTable) -> Self {
        Self {
            fee_table,
            max_months: DEFAULT_MAX_GENERATION_MONTHS,
        }
    }

    #[must_use]
    pub fn with_max_months(mut self, max_months: u32) -> Self {
        self.max_months = max_months.max(1);
        self
    }

    #[must_use]
    pub fn fee_table(&self) -> &'a CourseFeeTable {
        self.fee_table
    }

    /// Monthly fee for the student's current stage and level
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the table has no matching entry.
    pub fn monthly_fee(&self, student: &Student) -> Result<Decimal, FeeError> {
        Ok(self.fee_table.lookup(student.stage, student.level)?.fee_amount)
    }

    /// Compute the obligations that should exist but are missing from `existing`
    ///
    /// Walks month by month from the student's effective cycle start through
    /// the month containing `today`. Months already present in `existing` are
    /// skipped, so running this against its own output yields nothing new.
    /// When a course duration is known (`duration_override` first, then the
    /// fee table), the walk also stops after the student's remaining share of
    /// that duration measured from the batch start.
    ///
    /// # Errors
    ///
    /// `CourseNotConfigured` / `LevelNotConfigured` when the fee table has no
    /// entry for the student's stage and level.
    pub fn plan_obligations(
        &self,
        student: &Student,
        batch: Option<&Batch>,
        existing: &[FeeRecord],
        today: NaiveDate,
        duration_override: Option<u32>,
    ) -> Result<Vec<FeeRecord>, FeeError> {
        let course = self.fee_table.lookup(student.stage, student.level)?;
        let cycle_start = effective_cycle_start(student);

        let limit = duration_override
            .or(course.duration_months)
            .map(|total| match batch.and_then(Batch::anchor_date) {
                Some(batch_start) => remaining_obligations(total, batch_start, cycle_start),
                None => total.max(1),
            })
            .unwrap_or(u32::MAX)
            .min(self.max_months);

        let present: HashSet<FeeMonth> = existing
            .iter()
            .filter(|r| r.student_id == student.id)
            .map(|r| r.fee_month)
            .collect();

        let last = FeeMonth::of(today);
        let mut month = FeeMonth::of(cycle_start);
        let mut planned = Vec::new();

        for _ in 0..limit {
            if month > last {
                break;
            }
            if !present.contains(&month) {
                planned.push(FeeRecord {
                    id: Uuid::new_v4(),
                    student_id: student.id,
                    fee_month: month,
                    due_date: due_date(month, cycle_start),
                    fee_amount: course.fee_amount,
                    paid_amount: Decimal::ZERO,
                    payment_date: None,
                    stage: student.stage,
                    level: student.level,
                });
            }
            month = month.succ();
        }

        Ok(planned)
    }

    /// Persist any missing obligations for a student attached to a billable batch
    ///
    /// Students without a batch, or attached to a draft batch, get nothing.
    ///
    /// # Errors
    ///
    /// Configuration errors from the fee table and storage errors.
    pub fn generate_obligations(
        &self,
        store: &dyn LedgerStore,
        student: &Student,
        today: NaiveDate,
    ) -> Result<Vec<FeeRecord>, FeeError> {
        let batch = match student.batch_id {
            Some(batch_id) => store.batch(batch_id)?,
            None => None,
        };
        let Some(batch) = batch.filter(Batch::is_billable) else {
            debug!("student '{}' has no billable batch, no obligations generated", student.name);
            return Ok(Vec::new());
        };

        let existing = store.fee_records(student.id)?;
        let planned = self.plan_obligations(student, Some(&batch), &existing, today, None)?;

        let mut created = Vec::with_capacity(planned.len());
        for record in planned {
            match store.insert_fee_record(&record) {
                Ok(()) => created.push(record),
                Err(StoreError::Duplicate(key)) => {
                    debug!("fee record {key} already exists, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !created.is_empty() {
            info!(
                "generated {} fee record(s) for '{}' ({} level {})",
                created.len(),
                student.name,
                student.stage,
                student.level
            );
        }
        Ok(created)
    }
}
