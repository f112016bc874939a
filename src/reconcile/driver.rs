//! Reconciliation runs

use crate::batch::{allocate_display_codes, CodeCandidate};
use crate::context::RunContext;
use crate::enrollment::register_student;
use crate::fees::FeeCycleEngine;
use crate::model::{BatchId, BatchStatus};
use crate::reconcile::plan::{Planner, RunState, StudentPlan};
use crate::reconcile::report::{RecordAction, StudentOutcome};
use crate::reconcile::{AuthoritativeSnapshot, AuthoritativeStudent, ReconcileError, ReconciliationReport};
use crate::store::{with_transaction, LedgerStore, StoreError};
use chrono::NaiveDate;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

/// Converges stored batches, students and fee records on an authoritative snapshot
///
/// Every row is planned against the same run-local view in both modes. A
/// live run then writes the plan in one transaction per student; a dry run
/// stops after planning. Findings are identical either way.
pub struct ReconciliationDriver<'a> {
    store: &'a dyn LedgerStore,
    engine: FeeCycleEngine<'a>,
    context: &'a RunContext,
}

impl<'a> ReconciliationDriver<'a> {
    #[must_use]
    pub fn new(store: &'a dyn LedgerStore, engine: FeeCycleEngine<'a>, context: &'a RunContext) -> Self {
        Self { store, engine, context }
    }

    /// Reconcile every student in `snapshot`
    ///
    /// A failing student is logged, reported and skipped; the run always
    /// completes.
    ///
    /// # Errors
    ///
    /// Only when the initial store read fails.
    pub fn run(&self, snapshot: &AuthoritativeSnapshot) -> Result<ReconciliationReport, ReconcileError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::reconciliation_span(self.context.dry_run()).entered();

        let mode = if self.context.dry_run() { "dry run" } else { "live run" };
        info!(
            "reconciling {} student(s) as {} ({mode}, today {})",
            snapshot.students.len(),
            self.context.acting_admin().email,
            self.context.today()
        );

        let planner = Planner {
            store: self.store,
            engine: self.engine,
            context: self.context,
        };
        let mut state = RunState::load(self.store)?;
        let mut report =
            ReconciliationReport::new(self.context.dry_run(), self.context.today(), snapshot.checksum.clone());
        report.tally.skipped = snapshot.skipped_rows;

        for row in &snapshot.students {
            let outcome = match self.process(&planner, &mut state, row, &mut report) {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("line {}: skipping '{}': {e}", row.line, row.name);
                    StudentOutcome::failed(row.line, &row.name, e.to_string(), e.kind())
                }
            };
            report.push_student(outcome);
        }

        info!("reconciliation finished: {}", report.tally);
        Ok(report)
    }

    fn process(
        &self,
        planner: &Planner<'_>,
        state: &mut RunState,
        row: &AuthoritativeStudent,
        report: &mut ReconciliationReport,
    ) -> Result<StudentOutcome, ReconcileError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::student_span(&row.name).entered();

        let plan = planner.plan_student(state, row)?;
        if self.context.dry_run() {
            debug!("dry run, not writing plan for '{}'", row.name);
        } else {
            self.apply(&plan)?;
        }
        state.commit(&plan);

        if let Some(batch) = &plan.batch {
            let seen = report.batches.iter().any(|b| b.code == batch.batch.code);
            if !seen || batch.action != RecordAction::Unchanged {
                report.batches.push(batch.outcome());
            }
        }
        let outcome = plan.outcome();
        info!(
            "line {}: '{}' {} ({} deleted, {} created, {} issue(s))",
            outcome.line,
            outcome.name,
            outcome.action,
            outcome.deleted,
            outcome.created,
            outcome.issues.len()
        );
        Ok(outcome)
    }

    fn apply(&self, plan: &StudentPlan) -> Result<(), ReconcileError> {
        let store = self.store;
        with_transaction(store, || -> Result<(), ReconcileError> {
            if let Some(batch) = &plan.batch {
                match batch.action {
                    RecordAction::Created => store.insert_batch(&batch.batch)?,
                    RecordAction::Updated => store.update_batch(&batch.batch)?,
                    RecordAction::Unchanged => {}
                }
            }

            if plan.is_new {
                register_student(store, self.context, &plan.student)?;
            } else if !plan.changes.is_empty() {
                store.update_student(&plan.student)?;
            }

            if let Some(records) = &plan.regenerated {
                store.delete_fee_records(&plan.delete)?;
                for record in records {
                    store.insert_fee_record(record)?;
                }
            }
            for entry in plan.deposits.iter().chain(&plan.applied) {
                store.append_credit(entry)?;
            }
            Ok(())
        })
    }
}

/// One display code that changes under group re-derivation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChange {
    pub batch_id: BatchId,
    pub from: String,
    pub to: String,
    pub status: BatchStatus,
    pub start_date: Option<NaiveDate>,
}

/// Re-derive display codes for every stored batch
///
/// Batches sharing a base code are re-ranked and re-suffixed. In live mode
/// the new codes are written in one transaction; the returned changes are
/// the same in both modes.
///
/// # Errors
///
/// Storage errors; nothing is written when one occurs.
pub fn rederive_batch_codes(store: &dyn LedgerStore, dry_run: bool) -> Result<Vec<CodeChange>, ReconcileError> {
    let batches = store.batches()?;
    let candidates: Vec<CodeCandidate<BatchId>> = batches
        .iter()
        .map(|b| CodeCandidate {
            key: b.id,
            base_code: b.base_code.clone(),
            status: b.status,
            start_date: b.start_date,
        })
        .collect();
    let assigned: HashMap<BatchId, String> = allocate_display_codes(&candidates).into_iter().collect();

    let changes: Vec<CodeChange> = batches
        .iter()
        .filter_map(|b| {
            let to = assigned.get(&b.id)?;
            (*to != b.code).then(|| CodeChange {
                batch_id: b.id,
                from: b.code.clone(),
                to: to.clone(),
                status: b.status,
                start_date: b.start_date,
            })
        })
        .collect();

    for change in &changes {
        info!("batch code {} -> {}", change.from, change.to);
    }
    if dry_run || changes.is_empty() {
        return Ok(changes);
    }

    with_transaction(store, || -> Result<(), ReconcileError> {
        // park changed batches on unique codes first so swaps never collide
        for phase in [true, false] {
            for change in &changes {
                let mut batch = batches
                    .iter()
                    .find(|b| b.id == change.batch_id)
                    .cloned()
                    .ok_or_else(|| StoreError::NotFound(format!("batch {}", change.batch_id)))?;
                batch.code = if phase {
                    format!("{}#{}", change.from, change.batch_id)
                } else {
                    change.to.clone()
                };
                store.update_batch(&batch)?;
            }
        }
        Ok(())
    })?;
    Ok(changes)
}
