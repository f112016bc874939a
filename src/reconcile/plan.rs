//! Per-student reconciliation planning
//!
//! Planning never writes to the store. It reads through [`RunState`], an
//! overlay holding the store's contents plus everything planned earlier in
//! the run, so a dry run sees exactly what a live run would have written.

use crate::batch::{parse_batch_code, probe_code, CodeProbe};
use crate::context::RunContext;
use crate::credit::{plan_credit_application, plan_deposit, plan_settlement, CreditContext};
use crate::enrollment::{build_student, NewStudent};
use crate::fees::{match_payment, resolve_cycle_start, CycleStatus, FeeCycleEngine, FeeMonth, PaymentCycle};
use crate::model::{
    normalize_phone, Batch, BatchIdentity, BatchStatus, CreditId, CreditTransactionType, FeeRecord, FeeRecordId, Level,
    ScheduleEntry, Stage, Student, StudentCredit, StudentId,
};
use crate::reconcile::report::{push_change, FeeIssue, RecordAction, StudentAction, StudentOutcome};
use crate::reconcile::{AuthoritativeStudent, BatchOutcome, FieldChange, ReconcileError};
use crate::store::{LedgerStore, StoreError};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap, HashSet};
use uuid::Uuid;

/// Store contents as seen by the current run
pub(crate) struct RunState {
    batches: Vec<Batch>,
    students: Vec<Student>,
    fee_records: HashMap<StudentId, Vec<FeeRecord>>,
    credits: HashMap<StudentId, Vec<StudentCredit>>,
    claimed: HashSet<StudentId>,
}

impl RunState {
    pub(crate) fn load(store: &dyn LedgerStore) -> Result<Self, StoreError> {
        Ok(Self {
            batches: store.batches()?,
            students: store.students()?,
            fee_records: HashMap::new(),
            credits: HashMap::new(),
            claimed: HashSet::new(),
        })
    }

    fn batch_by_code(&self, code: &str) -> Option<&Batch> {
        self.batches.iter().find(|b| b.code == code)
    }

    fn fee_records(&mut self, store: &dyn LedgerStore, id: StudentId) -> Result<Vec<FeeRecord>, StoreError> {
        if let Some(records) = self.fee_records.get(&id) {
            return Ok(records.clone());
        }
        let records = store.fee_records(id)?;
        self.fee_records.insert(id, records.clone());
        Ok(records)
    }

    fn credits(&mut self, store: &dyn LedgerStore, id: StudentId) -> Result<Vec<StudentCredit>, StoreError> {
        if let Some(credits) = self.credits.get(&id) {
            return Ok(credits.clone());
        }
        let credits = store.credits(id)?;
        self.credits.insert(id, credits.clone());
        Ok(credits)
    }

    /// Find the stored student an authoritative row refers to
    ///
    /// Email first, then phone, then name. A contact match is only taken
    /// when the first names agree; siblings often share a parent's phone or
    /// email. Rejected contact matches are reported in `issues`. Name
    /// matches skip students already matched earlier in the run.
    fn match_student(
        &self,
        row: &AuthoritativeStudent,
        issues: &mut Vec<FeeIssue>,
    ) -> Option<(Student, StudentMatch)> {
        if let Some(email) = row.email.as_deref().map(|e| e.trim().to_ascii_lowercase()) {
            let found = self.students.iter().find(|s| {
                s.email
                    .as_deref()
                    .is_some_and(|stored| stored.trim().eq_ignore_ascii_case(&email))
            });
            if let Some(student) = found {
                if same_first_name(&student.name, &row.name) {
                    return Some((student.clone(), StudentMatch::Email));
                }
                issues.push(contact_conflict("email", student));
            }
        }

        if let Some(phone) = row.phone.as_deref().map(normalize_phone).filter(|p| !p.is_empty()) {
            let found = self
                .students
                .iter()
                .find(|s| s.phone.as_deref().map(normalize_phone).as_deref() == Some(phone.as_str()));
            if let Some(student) = found {
                if same_first_name(&student.name, &row.name) {
                    return Some((student.clone(), StudentMatch::Phone));
                }
                issues.push(contact_conflict("phone", student));
            }
        }

        let name = name_key(&row.name);
        self.students
            .iter()
            .find(|s| !self.claimed.contains(&s.id) && name_key(&s.name) == name)
            .map(|s| (s.clone(), StudentMatch::Name))
    }

    /// Make a successfully processed plan visible to the rest of the run
    pub(crate) fn commit(&mut self, plan: &StudentPlan) {
        if let Some(batch) = &plan.batch {
            upsert(&mut self.batches, batch.batch.clone(), |b| b.id);
        }
        upsert(&mut self.students, plan.student.clone(), |s| s.id);
        self.claimed.insert(plan.student.id);

        if let Some(records) = &plan.regenerated {
            self.fee_records.insert(plan.student.id, records.clone());
        }
        let credits = self.credits.entry(plan.student.id).or_default();
        credits.extend(plan.deposits.iter().cloned());
        credits.extend(plan.applied.iter().cloned());
    }
}

fn upsert<T>(items: &mut Vec<T>, item: T, key: impl Fn(&T) -> Uuid) {
    let id = key(&item);
    match items.iter_mut().find(|existing| key(existing) == id) {
        Some(slot) => *slot = item,
        None => items.push(item),
    }
}

fn name_key(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// "Asha Rao" and "asha r" agree; "Anu Sharma" and "Arjun Sharma" do not
fn same_first_name(a: &str, b: &str) -> bool {
    let first = |name: &str| name.split_whitespace().next().map(str::to_lowercase);
    first(a).is_some() && first(a) == first(b)
}

fn contact_conflict(contact: &str, stored: &Student) -> FeeIssue {
    FeeIssue::ContactNameConflict {
        contact: contact.to_string(),
        stored_name: stored.name.clone(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StudentMatch {
    Email,
    Phone,
    Name,
}

/// Resolved batch for one row
#[derive(Debug, Clone)]
pub(crate) struct BatchPlan {
    pub(crate) source_code: String,
    pub(crate) batch: Batch,
    pub(crate) action: RecordAction,
    pub(crate) changes: Vec<FieldChange>,
}

impl BatchPlan {
    pub(crate) fn outcome(&self) -> BatchOutcome {
        BatchOutcome {
            source_code: self.source_code.clone(),
            code: self.batch.code.clone(),
            status: self.batch.status,
            start_date: self.batch.start_date,
            action: self.action,
            changes: self.changes.clone(),
        }
    }
}

/// Everything a live run writes for one row
#[derive(Debug, Clone)]
pub(crate) struct StudentPlan {
    pub(crate) line: usize,
    pub(crate) name: String,
    pub(crate) batch: Option<BatchPlan>,
    pub(crate) student: Student,
    pub(crate) is_new: bool,
    pub(crate) changes: Vec<FieldChange>,
    pub(crate) issues: Vec<FeeIssue>,
    /// Stored records to delete before inserting `regenerated`
    pub(crate) delete: Vec<FeeRecordId>,
    /// Replacement record set; `None` leaves stored records alone
    pub(crate) regenerated: Option<Vec<FeeRecord>>,
    pub(crate) deposits: Vec<StudentCredit>,
    pub(crate) applied: Vec<StudentCredit>,
}

impl StudentPlan {
    pub(crate) fn outcome(&self) -> StudentOutcome {
        let created = self.regenerated.as_ref().map_or(0, Vec::len);
        let action = if self.is_new {
            StudentAction::Created
        } else if !self.changes.is_empty()
            || !self.delete.is_empty()
            || created > 0
            || !self.deposits.is_empty()
            || !self.applied.is_empty()
        {
            StudentAction::Updated
        } else {
            StudentAction::Unchanged
        };

        StudentOutcome {
            action,
            batch_code: self.batch.as_ref().map(|b| b.batch.code.clone()),
            changes: self.changes.clone(),
            issues: self.issues.clone(),
            deleted: self.delete.len(),
            created,
            credit_deposited: self.deposits.iter().map(|c| c.amount).sum(),
            credit_applied: -self.applied.iter().map(|c| c.amount).sum::<Decimal>(),
            ..StudentOutcome::new(self.line, &self.name)
        }
    }
}

/// Builds [`StudentPlan`]s for authoritative rows
pub(crate) struct Planner<'a> {
    pub(crate) store: &'a dyn LedgerStore,
    pub(crate) engine: FeeCycleEngine<'a>,
    pub(crate) context: &'a RunContext,
}

impl Planner<'_> {
    pub(crate) fn plan_student(
        &self,
        state: &mut RunState,
        row: &AuthoritativeStudent,
    ) -> Result<StudentPlan, ReconcileError> {
        let today = self.context.today();
        let mut issues = Vec::new();

        let matched = state.match_student(row, &mut issues);
        if matches!(matched, Some((_, StudentMatch::Name))) && (row.email.is_some() || row.phone.is_some()) {
            issues.push(FeeIssue::NameOnlyMatch);
        }
        let stored = matched.map(|(student, _)| student);

        let (stage, level) = match (row.stage_level()?, &stored) {
            (Some(stage_level), _) => stage_level,
            (None, Some(student)) => (student.stage, student.level),
            (None, None) => return Err(ReconcileError::MissingLevel(row.name.clone())),
        };

        let batch = match row.batch_code.as_deref() {
            Some(raw) => Some(plan_batch(state, raw, stage, level, row.batch_start_date, row.timing.as_deref())?),
            None => None,
        };
        let anchor = batch.as_ref().and_then(|b| b.batch.anchor_date());

        let own_start = row
            .student_start_date
            .or_else(|| stored.as_ref().map(|s| s.enrollment_date))
            .or(row.batch_start_date)
            .unwrap_or(today);

        let (student, changes, is_new) = match &stored {
            Some(stored) => {
                let mut desired = stored.clone();
                desired.stage = stage;
                desired.level = level;
                desired.batch_id = batch.as_ref().map(|b| b.batch.id);
                desired.is_active = row.is_active();
                if anchor.is_some() {
                    desired.fee_cycle_start_date = resolve_cycle_start(Some(own_start), anchor);
                } else if row.student_start_date.is_some() {
                    desired.fee_cycle_start_date = row.student_start_date;
                }
                if row.email.is_some() {
                    desired.email = row.email.clone();
                }
                if row.phone.is_some() {
                    desired.phone = row.phone.clone();
                }
                let stored_code = stored
                    .batch_id
                    .and_then(|id| state.batches.iter().find(|b| b.id == id))
                    .map(|b| b.code.as_str());
                let desired_code = batch.as_ref().map(|b| b.batch.code.as_str());
                let changes = student_changes(stored, &desired, stored_code, desired_code);
                (desired, changes, false)
            }
            None => {
                issues.push(FeeIssue::StudentWillBeCreated);
                let new = NewStudent {
                    name: row.name.clone(),
                    email: row.email.clone(),
                    phone: row.phone.clone(),
                    stage,
                    level,
                    batch_id: None,
                    enrollment_date: own_start,
                    start_date: row.student_start_date,
                    is_active: row.is_active(),
                };
                let student = build_student(&new, batch.as_ref().map(|b| &b.batch))?;
                (student, Vec::new(), true)
            }
        };

        let stored_records = if is_new {
            Vec::new()
        } else {
            state.fee_records(self.store, student.id)?
        };
        let credits = if is_new {
            Vec::new()
        } else {
            state.credits(self.store, student.id)?
        };
        issues.extend(
            stored_records
                .iter()
                .filter(|r| r.is_untouched())
                .filter_map(|r| r.payment_date)
                .map(|paid_date| FeeIssue::PaymentDateWithoutAmount { paid_date }),
        );

        let mut plan = StudentPlan {
            line: row.line,
            name: row.name.clone(),
            batch,
            student,
            is_new,
            changes,
            issues,
            delete: Vec::new(),
            regenerated: None,
            deposits: Vec::new(),
            applied: Vec::new(),
        };

        let billable_batch = plan.batch.as_ref().map(|b| b.batch.clone()).filter(Batch::is_billable);
        match billable_batch {
            Some(batch) => self.plan_regeneration(&mut plan, &batch, row, &stored_records, &credits)?,
            None => self.plan_deposits(&mut plan, row, &stored_records, &credits)?,
        }
        Ok(plan)
    }

    /// Regenerate obligations, replay payments, then apply credit
    fn plan_regeneration(
        &self,
        plan: &mut StudentPlan,
        batch: &Batch,
        row: &AuthoritativeStudent,
        stored: &[FeeRecord],
        credits: &[StudentCredit],
    ) -> Result<(), ReconcileError> {
        let today = self.context.today();
        let mut records = self
            .engine
            .plan_obligations(&plan.student, Some(batch), &[], today, row.duration_months)?;

        if !plan.is_new {
            let expected: BTreeSet<FeeMonth> = records.iter().map(|r| r.fee_month).collect();
            let present: BTreeSet<FeeMonth> = stored.iter().map(|r| r.fee_month).collect();
            plan.issues
                .extend(expected.difference(&present).map(|&month| FeeIssue::MissingMonth { month }));
            plan.issues
                .extend(present.difference(&expected).map(|&month| FeeIssue::UnexpectedMonth { month }));
        }

        // payments banked as credit before the batch was billable settle from that credit
        let held: HashMap<String, CreditId> = credits
            .iter()
            .filter(|c| c.transaction_type == CreditTransactionType::Deposit)
            .filter_map(|c| c.reference.clone().map(|reference| (reference, c.id)))
            .collect();
        let settlements = replay_cycles(&mut records, stored, &row.cycles, &held, &mut plan.issues);

        let mut credits = credits.to_vec();
        let restored = restore_applied_credits(plan.student.id, &mut records, stored, &credits);
        credits.extend(restored.iter().cloned());
        plan.deposits.extend(restored);

        for settlement in settlements {
            let record = &mut records[settlement.index];
            if let Some(entry) = plan_settlement(
                plan.student.id,
                &credits,
                settlement.deposit,
                record,
                settlement.paid_on,
                Utc::now(),
            ) {
                credits.push(entry.clone());
                plan.applied.push(entry);
            }
        }

        let application = plan_credit_application(plan.student.id, &credits, &records, today, Utc::now());
        for updated in application.updated_records {
            if let Some(slot) = records.iter_mut().find(|r| r.id == updated.id) {
                *slot = updated;
            }
        }
        plan.applied.extend(application.entries);

        if same_obligations(stored, &records) && plan.applied.is_empty() && plan.deposits.is_empty() {
            return Ok(());
        }
        plan.delete = stored.iter().map(|r| r.id).collect();
        plan.regenerated = Some(records);
        Ok(())
    }

    /// Without a billable batch, observed payments become credit
    fn plan_deposits(
        &self,
        plan: &mut StudentPlan,
        row: &AuthoritativeStudent,
        stored: &[FeeRecord],
        credits: &[StudentCredit],
    ) -> Result<(), ReconcileError> {
        if !stored.is_empty() {
            plan.issues.push(FeeIssue::RecordsWithoutBillableBatch { count: stored.len() });
        }

        let mut ledger = credits.to_vec();
        for cycle in &row.cycles {
            if !cycle.status.carries_payment() {
                if let Some(paid_date) = cycle.paid_date {
                    plan.issues.push(FeeIssue::PaymentDateWithoutAmount { paid_date });
                }
                continue;
            }

            let amount = match (cycle.status, cycle.amount) {
                (_, Some(amount)) => amount,
                (CycleStatus::Paid, None) => {
                    self.engine
                        .fee_table()
                        .lookup(plan.student.stage, plan.student.level)?
                        .fee_amount
                }
                _ => {
                    plan.issues.push(FeeIssue::PartialAmountUnknown {
                        month: cycle.month_hint(),
                    });
                    continue;
                }
            };
            if amount <= Decimal::ZERO {
                continue;
            }

            let context = CreditContext::note(format!("payment recorded without a billable batch, line {}", row.line))
                .with_reference(cycle_reference(cycle));
            if let Some(entry) = plan_deposit(plan.student.id, &ledger, amount, &context, Utc::now())? {
                ledger.push(entry.clone());
                plan.deposits.push(entry);
            }
        }
        Ok(())
    }
}

fn plan_batch(
    state: &RunState,
    raw: &str,
    stage: Stage,
    level: Level,
    start_date: Option<NaiveDate>,
    timing: Option<&str>,
) -> Result<BatchPlan, ReconcileError> {
    let parsed = parse_batch_code(raw)?;
    let identity = BatchIdentity {
        start_date,
        stage,
        level,
    };
    let schedule: Vec<ScheduleEntry> = parsed
        .days
        .iter()
        .map(|&day| ScheduleEntry {
            day,
            time: parsed.time,
        })
        .collect();
    let status = if start_date.is_some() {
        BatchStatus::Active
    } else {
        BatchStatus::Draft
    };

    // a dated row for an undated draft of the same stage and level promotes that draft
    let probe = probe_code(&parsed.normalized_code, &identity, |code| {
        state.batch_by_code(code).map(|b| {
            let held = b.identity();
            let promotable = b.status == BatchStatus::Draft
                && held.start_date.is_none()
                && held.stage == stage
                && held.level == level;
            if promotable {
                identity
            } else {
                held
            }
        })
    });
    let existing = match &probe {
        CodeProbe::Existing(code) => state.batch_by_code(code).cloned(),
        CodeProbe::Free(_) => None,
    };

    let Some(existing) = existing else {
        return Ok(BatchPlan {
            source_code: raw.trim().to_string(),
            batch: Batch {
                id: Uuid::new_v4(),
                code: probe.code().to_string(),
                base_code: parsed.normalized_code,
                stage,
                level,
                schedule,
                status,
                start_date,
                timing: timing.map(str::to_string),
            },
            action: RecordAction::Created,
            changes: Vec::new(),
        });
    };

    let mut desired = existing.clone();
    desired.schedule = schedule;
    if timing.is_some() {
        desired.timing = timing.map(str::to_string);
    }
    if existing.start_date.is_none() && start_date.is_some() {
        desired.start_date = start_date;
    }
    if existing.status != BatchStatus::Ended {
        desired.status = status;
    }

    let mut changes = Vec::new();
    push_change(
        &mut changes,
        "schedule",
        Some(schedule_label(&existing.schedule)),
        Some(schedule_label(&desired.schedule)),
    );
    push_change(&mut changes, "timing", existing.timing.as_deref(), desired.timing.as_deref());
    push_change(&mut changes, "start_date", existing.start_date, desired.start_date);
    push_change(&mut changes, "status", Some(existing.status), Some(desired.status));

    let action = if changes.is_empty() {
        RecordAction::Unchanged
    } else {
        RecordAction::Updated
    };
    Ok(BatchPlan {
        source_code: raw.trim().to_string(),
        batch: desired,
        action,
        changes,
    })
}

fn schedule_label(schedule: &[ScheduleEntry]) -> String {
    schedule
        .iter()
        .map(|entry| format!("{} {}", crate::batch::weekday_name(entry.day), entry.time))
        .collect::<Vec<_>>()
        .join(", ")
}

fn student_changes(
    stored: &Student,
    desired: &Student,
    stored_batch: Option<&str>,
    desired_batch: Option<&str>,
) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    push_change(&mut changes, "stage", Some(stored.stage), Some(desired.stage));
    push_change(&mut changes, "level", Some(stored.level), Some(desired.level));
    push_change(&mut changes, "batch", stored_batch, desired_batch);
    push_change(
        &mut changes,
        "fee_cycle_start_date",
        stored.fee_cycle_start_date,
        desired.fee_cycle_start_date,
    );
    push_change(&mut changes, "is_active", Some(stored.is_active), Some(desired.is_active));
    push_change(&mut changes, "email", stored.email.as_deref(), desired.email.as_deref());
    push_change(&mut changes, "phone", stored.phone.as_deref(), desired.phone.as_deref());
    changes
}

/// Re-apply credit consumed by records that are about to be replaced
///
/// The payment date is taken from the stored record of the same month.
/// Applications that no longer fit are returned to the ledger as new
/// deposits so the balance stays whole.
fn restore_applied_credits(
    student_id: StudentId,
    records: &mut [FeeRecord],
    stored: &[FeeRecord],
    credits: &[StudentCredit],
) -> Vec<StudentCredit> {
    let mut restored = Vec::new();
    let mut ledger = credits.to_vec();
    for entry in credits
        .iter()
        .filter(|c| c.transaction_type == CreditTransactionType::Applied)
    {
        let amount = -entry.amount;
        let slot = entry
            .fee_month
            .and_then(|month| records.iter_mut().find(|r| r.fee_month == month));
        let leftover = match slot {
            Some(record) => {
                let paid_on = stored
                    .iter()
                    .find(|s| s.fee_month == record.fee_month)
                    .and_then(|s| s.payment_date)
                    .unwrap_or_else(|| entry.processed_at.date_naive());
                amount - record.record_payment(amount, paid_on)
            }
            None => amount,
        };
        if leftover <= Decimal::ZERO {
            continue;
        }

        let context = CreditContext::note("credit returned from a replaced fee record")
            .with_reference(format!("restored:{}", entry.id));
        if let Ok(Some(deposit)) = plan_deposit(student_id, &ledger, leftover, &context, Utc::now()) {
            ledger.push(deposit.clone());
            restored.push(deposit);
        }
    }
    restored
}

/// A matched payment that is already held as a credit deposit
struct Settlement {
    index: usize,
    deposit: CreditId,
    paid_on: NaiveDate,
}

/// Replay authoritative payment cycles onto freshly generated records
///
/// Cycles whose reference is a key of `held` are not paid again; they are
/// returned so the caller can settle them from the held deposit.
fn replay_cycles(
    records: &mut [FeeRecord],
    stored: &[FeeRecord],
    cycles: &[PaymentCycle],
    held: &HashMap<String, CreditId>,
    issues: &mut Vec<FeeIssue>,
) -> Vec<Settlement> {
    let mut settlements = Vec::new();
    for cycle in cycles {
        if !cycle.status.carries_payment() {
            if let Some(paid_date) = cycle.paid_date {
                issues.push(FeeIssue::PaymentDateWithoutAmount { paid_date });
            }
            continue;
        }

        let Some(found) = match_payment(records, cycle) else {
            issues.push(FeeIssue::UnmatchedPayment {
                due_date: cycle.due_date,
                paid_date: cycle.paid_date,
            });
            continue;
        };
        let record = &mut records[found.index];
        issues.extend(FeeIssue::from_match(found.pass, record.fee_month));

        let amount = match (cycle.status, cycle.amount) {
            (status, Some(amount)) => {
                if status == CycleStatus::Paid && amount != record.fee_amount {
                    issues.push(FeeIssue::AmountMismatch {
                        month: record.fee_month,
                        expected: record.fee_amount,
                        reported: amount,
                    });
                }
                amount
            }
            (CycleStatus::Paid, None) => record.outstanding(),
            _ => {
                issues.push(FeeIssue::PartialAmountUnknown {
                    month: Some(record.fee_month),
                });
                continue;
            }
        };
        let paid_on = cycle.paid_date.unwrap_or(record.due_date);
        match held.get(&cycle_reference(cycle)) {
            Some(&deposit) => settlements.push(Settlement {
                index: found.index,
                deposit,
                paid_on,
            }),
            None => {
                record.record_payment(amount, paid_on);
            }
        }

        if cycle.status == CycleStatus::Paid {
            let unmarked = stored
                .iter()
                .find(|s| s.fee_month == record.fee_month)
                .is_some_and(|s| s.paid_amount < s.fee_amount);
            if unmarked {
                issues.push(FeeIssue::PaidNotMarked {
                    month: record.fee_month,
                });
            }
        }
    }
    settlements
}

/// Stable per-ledger key for a deposit taken from a payment cycle
fn cycle_reference(cycle: &PaymentCycle) -> String {
    let date = |d: Option<NaiveDate>| d.map_or_else(|| "-".to_string(), |d| d.to_string());
    format!("sheet:{}:{}", date(cycle.due_date), date(cycle.paid_date))
}

/// Whether two record sets carry the same obligations and payment facts
fn same_obligations(stored: &[FeeRecord], planned: &[FeeRecord]) -> bool {
    let key = |r: &FeeRecord| {
        (
            r.fee_month,
            r.due_date,
            r.fee_amount,
            r.paid_amount,
            r.payment_date,
            r.stage,
            r.level,
        )
    };
    let mut a: Vec<_> = stored.iter().map(key).collect();
    let mut b: Vec<_> = planned.iter().map(key).collect();
    a.sort();
    b.sort();
    a == b
}
