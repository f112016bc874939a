//! Student credit ledger
//!
//! Credits are prepayments collected while a student has no billable cycle.
//! The ledger is append-only: every entry records the balance before and
//! after it, read from the previous entry at the time of the call. Deposits
//! are consumed oldest first against unpaid fee records in due-date order.

use crate::error::ErrorKind;
use crate::model::{CreditId, CreditTransactionType, FeeRecord, StudentCredit, StudentId};
use crate::store::{with_transaction, LedgerStore, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info};
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

#[derive(Debug, Error)]
pub enum CreditError {
    #[error("credit amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CreditError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            CreditError::NonPositiveAmount(_) => ErrorKind::Validation,
            CreditError::Store(e) => e.kind(),
        }
    }
}

/// Descriptive context stored with a deposit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreditContext {
    /// Deduplication key; a second deposit with the same reference is ignored
    pub reference: Option<String>,
    pub note: String,
}

impl CreditContext {
    #[must_use]
    pub fn note(note: impl Into<String>) -> Self {
        Self {
            reference: None,
            note: note.into(),
        }
    }

    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Result of consuming credit against fee records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreditApplication {
    /// New `Applied` ledger entries, in append order
    pub entries: Vec<StudentCredit>,
    /// Fee records whose paid amount changed
    pub updated_records: Vec<FeeRecord>,
    pub total_applied: Decimal,
}

impl CreditApplication {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Current balance: the `balance_after` of the last entry
#[must_use]
pub fn credit_balance(entries: &[StudentCredit]) -> Decimal {
    entries.last().map_or(Decimal::ZERO, |e| e.balance_after)
}

/// Build the next deposit entry for a ledger
///
/// Returns `Ok(None)` when `context.reference` was already recorded.
///
/// # Errors
///
/// `NonPositiveAmount` when `amount <= 0`.
pub fn plan_deposit(
    student_id: StudentId,
    entries: &[StudentCredit],
    amount: Decimal,
    context: &CreditContext,
    processed_at: DateTime<Utc>,
) -> Result<Option<StudentCredit>, CreditError> {
    if amount <= Decimal::ZERO {
        return Err(CreditError::NonPositiveAmount(amount));
    }
    if let Some(reference) = &context.reference {
        if entries.iter().any(|e| e.reference.as_deref() == Some(reference.as_str())) {
            debug!("credit '{reference}' already recorded for student {student_id}");
            return Ok(None);
        }
    }

    let balance_before = credit_balance(entries);
    Ok(Some(StudentCredit {
        id: Uuid::new_v4(),
        student_id,
        amount,
        balance_before,
        balance_after: balance_before + amount,
        transaction_type: CreditTransactionType::Deposit,
        fee_month: None,
        source_credit: None,
        reference: context.reference.clone(),
        note: context.note.clone(),
        processed_at,
    }))
}

/// Unspent amount left on each deposit, oldest first
fn unspent_deposits(entries: &[StudentCredit]) -> Vec<(CreditId, Decimal)> {
    let mut consumed: HashMap<CreditId, Decimal> = HashMap::new();
    for entry in entries {
        if entry.transaction_type == CreditTransactionType::Applied {
            if let Some(source) = entry.source_credit {
                *consumed.entry(source).or_default() += -entry.amount;
            }
        }
    }

    entries
        .iter()
        .filter(|e| e.transaction_type == CreditTransactionType::Deposit)
        .map(|e| (e.id, e.amount - consumed.get(&e.id).copied().unwrap_or_default()))
        .filter(|(_, left)| *left > Decimal::ZERO)
        .collect()
}

/// Plan how existing credit pays down unpaid fee records
///
/// Deposits are consumed oldest first; records are paid in ascending due
/// date order. Each record receives at most its outstanding amount, so a
/// credit smaller than the fee leaves the record partially paid. Nothing is
/// written; the caller persists the returned entries and records.
#[must_use]
pub fn plan_credit_application(
    student_id: StudentId,
    entries: &[StudentCredit],
    records: &[FeeRecord],
    applied_on: NaiveDate,
    processed_at: DateTime<Utc>,
) -> CreditApplication {
    let mut deposits = unspent_deposits(entries).into_iter();
    let mut balance = credit_balance(entries);
    let mut application = CreditApplication::default();

    let mut unpaid: Vec<FeeRecord> = records
        .iter()
        .filter(|r| r.student_id == student_id && r.outstanding() > Decimal::ZERO)
        .cloned()
        .collect();
    unpaid.sort_by(|a, b| a.due_date.cmp(&b.due_date).then_with(|| a.fee_month.cmp(&b.fee_month)));

    let mut current = deposits.next();
    for mut record in unpaid {
        let mut touched = false;
        while record.outstanding() > Decimal::ZERO && balance > Decimal::ZERO {
            let Some((deposit_id, left)) = current.as_mut() else {
                break;
            };
            let take = (*left).min(record.outstanding()).min(balance);
            let applied = record.record_payment(take, applied_on);
            if applied.is_zero() {
                break;
            }

            application.entries.push(StudentCredit {
                id: Uuid::new_v4(),
                student_id,
                amount: -applied,
                balance_before: balance,
                balance_after: balance - applied,
                transaction_type: CreditTransactionType::Applied,
                fee_month: Some(record.fee_month),
                source_credit: Some(*deposit_id),
                reference: None,
                note: format!("applied to {}", record.fee_month),
                processed_at,
            });
            balance -= applied;
            application.total_applied += applied;
            *left -= applied;
            touched = true;

            if *left <= Decimal::ZERO {
                current = deposits.next();
            }
        }
        if touched {
            application.updated_records.push(record);
        }
        if current.is_none() || balance <= Decimal::ZERO {
            break;
        }
    }

    application
}

/// Consume one named deposit against one fee record
///
/// Used when a payment already held as credit is later matched to its own
/// month. Takes at most the deposit's unspent amount and the record's
/// outstanding amount. Returns `None` when either is exhausted.
#[must_use]
pub fn plan_settlement(
    student_id: StudentId,
    entries: &[StudentCredit],
    deposit_id: CreditId,
    record: &mut FeeRecord,
    applied_on: NaiveDate,
    processed_at: DateTime<Utc>,
) -> Option<StudentCredit> {
    let (_, left) = unspent_deposits(entries)
        .into_iter()
        .find(|(id, _)| *id == deposit_id)?;
    let balance = credit_balance(entries);
    let applied = record.record_payment(left.min(balance), applied_on);
    if applied.is_zero() {
        return None;
    }

    Some(StudentCredit {
        id: Uuid::new_v4(),
        student_id,
        amount: -applied,
        balance_before: balance,
        balance_after: balance - applied,
        transaction_type: CreditTransactionType::Applied,
        fee_month: Some(record.fee_month),
        source_credit: Some(deposit_id),
        reference: None,
        note: format!("settled {}", record.fee_month),
        processed_at,
    })
}

/// Store-backed credit ledger operations
#[derive(Clone, Copy)]
pub struct CreditLedger<'a> {
    store: &'a dyn LedgerStore,
}

impl<'a> CreditLedger<'a> {
    #[must_use]
    pub fn new(store: &'a dyn LedgerStore) -> Self {
        Self { store }
    }

    /// Current unspent credit of a student
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn balance(&self, student_id: StudentId) -> Result<Decimal, CreditError> {
        Ok(credit_balance(&self.store.credits(student_id)?))
    }

    /// Append a deposit to a student's ledger
    ///
    /// Returns `Ok(None)` when the context's reference was already recorded.
    ///
    /// # Errors
    ///
    /// `NonPositiveAmount` for amounts `<= 0`, storage errors otherwise.
    pub fn add_credit(
        &self,
        student_id: StudentId,
        amount: Decimal,
        context: &CreditContext,
    ) -> Result<Option<StudentCredit>, CreditError> {
        let entries = self.store.credits(student_id)?;
        let Some(entry) = plan_deposit(student_id, &entries, amount, context, Utc::now())? else {
            return Ok(None);
        };
        self.store.append_credit(&entry)?;
        info!(
            "credit of {} recorded for student {student_id}, balance now {}",
            entry.amount, entry.balance_after
        );
        Ok(Some(entry))
    }

    /// Consume a student's unspent credit against their unpaid fee records
    ///
    /// Record updates and ledger entries are written in one transaction.
    ///
    /// # Errors
    ///
    /// Storage errors; nothing is written when one occurs.
    pub fn apply_credits_to_obligations(
        &self,
        student_id: StudentId,
        applied_on: NaiveDate,
    ) -> Result<CreditApplication, CreditError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::credit_span(student_id).entered();

        let store = self.store;
        with_transaction(store, || {
            let entries = store.credits(student_id)?;
            if credit_balance(&entries) <= Decimal::ZERO {
                return Ok(CreditApplication::default());
            }
            let records = store.fee_records(student_id)?;
            let application = plan_credit_application(student_id, &entries, &records, applied_on, Utc::now());

            for record in &application.updated_records {
                store.update_fee_record(record)?;
            }
            for entry in &application.entries {
                store.append_credit(entry)?;
            }
            if !application.is_empty() {
                info!(
                    "applied {} credit to {} fee record(s) for student {student_id}",
                    application.total_applied,
                    application.updated_records.len()
                );
            }
            Ok(application)
        })
    }
}
