//! `FeeRecord` - one month's billable amount for a student

use crate::fees::{derive_status, FeeMonth, FeeStatus};
use crate::model::{FeeRecordId, Level, Stage, StudentId};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A monthly fee obligation
///
/// Keyed by `(student_id, fee_month)`. Status is never stored; call
/// [`FeeRecord::status`] to derive it from the payment facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRecord {
    pub id: FeeRecordId,
    pub student_id: StudentId,
    pub fee_month: FeeMonth,
    pub due_date: NaiveDate,
    pub fee_amount: Decimal,
    pub paid_amount: Decimal,
    pub payment_date: Option<NaiveDate>,
    /// Stage and level the obligation was billed under
    pub stage: Stage,
    pub level: Level,
}

impl FeeRecord {
    #[must_use]
    pub fn status(&self, today: NaiveDate) -> FeeStatus {
        derive_status(self, today)
    }

    /// Amount still owed, never negative
    #[must_use]
    pub fn outstanding(&self) -> Decimal {
        (self.fee_amount - self.paid_amount).max(Decimal::ZERO)
    }

    #[must_use]
    pub fn is_untouched(&self) -> bool {
        self.paid_amount.is_zero()
    }

    /// Record a payment, capping the paid amount at the fee amount
    pub fn record_payment(&mut self, amount: Decimal, paid_on: NaiveDate) -> Decimal {
        let applied = amount.min(self.outstanding()).max(Decimal::ZERO);
        if !applied.is_zero() {
            self.paid_amount += applied;
            self.payment_date = Some(paid_on);
        }
        applied
    }
}
