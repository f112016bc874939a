//! Derived payment status
//!
//! Status is a pure function of the payment facts on a record. Nothing else
//! in the crate encodes these rules; filters and reports call [`derive_status`].

use crate::model::FeeRecord;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeStatus {
    Paid,
    PartiallyPaid,
    Overdue,
    Upcoming,
}

impl FeeStatus {
    #[must_use]
    pub fn is_settled(self) -> bool {
        self == FeeStatus::Paid
    }
}

impl fmt::Display for FeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeeStatus::Paid => "paid",
            FeeStatus::PartiallyPaid => "partially_paid",
            FeeStatus::Overdue => "overdue",
            FeeStatus::Upcoming => "upcoming",
        };
        f.write_str(name)
    }
}

/// Derive the status of a fee record as of `today`
///
/// The due date counts as end-of-day: a record due today is still upcoming.
/// `payment_date` does not influence the outcome; a partial payment is
/// partial whether or not a date was recorded.
#[must_use]
pub fn derive_status(record: &FeeRecord, today: NaiveDate) -> FeeStatus {
    if record.paid_amount >= record.fee_amount {
        FeeStatus::Paid
    } else if record.paid_amount > Decimal::ZERO {
        FeeStatus::PartiallyPaid
    } else if record.due_date < today {
        FeeStatus::Overdue
    } else {
        FeeStatus::Upcoming
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::FeeMonth;
    use crate::model::{Level, Stage};
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(fee: i64, paid: i64, due: NaiveDate, paid_on: Option<NaiveDate>) -> FeeRecord {
        FeeRecord {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            fee_month: FeeMonth::of(due),
            due_date: due,
            fee_amount: Decimal::from(fee),
            paid_amount: Decimal::from(paid),
            payment_date: paid_on,
            stage: Stage::Beginner,
            level: Level::new(1).unwrap(),
        }
    }

    #[test]
    fn test_paid_when_amount_covers_fee() {
        let today = date(2026, 4, 1);
        assert_eq!(derive_status(&record(1000, 1000, date(2026, 3, 15), None), today), FeeStatus::Paid);
        assert_eq!(derive_status(&record(1000, 1200, date(2026, 5, 15), None), today), FeeStatus::Paid);
    }

    #[test]
    fn test_partial_regardless_of_payment_date() {
        let today = date(2026, 4, 1);
        let due = date(2026, 3, 15);
        assert_eq!(derive_status(&record(1000, 400, due, None), today), FeeStatus::PartiallyPaid);
        assert_eq!(
            derive_status(&record(1000, 400, due, Some(date(2026, 3, 20))), today),
            FeeStatus::PartiallyPaid
        );
    }

    #[test]
    fn test_overdue_and_upcoming_split_on_due_date() {
        let today = date(2026, 4, 15);
        assert_eq!(derive_status(&record(1000, 0, date(2026, 4, 14), None), today), FeeStatus::Overdue);
        assert_eq!(derive_status(&record(1000, 0, date(2026, 4, 15), None), today), FeeStatus::Upcoming);
        assert_eq!(derive_status(&record(1000, 0, date(2026, 5, 15), None), today), FeeStatus::Upcoming);
    }

    #[test]
    fn test_payment_date_with_zero_amount_is_not_paid() {
        let today = date(2026, 4, 15);
        let r = record(1000, 0, date(2026, 3, 15), Some(date(2026, 3, 10)));
        assert_eq!(derive_status(&r, today), FeeStatus::Overdue);
    }

    #[test]
    fn test_deterministic() {
        let today = date(2026, 4, 15);
        let r = record(1000, 250, date(2026, 2, 15), None);
        let first = derive_status(&r, today);
        for _ in 0..5 {
            assert_eq!(derive_status(&r, today), first);
        }
    }
}
