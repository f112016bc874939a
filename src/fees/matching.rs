//! Matching external payment facts to fee months
//!
//! Source rows do not always record a due date. Matching runs two explicit,
//! ordered passes: first on the month of the due date, then on the month of
//! the payment date.

use crate::fees::FeeMonth;
use crate::model::FeeRecord;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payment state reported by the authoritative source for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Paid,
    Partial,
    Pending,
}

impl CycleStatus {
    /// Interpret a free-text status cell; anything unrecognised is pending
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.starts_with("partial") || normalized == "part paid" {
            CycleStatus::Partial
        } else if matches!(
            normalized.as_str(),
            "paid" | "done" | "received" | "complete" | "completed" | "yes"
        ) {
            CycleStatus::Paid
        } else {
            CycleStatus::Pending
        }
    }

    #[must_use]
    pub fn carries_payment(self) -> bool {
        matches!(self, CycleStatus::Paid | CycleStatus::Partial)
    }
}

/// One `(dueDate, status, paidDate)` payment cycle from the authoritative source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCycle {
    pub due_date: Option<NaiveDate>,
    pub status: CycleStatus,
    pub paid_date: Option<NaiveDate>,
    /// Amount received, when the source records one
    #[serde(default)]
    pub amount: Option<Decimal>,
}

impl PaymentCycle {
    /// Month the cycle most plausibly refers to, due date first
    #[must_use]
    pub fn month_hint(&self) -> Option<FeeMonth> {
        self.due_date.or(self.paid_date).map(FeeMonth::of)
    }
}

/// Which pass produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPass {
    DueMonth,
    PaidMonth,
}

/// Index into the record slice plus the pass that found it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentMatch {
    pub index: usize,
    pub pass: MatchPass,
}

/// Find the record a payment cycle belongs to
///
/// Pass one compares the cycle's due-date month with each record's fee month.
/// Only when that finds nothing does pass two compare the payment-date month.
#[must_use]
pub fn match_payment(records: &[FeeRecord], cycle: &PaymentCycle) -> Option<PaymentMatch> {
    let by_month = |date: Option<NaiveDate>| {
        let month = FeeMonth::of(date?);
        records.iter().position(|r| r.fee_month == month)
    };

    if let Some(index) = by_month(cycle.due_date) {
        return Some(PaymentMatch {
            index,
            pass: MatchPass::DueMonth,
        });
    }

    by_month(cycle.paid_date).map(|index| PaymentMatch {
        index,
        pass: MatchPass::PaidMonth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Level, Stage};
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn records() -> Vec<FeeRecord> {
        [1u32, 2, 3]
            .iter()
            .map(|m| FeeRecord {
                id: Uuid::new_v4(),
                student_id: Uuid::nil(),
                fee_month: FeeMonth::new(2026, *m).unwrap(),
                due_date: date(2026, *m, 10),
                fee_amount: Decimal::from(1000),
                paid_amount: Decimal::ZERO,
                payment_date: None,
                stage: Stage::Beginner,
                level: Level::new(1).unwrap(),
            })
            .collect()
    }

    fn cycle(due: Option<NaiveDate>, paid: Option<NaiveDate>) -> PaymentCycle {
        PaymentCycle {
            due_date: due,
            status: CycleStatus::Paid,
            paid_date: paid,
            amount: None,
        }
    }

    #[test]
    fn test_due_month_wins_over_paid_month() {
        let m = match_payment(&records(), &cycle(Some(date(2026, 2, 10)), Some(date(2026, 3, 2)))).unwrap();
        assert_eq!(m.index, 1);
        assert_eq!(m.pass, MatchPass::DueMonth);
    }

    #[test]
    fn test_falls_back_to_paid_month() {
        let m = match_payment(&records(), &cycle(None, Some(date(2026, 3, 2)))).unwrap();
        assert_eq!(m.index, 2);
        assert_eq!(m.pass, MatchPass::PaidMonth);

        // due date outside the generated range also falls through
        let m = match_payment(&records(), &cycle(Some(date(2025, 12, 10)), Some(date(2026, 1, 5)))).unwrap();
        assert_eq!(m.index, 0);
        assert_eq!(m.pass, MatchPass::PaidMonth);
    }

    #[test]
    fn test_no_match() {
        assert!(match_payment(&records(), &cycle(Some(date(2026, 9, 1)), None)).is_none());
        assert!(match_payment(&records(), &cycle(None, None)).is_none());
    }

    #[test]
    fn test_cycle_status_parse() {
        assert_eq!(CycleStatus::parse(" Paid "), CycleStatus::Paid);
        assert_eq!(CycleStatus::parse("Partially paid"), CycleStatus::Partial);
        assert_eq!(CycleStatus::parse("pending"), CycleStatus::Pending);
        assert_eq!(CycleStatus::parse(""), CycleStatus::Pending);
    }
}
