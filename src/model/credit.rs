//! Append-only student credit ledger entries

use crate::fees::FeeMonth;
use crate::model::{CreditId, StudentId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of credit ledger movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditTransactionType {
    /// Prepayment collected while the student had no billable cycle
    Deposit,
    /// Credit consumed by a fee record
    Applied,
}

impl fmt::Display for CreditTransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreditTransactionType::Deposit => f.write_str("deposit"),
            CreditTransactionType::Applied => f.write_str("applied"),
        }
    }
}

/// One ledger entry
///
/// Deposits carry a positive `amount`, applications a negative one.
/// `balance_after == balance_before + amount` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentCredit {
    pub id: CreditId,
    pub student_id: StudentId,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub transaction_type: CreditTransactionType,
    /// Fee month an application was made against
    #[serde(default)]
    pub fee_month: Option<FeeMonth>,
    /// Deposit an application consumed
    #[serde(default)]
    pub source_credit: Option<CreditId>,
    /// Caller-supplied key used to avoid recording the same deposit twice
    #[serde(default)]
    pub reference: Option<String>,
    pub note: String,
    pub processed_at: DateTime<Utc>,
}
