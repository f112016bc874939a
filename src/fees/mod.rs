//! Fee cycle engine
//!
//! This module provides:
//! - `FeeMonth`, the canonical `YYYY-MM` obligation key
//! - `derive_status`, the single definition of payment status
//! - `FeeCycleEngine`, monthly obligation generation from a cycle start
//! - two-pass matching of external payment facts to fee months

pub mod cycle;
pub mod error;
pub mod matching;
pub mod month;
pub mod status;

pub use cycle::{
    due_date, effective_cycle_start, remaining_obligations, resolve_cycle_start, FeeCycleEngine,
    DEFAULT_MAX_GENERATION_MONTHS,
};
pub use error::FeeError;
pub use matching::{match_payment, CycleStatus, MatchPass, PaymentCycle, PaymentMatch};
pub use month::{months_between, FeeMonth};
pub use status::{derive_status, FeeStatus};
