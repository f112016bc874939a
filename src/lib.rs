//! # Feeguard
//!
//! Monthly fee lifecycle and batch reconciliation for a course institute.
//!
//! - [`batch`]: schedule code parsing and unique display code allocation
//! - [`fees`]: monthly obligation generation and payment status
//! - [`credit`]: append-only credit ledger, applied oldest-due first
//! - [`transition`]: stage/level/batch moves that rebuild future obligations
//! - [`enrollment`]: atomic student plus identity account registration
//! - [`reconcile`]: converge stored state on an authoritative snapshot
//!
//! Storage sits behind [`store::LedgerStore`]; [`store::InMemoryStore`] is
//! the bundled implementation.

pub mod batch;
pub mod config;
pub mod context;
pub mod credit;
pub mod enrollment;
pub mod error;
pub mod fees;
pub mod model;
pub mod reconcile;
pub mod store;
#[cfg(feature = "tracing")]
pub mod tracing_helpers;
pub mod transition;

pub use config::{EngineConfig, FeeguardConfig};
pub use context::RunContext;
pub use credit::{CreditContext, CreditError, CreditLedger};
pub use enrollment::{EnrollmentError, EnrollmentService, NewStudent};
pub use error::ErrorKind;
pub use fees::{FeeCycleEngine, FeeError, FeeMonth, FeeStatus};
pub use reconcile::{AuthoritativeSnapshot, ReconcileError, ReconciliationDriver, ReconciliationReport};
pub use store::{InMemoryStore, LedgerStore, StoreError};
pub use transition::{TransitionError, TransitionHandler, TransitionRequest};
