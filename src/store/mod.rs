//! `LedgerStore` - the persistence seam
//!
//! Engines never touch storage directly; they call through this trait so the
//! in-memory store used by tests and the CLI can be swapped for a database
//! backed implementation.
//!
//! # Example
//!
//! ```rust
//! use feeguard::store::{with_transaction, InMemoryStore, LedgerStore, StoreError};
//!
//! let store = InMemoryStore::new();
//! let students = with_transaction(&store, || -> Result<usize, StoreError> {
//!     Ok(store.students()?.len())
//! })?;
//! assert_eq!(students, 0);
//! # Ok::<(), StoreError>(())
//! ```

pub mod error;
pub mod memory;

pub use error::StoreError;
pub use memory::InMemoryStore;

use crate::model::{
    AdminIdentity, Batch, BatchId, FeeRecord, FeeRecordId, IdentityAccount, Student,
    StudentCredit, StudentId,
};
use log::warn;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

/// Storage operations needed by the fee engines
///
/// Methods take `&self`; implementations use interior mutability. Processing
/// is single-threaded, so implementations need not be `Sync`.
pub trait LedgerStore {
    fn students(&self) -> Result<Vec<Student>, StoreError>;
    fn student(&self, id: StudentId) -> Result<Option<Student>, StoreError>;
    fn insert_student(&self, student: &Student) -> Result<(), StoreError>;
    fn update_student(&self, student: &Student) -> Result<(), StoreError>;

    /// Insert a login account; fails with `Duplicate` when the login is taken
    fn insert_identity_account(&self, account: &IdentityAccount) -> Result<(), StoreError>;
    fn identity_account_for(&self, student_id: StudentId) -> Result<Option<IdentityAccount>, StoreError>;

    fn admin_by_email(&self, email: &str) -> Result<Option<AdminIdentity>, StoreError>;
    fn insert_admin(&self, admin: &AdminIdentity) -> Result<(), StoreError>;

    fn batches(&self) -> Result<Vec<Batch>, StoreError>;
    fn batch(&self, id: BatchId) -> Result<Option<Batch>, StoreError>;
    fn batch_by_code(&self, code: &str) -> Result<Option<Batch>, StoreError>;
    /// Insert a batch; fails with `Duplicate` when the display code is taken
    fn insert_batch(&self, batch: &Batch) -> Result<(), StoreError>;
    fn update_batch(&self, batch: &Batch) -> Result<(), StoreError>;

    /// Fee records of one student, ordered by fee month
    fn fee_records(&self, student_id: StudentId) -> Result<Vec<FeeRecord>, StoreError>;
    /// Insert a fee record; fails with `Duplicate` when `(student_id, fee_month)` exists
    fn insert_fee_record(&self, record: &FeeRecord) -> Result<(), StoreError>;
    fn update_fee_record(&self, record: &FeeRecord) -> Result<(), StoreError>;
    /// Delete records by id, returning how many existed
    fn delete_fee_records(&self, ids: &[FeeRecordId]) -> Result<usize, StoreError>;

    /// Credit entries of one student in append order
    fn credits(&self, student_id: StudentId) -> Result<Vec<StudentCredit>, StoreError>;
    fn append_credit(&self, credit: &StudentCredit) -> Result<(), StoreError>;

    fn begin(&self) -> Result<(), StoreError>;
    fn commit(&self) -> Result<(), StoreError>;
    fn rollback(&self) -> Result<(), StoreError>;
}

/// Run `f` inside a store transaction
///
/// Commits when `f` returns `Ok`, rolls back when it returns `Err`. A failed
/// rollback is logged and the original error is returned.
///
/// # Errors
///
/// Returns the error from `f`, or from `begin`/`commit`.
pub fn with_transaction<T, E, F>(store: &dyn LedgerStore, f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<StoreError>,
{
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::transaction_span().entered();

    store.begin()?;
    match f() {
        Ok(value) => {
            store.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = store.rollback() {
                warn!("rollback failed: {rollback_err}");
            }
            Err(e)
        }
    }
}
