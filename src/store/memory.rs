//! In-memory `LedgerStore` with snapshot-based transactions and JSON persistence

use crate::model::{
    AdminIdentity, Batch, BatchId, FeeRecord, FeeRecordId, IdentityAccount, Student,
    StudentCredit, StudentId,
};
use crate::store::{LedgerStore, StoreError};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerState {
    #[serde(default)]
    students: Vec<Student>,
    #[serde(default)]
    identity_accounts: Vec<IdentityAccount>,
    #[serde(default)]
    admins: Vec<AdminIdentity>,
    #[serde(default)]
    batches: Vec<Batch>,
    #[serde(default)]
    fee_records: Vec<FeeRecord>,
    #[serde(default)]
    credits: Vec<StudentCredit>,
}

/// Single-threaded store keeping every table in insertion order
///
/// `begin` pushes a copy of the current state; `rollback` restores it and
/// `commit` discards it. Nested transactions behave like savepoints.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RefCell<LedgerState>,
    savepoints: RefCell<Vec<LedgerState>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a JSON snapshot, or start empty when the file is missing
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` when the file exists but cannot be read or parsed.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| StoreError::Io(format!("failed to read {}: {e}", path.display())))?;
        let state: LedgerState = serde_json::from_str(&content)?;
        Ok(Self {
            state: RefCell::new(state),
            savepoints: RefCell::new(Vec::new()),
        })
    }

    /// Write the committed state as pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Fails while a transaction is open, or when the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if !self.savepoints.borrow().is_empty() {
            return Err(StoreError::Other(
                "cannot save while a transaction is open".to_string(),
            ));
        }
        let json = serde_json::to_string_pretty(&*self.state.borrow())?;
        fs::write(path, json)
            .map_err(|e| StoreError::Io(format!("failed to write {}: {e}", path.display())))
    }

    /// Every fee record across all students
    #[must_use]
    pub fn all_fee_records(&self) -> Vec<FeeRecord> {
        self.state.borrow().fee_records.clone()
    }

    #[must_use]
    pub fn identity_accounts(&self) -> Vec<IdentityAccount> {
        self.state.borrow().identity_accounts.clone()
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        !self.savepoints.borrow().is_empty()
    }
}

impl LedgerStore for InMemoryStore {
    fn students(&self) -> Result<Vec<Student>, StoreError> {
        Ok(self.state.borrow().students.clone())
    }

    fn student(&self, id: StudentId) -> Result<Option<Student>, StoreError> {
        Ok(self.state.borrow().students.iter().find(|s| s.id == id).cloned())
    }

    fn insert_student(&self, student: &Student) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        if state.students.iter().any(|s| s.id == student.id) {
            return Err(StoreError::Duplicate(format!("student {}", student.id)));
        }
        state.students.push(student.clone());
        Ok(())
    }

    fn update_student(&self, student: &Student) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        let slot = state
            .students
            .iter_mut()
            .find(|s| s.id == student.id)
            .ok_or_else(|| StoreError::NotFound(format!("student {}", student.id)))?;
        *slot = student.clone();
        Ok(())
    }

    fn insert_identity_account(&self, account: &IdentityAccount) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        if state
            .identity_accounts
            .iter()
            .any(|a| a.login == account.login || a.student_id == account.student_id)
        {
            return Err(StoreError::Duplicate(format!("login {}", account.login)));
        }
        state.identity_accounts.push(account.clone());
        Ok(())
    }

    fn identity_account_for(&self, student_id: StudentId) -> Result<Option<IdentityAccount>, StoreError> {
        Ok(self
            .state
            .borrow()
            .identity_accounts
            .iter()
            .find(|a| a.student_id == student_id)
            .cloned())
    }

    fn admin_by_email(&self, email: &str) -> Result<Option<AdminIdentity>, StoreError> {
        Ok(self
            .state
            .borrow()
            .admins
            .iter()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn insert_admin(&self, admin: &AdminIdentity) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        if state.admins.iter().any(|a| a.email.eq_ignore_ascii_case(&admin.email)) {
            return Err(StoreError::Duplicate(format!("admin {}", admin.email)));
        }
        state.admins.push(admin.clone());
        Ok(())
    }

    fn batches(&self) -> Result<Vec<Batch>, StoreError> {
        Ok(self.state.borrow().batches.clone())
    }

    fn batch(&self, id: BatchId) -> Result<Option<Batch>, StoreError> {
        Ok(self.state.borrow().batches.iter().find(|b| b.id == id).cloned())
    }

    fn batch_by_code(&self, code: &str) -> Result<Option<Batch>, StoreError> {
        Ok(self.state.borrow().batches.iter().find(|b| b.code == code).cloned())
    }

    fn insert_batch(&self, batch: &Batch) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        if state.batches.iter().any(|b| b.id == batch.id || b.code == batch.code) {
            return Err(StoreError::Duplicate(format!("batch {}", batch.code)));
        }
        state.batches.push(batch.clone());
        Ok(())
    }

    fn update_batch(&self, batch: &Batch) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        if state.batches.iter().any(|b| b.id != batch.id && b.code == batch.code) {
            return Err(StoreError::Duplicate(format!("batch {}", batch.code)));
        }
        let slot = state
            .batches
            .iter_mut()
            .find(|b| b.id == batch.id)
            .ok_or_else(|| StoreError::NotFound(format!("batch {}", batch.id)))?;
        *slot = batch.clone();
        Ok(())
    }

    fn fee_records(&self, student_id: StudentId) -> Result<Vec<FeeRecord>, StoreError> {
        let mut records: Vec<FeeRecord> = self
            .state
            .borrow()
            .fee_records
            .iter()
            .filter(|r| r.student_id == student_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.fee_month);
        Ok(records)
    }

    fn insert_fee_record(&self, record: &FeeRecord) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        if state
            .fee_records
            .iter()
            .any(|r| r.student_id == record.student_id && r.fee_month == record.fee_month)
        {
            return Err(StoreError::Duplicate(format!(
                "fee record ({}, {})",
                record.student_id, record.fee_month
            )));
        }
        state.fee_records.push(record.clone());
        Ok(())
    }

    fn update_fee_record(&self, record: &FeeRecord) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        let slot = state
            .fee_records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| StoreError::NotFound(format!("fee record {}", record.id)))?;
        *slot = record.clone();
        Ok(())
    }

    fn delete_fee_records(&self, ids: &[FeeRecordId]) -> Result<usize, StoreError> {
        let mut state = self.state.borrow_mut();
        let before = state.fee_records.len();
        state.fee_records.retain(|r| !ids.contains(&r.id));
        Ok(before - state.fee_records.len())
    }

    fn credits(&self, student_id: StudentId) -> Result<Vec<StudentCredit>, StoreError> {
        Ok(self
            .state
            .borrow()
            .credits
            .iter()
            .filter(|c| c.student_id == student_id)
            .cloned()
            .collect())
    }

    fn append_credit(&self, credit: &StudentCredit) -> Result<(), StoreError> {
        self.state.borrow_mut().credits.push(credit.clone());
        Ok(())
    }

    fn begin(&self) -> Result<(), StoreError> {
        let snapshot = self.state.borrow().clone();
        self.savepoints.borrow_mut().push(snapshot);
        Ok(())
    }

    fn commit(&self) -> Result<(), StoreError> {
        self.savepoints
            .borrow_mut()
            .pop()
            .map(|_| ())
            .ok_or(StoreError::TransactionClosed)
    }

    fn rollback(&self) -> Result<(), StoreError> {
        let snapshot = self
            .savepoints
            .borrow_mut()
            .pop()
            .ok_or(StoreError::TransactionClosed)?;
        *self.state.borrow_mut() = snapshot;
        Ok(())
    }
}
