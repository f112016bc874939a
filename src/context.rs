//! Per-run context threaded through every mutating operation

use crate::config::EngineConfig;
use crate::model::AdminIdentity;
use crate::store::{LedgerStore, StoreError};
use chrono::NaiveDate;
use log::info;
use uuid::Uuid;

/// Acting administrator, run date and mode for one run
///
/// Resolved once before any mutation and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    acting_admin: AdminIdentity,
    today: NaiveDate,
    dry_run: bool,
}

impl RunContext {
    #[must_use]
    pub fn new(acting_admin: AdminIdentity, today: NaiveDate, dry_run: bool) -> Self {
        Self {
            acting_admin,
            today,
            dry_run,
        }
    }

    /// Look up the configured administrator, creating it when missing
    ///
    /// In dry-run mode a missing administrator is synthesised but not stored.
    ///
    /// # Errors
    ///
    /// Storage errors from the lookup or insert.
    pub fn resolve(
        store: &dyn LedgerStore,
        engine: &EngineConfig,
        today: NaiveDate,
        dry_run: bool,
    ) -> Result<Self, StoreError> {
        let email = engine.acting_admin_email.trim().to_ascii_lowercase();
        let admin = match store.admin_by_email(&email)? {
            Some(admin) => admin,
            None => {
                let admin = AdminIdentity {
                    id: Uuid::new_v4(),
                    email,
                    name: engine.acting_admin_name.clone(),
                };
                if dry_run {
                    info!("acting administrator {} would be created", admin.email);
                } else {
                    store.insert_admin(&admin)?;
                    info!("created acting administrator {}", admin.email);
                }
                admin
            }
        };
        Ok(Self::new(admin, today, dry_run))
    }

    #[must_use]
    pub fn acting_admin(&self) -> &AdminIdentity {
        &self.acting_admin
    }

    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.today
    }

    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, 1).unwrap()
    }

    #[test]
    fn test_admin_created_once() {
        let store = InMemoryStore::new();
        let engine = EngineConfig::default();

        let first = RunContext::resolve(&store, &engine, today(), false).unwrap();
        let second = RunContext::resolve(&store, &engine, today(), false).unwrap();
        assert_eq!(first.acting_admin(), second.acting_admin());
        assert_eq!(first.acting_admin().name, "System Administrator");
    }

    #[test]
    fn test_dry_run_does_not_store_admin() {
        let store = InMemoryStore::new();
        let engine = EngineConfig::default();

        let context = RunContext::resolve(&store, &engine, today(), true).unwrap();
        assert!(context.dry_run());
        assert!(store.admin_by_email(&context.acting_admin().email).unwrap().is_none());
    }
}
