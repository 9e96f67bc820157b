//! Per-migrator completion ledger.
//!
//! A [`Ledger`] caches the migrator's completion table in memory for
//! `skip` checks and writes through to the [`StateStore`] on every
//! `record`. Only the scheduling task calls `record`, so the
//! read-modify-write of the persisted table never races another writer.

use std::sync::{Arc, RwLock};

use admin_state::{LedgerTable, StateStore};
use tracing::debug;

use crate::domain::error::Result;
use crate::obs;

pub struct Ledger {
    migrator: String,
    store: Arc<dyn StateStore>,
    table: RwLock<LedgerTable>,
}

impl Ledger {
    /// Load the persisted table for `migrator`; empty if none was saved yet.
    pub fn load(migrator: &str, store: Arc<dyn StateStore>) -> Result<Self> {
        let table = store.load_ledger(migrator)?;
        obs::emit_migrator_loaded(migrator, table.feedstock_count());
        Ok(Self {
            migrator: migrator.to_string(),
            store,
            table: RwLock::new(table),
        })
    }

    /// Whether (feedstock, branch) was completed. `master` and `main` are
    /// interchangeable.
    pub fn is_done(&self, feedstock: &str, branch: &str) -> bool {
        self.read().is_done(feedstock, branch)
    }

    /// Mark (feedstock, branch) complete and persist immediately.
    ///
    /// The persisted table is re-read before writing so entries recorded by
    /// an earlier run of the job are never dropped.
    pub fn record(&self, feedstock: &str, branch: &str) -> Result<()> {
        self.record_branches(feedstock, &[branch])
    }

    /// Mark several branches of `feedstock` complete with a single write.
    pub fn record_branches(&self, feedstock: &str, branches: &[&str]) -> Result<()> {
        let mut persisted = self.store.load_ledger(&self.migrator)?;
        for branch in branches {
            persisted.mark(feedstock, branch);
        }
        self.store.save_ledger(&self.migrator, &persisted)?;

        let mut table = self.write();
        for branch in branches {
            table.mark(feedstock, branch);
        }
        debug!(migrator = %self.migrator, feedstock = %feedstock, branches = ?branches, "recorded");
        Ok(())
    }

    /// Forget completions for `feedstocks` in memory so they are offered to
    /// the migrator again this run. Used by debug runs only; the persisted
    /// table is untouched. Returns how many feedstocks had entries.
    pub fn force_clear(&self, feedstocks: &[String]) -> usize {
        let mut table = self.write();
        feedstocks
            .iter()
            .filter(|f| table.clear_feedstock(f))
            .count()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, LedgerTable> {
        self.table.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, LedgerTable> {
        self.table.write().unwrap_or_else(|e| e.into_inner())
    }
}
