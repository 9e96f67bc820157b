//! In-memory fake for [`StateStore`] (testing only)

use std::collections::HashMap;
use std::sync::Mutex;

use crate::documents::{FleetCursor, FleetList, LedgerTable};
use crate::store::{StateResult, StateStore};

/// In-memory state store. Counts ledger writes so tests can assert that
/// nothing was persisted for a failed unit of work.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    ledgers: Mutex<HashMap<String, LedgerTable>>,
    cursor: Mutex<Option<FleetCursor>>,
    fleet: Mutex<Option<FleetList>>,
    ledger_writes: Mutex<usize>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of `save_ledger` calls so far.
    pub fn ledger_writes(&self) -> usize {
        *self.ledger_writes.lock().unwrap()
    }
}

impl StateStore for MemoryStateStore {
    fn load_ledger(&self, migrator: &str) -> StateResult<LedgerTable> {
        let ledgers = self.ledgers.lock().unwrap();
        Ok(ledgers.get(migrator).cloned().unwrap_or_default())
    }

    fn save_ledger(&self, migrator: &str, table: &LedgerTable) -> StateResult<()> {
        self.ledgers
            .lock()
            .unwrap()
            .insert(migrator.to_string(), table.clone());
        *self.ledger_writes.lock().unwrap() += 1;
        Ok(())
    }

    fn load_cursor(&self) -> StateResult<Option<FleetCursor>> {
        Ok(self.cursor.lock().unwrap().clone())
    }

    fn save_cursor(&self, cursor: &FleetCursor) -> StateResult<()> {
        *self.cursor.lock().unwrap() = Some(cursor.clone());
        Ok(())
    }

    fn load_fleet(&self) -> StateResult<Option<FleetList>> {
        Ok(self.fleet.lock().unwrap().clone())
    }

    fn save_fleet(&self, fleet: &FleetList) -> StateResult<()> {
        *self.fleet.lock().unwrap() = Some(fleet.clone());
        Ok(())
    }
}
