//! Storage trait for admin migration state
//!
//! One trait covers the three persisted document kinds. Writes are only ever
//! issued from the scheduling task, so implementations do not need to guard
//! against concurrent writers of the same document.

use crate::documents::{FleetCursor, FleetList, LedgerTable};
use crate::error::StateError;

/// Result type for state operations
pub type StateResult<T> = std::result::Result<T, StateError>;

/// Backend for persisted ledgers, cursor and fleet listing.
///
/// Guarantees:
/// - `load_ledger` on a migrator with no saved table returns an empty table.
/// - `load_cursor` / `load_fleet` return `None` when nothing was saved yet.
/// - A document that exists but cannot be decoded is an error, never a default.
pub trait StateStore: Send + Sync {
    /// Load the completion table for `migrator`.
    fn load_ledger(&self, migrator: &str) -> StateResult<LedgerTable>;

    /// Replace the completion table for `migrator`.
    fn save_ledger(&self, migrator: &str, table: &LedgerTable) -> StateResult<()>;

    /// Load the resumption cursor.
    fn load_cursor(&self) -> StateResult<Option<FleetCursor>>;

    /// Replace the resumption cursor.
    fn save_cursor(&self, cursor: &FleetCursor) -> StateResult<()>;

    /// Load the cached fleet listing.
    fn load_fleet(&self) -> StateResult<Option<FleetList>>;

    /// Replace the cached fleet listing.
    fn save_fleet(&self, fleet: &FleetList) -> StateResult<()>;
}
