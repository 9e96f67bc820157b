//! Admin-State: persisted documents for the admin migration job
//!
//! Every piece of state the job keeps between runs is a small, human-diffable
//! JSON document that is committed back to the job's own repository:
//!
//! - `data/<Migrator>.json`: per-migrator completion ledger, feedstock -> branch -> bool
//! - `data/feedstocks.json`: the resumption cursor
//! - `data/all_feedstocks.json`: cached fleet listing split into active and archived
//!
//! ## Key Components
//!
//! - [`StateStore`]: backend-agnostic load/save of the three document kinds
//! - [`JsonStateStore`]: the on-disk store with atomic writes
//! - [`fakes::MemoryStateStore`]: in-memory store for tests

mod documents;
mod error;
pub mod fakes;
mod json_store;
mod store;

pub use documents::{FleetCursor, FleetList, LedgerTable, DEFAULT_BRANCH_ALIASES};
pub use error::StateError;
pub use json_store::JsonStateStore;
pub use store::{StateResult, StateStore};
