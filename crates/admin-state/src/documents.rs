//! Document shapes for the persisted admin migration state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Names a repository's default branch has had over time.
///
/// Completion recorded under either name counts for both.
pub const DEFAULT_BRANCH_ALIASES: [&str; 2] = ["master", "main"];

// ---------------------------------------------------------------------------
// LedgerTable
// ---------------------------------------------------------------------------

/// Completion table for one migrator: feedstock -> branch -> completed.
///
/// Backed by `BTreeMap`s so the serialized file has sorted keys and diffs
/// cleanly between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerTable(BTreeMap<String, BTreeMap<String, bool>>);

impl LedgerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether completion was recorded for exactly this (feedstock, branch).
    pub fn get(&self, feedstock: &str, branch: &str) -> bool {
        self.0
            .get(feedstock)
            .and_then(|branches| branches.get(branch))
            .copied()
            .unwrap_or(false)
    }

    /// Whether (feedstock, branch) is complete, treating the default branch
    /// aliases as one branch.
    pub fn is_done(&self, feedstock: &str, branch: &str) -> bool {
        if DEFAULT_BRANCH_ALIASES.contains(&branch) {
            DEFAULT_BRANCH_ALIASES
                .iter()
                .any(|alias| self.get(feedstock, alias))
        } else {
            self.get(feedstock, branch)
        }
    }

    /// Mark (feedstock, branch) complete.
    pub fn mark(&mut self, feedstock: &str, branch: &str) {
        self.0
            .entry(feedstock.to_string())
            .or_default()
            .insert(branch.to_string(), true);
    }

    /// Drop every entry for `feedstock`. Returns true if anything was removed.
    pub fn clear_feedstock(&mut self, feedstock: &str) -> bool {
        self.0.remove(feedstock).is_some()
    }

    /// Number of feedstocks with at least one entry.
    pub fn feedstock_count(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// FleetCursor
// ---------------------------------------------------------------------------

/// Resumption watermark over the sorted fleet.
///
/// Every feedstock that sorts at or before `current_feedstock` has been
/// attempted in the current pass. `None` means the pass starts at the
/// beginning of the fleet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetCursor {
    #[serde(default)]
    pub current_feedstock: Option<String>,
}

impl FleetCursor {
    /// A cursor positioned before the first feedstock.
    pub fn start() -> Self {
        Self::default()
    }

    pub fn at(feedstock: impl Into<String>) -> Self {
        Self {
            current_feedstock: Some(feedstock.into()),
        }
    }

    /// Whether `feedstock` was already attempted in this pass.
    pub fn is_behind(&self, feedstock: &str) -> bool {
        match &self.current_feedstock {
            Some(current) => feedstock <= current.as_str(),
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// FleetList
// ---------------------------------------------------------------------------

/// Cached fleet listing, split by hosting archive status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetList {
    #[serde(default)]
    pub active: Vec<String>,
    #[serde(default)]
    pub archived: Vec<String>,
}

impl FleetList {
    /// Build a listing with both halves sorted and deduplicated.
    pub fn new(mut active: Vec<String>, mut archived: Vec<String>) -> Self {
        active.sort();
        active.dedup();
        archived.sort();
        archived.dedup();
        Self { active, archived }
    }
}
