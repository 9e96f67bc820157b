//! Migrator plugin contract.
//!
//! A migrator is an idempotent unit of maintenance logic applied to one
//! (feedstock, branch). The runner checks out the branch, asks the migrator
//! whether to skip, then calls [`Migrator::migrate`] with the working tree
//! available through [`MigrationContext`]. Migrators stage their changes;
//! the runner commits and pushes.

use std::path::PathBuf;
use std::sync::Arc;

use admin_state::DEFAULT_BRANCH_ALIASES;
use async_trait::async_trait;

use crate::domain::error::Result;
use crate::domain::outcome::MigrationOutcome;
use crate::git::Git;
use crate::ledger::Ledger;

/// Working tree handed to a migrator, checked out at `branch`.
pub struct MigrationContext<'a> {
    pub feedstock: &'a str,
    pub branch: &'a str,
    pub git: &'a Git,
}

impl MigrationContext<'_> {
    /// Path of `relative` inside the working tree.
    pub fn path(&self, relative: &str) -> PathBuf {
        self.git.path(relative)
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }
}

/// A pluggable migration.
#[async_trait]
pub trait Migrator: Send + Sync {
    /// Stable name; also names the ledger file.
    fn name(&self) -> &str;

    /// Run only on the default branch, once per feedstock.
    fn main_branch_only(&self) -> bool {
        false
    }

    /// Upper bound this migrator puts on concurrent feedstock workers.
    fn max_processes(&self) -> Option<usize> {
        None
    }

    /// Whether (feedstock, branch) should not be attempted.
    ///
    /// Must depend only on the ledger and static metadata, never on the
    /// repository contents.
    fn skip(&self, feedstock: &str, branch: &str, ledger: &Ledger) -> bool {
        ledger.is_done(feedstock, branch)
    }

    /// Apply the migration to the checked out tree and stage any changes.
    ///
    /// Must be safe to call again on a tree it already migrated.
    async fn migrate(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<MigrationOutcome>;

    /// Commit message suffix.
    fn message(&self) -> String {
        format!("admin migration {}", self.name())
    }
}

/// Scheduling metadata after configuration overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingHints {
    pub main_branch_only: bool,
    pub max_processes: Option<usize>,
}

/// A configured migrator bound to its ledger.
#[derive(Clone)]
pub struct RegisteredMigrator {
    migrator: Arc<dyn Migrator>,
    ledger: Arc<Ledger>,
    hints: SchedulingHints,
}

impl RegisteredMigrator {
    /// Bind `migrator` to its ledger using the migrator's own hints.
    pub fn new(migrator: Arc<dyn Migrator>, ledger: Arc<Ledger>) -> Self {
        let hints = SchedulingHints {
            main_branch_only: migrator.main_branch_only(),
            max_processes: migrator.max_processes(),
        };
        Self {
            migrator,
            ledger,
            hints,
        }
    }

    /// Load the migrator's ledger from `store` and bind it.
    pub fn load(
        migrator: Arc<dyn Migrator>,
        store: Arc<dyn admin_state::StateStore>,
    ) -> Result<Self> {
        let ledger = Arc::new(Ledger::load(migrator.name(), store)?);
        Ok(Self::new(migrator, ledger))
    }

    /// Replace the scheduling hints, keeping unspecified ones.
    pub fn with_overrides(
        mut self,
        main_branch_only: Option<bool>,
        max_processes: Option<usize>,
    ) -> Self {
        if let Some(flag) = main_branch_only {
            self.hints.main_branch_only = flag;
        }
        if max_processes.is_some() {
            self.hints.max_processes = max_processes;
        }
        self
    }

    pub fn name(&self) -> &str {
        self.migrator.name()
    }

    pub fn hints(&self) -> SchedulingHints {
        self.hints
    }

    pub fn main_branch_only(&self) -> bool {
        self.hints.main_branch_only
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn skip(&self, feedstock: &str, branch: &str) -> bool {
        self.migrator.skip(feedstock, branch, &self.ledger)
    }

    pub async fn migrate(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<MigrationOutcome> {
        self.migrator.migrate(ctx).await
    }

    pub fn message(&self) -> String {
        self.migrator.message()
    }

    /// Record a completed unit. Main-branch-only migrators key on the
    /// feedstock alone, so the default branch is written under both of its
    /// historical names.
    pub fn record(&self, feedstock: &str, branch: &str) -> Result<()> {
        if self.main_branch_only() && DEFAULT_BRANCH_ALIASES.contains(&branch) {
            self.ledger.record_branches(feedstock, &DEFAULT_BRANCH_ALIASES)
        } else {
            self.ledger.record(feedstock, branch)
        }
    }
}
