//! Results produced by migrators and by the per-feedstock runner.

/// What one `migrate()` call did for one (feedstock, branch).
///
/// - `completed`: the unit of work is logically finished and should be
///   recorded in the migrator's ledger, whether or not files changed.
/// - `needs_commit`: changes are staged in the working tree and must be
///   committed (and pushed unless the repository is archived).
/// - `made_external_call`: a networked service was touched; counts toward
///   the run's migrate quota independently of `needs_commit`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub completed: bool,
    pub needs_commit: bool,
    pub made_external_call: bool,
}

impl MigrationOutcome {
    /// Finished, nothing to commit, no external calls.
    pub const fn done() -> Self {
        Self {
            completed: true,
            needs_commit: false,
            made_external_call: false,
        }
    }

    /// Not finished; retried on a later pass.
    pub const fn not_done() -> Self {
        Self {
            completed: false,
            needs_commit: false,
            made_external_call: false,
        }
    }

    pub const fn with_commit(mut self, needs_commit: bool) -> Self {
        self.needs_commit = needs_commit;
        self
    }

    pub const fn with_external_call(mut self, made_external_call: bool) -> Self {
        self.made_external_call = made_external_call;
        self
    }
}

/// A (migrator, branch) pair that completed for a feedstock.
///
/// `migrator_index` is the position of the migrator in the configured list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedUnit {
    pub migrator_index: usize,
    pub branch: String,
}

/// How far the runner got with a feedstock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedstockDisposition {
    /// No migrators configured.
    NoMigrators,
    /// Clone failed (renamed, deleted or unreachable repository).
    CloneFailed,
    /// The repository has no recognized recipe file.
    NotRecipeRepo,
    /// Migrators ran over the branches.
    Migrated,
    /// The runner itself panicked; nothing is recorded.
    Crashed,
}

/// Aggregate result of running every migrator over one feedstock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedstockReport {
    pub feedstock: String,
    pub disposition: FeedstockDisposition,
    /// Whether any commit was made or any external API was called.
    pub made_api_calls: bool,
    pub completed: Vec<CompletedUnit>,
}

impl FeedstockReport {
    /// A report with nothing done and nothing to record.
    pub fn empty(feedstock: &str, disposition: FeedstockDisposition) -> Self {
        Self {
            feedstock: feedstock.to_string(),
            disposition,
            made_api_calls: false,
            completed: Vec::new(),
        }
    }
}
