//! Admin migrations core
//!
//! Drives idempotent maintenance migrations across a fleet of feedstock
//! repositories under a wall-clock and push budget, resuming from a
//! persisted cursor on the next scheduled run.

pub mod branches;
pub mod checkpoint;
pub mod config;
pub mod domain;
pub mod fleet;
pub mod git;
pub mod github;
pub mod job;
pub mod ledger;
pub mod migrator;
pub mod obs;
pub mod oracle;
pub mod runner;
pub mod scheduler;
pub mod telemetry;
pub mod workspace;

pub use branches::{enumerate_branches, order_branches, BranchPlan};
pub use checkpoint::{StateRepo, CHECKPOINT_MESSAGE};
pub use config::{
    check_schedule, AdminConfig, GitSettings, MigratorDescriptor, RunLimits, RunOverrides,
};
pub use domain::{
    feedstock_from_repo_name, repo_name, AdminError, CompletedUnit, FeedstockDisposition,
    FeedstockReport, MigrationOutcome, Result,
};
pub use fleet::{load_fleet, FleetSource, GitHubFleetSource, LoadedFleet, StaticFleetSource};
pub use git::{capture_head_sha, is_git_repo, Git};
pub use github::{GitHubClient, RepoInfo};
pub use job::{AdminMigrationJob, JobReport, JobSettings};
pub use ledger::Ledger;
pub use migrator::{MigrationContext, Migrator, RegisteredMigrator, SchedulingHints};
pub use oracle::{
    ArchiveStatus, ArchiveStatusSource, ArchivedRepoOracle, GitHubArchiveSource, RetryPolicy,
};
pub use runner::{FeedstockRunner, FeedstockWork};
pub use scheduler::{worker_count, Budget, FleetScheduler, PassSummary, SchedulerOptions, StopReason};
pub use telemetry::init_tracing;
pub use workspace::{CommitIdentity, RemoteSpec, RepoWorkspace, CI_SKIP_PREFIX, RECIPE_LOCATIONS};

pub use admin_state::{FleetCursor, FleetList, JsonStateStore, LedgerTable, StateStore};
