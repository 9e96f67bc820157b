//! One scheduled run of the admin migrations job.
//!
//! Ties the pieces together: schedule guard, fleet listing, cursor, debug
//! adjustments, worker pool sizing, the pass itself and the checkpoint.

use std::path::PathBuf;
use std::sync::Arc;

use admin_state::{FleetCursor, StateStore};
use chrono::{DateTime, Timelike, Utc};
use tracing::{debug, info};

use crate::checkpoint::StateRepo;
use crate::config::{check_schedule, AdminConfig, SCHEDULE_WORKFLOW};
use crate::domain::error::Result;
use crate::fleet::{load_fleet, FleetSource};
use crate::migrator::RegisteredMigrator;
use crate::oracle::ArchivedRepoOracle;
use crate::runner::FeedstockRunner;
use crate::scheduler::{worker_count, FleetScheduler, PassSummary, SchedulerOptions};

/// Process-level inputs of a run.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub debug: bool,
    pub token: Option<String>,
    /// `CPU_COUNT` worker override.
    pub cpu_count: Option<usize>,
    /// Checkout of the job's own repository.
    pub repo_root: PathBuf,
    pub data_dir: PathBuf,
    pub now: DateTime<Utc>,
    /// Commit and push the state documents at the end.
    pub checkpoint: bool,
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub summary: PassSummary,
    pub workers: usize,
    pub fleet_refreshed: bool,
    /// HEAD after the checkpoint push, when one was made.
    pub checkpoint: Option<String>,
}

pub struct AdminMigrationJob {
    config: AdminConfig,
    settings: JobSettings,
    store: Arc<dyn StateStore>,
    fleet_source: Arc<dyn FleetSource>,
    oracle: Arc<ArchivedRepoOracle>,
}

impl AdminMigrationJob {
    pub fn new(
        config: AdminConfig,
        settings: JobSettings,
        store: Arc<dyn StateStore>,
        fleet_source: Arc<dyn FleetSource>,
        oracle: Arc<ArchivedRepoOracle>,
    ) -> Self {
        Self {
            config,
            settings,
            store,
            fleet_source,
            oracle,
        }
    }

    pub async fn run(&self, migrators: Vec<RegisteredMigrator>) -> Result<JobReport> {
        check_schedule(&self.settings.repo_root.join(SCHEDULE_WORKFLOW))?;

        let debug = self.settings.debug;
        let mut limits = self.config.run_limits(debug, self.settings.now);

        let (fleet, cursor, fleet_refreshed) = if debug {
            let feedstocks = self.config.debug_feedstocks();
            for migrator in &migrators {
                let cleared = migrator.ledger().force_clear(&feedstocks);
                debug!(migrator = %migrator.name(), cleared, "cleared debug feedstocks");
            }
            let mut fleet = feedstocks;
            fleet.sort();
            (fleet, FleetCursor::start(), false)
        } else {
            let loaded = load_fleet(
                &self.store,
                self.fleet_source.as_ref(),
                self.settings.now.hour(),
                false,
            )
            .await?;
            // Listing eats into the run.
            limits.budget.max_seconds = limits.budget.max_seconds.saturating_sub(loaded.elapsed);
            let cursor = self.store.load_cursor()?.unwrap_or_default();
            (loaded.fleet.active, cursor, loaded.refreshed)
        };

        let workers = worker_count(
            &migrators,
            self.settings.cpu_count,
            limits.max_workers,
            debug,
        );
        info!(
            migrators = migrators.len(),
            feedstocks = fleet.len(),
            workers,
            max_seconds = limits.budget.max_seconds.as_secs(),
            max_migrate = limits.budget.max_migrate,
            debug = self.settings.debug,
            "starting admin migrations"
        );

        let migrators: Arc<[RegisteredMigrator]> = migrators.into();
        let runner = FeedstockRunner::new(
            Arc::clone(&migrators),
            Arc::clone(&self.oracle),
            self.config.remote(self.settings.token.clone()),
            self.config.git.identity(),
        );
        let scheduler = FleetScheduler::new(
            Arc::new(runner),
            migrators,
            Arc::clone(&self.store),
            SchedulerOptions::new(limits.budget, workers),
        );
        let summary = scheduler.run_pass(&fleet, cursor).await?;

        let checkpoint = if self.settings.checkpoint && !debug {
            let repo = StateRepo::open(
                &self.settings.repo_root,
                &self.settings.data_dir,
                self.settings.token.as_deref(),
            )
            .await?;
            repo.save().await?
        } else {
            None
        };

        Ok(JobReport {
            summary,
            workers,
            fleet_refreshed,
            checkpoint,
        })
    }
}
