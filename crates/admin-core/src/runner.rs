//! Per-feedstock runner.
//!
//! Drives every configured migrator over every applicable branch of one
//! feedstock inside a fresh clone. Migrators run in configured order; within
//! a migrator branches run default-first. Nothing that goes wrong for one
//! (migrator, branch) unit escapes this module: it is logged, the unit is
//! not recorded, and the loop moves on.
//!
//! Ledger writes are not done here. The runner returns the completed units
//! and the scheduler records them once the worker has been drained.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, error, info, warn, Instrument};

use crate::branches::enumerate_branches;
use crate::domain::error::{AdminError, Result};
use crate::domain::outcome::{CompletedUnit, FeedstockDisposition, FeedstockReport};
use crate::migrator::{MigrationContext, RegisteredMigrator};
use crate::obs;
use crate::oracle::{ArchiveStatus, ArchivedRepoOracle};
use crate::workspace::{CommitIdentity, RemoteSpec, RepoWorkspace};

/// Work the scheduler hands to a worker: one feedstock, run to completion.
#[async_trait]
pub trait FeedstockWork: Send + Sync {
    async fn run(&self, feedstock: &str) -> FeedstockReport;
}

#[derive(Clone)]
pub struct FeedstockRunner {
    migrators: Arc<[RegisteredMigrator]>,
    oracle: Arc<ArchivedRepoOracle>,
    remote: Arc<RemoteSpec>,
    identity: Option<CommitIdentity>,
}

impl FeedstockRunner {
    pub fn new(
        migrators: Arc<[RegisteredMigrator]>,
        oracle: Arc<ArchivedRepoOracle>,
        remote: RemoteSpec,
        identity: Option<CommitIdentity>,
    ) -> Self {
        Self {
            migrators,
            oracle,
            remote: Arc::new(remote),
            identity,
        }
    }

    /// Run all migrators over `feedstock`.
    pub async fn run_feedstock(&self, feedstock: &str) -> FeedstockReport {
        if self.migrators.is_empty() {
            return FeedstockReport::empty(feedstock, FeedstockDisposition::NoMigrators);
        }

        obs::emit_feedstock_started(feedstock);
        let started = Instant::now();
        let report = self
            .migrate_feedstock(feedstock)
            .instrument(obs::feedstock_span(feedstock))
            .await;
        obs::emit_feedstock_finished(
            feedstock,
            started.elapsed(),
            report.disposition,
            report.made_api_calls,
            report.completed.len(),
        );
        report
    }

    async fn migrate_feedstock(&self, feedstock: &str) -> FeedstockReport {
        let ws = match RepoWorkspace::clone(feedstock, &self.remote, self.identity.as_ref()).await
        {
            Ok(ws) => ws,
            Err(e) => {
                error!(error = %e, "ERROR: clone failed!");
                return FeedstockReport::empty(feedstock, FeedstockDisposition::CloneFailed);
            }
        };

        if !ws.is_recipe_repo() {
            info!("no recipe found; skipping all migrators");
            return FeedstockReport::empty(feedstock, FeedstockDisposition::NotRecipeRepo);
        }

        let plan = match ws.authorize_push().await {
            Ok(()) => enumerate_branches(ws.git()).await,
            Err(e) => Err(e),
        };
        let plan = match plan {
            Ok(plan) => plan,
            Err(e) => {
                error!(error = %e, "ERROR: could not prepare clone");
                return FeedstockReport::empty(feedstock, FeedstockDisposition::CloneFailed);
            }
        };

        let mut report = FeedstockReport::empty(feedstock, FeedstockDisposition::Migrated);
        for (index, migrator) in self.migrators.iter().enumerate() {
            info!(migrator = %migrator.name(), "migrator {}", migrator.name());

            for branch in &plan.branches {
                if migrator.main_branch_only() && !plan.is_default(branch) {
                    continue;
                }
                info!(migrator = %migrator.name(), "    branch: {branch}");

                match self
                    .run_unit(&ws, feedstock, branch, migrator, &mut report.made_api_calls)
                    .await
                {
                    Ok(true) => report.completed.push(CompletedUnit {
                        migrator_index: index,
                        branch: branch.clone(),
                    }),
                    Ok(false) => {}
                    Err(e) => {
                        error!(migrator = %migrator.name(), branch = %branch, error = %e, "ERROR: {e}");
                    }
                }

                // Leftovers from an uncommitted or failed unit must not leak
                // into the next checkout.
                if let Err(e) = discard_changes(&ws).await {
                    warn!(error = %e, "could not reset working tree");
                }
            }
        }
        report
    }

    /// One (migrator, branch) unit. `Ok(true)` means record it.
    async fn run_unit(
        &self,
        ws: &RepoWorkspace,
        feedstock: &str,
        branch: &str,
        migrator: &RegisteredMigrator,
        made_api_calls: &mut bool,
    ) -> Result<bool> {
        ws.checkout(branch).await?;

        if migrator.skip(feedstock, branch) {
            debug!(migrator = %migrator.name(), branch = %branch, "already done");
            return Ok(false);
        }

        let ctx = MigrationContext {
            feedstock,
            branch,
            git: ws.git(),
        };
        let outcome = match AssertUnwindSafe(migrator.migrate(&ctx)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                return Err(AdminError::Migrator {
                    migrator: migrator.name().to_string(),
                    reason: format!("{e:#}"),
                })
            }
            Err(panic) => {
                return Err(AdminError::Migrator {
                    migrator: migrator.name().to_string(),
                    reason: format!("panicked: {}", panic_message(panic.as_ref())),
                })
            }
        };
        *made_api_calls |= outcome.made_external_call;

        if !outcome.needs_commit {
            return Ok(outcome.completed);
        }

        ws.commit(&migrator.message()).await?;
        *made_api_calls = true;

        match self.oracle.status(feedstock).await {
            ArchiveStatus::Active => {
                ws.push().await?;
                Ok(outcome.completed)
            }
            ArchiveStatus::Archived => {
                info!("not pushing to archived feedstock");
                Ok(outcome.completed)
            }
            ArchiveStatus::Unknown => {
                warn!("could not get repo archived status - punting to next round");
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl FeedstockWork for FeedstockRunner {
    async fn run(&self, feedstock: &str) -> FeedstockReport {
        self.run_feedstock(feedstock).await
    }
}

async fn discard_changes(ws: &RepoWorkspace) -> Result<()> {
    ws.git().run(&["reset", "--quiet", "--hard"]).await?;
    ws.git().run(&["clean", "-fdq"]).await?;
    Ok(())
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
