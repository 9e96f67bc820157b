use std::sync::Arc;

use admin_core::{ArchiveStatus, ArchivedRepoOracle, MigrationContext, MigrationOutcome, Migrator};
use async_trait::async_trait;
use serde_yaml::Value;
use tracing::info;

use crate::cf_yaml::{self, CONDA_FORGE_YML};

/// Switches feedstocks to the `.conda` package format by setting
/// `conda_build.pkg_format: "2"` in `conda-forge.yml`.
///
/// Archived feedstocks are reported done without changes.
pub struct DotConda {
    oracle: Arc<ArchivedRepoOracle>,
}

impl DotConda {
    pub fn new(oracle: Arc<ArchivedRepoOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl Migrator for DotConda {
    fn name(&self) -> &str {
        "DotConda"
    }

    async fn migrate(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<MigrationOutcome> {
        match self.oracle.status(ctx.feedstock).await {
            ArchiveStatus::Archived => return Ok(MigrationOutcome::done()),
            ArchiveStatus::Unknown => anyhow::bail!("archived status of {} unknown", ctx.feedstock),
            ArchiveStatus::Active => {}
        }

        let path = ctx.path(CONDA_FORGE_YML);
        let mut cfg = cf_yaml::read(&path)?;
        if cf_yaml::nested(&cfg, "conda_build", "pkg_format").is_some() {
            return Ok(MigrationOutcome::done());
        }

        cf_yaml::set_nested(&mut cfg, "conda_build", "pkg_format", Value::from("2"));
        cf_yaml::write(&path, &cfg)?;
        ctx.git.add(&[CONDA_FORGE_YML]).await?;
        info!("    updated conda-forge.yml");
        Ok(MigrationOutcome::done().with_commit(true))
    }
}
