use std::path::Path;

use admin_core::{MigrationContext, MigrationOutcome, Migrator};
use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

const NESTED: &str = "recipe/recipe";

/// Flattens a doubly nested `recipe/recipe/` directory into `recipe/`.
///
/// Only applies when the nested recipe exists and `recipe/meta.yaml` does
/// not, so an already flat tree is reported done untouched.
pub struct RecipeLocation;

#[async_trait]
impl Migrator for RecipeLocation {
    fn name(&self) -> &str {
        "RecipeLocation"
    }

    async fn migrate(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<MigrationOutcome> {
        if !ctx.exists("recipe/recipe/meta.yaml") || ctx.exists("recipe/meta.yaml") {
            return Ok(MigrationOutcome::done());
        }

        let mut entries: Vec<String> = std::fs::read_dir(ctx.path(NESTED))
            .context("listing recipe/recipe")?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();

        for name in &entries {
            let target = format!("recipe/{name}");
            if ctx.exists(&target) {
                anyhow::bail!("{target} already exists; cannot flatten recipe");
            }
            ctx.git.mv(&format!("{NESTED}/{name}"), &target).await?;
        }
        // git leaves the emptied directory behind.
        remove_leftover_dir(&ctx.path(NESTED));
        ctx.git.add(&["recipe"]).await?;

        Ok(MigrationOutcome::done().with_commit(true))
    }
}

/// Best-effort removal of an emptied directory.
fn remove_leftover_dir(dir: &Path) {
    if let Err(e) = std::fs::remove_dir(dir) {
        debug!(dir = %dir.display(), error = %e, "leaving directory in place");
    }
}
