use std::path::PathBuf;

use admin_core::{MigrationContext, MigrationOutcome, Migrator};
use async_trait::async_trait;
use serde_yaml::Value;
use tracing::info;

use crate::cf_yaml::{self, CONDA_FORGE_YML};

const R_TEAM: &str = "conda-forge/r";
const SECTION_STARTS: [&str; 5] = ["build:", "requirements:", "test:", "about:", "extra:"];

/// Turns on bot automerge for CRAN packages maintained by the R team.
///
/// Applies to `r-*` feedstocks other than `r-base` whose recipe lists
/// `conda-forge/r` as a maintainer and whose source is a CRAN URL (or the
/// `cran_mirror` template variable). An explicit `bot.automerge`, whatever
/// its value, is left alone.
pub struct RAutomerge;

fn meta_yaml(ctx: &MigrationContext<'_>) -> Option<PathBuf> {
    ["recipe/meta.yaml", "recipe/recipe/meta.yaml"]
        .into_iter()
        .map(|p| ctx.path(p))
        .find(|p| p.exists())
}

/// Whether the `extra.recipe-maintainers` list names the R team.
///
/// Only the `extra:` section onward is parsed; the rest of a recipe is
/// usually jinja and not valid YAML.
pub(crate) fn has_r_team(meta: &str) -> bool {
    let Some(start) = meta
        .lines()
        .position(|line| line.starts_with("extra:"))
    else {
        return false;
    };
    let extra: String = meta
        .lines()
        .skip(start)
        .map(|line| format!("{line}\n"))
        .collect();
    let Ok(doc) = serde_yaml::from_str::<Value>(&extra) else {
        return false;
    };
    doc.get("extra")
        .and_then(|e| e.get("recipe-maintainers"))
        .and_then(Value::as_sequence)
        .is_some_and(|maintainers| {
            maintainers
                .iter()
                .filter_map(Value::as_str)
                .any(|m| m.trim() == R_TEAM)
        })
}

/// Whether the `source:` section points at CRAN.
pub(crate) fn has_cran_url(meta: &str) -> bool {
    let mut in_source = false;
    for line in meta.lines() {
        if line.starts_with("source:") {
            in_source = true;
        } else if SECTION_STARTS.iter().any(|s| line.starts_with(s)) {
            break;
        }
        if in_source
            && (line.contains("cran_mirror") || line.contains("cran.r-project.org/src/contrib"))
        {
            return true;
        }
    }
    false
}

#[async_trait]
impl Migrator for RAutomerge {
    fn name(&self) -> &str {
        "RAutomerge"
    }

    async fn migrate(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<MigrationOutcome> {
        if !ctx.feedstock.starts_with("r-") || ctx.feedstock == "r-base" {
            return Ok(MigrationOutcome::not_done());
        }
        let Some(meta_path) = meta_yaml(ctx) else {
            return Ok(MigrationOutcome::not_done());
        };
        let meta = std::fs::read_to_string(meta_path)?;
        let r_team = has_r_team(&meta);
        let cran = has_cran_url(&meta);
        info!(r_team, cran, "    r team / cran url");
        if !(r_team && cran) {
            return Ok(MigrationOutcome::not_done());
        }

        let path = ctx.path(CONDA_FORGE_YML);
        let mut cfg = cf_yaml::read(&path)?;
        if let Some(current) = cf_yaml::nested(&cfg, "bot", "automerge") {
            info!("    bot.automerge already set: {current:?}");
            return Ok(MigrationOutcome::done());
        }

        cf_yaml::set_nested(&mut cfg, "bot", "automerge", Value::Bool(true));
        cf_yaml::write(&path, &cfg)?;
        ctx.git.add(&[CONDA_FORGE_YML]).await?;
        Ok(MigrationOutcome::done().with_commit(true))
    }
}
