use admin_core::{MigrationContext, MigrationOutcome, Migrator};
use anyhow::Context;
use async_trait::async_trait;
use serde_yaml::Value;

const TRAVIS_YML: &str = ".travis.yml";

/// Drops osx and amd64 jobs from `.travis.yml`; those platforms build
/// elsewhere.
///
/// The ledger name keeps its historical spelling so existing completion
/// data stays valid.
pub struct TravisCINoOSXAMD64;

fn is_dropped(entry: &Value) -> bool {
    entry.get("os").and_then(Value::as_str) == Some("osx")
        || entry.get("arch").and_then(Value::as_str) == Some("amd64")
}

/// Remove dropped entries from `matrix.include`. Returns whether anything
/// changed.
pub(crate) fn prune_matrix(cfg: &mut Value) -> bool {
    let Some(include) = cfg
        .get_mut("matrix")
        .and_then(|m| m.get_mut("include"))
        .and_then(Value::as_sequence_mut)
    else {
        return false;
    };
    let before = include.len();
    include.retain(|entry| !is_dropped(entry));
    include.len() != before
}

#[async_trait]
impl Migrator for TravisCINoOSXAMD64 {
    fn name(&self) -> &str {
        "TraviCINoOSXAMD64"
    }

    async fn migrate(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<MigrationOutcome> {
        let path = ctx.path(TRAVIS_YML);
        if !path.exists() {
            return Ok(MigrationOutcome::done());
        }
        let raw = std::fs::read_to_string(&path)?;
        let mut cfg: Value = serde_yaml::from_str(&raw).context("parsing .travis.yml")?;
        if !prune_matrix(&mut cfg) {
            return Ok(MigrationOutcome::done());
        }
        std::fs::write(&path, serde_yaml::to_string(&cfg)?)?;
        ctx.git.add(&[TRAVIS_YML]).await?;
        Ok(MigrationOutcome::done().with_commit(true))
    }
}
