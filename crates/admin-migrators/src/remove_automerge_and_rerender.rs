use admin_core::{MigrationContext, MigrationOutcome, Migrator};
use async_trait::async_trait;

const WORKFLOWS: [&str; 2] = [
    ".github/workflows/automerge.yml",
    ".github/workflows/webservices.yml",
];

/// Drops the per-feedstock automerge and webservices workflows; the
/// organization-level services replace them.
pub struct RemoveAutomergeAndRerender;

#[async_trait]
impl Migrator for RemoveAutomergeAndRerender {
    fn name(&self) -> &str {
        "RemoveAutomergeAndRerender"
    }

    async fn migrate(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<MigrationOutcome> {
        let mut removed = false;
        for workflow in WORKFLOWS {
            if ctx.exists(workflow) {
                ctx.git.remove(workflow).await?;
                removed = true;
            }
        }
        Ok(MigrationOutcome::done().with_commit(removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Sandbox;

    #[tokio::test]
    async fn removes_both_workflows() {
        let sb = Sandbox::with_files(&[
            (".github/workflows/automerge.yml", "on: push\n"),
            (".github/workflows/webservices.yml", "on: push\n"),
            (".github/workflows/conda-build.yml", "on: push\n"),
        ]);
        let out = RemoveAutomergeAndRerender.migrate(&sb.ctx("pkg")).await.unwrap();
        assert_eq!(out, MigrationOutcome::done().with_commit(true));
        assert_eq!(
            sb.staged(),
            vec![
                "D .github/workflows/automerge.yml",
                "D .github/workflows/webservices.yml"
            ]
        );
        assert!(sb.ctx("pkg").exists(".github/workflows/conda-build.yml"));
    }

    #[tokio::test]
    async fn already_clean_is_done_without_commit() {
        let sb = Sandbox::with_files(&[("recipe/meta.yaml", "{}\n")]);
        let out = RemoveAutomergeAndRerender.migrate(&sb.ctx("pkg")).await.unwrap();
        assert_eq!(out, MigrationOutcome::done());
        assert!(sb.staged().is_empty());
    }
}
