//! Issue labels the bots rely on.

use std::sync::Arc;

use admin_core::{
    repo_name, ArchiveStatus, ArchivedRepoOracle, GitHubClient, MigrationContext, MigrationOutcome,
    Migrator,
};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Label {
    fn new(name: &str, color: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            color: color.to_string(),
            description: Some(description.to_string()),
        }
    }
}

/// Labels every feedstock carries, with their expected colour and text.
pub fn expected_labels() -> [Label; 2] {
    [
        Label::new("bot-rerun", "191970", "Instruct the bot to retry the PR"),
        Label::new("automerge", "0e8a16", "Merge the PR when CI passes"),
    ]
}

/// Label endpoints of the hosting API.
#[async_trait]
pub trait LabelApi: Send + Sync {
    async fn list_labels(&self, owner: &str, repo: &str) -> admin_core::Result<Vec<Label>>;
    async fn create_label(&self, owner: &str, repo: &str, label: &Label) -> admin_core::Result<()>;
    async fn update_label(&self, owner: &str, repo: &str, label: &Label) -> admin_core::Result<()>;
}

#[async_trait]
impl LabelApi for GitHubClient {
    async fn list_labels(&self, owner: &str, repo: &str) -> admin_core::Result<Vec<Label>> {
        self.get_json(&format!("repos/{owner}/{repo}/labels?per_page=100"))
            .await
    }

    async fn create_label(&self, owner: &str, repo: &str, label: &Label) -> admin_core::Result<()> {
        self.send(Method::POST, &format!("repos/{owner}/{repo}/labels"), label)
            .await
    }

    async fn update_label(&self, owner: &str, repo: &str, label: &Label) -> admin_core::Result<()> {
        self.send(
            Method::PATCH,
            &format!("repos/{owner}/{repo}/labels/{}", label.name),
            label,
        )
        .await
    }
}

/// Ensures the `bot-rerun` and `automerge` labels exist and look right.
pub struct AutomergeAndBotRerunLabels {
    api: Arc<dyn LabelApi>,
    oracle: Arc<ArchivedRepoOracle>,
    org: String,
    suffix: String,
}

impl AutomergeAndBotRerunLabels {
    pub fn new(
        api: Arc<dyn LabelApi>,
        oracle: Arc<ArchivedRepoOracle>,
        org: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            api,
            oracle,
            org: org.into(),
            suffix: suffix.into(),
        }
    }

    async fn sync_labels(&self, repo: &str) -> admin_core::Result<()> {
        let current = self.api.list_labels(&self.org, repo).await?;
        for wanted in expected_labels() {
            match current.iter().find(|l| l.name == wanted.name) {
                Some(found) if found == &wanted => {}
                Some(_) => {
                    self.api.update_label(&self.org, repo, &wanted).await?;
                    info!("    edited: {}", wanted.name);
                }
                None => {
                    self.api.create_label(&self.org, repo, &wanted).await?;
                    info!("    created: {}", wanted.name);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Migrator for AutomergeAndBotRerunLabels {
    fn name(&self) -> &str {
        "AutomergeAndBotRerunLabels"
    }

    fn main_branch_only(&self) -> bool {
        true
    }

    async fn migrate(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<MigrationOutcome> {
        match self.oracle.status(ctx.feedstock).await {
            ArchiveStatus::Archived => {
                return Ok(MigrationOutcome::done().with_external_call(true))
            }
            ArchiveStatus::Unknown => {
                return Ok(MigrationOutcome::not_done().with_external_call(true))
            }
            ArchiveStatus::Active => {}
        }

        let repo = repo_name(ctx.feedstock, &self.suffix);
        let outcome = match self.sync_labels(&repo).await {
            Ok(()) => MigrationOutcome::done(),
            Err(e) => {
                error!(repo = %repo, "ERROR: {e}");
                MigrationOutcome::not_done()
            }
        };
        Ok(outcome.with_external_call(true))
    }
}
