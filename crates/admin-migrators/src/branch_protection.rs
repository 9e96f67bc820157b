//! Organization branch-protection ruleset.

use std::sync::Arc;

use admin_core::{repo_name, GitHubClient, MigrationContext, MigrationOutcome, Migrator};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const RULESET_NAME: &str = "conda-forge-branch-protection";

/// Repository ruleset request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ruleset {
    pub name: String,
    pub target: String,
    pub conditions: Conditions,
    pub rules: Vec<Rule>,
    pub enforcement: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    pub ref_name: RefName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefName {
    pub exclude: Vec<String>,
    pub include: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Listing entry for an existing ruleset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesetSummary {
    pub id: u64,
    pub name: String,
}

impl Ruleset {
    /// No deletion and no force-push on the default branch.
    pub fn default_branch_protection() -> Self {
        Self {
            name: RULESET_NAME.to_string(),
            target: "branch".to_string(),
            conditions: Conditions {
                ref_name: RefName {
                    exclude: Vec::new(),
                    include: vec!["~DEFAULT_BRANCH".to_string()],
                },
            },
            rules: ["deletion", "non_fast_forward"]
                .into_iter()
                .map(|kind| Rule {
                    kind: kind.to_string(),
                })
                .collect(),
            enforcement: "active".to_string(),
        }
    }
}

/// Ruleset endpoints of the hosting API.
#[async_trait]
pub trait RulesetApi: Send + Sync {
    async fn list_rulesets(&self, owner: &str, repo: &str) -> admin_core::Result<Vec<RulesetSummary>>;
    async fn create_ruleset(&self, owner: &str, repo: &str, ruleset: &Ruleset) -> admin_core::Result<()>;
    async fn update_ruleset(
        &self,
        owner: &str,
        repo: &str,
        id: u64,
        ruleset: &Ruleset,
    ) -> admin_core::Result<()>;
}

#[async_trait]
impl RulesetApi for GitHubClient {
    async fn list_rulesets(&self, owner: &str, repo: &str) -> admin_core::Result<Vec<RulesetSummary>> {
        self.get_json(&format!("repos/{owner}/{repo}/rulesets")).await
    }

    async fn create_ruleset(&self, owner: &str, repo: &str, ruleset: &Ruleset) -> admin_core::Result<()> {
        self.send(Method::POST, &format!("repos/{owner}/{repo}/rulesets"), ruleset)
            .await
    }

    async fn update_ruleset(
        &self,
        owner: &str,
        repo: &str,
        id: u64,
        ruleset: &Ruleset,
    ) -> admin_core::Result<()> {
        self.send(
            Method::PUT,
            &format!("repos/{owner}/{repo}/rulesets/{id}"),
            ruleset,
        )
        .await
    }
}

/// Creates or refreshes the branch-protection ruleset of each feedstock.
///
/// Runs once per feedstock on the default branch, one feedstock at a time
/// to stay under the API's secondary rate limits. Always counts as an API
/// call; a failed request leaves the unit not done.
pub struct BranchProtection {
    api: Arc<dyn RulesetApi>,
    org: String,
    suffix: String,
}

impl BranchProtection {
    pub fn new(api: Arc<dyn RulesetApi>, org: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            api,
            org: org.into(),
            suffix: suffix.into(),
        }
    }

    async fn apply(&self, repo: &str) -> admin_core::Result<()> {
        let ruleset = Ruleset::default_branch_protection();
        let existing = self
            .api
            .list_rulesets(&self.org, repo)
            .await?
            .into_iter()
            .find(|r| r.name == RULESET_NAME);
        match existing {
            Some(found) => {
                self.api
                    .update_ruleset(&self.org, repo, found.id, &ruleset)
                    .await?;
                info!(ruleset = found.id, "    updated ruleset");
            }
            None => {
                self.api.create_ruleset(&self.org, repo, &ruleset).await?;
                info!("    created ruleset");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Migrator for BranchProtection {
    fn name(&self) -> &str {
        "BranchProtection"
    }

    fn main_branch_only(&self) -> bool {
        true
    }

    fn max_processes(&self) -> Option<usize> {
        Some(1)
    }

    async fn migrate(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<MigrationOutcome> {
        let repo = repo_name(ctx.feedstock, &self.suffix);
        let outcome = match self.apply(&repo).await {
            Ok(()) => MigrationOutcome::done(),
            Err(e) => {
                warn!(repo = %repo, error = %e, "ruleset request failed");
                MigrationOutcome::not_done()
            }
        };
        Ok(outcome.with_external_call(true))
    }
}
