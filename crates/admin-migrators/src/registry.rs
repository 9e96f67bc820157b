//! Builds the configured migrator list.

use std::collections::HashSet;
use std::sync::Arc;

use admin_core::{
    AdminError, ArchivedRepoOracle, GitHubClient, MigratorDescriptor, Migrator, RegisteredMigrator,
    Result,
};
use admin_state::StateStore;

use crate::branch_protection::{BranchProtection, RulesetApi};
use crate::conda_forge_yml_test::CondaForgeYAMLTest;
use crate::dot_conda::DotConda;
use crate::labels::{AutomergeAndBotRerunLabels, LabelApi};
use crate::r_automerge::RAutomerge;
use crate::recipe_location::RecipeLocation;
use crate::remove_automerge_and_rerender::RemoveAutomergeAndRerender;
use crate::travis_no_osx_amd64::TravisCINoOSXAMD64;

/// Every `kind` a `[[migrator]]` entry may name.
pub const KNOWN_KINDS: [&str; 8] = [
    "RemoveAutomergeAndRerender",
    "RecipeLocation",
    "CondaForgeYAMLTest",
    "RAutomerge",
    "TraviCINoOSXAMD64",
    "DotConda",
    "BranchProtection",
    "AutomergeAndBotRerunLabels",
];

/// Collaborators for migrators that reach the hosting API.
#[derive(Clone)]
pub struct MigratorDeps {
    pub rulesets: Arc<dyn RulesetApi>,
    pub labels: Arc<dyn LabelApi>,
    pub oracle: Arc<ArchivedRepoOracle>,
    pub org: String,
    pub suffix: String,
}

impl MigratorDeps {
    /// Route every API-calling migrator through one shared client.
    pub fn github(
        client: GitHubClient,
        oracle: Arc<ArchivedRepoOracle>,
        org: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        let client = Arc::new(client);
        Self {
            rulesets: client.clone(),
            labels: client,
            oracle,
            org: org.into(),
            suffix: suffix.into(),
        }
    }
}

/// Kinds run by the hosted job that this crate does not provide, with the
/// reason. Token rotation needs conda-smithy and team cleanup needs the
/// organization teams API.
pub const UNSUPPORTED_KINDS: [(&str, &str); 2] = [
    ("RotateFeedstockToken", "needs conda-smithy token rotation"),
    ("TeamsCleanup", "needs the organization teams API"),
];

/// The list run when the config file names no migrators. It omits the
/// [`UNSUPPORTED_KINDS`].
pub fn default_descriptors() -> Vec<MigratorDescriptor> {
    [
        "RAutomerge",
        "TraviCINoOSXAMD64",
        "CondaForgeYAMLTest",
        "BranchProtection",
        "RemoveAutomergeAndRerender",
    ]
    .into_iter()
    .map(MigratorDescriptor::new)
    .collect()
}

/// Construct the migrator for `kind`.
pub fn instantiate(kind: &str, deps: &MigratorDeps) -> Result<Arc<dyn Migrator>> {
    let migrator: Arc<dyn Migrator> = match kind {
        "RemoveAutomergeAndRerender" => Arc::new(RemoveAutomergeAndRerender),
        "RecipeLocation" => Arc::new(RecipeLocation),
        "CondaForgeYAMLTest" => Arc::new(CondaForgeYAMLTest),
        "RAutomerge" => Arc::new(RAutomerge),
        "TraviCINoOSXAMD64" | "TravisCINoOSXAMD64" => Arc::new(TravisCINoOSXAMD64),
        "DotConda" => Arc::new(DotConda::new(Arc::clone(&deps.oracle))),
        "BranchProtection" => Arc::new(BranchProtection::new(
            Arc::clone(&deps.rulesets),
            deps.org.clone(),
            deps.suffix.clone(),
        )),
        "AutomergeAndBotRerunLabels" => Arc::new(AutomergeAndBotRerunLabels::new(
            Arc::clone(&deps.labels),
            Arc::clone(&deps.oracle),
            deps.org.clone(),
            deps.suffix.clone(),
        )),
        other => {
            if let Some((_, reason)) = UNSUPPORTED_KINDS.iter().find(|(k, _)| *k == other) {
                return Err(AdminError::Config(format!(
                    "migrator kind {other:?} is not supported: {reason}"
                )));
            }
            return Err(AdminError::Config(format!(
                "unknown migrator kind {other:?}; known kinds: {}",
                KNOWN_KINDS.join(", ")
            )))
        }
    };
    Ok(migrator)
}

/// Build and bind the enabled migrators in configured order.
///
/// Every descriptor is validated, disabled ones included. Two entries
/// resolving to the same migrator would share a ledger and are rejected.
pub fn build_migrators(
    descriptors: &[MigratorDescriptor],
    deps: &MigratorDeps,
    store: Arc<dyn StateStore>,
) -> Result<Vec<RegisteredMigrator>> {
    let mut seen = HashSet::new();
    let mut built = Vec::new();
    for descriptor in descriptors {
        let migrator = instantiate(&descriptor.kind, deps)?;
        if !seen.insert(migrator.name().to_string()) {
            return Err(AdminError::Config(format!(
                "migrator {} configured twice",
                migrator.name()
            )));
        }
        if !descriptor.enabled {
            continue;
        }
        let registered = RegisteredMigrator::load(migrator, Arc::clone(&store))?
            .with_overrides(descriptor.main_branch_only, descriptor.max_processes);
        built.push(registered);
    }
    Ok(built)
}
