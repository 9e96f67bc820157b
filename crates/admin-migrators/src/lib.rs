//! Feedstock migrators
//!
//! Leaf plugins for the admin migration driver. Each migrator is
//! idempotent: run again on a migrated tree it reports done without staging
//! anything. [`registry`] builds the configured, ordered list.

pub mod branch_protection;
pub mod cf_yaml;
pub mod dot_conda;
pub mod labels;
pub mod r_automerge;
pub mod recipe_location;
pub mod registry;
pub mod remove_automerge_and_rerender;
pub mod travis_no_osx_amd64;

pub use branch_protection::{BranchProtection, Ruleset, RulesetApi, RulesetSummary};
pub use conda_forge_yml_test::CondaForgeYAMLTest;
pub use dot_conda::DotConda;
pub use labels::{AutomergeAndBotRerunLabels, Label, LabelApi};
pub use r_automerge::RAutomerge;
pub use recipe_location::RecipeLocation;
pub use registry::{
    build_migrators, default_descriptors, instantiate, MigratorDeps, KNOWN_KINDS, UNSUPPORTED_KINDS,
};
pub use remove_automerge_and_rerender::RemoveAutomergeAndRerender;
pub use travis_no_osx_amd64::TravisCINoOSXAMD64;
