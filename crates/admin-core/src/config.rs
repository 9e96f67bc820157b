//! Run configuration.
//!
//! A versioned TOML file tunes the run and lists the migrators in order.
//! Everything is optional; a missing file means built-in defaults.
//!
//! ```toml
//! version = 1
//!
//! [run]
//! max_workers = 2
//!
//! [[migrator]]
//! kind = "RAutomerge"
//!
//! [[migrator]]
//! kind = "BranchProtection"
//! max_processes = 1
//! ```

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::error::{AdminError, Result};
use crate::scheduler::Budget;
use crate::workspace::{CommitIdentity, RemoteSpec};

pub const CONFIG_VERSION: u32 = 1;
pub const DEFAULT_ORG: &str = "conda-forge";
pub const DEFAULT_SUFFIX: &str = "-feedstock";
pub const DEBUG_FEEDSTOCK: &str = "cf-autotick-bot-test-package";

/// Workflow that schedules the job; its cron must start runs on the hour.
pub const SCHEDULE_WORKFLOW: &str = ".github/workflows/migrate.yml";
pub const REQUIRED_CRON: &str = "0 * * * *";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdminConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub run: RunOverrides,
    #[serde(default)]
    pub git: GitSettings,
    /// Ordered migrator list. `None` means the built-in default list.
    #[serde(default, rename = "migrator", skip_serializing_if = "Option::is_none")]
    pub migrators: Option<Vec<MigratorDescriptor>>,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            run: RunOverrides::default(),
            git: GitSettings::default(),
            migrators: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunOverrides {
    pub max_migrate: Option<usize>,
    pub max_seconds: Option<u64>,
    pub max_workers: Option<usize>,
    pub org: Option<String>,
    pub feedstock_suffix: Option<String>,
    pub debug_feedstocks: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitSettings {
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    /// Clone URL with `{token}`, `{org}` and `{repo}` placeholders.
    pub clone_url_template: Option<String>,
}

impl GitSettings {
    /// Commit identity, when both halves are configured.
    pub fn identity(&self) -> Option<CommitIdentity> {
        match (&self.user_name, &self.user_email) {
            (Some(name), Some(email)) => Some(CommitIdentity {
                name: name.clone(),
                email: email.clone(),
            }),
            _ => None,
        }
    }
}

/// One `[[migrator]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigratorDescriptor {
    pub kind: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Overrides the migrator's own setting when present.
    pub main_branch_only: Option<bool>,
    pub max_processes: Option<usize>,
}

fn enabled_by_default() -> bool {
    true
}

impl MigratorDescriptor {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            enabled: true,
            main_branch_only: None,
            max_processes: None,
        }
    }
}

impl AdminConfig {
    /// Load `path`, or the defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
            .map_err(|e| AdminError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| AdminError::Config(e.to_string()))?;
        if config.version != CONFIG_VERSION {
            return Err(AdminError::Config(format!(
                "unsupported config version {} (expected {CONFIG_VERSION})",
                config.version
            )));
        }
        Ok(config)
    }

    pub fn org(&self) -> &str {
        self.run.org.as_deref().unwrap_or(DEFAULT_ORG)
    }

    pub fn feedstock_suffix(&self) -> &str {
        self.run
            .feedstock_suffix
            .as_deref()
            .unwrap_or(DEFAULT_SUFFIX)
    }

    /// Feedstocks a debug run is restricted to.
    pub fn debug_feedstocks(&self) -> Vec<String> {
        self.run
            .debug_feedstocks
            .clone()
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| vec![DEBUG_FEEDSTOCK.to_string()])
    }

    pub fn remote(&self, token: Option<String>) -> RemoteSpec {
        RemoteSpec::new(
            self.git
                .clone_url_template
                .as_deref()
                .unwrap_or(RemoteSpec::DEFAULT_TEMPLATE),
            token,
            self.org(),
            self.feedstock_suffix(),
        )
    }

    /// Limits for this run: clock-derived defaults with file overrides on
    /// top. Debug runs keep a quota and pool of one.
    pub fn run_limits(&self, debug: bool, now: DateTime<Utc>) -> RunLimits {
        let mut limits = RunLimits::for_clock(debug, now);
        if let Some(secs) = self.run.max_seconds {
            limits.budget.max_seconds = Duration::from_secs(secs);
        }
        if !debug {
            if let Some(n) = self.run.max_migrate {
                limits.budget.max_migrate = n;
            }
            if let Some(n) = self.run.max_workers {
                limits.max_workers = n;
            }
        }
        limits
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    pub budget: Budget,
    pub max_workers: usize,
}

impl RunLimits {
    /// Defaults for a run started at `now`.
    ///
    /// Scheduled runs start on the hour and must finish before the next
    /// one, leaving six minutes for setup and the checkpoint.
    pub fn for_clock(debug: bool, now: DateTime<Utc>) -> Self {
        if debug {
            return Self {
                budget: Budget {
                    max_seconds: Duration::from_secs(3000),
                    max_migrate: 1,
                },
                max_workers: 1,
            };
        }
        let minutes = (60 - i64::from(now.minute()) - 6).clamp(0, 50) as u64;
        Self {
            budget: Budget {
                max_seconds: Duration::from_secs(minutes * 60),
                max_migrate: 100,
            },
            max_workers: 2,
        }
    }
}

/// Refuse to run when the scheduling workflow does not start on the hour.
///
/// A missing workflow or one without `on.schedule` passes.
pub fn check_schedule(workflow: &Path) -> Result<()> {
    if !workflow.exists() {
        return Ok(());
    }
    let raw = std::fs::read_to_string(workflow)?;
    let doc: serde_yaml::Value = serde_yaml::from_str(&raw)?;

    let Some(schedule) = doc.get("on").and_then(|on| on.get("schedule")) else {
        return Ok(());
    };
    let cron = schedule
        .get(0)
        .and_then(|entry| entry.get("cron"))
        .and_then(|cron| cron.as_str());
    match cron {
        Some(REQUIRED_CRON) => Ok(()),
        other => Err(AdminError::Config(format!(
            "{} must be scheduled with cron \"{REQUIRED_CRON}\", found {other:?}",
            workflow.display()
        ))),
    }
}
