//! Shared fixtures: a directory of bare "hosting" repositories and fakes
//! for the hosting API seams.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use admin_core::{
    AdminConfig, AdminError, ArchiveStatusSource, ArchivedRepoOracle, GitSettings, Result,
    RetryPolicy,
};
use async_trait::async_trait;

pub fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Bare repositories named `<feedstock>-feedstock.git` under one tempdir.
pub struct HostedFleet {
    root: tempfile::TempDir,
}

impl HostedFleet {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    /// Publish a feedstock with a `main` branch plus `extra_branches`.
    pub fn add(&self, feedstock: &str, extra_branches: &[&str], with_recipe: bool) {
        let seed = tempfile::tempdir().unwrap();
        let dir = seed.path();
        run_git(dir, &["init", "--quiet", "--initial-branch=main"]);
        run_git(dir, &["config", "user.name", "seed"]);
        run_git(dir, &["config", "user.email", "seed@example.com"]);
        std::fs::write(dir.join("README.md"), format!("# {feedstock}\n")).unwrap();
        run_git(dir, &["add", "README.md"]);
        if with_recipe {
            std::fs::create_dir_all(dir.join("recipe")).unwrap();
            std::fs::write(dir.join("recipe/meta.yaml"), "package:\n  name: x\n").unwrap();
            run_git(dir, &["add", "recipe/meta.yaml"]);
        }
        run_git(dir, &["commit", "--quiet", "-m", "initial"]);
        for branch in extra_branches {
            run_git(dir, &["branch", branch]);
        }
        run_git(
            dir,
            &["clone", "--quiet", "--bare", ".", &self.bare(feedstock).to_string_lossy()],
        );
    }

    pub fn bare(&self, feedstock: &str) -> PathBuf {
        self.root.path().join(format!("{feedstock}-feedstock.git"))
    }

    /// Install a `pre-receive` hook that refuses every push to `feedstock`.
    #[cfg(unix)]
    pub fn reject_pushes(&self, feedstock: &str) {
        use std::os::unix::fs::PermissionsExt;

        let hooks = self.bare(feedstock).join("hooks");
        std::fs::create_dir_all(&hooks).unwrap();
        let hook = hooks.join("pre-receive");
        std::fs::write(&hook, "#!/bin/sh\necho 'pushes are frozen' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    pub fn accept_pushes(&self, feedstock: &str) {
        let hook = self.bare(feedstock).join("hooks/pre-receive");
        if hook.exists() {
            std::fs::remove_file(hook).unwrap();
        }
    }

    pub fn template(&self) -> String {
        format!("{}/{{repo}}.git", self.root.path().display())
    }

    /// Subjects on `branch`, newest first.
    pub fn subjects(&self, feedstock: &str, branch: &str) -> Vec<String> {
        run_git(&self.bare(feedstock), &["log", "--format=%s", branch])
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn config(&self) -> AdminConfig {
        AdminConfig {
            git: GitSettings {
                user_name: Some("admin-bot".to_string()),
                user_email: Some("admin-bot@example.com".to_string()),
                clone_url_template: Some(self.template()),
            },
            ..AdminConfig::default()
        }
    }
}

/// Archive status from a fixed set; optionally failing every lookup.
pub struct FixedArchive {
    archived: HashSet<String>,
    failing: bool,
}

impl FixedArchive {
    pub fn active() -> Self {
        Self {
            archived: HashSet::new(),
            failing: false,
        }
    }

    pub fn archived(names: &[&str]) -> Self {
        Self {
            archived: names.iter().map(|s| s.to_string()).collect(),
            failing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            archived: HashSet::new(),
            failing: true,
        }
    }

    pub fn oracle(self) -> Arc<ArchivedRepoOracle> {
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        };
        Arc::new(ArchivedRepoOracle::new(Arc::new(self), policy, 16))
    }
}

#[async_trait]
impl ArchiveStatusSource for FixedArchive {
    async fn is_archived(&self, feedstock: &str) -> Result<bool> {
        if self.failing {
            return Err(AdminError::Http("503 service unavailable".to_string()));
        }
        Ok(self.archived.contains(feedstock))
    }
}
