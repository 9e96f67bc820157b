//! Git command execution inside a working tree.
//!
//! Every git interaction the driver needs (clone, branch listing, switch,
//! commit, push, the checkpoint sequence) goes through [`Git`], which runs the
//! `git` binary as a subprocess with stdout and stderr captured together.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::domain::error::{AdminError, Result};

/// Captured result of a git invocation that was allowed to fail.
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub success: bool,
    /// stdout followed by stderr.
    pub output: String,
}

/// Git runner bound to one directory.
#[derive(Debug, Clone)]
pub struct Git {
    dir: PathBuf,
    /// Substrings scrubbed from any output that ends up in an error or log.
    secrets: Vec<String>,
}

impl Git {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            secrets: Vec::new(),
        }
    }

    /// Scrub `secret` from command output before it is reported.
    pub fn with_secret(mut self, secret: Option<&str>) -> Self {
        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            self.secrets.push(secret.to_string());
        }
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `relative` inside the working tree.
    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.join(relative)
    }

    fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret, "***"))
    }

    /// Run `git <args>`; a non-zero exit is returned as `Ok` with `success = false`.
    pub async fn try_run(&self, args: &[&str]) -> Result<GitOutput> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AdminError::Git {
                command: args.first().copied().unwrap_or_default().to_string(),
                output: format!("failed to run git: {e}"),
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let text = self.redact(&text);

        debug!(args = %self.redact(&args.join(" ")), success = output.status.success(), "git");
        Ok(GitOutput {
            success: output.status.success(),
            output: text,
        })
    }

    /// Run `git <args>` and fail on a non-zero exit. Returns the combined output.
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        let out = self.try_run(args).await?;
        if out.success {
            Ok(out.output)
        } else {
            Err(AdminError::Git {
                command: self.redact(&args.join(" ")),
                output: out.output.trim().to_string(),
            })
        }
    }

    /// Stage paths (pathspecs are passed through to git unexpanded).
    pub async fn add(&self, paths: &[&str]) -> Result<()> {
        let mut args = vec!["add"];
        args.extend_from_slice(paths);
        self.run(&args).await.map(|_| ())
    }

    /// Remove a tracked file from the tree and the index.
    pub async fn remove(&self, path: &str) -> Result<()> {
        self.run(&["rm", "-f", "--quiet", path]).await.map(|_| ())
    }

    /// Move a tracked path.
    pub async fn mv(&self, from: &str, to: &str) -> Result<()> {
        self.run(&["mv", from, to]).await.map(|_| ())
    }

    /// Name of the checked out branch.
    pub async fn current_branch(&self) -> Result<String> {
        let out = self.run(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        Ok(out.trim().to_string())
    }

    /// Whether the index differs from HEAD.
    pub async fn has_staged_changes(&self) -> Result<bool> {
        let out = self.try_run(&["diff", "--cached", "--quiet"]).await?;
        Ok(!out.success)
    }
}

/// Capture the HEAD commit SHA of the repository in `repo_dir`.
pub async fn capture_head_sha(repo_dir: &Path) -> Result<String> {
    let sha = Git::new(repo_dir).run(&["rev-parse", "HEAD"]).await?;
    let sha = sha.trim().to_string();
    if sha.is_empty() {
        return Err(AdminError::Git {
            command: "rev-parse HEAD".to_string(),
            output: "empty output".to_string(),
        });
    }
    Ok(sha)
}

/// Check whether a directory is inside a git work tree.
pub async fn is_git_repo(dir: &Path) -> bool {
    Git::new(dir)
        .try_run(&["rev-parse", "--is-inside-work-tree"])
        .await
        .map(|o| o.success)
        .unwrap_or(false)
}
