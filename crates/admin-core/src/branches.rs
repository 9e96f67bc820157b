//! Branch enumeration for a freshly cloned feedstock.
//!
//! The default branch always comes first. Migrators that only touch
//! repository-wide state rely on this: they run once, on the first branch.

use crate::domain::error::Result;
use crate::git::Git;

const REMOTE_PREFIX: &str = "origin/";

/// Branches of one clone in the order migrators visit them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchPlan {
    pub default_branch: String,
    /// Default branch first, then every other remote branch once, in
    /// listing order.
    pub branches: Vec<String>,
}

impl BranchPlan {
    pub fn is_default(&self, branch: &str) -> bool {
        self.default_branch == branch
    }
}

/// Determine the default branch and list all remote branches of the clone.
pub async fn enumerate_branches(git: &Git) -> Result<BranchPlan> {
    let default_branch = git.current_branch().await?;
    let listing = git.run(&["branch", "-r"]).await?;
    let branches = order_branches(&default_branch, &listing);
    Ok(BranchPlan {
        default_branch,
        branches,
    })
}

/// Order the output of `git branch -r` with `default_branch` first.
///
/// The symbolic `origin/HEAD` entry is ignored and duplicates are dropped.
pub fn order_branches(default_branch: &str, remote_listing: &str) -> Vec<String> {
    let mut branches = vec![default_branch.to_string()];
    for line in remote_listing.lines() {
        let line = line.trim();
        if line.is_empty() || line.contains("origin/HEAD") {
            continue;
        }
        let branch = line.strip_prefix(REMOTE_PREFIX).unwrap_or(line);
        if !branches.iter().any(|b| b == branch) {
            branches.push(branch.to_string());
        }
    }
    branches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_support::{make_git_repo, run_git};

    #[test]
    fn default_first_then_listing_order() {
        let listing = "  origin/HEAD -> origin/main\n  origin/1.x\n  origin/main\n  origin/0.x\n";
        assert_eq!(order_branches("main", listing), vec!["main", "1.x", "0.x"]);
    }

    #[test]
    fn duplicates_appear_once() {
        let listing = "  origin/v1\n  origin/v1\n  origin/master\n";
        assert_eq!(order_branches("master", listing), vec!["master", "v1"]);
    }

    #[test]
    fn empty_listing_keeps_default() {
        assert_eq!(order_branches("main", ""), vec!["main"]);
    }

    #[tokio::test]
    async fn enumerates_cloned_repository() {
        let upstream = make_git_repo();
        run_git(upstream.path(), &["branch", "rc"]);
        run_git(upstream.path(), &["branch", "1.x"]);

        let work = tempfile::tempdir().unwrap();
        let url = upstream.path().to_string_lossy().to_string();
        run_git(work.path(), &["clone", "--quiet", &url, "clone"]);

        let plan = enumerate_branches(&Git::new(work.path().join("clone")))
            .await
            .unwrap();
        assert_eq!(plan.default_branch, "main");
        assert_eq!(plan.branches[0], "main");
        assert_eq!(plan.branches.len(), 3);
        assert!(plan.branches.contains(&"rc".to_string()));
        assert!(plan.branches.contains(&"1.x".to_string()));
        assert!(plan.is_default("main"));
    }
}
