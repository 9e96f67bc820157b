//! Checkpoint of the state documents into the job's own repository.
//!
//! Other scheduled runs may have pushed meanwhile, so local edits are
//! stashed around a pull before the data files are committed and pushed.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::domain::error::{AdminError, Result};
use crate::git::{capture_head_sha, is_git_repo, Git};
use crate::obs;

pub const CHECKPOINT_MESSAGE: &str = "[ci skip] data for admin migration run";

/// The repository holding the state directory.
pub struct StateRepo {
    git: Git,
    pathspec: String,
}

impl StateRepo {
    /// Open the repository at `root`. `data_dir` is where the state
    /// documents live, absolute or relative to `root`.
    pub async fn open(root: &Path, data_dir: &Path, token: Option<&str>) -> Result<Self> {
        if !is_git_repo(root).await {
            return Err(AdminError::Config(format!(
                "{} is not a git checkout; cannot save state",
                root.display()
            )));
        }
        let relative: PathBuf = data_dir
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| data_dir.to_path_buf());
        let pathspec = if relative.as_os_str().is_empty() {
            "*.json".to_string()
        } else {
            format!("{}/*.json", relative.display())
        };
        Ok(Self {
            git: Git::new(root).with_secret(token),
            pathspec,
        })
    }

    /// Pathspec of the files committed by [`StateRepo::save`].
    pub fn pathspec(&self) -> &str {
        &self.pathspec
    }

    /// Commit and push the state documents. Returns the new HEAD, or
    /// `None` when nothing changed.
    pub async fn save(&self) -> Result<Option<String>> {
        info!("saving data...");
        let stash = self.git.run(&["stash"]).await?;
        self.git.run(&["pull", "--quiet"]).await?;
        if !stash.contains("No local changes") {
            self.git.run(&["stash", "pop"]).await?;
        }

        self.git.add(&[self.pathspec.as_str()]).await?;
        if !self.git.has_staged_changes().await? {
            info!("state unchanged; nothing to commit");
            return Ok(None);
        }
        self.git
            .run(&["commit", "--quiet", "-m", CHECKPOINT_MESSAGE])
            .await?;
        self.git.run(&["push", "--quiet"]).await?;

        let head = capture_head_sha(self.git.dir()).await?;
        obs::emit_checkpoint_saved(&head);
        Ok(Some(head))
    }
}
