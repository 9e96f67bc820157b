//! Feedstock naming.
//!
//! A feedstock is identified by its package name; the hosting repository is
//! the name plus a fixed suffix (`numpy` -> `numpy-feedstock`).

/// Hosting repositories whose listed name differs from the feedstock name.
const RENAMED_REPOS: [(&str, &str); 1] = [("numpy-sugar-feedstock", "numpy_sugar-feedstock")];

/// Hosting repository name for a feedstock.
pub fn repo_name(feedstock: &str, suffix: &str) -> String {
    format!("{feedstock}{suffix}")
}

/// Feedstock name for a listed hosting repository, or `None` if the
/// repository does not follow the suffix convention.
pub fn feedstock_from_repo_name(repo: &str, suffix: &str) -> Option<String> {
    let repo = RENAMED_REPOS
        .iter()
        .find(|(listed, _)| *listed == repo)
        .map(|(_, actual)| *actual)
        .unwrap_or(repo);
    repo.strip_suffix(suffix)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}
