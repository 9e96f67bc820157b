//! Error taxonomy for the admin migration driver.
//!
//! Errors scoped to one (feedstock, branch, migrator) unit are logged by the
//! runner and never leave it. Everything that reaches the top level through
//! [`Result`] is a configuration, contract or state I/O failure and aborts
//! the run without writing a checkpoint.

/// Admin migration errors.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("git {command} failed: {output}")]
    Git { command: String, output: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("migrator {migrator} failed: {reason}")]
    Migrator { migrator: String, reason: String },

    #[error("worker failed: {0}")]
    Worker(String),

    #[error("state error: {0}")]
    State(#[from] admin_state::StateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for AdminError {
    fn from(err: reqwest::Error) -> Self {
        AdminError::Http(err.to_string())
    }
}

/// Result type for admin migration operations.
pub type Result<T> = std::result::Result<T, AdminError>;
