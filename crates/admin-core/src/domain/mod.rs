//! Domain types shared by the runner, the scheduler and the migrators.

pub mod error;
pub mod feedstock;
pub mod outcome;

pub use error::{AdminError, Result};
pub use feedstock::{feedstock_from_repo_name, repo_name};
pub use outcome::{CompletedUnit, FeedstockDisposition, FeedstockReport, MigrationOutcome};
