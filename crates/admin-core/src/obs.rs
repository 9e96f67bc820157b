//! Structured log events for the admin migration run.
//!
//! The run has no interactive surface; operators read these lines in the CI
//! log. Every feedstock gets a banner, progress is summarized periodically,
//! and failures are `error!` lines starting with `ERROR:`.

use std::time::Duration;

use tracing::{info, info_span, Span};

use crate::domain::outcome::FeedstockDisposition;

const BANNER: &str =
    "================================================================================";

/// Span tagging everything logged while a feedstock is migrated.
pub fn feedstock_span(feedstock: &str) -> Span {
    info_span!("admin.feedstock", feedstock = %feedstock)
}

/// Banner at the start of a feedstock.
pub fn emit_feedstock_started(feedstock: &str) {
    for _ in 0..3 {
        info!("{BANNER}");
    }
    info!(event = "feedstock.started", feedstock = %feedstock, "migrating {feedstock}");
}

/// A feedstock's runner returned.
pub fn emit_feedstock_finished(
    feedstock: &str,
    elapsed: Duration,
    disposition: FeedstockDisposition,
    made_api_calls: bool,
    completed: usize,
) {
    info!(
        event = "feedstock.finished",
        feedstock = %feedstock,
        seconds = elapsed.as_secs_f64(),
        disposition = ?disposition,
        made_api_calls,
        completed,
        "migration took {:.1} seconds",
        elapsed.as_secs_f64()
    );
}

/// A migrator's ledger was loaded.
pub fn emit_migrator_loaded(migrator: &str, done: usize) {
    info!(event = "migrator.loaded", migrator = %migrator, done, "migrator {migrator}: done {done}");
}

/// A feedstock was handed to a worker.
pub fn emit_dispatched(feedstock: &str, running: usize, workers: usize) {
    info!(
        event = "feedstock.dispatched",
        feedstock = %feedstock,
        running,
        workers,
        "# of feedstocks running|n_workers: {running}|{workers}"
    );
}

/// Periodic progress summary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Feedstocks attempted this pass, including earlier runs.
    pub position: usize,
    pub fleet_size: usize,
    /// Feedstocks finished by this run.
    pub processed: usize,
    /// Feedstocks for which a commit was made or an API was called.
    pub pushed_or_api: usize,
    /// Estimated feedstocks still doable in the remaining budget.
    pub remaining_estimate: usize,
}

impl Progress {
    /// `max(processed / elapsed * (budget - elapsed), 0)`.
    pub fn estimate_remaining(processed: usize, elapsed: Duration, budget: Duration) -> usize {
        let elapsed_s = elapsed.as_secs_f64();
        if elapsed_s <= 0.0 {
            return 0;
        }
        let left = budget.as_secs_f64() - elapsed_s;
        let estimate = processed as f64 / elapsed_s * left;
        if estimate > 0.0 {
            estimate as usize
        } else {
            0
        }
    }
}

pub fn emit_progress(progress: &Progress) {
    info!(
        event = "run.progress",
        position = progress.position,
        fleet_size = progress.fleet_size,
        processed = progress.processed,
        pushed_or_api = progress.pushed_or_api,
        remaining_estimate = progress.remaining_estimate,
        "on {} out of {} feedstocks; migrated {}; pushed or made API calls for {}; can migrate ~{} more this run",
        progress.position,
        progress.fleet_size,
        progress.processed,
        progress.pushed_or_api,
        progress.remaining_estimate
    );
}

/// The cursor reached the end of the fleet.
pub fn emit_wraparound() {
    for _ in 0..3 {
        info!("{BANNER}");
    }
    info!(event = "fleet.wraparound", "processed all feedstocks - starting over!");
}

/// State documents were committed and pushed.
pub fn emit_checkpoint_saved(head: &str) {
    info!(event = "checkpoint.saved", head = %head, "saved data at {head}");
}
