//! Fleet scheduler.
//!
//! One pass walks the sorted active fleet from the persisted cursor,
//! dispatching each feedstock to a bounded pool of tokio tasks. Before every
//! dispatch the time and migrate-quota budgets are checked; once either is
//! hit no new work starts, but in-flight feedstocks are always drained.
//!
//! Workers never touch persisted state. Ledger records and the cursor are
//! written here, in the task that drives the pass, as each worker result is
//! drained (first completed, first drained).

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use admin_state::{FleetCursor, StateStore};
use futures::FutureExt;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info};

use crate::domain::error::{AdminError, Result};
use crate::domain::outcome::{FeedstockDisposition, FeedstockReport};
use crate::migrator::RegisteredMigrator;
use crate::obs::{self, Progress};
use crate::runner::{panic_message, FeedstockWork};

/// Interval between progress lines while draining.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Limits for one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub max_seconds: Duration,
    /// Feedstocks with a commit or an API call before dispatch stops.
    pub max_migrate: usize,
}

/// Why dispatching stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    FleetExhausted,
    TimeBudget,
    MigrateQuota,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub dispatched: usize,
    pub processed: usize,
    pub pushed_or_api: usize,
    /// Cursor as persisted at the end of the pass.
    pub cursor: FleetCursor,
    /// The pass started over or reached the end of the fleet.
    pub wrapped: bool,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    pub budget: Budget,
    pub workers: usize,
    pub progress_interval: Duration,
}

impl SchedulerOptions {
    pub fn new(budget: Budget, workers: usize) -> Self {
        Self {
            budget,
            workers: workers.max(1),
            progress_interval: PROGRESS_INTERVAL,
        }
    }
}

/// Size of the worker pool.
///
/// The smallest `max_processes` of any migrator, further capped by the
/// `CPU_COUNT` override and `max_workers`. Never below one; debug runs
/// always use a single worker.
pub fn worker_count(
    migrators: &[RegisteredMigrator],
    env_override: Option<usize>,
    max_workers: usize,
    debug: bool,
) -> usize {
    if debug {
        return 1;
    }
    let mut workers = max_workers.max(1);
    if let Some(cap) = migrators
        .iter()
        .filter_map(|m| m.hints().max_processes)
        .min()
    {
        workers = workers.min(cap);
    }
    if let Some(n) = env_override.filter(|n| *n > 0) {
        workers = workers.min(n);
    }
    workers.max(1)
}

pub struct FleetScheduler {
    work: Arc<dyn FeedstockWork>,
    migrators: Arc<[RegisteredMigrator]>,
    store: Arc<dyn StateStore>,
    options: SchedulerOptions,
}

#[derive(Debug)]
struct Tally {
    started: Instant,
    last_report: Instant,
    done_before: usize,
    fleet_size: usize,
    processed: usize,
    pushed_or_api: usize,
    furthest: Option<String>,
}

impl Tally {
    fn progress(&self, budget: Duration) -> Progress {
        Progress {
            position: self.done_before + self.processed,
            fleet_size: self.fleet_size,
            processed: self.processed,
            pushed_or_api: self.pushed_or_api,
            remaining_estimate: Progress::estimate_remaining(
                self.processed,
                self.started.elapsed(),
                budget,
            ),
        }
    }
}

impl FleetScheduler {
    pub fn new(
        work: Arc<dyn FeedstockWork>,
        migrators: Arc<[RegisteredMigrator]>,
        store: Arc<dyn StateStore>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            work,
            migrators,
            store,
            options,
        }
    }

    /// Run one pass over `fleet` (sorted ascending) starting after `cursor`.
    ///
    /// The resulting cursor is saved exactly once, after every dispatched
    /// feedstock has been drained.
    pub async fn run_pass(&self, fleet: &[String], cursor: FleetCursor) -> Result<PassSummary> {
        let mut cursor = cursor;
        let mut wrapped = false;
        if !fleet.is_empty() && fleet.iter().all(|f| cursor.is_behind(f)) {
            obs::emit_wraparound();
            cursor = FleetCursor::start();
            wrapped = true;
        }

        let now = Instant::now();
        let mut tally = Tally {
            started: now,
            last_report: now,
            done_before: fleet.iter().filter(|f| cursor.is_behind(f)).count(),
            fleet_size: fleet.len(),
            processed: 0,
            pushed_or_api: 0,
            furthest: None,
        };

        let budget = self.options.budget;
        let workers = self.options.workers;
        let mut inflight: JoinSet<FeedstockReport> = JoinSet::new();
        let mut dispatched = 0;
        let mut stop_reason = StopReason::FleetExhausted;

        for feedstock in fleet.iter().filter(|f| !cursor.is_behind(f)) {
            while inflight.len() >= workers {
                self.drain_one(&mut inflight, &mut tally).await?;
            }

            if tally.started.elapsed() >= budget.max_seconds {
                stop_reason = StopReason::TimeBudget;
                break;
            }
            if tally.pushed_or_api >= budget.max_migrate {
                stop_reason = StopReason::MigrateQuota;
                break;
            }

            obs::emit_dispatched(feedstock, inflight.len(), workers);
            self.dispatch(&mut inflight, feedstock.clone());
            dispatched += 1;
        }

        while !inflight.is_empty() {
            self.drain_one(&mut inflight, &mut tally).await?;
        }
        obs::emit_progress(&tally.progress(budget.max_seconds));

        if let Some(furthest) = tally.furthest.take() {
            cursor = FleetCursor::at(furthest);
        }
        if let (Some(current), Some(last)) = (cursor.current_feedstock.as_deref(), fleet.last()) {
            if current == last {
                obs::emit_wraparound();
                wrapped = true;
            }
        }

        self.store.save_cursor(&cursor)?;
        info!(
            event = "pass.finished",
            dispatched,
            processed = tally.processed,
            pushed_or_api = tally.pushed_or_api,
            stop_reason = ?stop_reason,
            cursor = ?cursor.current_feedstock,
            "pass finished"
        );

        Ok(PassSummary {
            dispatched,
            processed: tally.processed,
            pushed_or_api: tally.pushed_or_api,
            cursor,
            wrapped,
            stop_reason,
        })
    }

    fn dispatch(&self, inflight: &mut JoinSet<FeedstockReport>, feedstock: String) {
        let work = Arc::clone(&self.work);
        inflight.spawn(async move {
            match AssertUnwindSafe(work.run(&feedstock)).catch_unwind().await {
                Ok(report) => report,
                Err(panic) => {
                    error!(
                        feedstock = %feedstock,
                        "ERROR: worker crashed: {}",
                        panic_message(panic.as_ref())
                    );
                    FeedstockReport::empty(&feedstock, FeedstockDisposition::Crashed)
                }
            }
        });
    }

    async fn drain_one(
        &self,
        inflight: &mut JoinSet<FeedstockReport>,
        tally: &mut Tally,
    ) -> Result<()> {
        let Some(joined) = inflight.join_next().await else {
            return Ok(());
        };
        let report =
            joined.map_err(|e| AdminError::Worker(format!("feedstock task join error: {e}")))?;
        self.absorb(report, tally)?;

        if tally.last_report.elapsed() > self.options.progress_interval {
            tally.last_report = Instant::now();
            obs::emit_progress(&tally.progress(self.options.budget.max_seconds));
        }
        Ok(())
    }

    fn absorb(&self, report: FeedstockReport, tally: &mut Tally) -> Result<()> {
        tally.processed += 1;
        if report.made_api_calls {
            tally.pushed_or_api += 1;
        }

        // A crashed worker leaves no trace so the feedstock is retried.
        if report.disposition == FeedstockDisposition::Crashed {
            return Ok(());
        }

        for unit in &report.completed {
            let migrator = self.migrators.get(unit.migrator_index).ok_or_else(|| {
                AdminError::Worker(format!(
                    "completed unit names unknown migrator #{}",
                    unit.migrator_index
                ))
            })?;
            migrator.record(&report.feedstock, &unit.branch)?;
        }

        if tally
            .furthest
            .as_deref()
            .map_or(true, |f| report.feedstock.as_str() > f)
        {
            tally.furthest = Some(report.feedstock.clone());
        }
        info!(feedstock = %report.feedstock, "finished {}", report.feedstock);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::outcome::{CompletedUnit, MigrationOutcome};
    use crate::migrator::{MigrationContext, Migrator};
    use admin_state::fakes::MemoryStateStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Noop {
        name: &'static str,
        max_processes: Option<usize>,
    }

    #[async_trait]
    impl Migrator for Noop {
        fn name(&self) -> &str {
            self.name
        }
        fn max_processes(&self) -> Option<usize> {
            self.max_processes
        }
        async fn migrate(&self, _ctx: &MigrationContext<'_>) -> anyhow::Result<MigrationOutcome> {
            Ok(MigrationOutcome::done())
        }
    }

    fn registered(
        store: &Arc<dyn StateStore>,
        name: &'static str,
        max_processes: Option<usize>,
    ) -> RegisteredMigrator {
        RegisteredMigrator::load(
            Arc::new(Noop {
                name,
                max_processes,
            }),
            Arc::clone(store),
        )
        .unwrap()
    }

    /// Completes the default branch of every feedstock it sees, once.
    #[derive(Default)]
    struct FakeWork {
        seen: Mutex<Vec<String>>,
        api_calls: bool,
        panic_on: Option<&'static str>,
        running: AtomicUsize,
        peak: AtomicUsize,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl FeedstockWork for FakeWork {
        async fn run(&self, feedstock: &str) -> FeedstockReport {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(feedstock.to_string());
            if self.panic_on == Some(feedstock) {
                panic!("worker blew up on {feedstock}");
            }
            FeedstockReport {
                feedstock: feedstock.to_string(),
                disposition: FeedstockDisposition::Migrated,
                made_api_calls: self.api_calls,
                completed: vec![CompletedUnit {
                    migrator_index: 0,
                    branch: "main".into(),
                }],
            }
        }
    }

    fn fleet(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn scheduler(
        work: Arc<FakeWork>,
        store: &Arc<dyn StateStore>,
        budget: Budget,
        workers: usize,
    ) -> (FleetScheduler, Arc<[RegisteredMigrator]>) {
        let migrators: Arc<[RegisteredMigrator]> =
            vec![registered(store, "Noop", None)].into();
        let scheduler = FleetScheduler::new(
            work,
            Arc::clone(&migrators),
            Arc::clone(store),
            SchedulerOptions::new(budget, workers),
        );
        (scheduler, migrators)
    }

    fn generous() -> Budget {
        Budget {
            max_seconds: Duration::from_secs(3600),
            max_migrate: 100,
        }
    }

    #[tokio::test]
    async fn pass_resumes_after_cursor_and_records_completions() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let work = Arc::new(FakeWork::default());
        let (sched, migrators) = scheduler(Arc::clone(&work), &store, generous(), 2);

        let summary = sched
            .run_pass(&fleet(&["a", "b", "c"]), FleetCursor::at("a"))
            .await
            .unwrap();

        assert_eq!(summary.dispatched, 2);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.cursor, FleetCursor::at("c"));
        assert!(summary.wrapped);
        assert_eq!(summary.stop_reason, StopReason::FleetExhausted);

        let ledger = migrators[0].ledger();
        assert!(ledger.is_done("b", "main"));
        assert!(ledger.is_done("c", "main"));
        assert!(!ledger.is_done("a", "main"));
        assert_eq!(store.load_cursor().unwrap(), Some(FleetCursor::at("c")));

        let mut seen = work.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn cursor_at_end_starts_over() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let work = Arc::new(FakeWork::default());
        let (sched, _) = scheduler(Arc::clone(&work), &store, generous(), 1);

        let summary = sched
            .run_pass(&fleet(&["a", "b", "c"]), FleetCursor::at("c"))
            .await
            .unwrap();

        assert!(summary.wrapped);
        assert_eq!(summary.dispatched, 3);
        assert_eq!(*work.seen.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn quota_stops_dispatch_but_drains() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let work = Arc::new(FakeWork {
            api_calls: true,
            ..Default::default()
        });
        let budget = Budget {
            max_seconds: Duration::from_secs(3600),
            max_migrate: 1,
        };
        let (sched, _) = scheduler(Arc::clone(&work), &store, budget, 1);

        let summary = sched
            .run_pass(&fleet(&["a", "b", "c"]), FleetCursor::start())
            .await
            .unwrap();

        assert_eq!(summary.stop_reason, StopReason::MigrateQuota);
        assert_eq!(summary.dispatched, 1);
        assert_eq!(summary.pushed_or_api, 1);
        assert_eq!(summary.cursor, FleetCursor::at("a"));
        assert!(!summary.wrapped);
    }

    #[tokio::test]
    async fn exhausted_time_budget_dispatches_nothing_and_keeps_cursor() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let work = Arc::new(FakeWork::default());
        let budget = Budget {
            max_seconds: Duration::ZERO,
            max_migrate: 100,
        };
        let (sched, _) = scheduler(Arc::clone(&work), &store, budget, 2);

        let summary = sched
            .run_pass(&fleet(&["a", "b"]), FleetCursor::at("a"))
            .await
            .unwrap();

        assert_eq!(summary.stop_reason, StopReason::TimeBudget);
        assert_eq!(summary.dispatched, 0);
        assert_eq!(summary.cursor, FleetCursor::at("a"));
        assert_eq!(store.load_cursor().unwrap(), Some(FleetCursor::at("a")));
    }

    #[tokio::test]
    async fn crashed_worker_is_not_recorded_and_pass_continues() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let work = Arc::new(FakeWork {
            panic_on: Some("c"),
            ..Default::default()
        });
        let (sched, migrators) = scheduler(Arc::clone(&work), &store, generous(), 1);

        let summary = sched
            .run_pass(&fleet(&["a", "b", "c"]), FleetCursor::start())
            .await
            .unwrap();

        assert_eq!(summary.processed, 3);
        assert!(migrators[0].ledger().is_done("b", "main"));
        assert!(!migrators[0].ledger().is_done("c", "main"));
        // "c" crashed so the cursor stops at the furthest clean finish.
        assert_eq!(summary.cursor, FleetCursor::at("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn pool_never_exceeds_worker_count() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let work = Arc::new(FakeWork {
            delay: Some(Duration::from_secs(1)),
            ..Default::default()
        });
        let (sched, _) = scheduler(Arc::clone(&work), &store, generous(), 2);

        let summary = sched
            .run_pass(&fleet(&["a", "b", "c", "d", "e"]), FleetCursor::start())
            .await
            .unwrap();

        assert_eq!(summary.processed, 5);
        assert_eq!(work.peak.load(Ordering::SeqCst), 2);
        assert_eq!(summary.cursor, FleetCursor::at("e"));
    }

    #[test]
    fn worker_count_takes_smallest_cap() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let free = registered(&store, "Free", None);
        let single = registered(&store, "Single", Some(1));

        assert_eq!(worker_count(&[free.clone()], None, 2, false), 2);
        assert_eq!(worker_count(&[free.clone(), single], None, 2, false), 1);
        assert_eq!(worker_count(&[free.clone()], Some(1), 4, false), 1);
        assert_eq!(worker_count(&[free.clone()], Some(0), 4, false), 4);
        assert_eq!(worker_count(&[free.clone()], Some(8), 0, false), 1);
        assert_eq!(worker_count(&[free], None, 4, true), 1);
    }
}
