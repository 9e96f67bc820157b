//! End-to-end passes over a fleet of local bare repositories.

mod common;

use std::sync::Arc;

use admin_core::{
    AdminMigrationJob, FeedstockDisposition, FeedstockRunner, FleetCursor, FleetList, JobReport,
    JobSettings, MigrationContext, MigrationOutcome, Migrator, RegisteredMigrator, StateStore,
    StaticFleetSource, StopReason, CI_SKIP_PREFIX,
};
use admin_state::fakes::MemoryStateStore;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use common::{FixedArchive, HostedFleet};

/// Writes `<name>.txt` with the branch name and asks for a commit.
struct Stamp {
    name: &'static str,
    main_only: bool,
}

#[async_trait]
impl Migrator for Stamp {
    fn name(&self) -> &str {
        self.name
    }

    fn main_branch_only(&self) -> bool {
        self.main_only
    }

    async fn migrate(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<MigrationOutcome> {
        let file = format!("{}.txt", self.name);
        std::fs::write(ctx.path(&file), ctx.branch)?;
        ctx.git.add(&[file.as_str()]).await?;
        Ok(MigrationOutcome::done().with_commit(true))
    }
}

/// Fails (or panics) on one feedstock; otherwise done without changes.
struct Flaky {
    bad: &'static str,
    panic: bool,
}

#[async_trait]
impl Migrator for Flaky {
    fn name(&self) -> &str {
        "Flaky"
    }

    async fn migrate(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<MigrationOutcome> {
        if ctx.feedstock == self.bad {
            if self.panic {
                panic!("migrator bug on {}", ctx.feedstock);
            }
            anyhow::bail!("cannot migrate {}", ctx.feedstock);
        }
        Ok(MigrationOutcome::done())
    }
}

fn store() -> Arc<dyn StateStore> {
    Arc::new(MemoryStateStore::new())
}

fn settings() -> JobSettings {
    JobSettings {
        debug: false,
        token: None,
        cpu_count: None,
        repo_root: std::env::temp_dir(),
        data_dir: std::env::temp_dir(),
        // Minute zero of an odd hour: full budget, cached listing preferred.
        now: Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap(),
        checkpoint: false,
    }
}

fn register(store: &Arc<dyn StateStore>, migrator: impl Migrator + 'static) -> RegisteredMigrator {
    RegisteredMigrator::load(Arc::new(migrator), Arc::clone(store)).unwrap()
}

async fn run_job(
    hosted: &HostedFleet,
    store: &Arc<dyn StateStore>,
    feedstocks: &[&str],
    archive: FixedArchive,
    migrators: Vec<RegisteredMigrator>,
) -> JobReport {
    let fleet = FleetList::new(feedstocks.iter().map(|s| s.to_string()).collect(), vec![]);
    let job = AdminMigrationJob::new(
        hosted.config(),
        settings(),
        Arc::clone(store),
        Arc::new(StaticFleetSource(fleet)),
        archive.oracle(),
    );
    job.run(migrators).await.unwrap()
}

#[tokio::test]
async fn pass_resumes_after_cursor_and_wraps_at_the_end() {
    let hosted = HostedFleet::new();
    for name in ["a", "b", "c"] {
        hosted.add(name, &[], true);
    }
    let store = store();
    store.save_cursor(&FleetCursor::at("a")).unwrap();

    let stamp = register(&store, Stamp { name: "Stamp", main_only: false });
    let report = run_job(
        &hosted,
        &store,
        &["a", "b", "c"],
        FixedArchive::active(),
        vec![stamp],
    )
    .await;

    assert_eq!(report.summary.dispatched, 2);
    assert_eq!(report.summary.cursor, FleetCursor::at("c"));
    assert!(report.summary.wrapped);
    assert_eq!(report.summary.stop_reason, StopReason::FleetExhausted);
    assert_eq!(store.load_cursor().unwrap(), Some(FleetCursor::at("c")));

    let ledger = store.load_ledger("Stamp").unwrap();
    assert!(ledger.get("b", "main"));
    assert!(ledger.get("c", "main"));
    assert!(!ledger.get("a", "main"));

    let subjects = hosted.subjects("b", "main");
    assert!(subjects[0].starts_with(CI_SKIP_PREFIX));
    assert!(subjects[0].ends_with("admin migration Stamp"));
    assert_eq!(hosted.subjects("a", "main"), vec!["initial"]);

    // Next run starts over; only "a" still needs work.
    let stamp = register(&store, Stamp { name: "Stamp", main_only: false });
    let report = run_job(
        &hosted,
        &store,
        &["a", "b", "c"],
        FixedArchive::active(),
        vec![stamp],
    )
    .await;
    assert_eq!(report.summary.dispatched, 3);
    assert!(store.load_ledger("Stamp").unwrap().get("a", "main"));
    assert_eq!(hosted.subjects("a", "main").len(), 2);
    assert_eq!(hosted.subjects("b", "main").len(), 2);
}

#[tokio::test]
async fn main_branch_only_migrators_skip_other_branches() {
    let hosted = HostedFleet::new();
    hosted.add("pkg", &["1.x"], true);
    let store = store();

    let everywhere = register(&store, Stamp { name: "Everywhere", main_only: false });
    let main_only = register(&store, Stamp { name: "MainOnly", main_only: true });
    run_job(
        &hosted,
        &store,
        &["pkg"],
        FixedArchive::active(),
        vec![everywhere, main_only],
    )
    .await;

    let everywhere = store.load_ledger("Everywhere").unwrap();
    assert!(everywhere.get("pkg", "main"));
    assert!(everywhere.get("pkg", "1.x"));

    let main_only = store.load_ledger("MainOnly").unwrap();
    assert!(main_only.get("pkg", "main"));
    assert!(!main_only.get("pkg", "1.x"));

    // Migrators commit in configured order on the default branch.
    let subjects = hosted.subjects("pkg", "main");
    assert!(subjects[0].ends_with("admin migration MainOnly"));
    assert!(subjects[1].ends_with("admin migration Everywhere"));
    assert_eq!(hosted.subjects("pkg", "1.x").len(), 2);
}

#[tokio::test]
async fn remote_only_branches_get_a_tracking_checkout() {
    let hosted = HostedFleet::new();
    hosted.add("pkg", &["2.x", "3.x"], true);
    let store = store();

    let stamp = register(&store, Stamp { name: "Stamp", main_only: false });
    run_job(&hosted, &store, &["pkg"], FixedArchive::active(), vec![stamp]).await;

    let ledger = store.load_ledger("Stamp").unwrap();
    for branch in ["main", "2.x", "3.x"] {
        assert!(ledger.get("pkg", branch), "{branch} not recorded");
        let subjects = hosted.subjects("pkg", branch);
        assert_eq!(subjects.len(), 2, "{branch}: {subjects:?}");
        assert!(subjects[0].ends_with("admin migration Stamp"));
    }
}

#[cfg(unix)]
#[tokio::test]
async fn rejected_push_leaves_the_unit_for_the_next_run() {
    let hosted = HostedFleet::new();
    hosted.add("pkg", &[], true);
    hosted.reject_pushes("pkg");
    let store = store();

    let stamp = register(&store, Stamp { name: "Stamp", main_only: false });
    let report = run_job(&hosted, &store, &["pkg"], FixedArchive::active(), vec![stamp]).await;
    assert_eq!(report.summary.dispatched, 1);
    assert!(!store.load_ledger("Stamp").unwrap().get("pkg", "main"));
    assert_eq!(hosted.subjects("pkg", "main"), vec!["initial"]);

    // Once the remote accepts pushes again the unit is retried and lands.
    hosted.accept_pushes("pkg");
    let stamp = register(&store, Stamp { name: "Stamp", main_only: false });
    let report = run_job(&hosted, &store, &["pkg"], FixedArchive::active(), vec![stamp]).await;
    assert_eq!(report.summary.dispatched, 1);
    assert!(store.load_ledger("Stamp").unwrap().get("pkg", "main"));
    assert_eq!(hosted.subjects("pkg", "main").len(), 2);
}

#[tokio::test]
async fn archived_feedstocks_are_recorded_but_not_pushed() {
    let hosted = HostedFleet::new();
    hosted.add("old", &[], true);
    let store = store();

    let stamp = register(&store, Stamp { name: "Stamp", main_only: false });
    let report = run_job(
        &hosted,
        &store,
        &["old"],
        FixedArchive::archived(&["old"]),
        vec![stamp],
    )
    .await;

    assert!(store.load_ledger("Stamp").unwrap().get("old", "main"));
    assert_eq!(hosted.subjects("old", "main"), vec!["initial"]);
    // The local commit still counts against the quota.
    assert_eq!(report.summary.pushed_or_api, 1);
}

#[tokio::test]
async fn unknown_archive_status_defers_the_unit() {
    let hosted = HostedFleet::new();
    hosted.add("pkg", &[], true);
    let store = store();

    let stamp = register(&store, Stamp { name: "Stamp", main_only: false });
    run_job(&hosted, &store, &["pkg"], FixedArchive::failing(), vec![stamp]).await;

    assert!(!store.load_ledger("Stamp").unwrap().get("pkg", "main"));
    assert_eq!(hosted.subjects("pkg", "main"), vec!["initial"]);
}

#[tokio::test]
async fn failing_units_are_isolated() {
    let hosted = HostedFleet::new();
    for name in ["a", "b", "c"] {
        hosted.add(name, &[], true);
    }
    let store = store();

    let flaky = register(&store, Flaky { bad: "a", panic: false });
    let stamp = register(&store, Stamp { name: "Stamp", main_only: false });
    let report = run_job(
        &hosted,
        &store,
        &["a", "b", "c"],
        FixedArchive::active(),
        vec![flaky, stamp],
    )
    .await;

    assert_eq!(report.summary.processed, 3);
    let flaky = store.load_ledger("Flaky").unwrap();
    assert!(!flaky.get("a", "main"));
    assert!(flaky.get("b", "main"));
    assert!(flaky.get("c", "main"));

    // A failure in one migrator does not stop the next one.
    let stamp = store.load_ledger("Stamp").unwrap();
    assert!(stamp.get("a", "main"));
    assert!(stamp.get("b", "main"));
}

#[tokio::test]
async fn panicking_migrator_does_not_take_down_the_runner() {
    let hosted = HostedFleet::new();
    hosted.add("a", &[], true);
    hosted.add("b", &[], true);
    let store = store();

    let panicky = register(&store, Flaky { bad: "a", panic: true });
    let report = run_job(
        &hosted,
        &store,
        &["a", "b"],
        FixedArchive::active(),
        vec![panicky],
    )
    .await;

    assert_eq!(report.summary.processed, 2);
    let ledger = store.load_ledger("Flaky").unwrap();
    assert!(!ledger.get("a", "main"));
    assert!(ledger.get("b", "main"));
    assert_eq!(report.summary.cursor, FleetCursor::at("b"));
}

#[tokio::test]
async fn clone_failures_and_non_recipe_repos_are_skipped() {
    let hosted = HostedFleet::new();
    hosted.add("docs", &[], false);
    let store = store();
    let stamp = register(&store, Stamp { name: "Stamp", main_only: false });
    let migrators: Arc<[RegisteredMigrator]> = vec![stamp].into();
    let runner = FeedstockRunner::new(
        Arc::clone(&migrators),
        FixedArchive::active().oracle(),
        hosted.config().remote(None),
        hosted.config().git.identity(),
    );

    let report = runner.run_feedstock("ghost").await;
    assert_eq!(report.disposition, FeedstockDisposition::CloneFailed);
    assert!(report.completed.is_empty());
    assert!(!report.made_api_calls);

    let report = runner.run_feedstock("docs").await;
    assert_eq!(report.disposition, FeedstockDisposition::NotRecipeRepo);
    assert!(report.completed.is_empty());
    assert_eq!(hosted.subjects("docs", "main"), vec!["initial"]);
}

#[tokio::test]
async fn quota_stops_dispatch_after_pushes() {
    let hosted = HostedFleet::new();
    for name in ["a", "b", "c"] {
        hosted.add(name, &[], true);
    }
    let store = store();
    let stamp = register(&store, Stamp { name: "Stamp", main_only: false });

    let fleet = FleetList::new(vec!["a".into(), "b".into(), "c".into()], vec![]);
    let mut config = hosted.config();
    config.run.max_migrate = Some(1);
    config.run.max_workers = Some(1);
    let job = AdminMigrationJob::new(
        config,
        settings(),
        Arc::clone(&store),
        Arc::new(StaticFleetSource(fleet)),
        FixedArchive::active().oracle(),
    );
    let report = job.run(vec![stamp]).await.unwrap();

    assert_eq!(report.workers, 1);
    assert_eq!(report.summary.stop_reason, StopReason::MigrateQuota);
    assert_eq!(report.summary.dispatched, 1);
    assert_eq!(report.summary.cursor, FleetCursor::at("a"));
    assert_eq!(hosted.subjects("b", "main"), vec!["initial"]);
}

#[tokio::test]
async fn debug_runs_reprocess_the_test_feedstock_without_saving_the_listing() {
    let hosted = HostedFleet::new();
    hosted.add("cf-autotick-bot-test-package", &[], true);
    let store = store();
    store.save_cursor(&FleetCursor::at("zzz")).unwrap();

    let mut persisted = admin_state::LedgerTable::new();
    persisted.mark("cf-autotick-bot-test-package", "main");
    store.save_ledger("Stamp", &persisted).unwrap();

    let stamp = register(&store, Stamp { name: "Stamp", main_only: false });
    let job = AdminMigrationJob::new(
        hosted.config(),
        JobSettings {
            debug: true,
            ..settings()
        },
        Arc::clone(&store),
        Arc::new(StaticFleetSource(FleetList::default())),
        FixedArchive::active().oracle(),
    );
    let report = job.run(vec![stamp]).await.unwrap();

    assert_eq!(report.workers, 1);
    assert!(!report.fleet_refreshed);
    assert_eq!(report.summary.dispatched, 1);
    assert_eq!(hosted.subjects("cf-autotick-bot-test-package", "main").len(), 2);
    assert!(store.load_fleet().unwrap().is_none());
}
