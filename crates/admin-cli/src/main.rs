//! `run-admin-migrations`: one scheduled pass of the admin migrations.
//!
//! Walks the feedstock fleet from the saved cursor, applies every enabled
//! migrator to every branch, and commits the state documents back to the
//! job's own repository when done.
//!
//! ## Environment
//!
//! - `GITHUB_TOKEN`: API and push credential
//! - `DEBUG_ADMIN_MIGRATIONS`: any value turns on debug mode
//! - `CPU_COUNT`: upper bound on the worker pool
//! - `ADMIN_MIGRATIONS_CONFIG`: path of the TOML config

use std::path::PathBuf;
use std::sync::Arc;

use admin_core::{
    init_tracing, AdminConfig, AdminMigrationJob, ArchivedRepoOracle, GitHubArchiveSource,
    GitHubClient, GitHubFleetSource, JobSettings, RegisteredMigrator,
};
use admin_migrators::{build_migrators, default_descriptors, MigratorDeps};
use admin_state::{JsonStateStore, StateStore};
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};

const DEBUG_ENV: &str = "DEBUG_ADMIN_MIGRATIONS";

#[derive(Parser, Debug)]
#[command(name = "run-admin-migrations")]
#[command(author = "Admin Migrations Maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Apply admin migrations across the feedstock fleet", long_about = None)]
struct Cli {
    /// Token for the hosting API and for pushes
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Restrict the run to the debug feedstocks (also DEBUG_ADMIN_MIGRATIONS)
    #[arg(long)]
    debug: bool,

    /// Cap the worker pool; ignored unless a positive integer
    #[arg(long, env = "CPU_COUNT")]
    cpu_count: Option<String>,

    /// Run configuration
    #[arg(
        long,
        env = "ADMIN_MIGRATIONS_CONFIG",
        default_value = "admin-migrations.toml"
    )]
    config: PathBuf,

    /// Directory holding the state documents
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Checkout of the job's own repository
    #[arg(long, default_value = ".")]
    repo_root: PathBuf,

    /// Skip committing the state documents at the end
    #[arg(long)]
    no_checkpoint: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// The environment switch counts by presence, whatever its value.
    fn debug_enabled(&self) -> bool {
        self.debug || std::env::var_os(DEBUG_ENV).is_some()
    }
}

fn parse_cpu_count(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
}

/// The shared oracle and the configured migrators, bound to `store`.
fn build_registry(
    config: &AdminConfig,
    client: &GitHubClient,
    store: Arc<dyn StateStore>,
) -> Result<(Arc<ArchivedRepoOracle>, Vec<RegisteredMigrator>)> {
    let oracle = Arc::new(ArchivedRepoOracle::with_defaults(Arc::new(
        GitHubArchiveSource::new(client.clone(), config.org(), config.feedstock_suffix()),
    )));
    let deps = MigratorDeps::github(
        client.clone(),
        Arc::clone(&oracle),
        config.org(),
        config.feedstock_suffix(),
    );
    let descriptors = config
        .migrators
        .clone()
        .unwrap_or_else(default_descriptors);
    let migrators =
        build_migrators(&descriptors, &deps, store).context("Failed to build migrators")?;
    Ok((oracle, migrators))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let debug = cli.debug_enabled();
    init_tracing(cli.json, admin_core::telemetry::level_for(cli.verbose, debug));

    let config = AdminConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let client =
        GitHubClient::new(cli.token.clone()).context("Failed to build GitHub client")?;
    if !client.has_token() {
        warn!("no GITHUB_TOKEN set; API calls and pushes will fail");
    }

    let data_dir = cli.repo_root.join(&cli.data_dir);
    let store: Arc<dyn StateStore> = Arc::new(
        JsonStateStore::new(&data_dir)
            .with_context(|| format!("Failed to open state in {}", data_dir.display()))?,
    );
    let (oracle, migrators) = build_registry(&config, &client, Arc::clone(&store))?;
    let fleet_source = Arc::new(GitHubFleetSource::new(
        client,
        config.org(),
        config.feedstock_suffix(),
    ));

    let settings = JobSettings {
        debug,
        token: cli.token,
        cpu_count: parse_cpu_count(cli.cpu_count.as_deref()),
        repo_root: cli.repo_root,
        data_dir,
        now: Utc::now(),
        checkpoint: !cli.no_checkpoint,
    };
    let report = AdminMigrationJob::new(config, settings, store, fleet_source, oracle)
        .run(migrators)
        .await
        .context("Admin migration run failed")?;

    info!(
        processed = report.summary.processed,
        dispatched = report.summary.dispatched,
        pushed_or_api = report.summary.pushed_or_api,
        workers = report.workers,
        wrapped = report.summary.wrapped,
        stop_reason = ?report.summary.stop_reason,
        fleet_refreshed = report.fleet_refreshed,
        checkpoint = report.checkpoint.as_deref().unwrap_or("none"),
        "admin migrations finished"
    );
    Ok(())
}
