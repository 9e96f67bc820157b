//! Fleet discovery.
//!
//! The fleet is every repository of the organization whose name carries the
//! feedstock suffix, split into active and archived. Listing the whole
//! organization takes minutes and spends API quota, so the listing is cached
//! in `all_feedstocks.json` and only refreshed on even UTC hours.

use std::sync::Arc;
use std::time::{Duration, Instant};

use admin_state::{FleetList, StateStore};
use async_trait::async_trait;
use tracing::info;

use crate::domain::error::Result;
use crate::domain::feedstock::feedstock_from_repo_name;
use crate::github::{GitHubClient, RepoInfo};

/// Source of the fleet listing.
#[async_trait]
pub trait FleetSource: Send + Sync {
    async fn list(&self) -> Result<FleetList>;
}

/// Lists the organization through the hosting API.
pub struct GitHubFleetSource {
    client: GitHubClient,
    org: String,
    suffix: String,
}

impl GitHubFleetSource {
    pub fn new(client: GitHubClient, org: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            client,
            org: org.into(),
            suffix: suffix.into(),
        }
    }
}

#[async_trait]
impl FleetSource for GitHubFleetSource {
    async fn list(&self) -> Result<FleetList> {
        info!(org = %self.org, "getting all feedstocks");
        let repos = self.client.list_org_repos(&self.org).await?;
        Ok(partition_repos(repos, &self.suffix))
    }
}

/// A fixed listing.
pub struct StaticFleetSource(pub FleetList);

#[async_trait]
impl FleetSource for StaticFleetSource {
    async fn list(&self) -> Result<FleetList> {
        Ok(self.0.clone())
    }
}

/// Keep repositories following the suffix convention and split them by
/// archive status.
pub fn partition_repos(repos: impl IntoIterator<Item = RepoInfo>, suffix: &str) -> FleetList {
    let mut active = Vec::new();
    let mut archived = Vec::new();
    for repo in repos {
        if let Some(feedstock) = feedstock_from_repo_name(&repo.name, suffix) {
            if repo.archived {
                archived.push(feedstock);
            } else {
                active.push(feedstock);
            }
        }
    }
    FleetList::new(active, archived)
}

/// Whether this run should list the fleet instead of using the cache.
pub fn should_refresh(utc_hour: u32, cache_present: bool, debug: bool) -> bool {
    !debug && (utc_hour % 2 == 0 || !cache_present)
}

/// Fleet listing for this run and the time spent producing it.
#[derive(Debug, Clone)]
pub struct LoadedFleet {
    pub fleet: FleetList,
    pub refreshed: bool,
    pub elapsed: Duration,
}

/// Load the fleet, refreshing and persisting the cached listing when the
/// cache policy says so.
pub async fn load_fleet(
    store: &Arc<dyn StateStore>,
    source: &dyn FleetSource,
    utc_hour: u32,
    debug: bool,
) -> Result<LoadedFleet> {
    let cached = store.load_fleet()?;
    if !should_refresh(utc_hour, cached.is_some(), debug) {
        if let Some(cached) = cached {
            // The cache file may be hand-edited or written by an older run.
            let fleet = FleetList::new(cached.active, cached.archived);
            info!(active = fleet.active.len(), "using cached feedstock list");
            return Ok(LoadedFleet {
                fleet,
                refreshed: false,
                elapsed: Duration::ZERO,
            });
        }
    }

    // Debug runs without a cache still need a listing; they use the source
    // but never persist it.
    let started = Instant::now();
    let listed = source.list().await?;
    let fleet = FleetList::new(listed.active, listed.archived);
    let elapsed = started.elapsed();
    if !debug {
        store.save_fleet(&fleet)?;
    }
    info!(
        active = fleet.active.len(),
        archived = fleet.archived.len(),
        seconds = elapsed.as_secs_f64(),
        "refreshed feedstock list"
    );
    Ok(LoadedFleet {
        fleet,
        refreshed: true,
        elapsed,
    })
}
