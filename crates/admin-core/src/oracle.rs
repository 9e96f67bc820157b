//! Archived-repository oracle.
//!
//! Pushing to an archived repository always fails, so the runner asks the
//! oracle before every push. Lookups go through a bounded retry policy and
//! definite answers are memoized in a bounded cache owned by the oracle.
//! A lookup that keeps failing yields [`ArchiveStatus::Unknown`], which the
//! runner treats as "defer the push", never as "not archived".

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::error::Result;
use crate::github::GitHubClient;

/// Default number of memoized lookups.
pub const DEFAULT_CACHE_CAPACITY: usize = 20_000;

/// Archive status of a feedstock's hosting repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveStatus {
    Active,
    Archived,
    /// Lookup failed on every attempt.
    Unknown,
}

/// Raw archived-status lookup.
#[async_trait]
pub trait ArchiveStatusSource: Send + Sync {
    async fn is_archived(&self, feedstock: &str) -> Result<bool>;
}

/// Looks up `archived` on the hosting API.
pub struct GitHubArchiveSource {
    client: GitHubClient,
    org: String,
    suffix: String,
}

impl GitHubArchiveSource {
    pub fn new(client: GitHubClient, org: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            client,
            org: org.into(),
            suffix: suffix.into(),
        }
    }
}

#[async_trait]
impl ArchiveStatusSource for GitHubArchiveSource {
    async fn is_archived(&self, feedstock: &str) -> Result<bool> {
        let repo = crate::domain::feedstock::repo_name(feedstock, &self.suffix);
        Ok(self.client.get_repo(&self.org, &repo).await?.archived)
    }
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Insertion-ordered map that evicts its oldest entry past `capacity`.
struct BoundedCache {
    capacity: usize,
    entries: HashMap<String, bool>,
    order: VecDeque<String>,
}

impl BoundedCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &str) -> Option<bool> {
        self.entries.get(key).copied()
    }

    fn insert(&mut self, key: &str, value: bool) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.to_string(), value).is_none() {
            self.order.push_back(key.to_string());
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Memoizing, retrying archived-status oracle shared by all workers.
pub struct ArchivedRepoOracle {
    source: Arc<dyn ArchiveStatusSource>,
    policy: RetryPolicy,
    cache: Mutex<BoundedCache>,
}

impl ArchivedRepoOracle {
    pub fn new(source: Arc<dyn ArchiveStatusSource>, policy: RetryPolicy, capacity: usize) -> Self {
        Self {
            source,
            policy,
            cache: Mutex::new(BoundedCache::new(capacity)),
        }
    }

    pub fn with_defaults(source: Arc<dyn ArchiveStatusSource>) -> Self {
        Self::new(source, RetryPolicy::default(), DEFAULT_CACHE_CAPACITY)
    }

    /// Archive status of `feedstock`, from cache when possible.
    pub async fn status(&self, feedstock: &str) -> ArchiveStatus {
        if let Some(archived) = self.cached(feedstock) {
            return to_status(archived);
        }

        for attempt in 1..=self.policy.max_attempts {
            match self.source.is_archived(feedstock).await {
                Ok(archived) => {
                    self.lock_cache().insert(feedstock, archived);
                    return to_status(archived);
                }
                Err(e) => {
                    warn!(feedstock = %feedstock, attempt, error = %e, "archived-status lookup failed");
                    if attempt < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.backoff(attempt)).await;
                    }
                }
            }
        }
        ArchiveStatus::Unknown
    }

    /// Number of memoized lookups.
    pub fn cached_entries(&self) -> usize {
        self.lock_cache().len()
    }

    fn cached(&self, feedstock: &str) -> Option<bool> {
        self.lock_cache().get(feedstock)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, BoundedCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn to_status(archived: bool) -> ArchiveStatus {
    if archived {
        ArchiveStatus::Archived
    } else {
        ArchiveStatus::Active
    }
}
