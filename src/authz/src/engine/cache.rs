//! Cache-aside holder for the process-wide policy index

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::index::PolicyIndex;
use crate::policy::PolicyStore;
use crate::types::PolicyId;

/// Cached index with TTL
#[derive(Clone)]
struct CachedIndex {
    index: Arc<PolicyIndex>,
    built_at: Instant,
}

impl CachedIndex {
    fn new(index: Arc<PolicyIndex>) -> Self {
        Self {
            index,
            built_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.built_at.elapsed() >= ttl
    }
}

/// Time-bounded cache around the index builder
///
/// Holds a single entry. A miss fetches every active policy, compiles a new
/// [`PolicyIndex`] and swaps it in whole; the cached value is never mutated.
/// Concurrent misses may each rebuild. Every build is pure over the store
/// contents, so the last writer simply wins.
///
/// Invalidation bumps a generation counter. A rebuild that started before an
/// invalidation still answers its own caller but is not installed.
pub struct AuthorizationCache {
    /// Source of truth
    policy_store: Arc<dyn PolicyStore>,

    /// The one cached index
    entry: RwLock<Option<CachedIndex>>,

    /// Incremented by every invalidation
    generation: AtomicU64,

    ttl: Duration,

    /// Cache statistics
    stats: Arc<DashMap<&'static str, usize>>,
}

impl AuthorizationCache {
    /// Create an empty cache over a policy store
    pub fn new(policy_store: Arc<dyn PolicyStore>, config: &CacheConfig) -> Self {
        Self {
            policy_store,
            entry: RwLock::new(None),
            generation: AtomicU64::new(0),
            ttl: config.ttl(),
            stats: Arc::new(DashMap::new()),
        }
    }

    /// Get the current index, rebuilding it on miss or expiry
    pub async fn get_index(&self) -> Result<Arc<PolicyIndex>> {
        if let Some(index) = self.cached() {
            self.increment_stat("hits");
            return Ok(index);
        }
        self.increment_stat("misses");

        let generation = self.generation.load(Ordering::Acquire);
        let start = Instant::now();

        let policies = self.policy_store.list_active_with_relations().await?;
        let index = Arc::new(PolicyIndex::build(&policies));

        {
            let mut entry = self.entry.write();
            if self.generation.load(Ordering::Acquire) == generation {
                *entry = Some(CachedIndex::new(Arc::clone(&index)));
            } else {
                debug!("Policy index invalidated during rebuild, not caching");
            }
        }
        self.increment_stat("rebuilds");

        debug!(
            "Rebuilt policy index: {} policies, {} entries in {:?}",
            policies.len(),
            index.len(),
            start.elapsed()
        );

        Ok(index)
    }

    /// Drop the cached index; the next query rebuilds it
    pub fn invalidate(&self) {
        let mut entry = self.entry.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        *entry = None;
        drop(entry);

        self.increment_stat("invalidations");
        info!("Authorization cache invalidated");
    }

    /// Whether `role` may exercise `permission` on `resource` within `scope`
    pub async fn authorize(
        &self,
        role: &str,
        permission: &str,
        resource: &str,
        scope: &str,
    ) -> Result<bool> {
        Ok(self.lookup(role, permission, resource, scope).await?.is_some())
    }

    /// Id of the policy authorizing the request, if any
    pub async fn lookup(
        &self,
        role: &str,
        permission: &str,
        resource: &str,
        scope: &str,
    ) -> Result<Option<PolicyId>> {
        let index = self.get_index().await?;
        Ok(index.lookup(role, resource, permission, scope))
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.get_stat("hits"),
            misses: self.get_stat("misses"),
            expirations: self.get_stat("expirations"),
            rebuilds: self.get_stat("rebuilds"),
            invalidations: self.get_stat("invalidations"),
        }
    }

    fn cached(&self) -> Option<Arc<PolicyIndex>> {
        let entry = self.entry.read();
        let cached = entry.as_ref()?;
        if cached.is_expired(self.ttl) {
            drop(entry);
            self.increment_stat("expirations");
            return None;
        }
        Some(Arc::clone(&cached.index))
    }

    fn increment_stat(&self, key: &'static str) {
        self.stats
            .entry(key)
            .and_modify(|count| *count += 1)
            .or_insert(1);
    }

    fn get_stat(&self, key: &'static str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub rebuilds: usize,
    pub invalidations: usize,
}

impl CacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
