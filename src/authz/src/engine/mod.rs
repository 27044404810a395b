//! Query-facing RBAC engine
//!
//! Wires the dimension store, policy store, authorization cache and ACL
//! reconciler behind the interface consumed by the HTTP layer.

pub mod cache;
pub mod reconcile;

pub use cache::{AuthorizationCache, CacheStats};
pub use reconcile::{AclReconciler, IntentOutcome, ReconcileReport};

use crate::config::EngineConfig;
use crate::dimension::DimensionStore;
use crate::error::Result;
use crate::policy::{InMemoryStore, PolicyStore};
use crate::types::{AclIntent, Page, Policy, PolicyId, UserId};

use std::sync::Arc;
use tracing::{debug, info};

/// Main RBAC engine
///
/// # Architecture
///
/// ```text
/// reconcile → AclReconciler → PolicyStore ──┐
///                  ↓                         ↓
///             invalidate ──→ AuthorizationCache → PolicyIndex::build
///                                  ↑
/// authorize ───────────────────────┘
/// ```
pub struct RbacEngine {
    /// Cache-aside holder of the compiled index
    cache: Arc<AuthorizationCache>,

    /// Batch grant/revoke
    reconciler: AclReconciler,

    /// Policy storage backend
    policy_store: Arc<dyn PolicyStore>,

    /// Engine configuration
    config: EngineConfig,
}

impl RbacEngine {
    /// Create an engine over explicit stores
    pub fn new(
        config: EngineConfig,
        dimension_store: Arc<dyn DimensionStore>,
        policy_store: Arc<dyn PolicyStore>,
    ) -> Self {
        let cache = Arc::new(AuthorizationCache::new(
            Arc::clone(&policy_store),
            &config.cache,
        ));
        let reconciler = AclReconciler::new(
            dimension_store,
            Arc::clone(&policy_store),
            Arc::clone(&cache),
        );

        info!("RbacEngine initialized with cache ttl={:?}", config.cache.ttl());

        Self {
            cache,
            reconciler,
            policy_store,
            config,
        }
    }

    /// Create an engine over a store serving both dimensions and policies
    pub fn with_store<S>(config: EngineConfig, store: Arc<S>) -> Self
    where
        S: DimensionStore + PolicyStore + 'static,
    {
        Self::new(config, store.clone(), store)
    }

    /// Create an engine backed by a fresh in-memory store.
    /// The store is returned for seeding dimensions.
    pub fn in_memory(config: EngineConfig) -> (Self, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (Self::with_store(config, Arc::clone(&store)), store)
    }

    /// Connect to PostgreSQL using `config.database` and run migrations
    #[cfg(feature = "postgres")]
    pub async fn connect(config: EngineConfig) -> Result<Self> {
        use crate::error::AuthzError;
        use crate::policy::PostgresStore;

        let database = config
            .database
            .as_ref()
            .ok_or_else(|| AuthzError::Config("database settings are required".to_string()))?;

        let store = Arc::new(PostgresStore::connect(database).await?);
        store.run_migrations().await?;

        Ok(Self::with_store(config, store))
    }

    /// Whether `role` may exercise `permission` on `resource` within `scope`.
    /// Names are matched after trimming, ignoring case.
    pub async fn authorize(
        &self,
        role: &str,
        permission: &str,
        resource: &str,
        scope: &str,
    ) -> Result<bool> {
        let allowed = self.cache.authorize(role, permission, resource, scope).await?;
        debug!(
            "Authorization {}/{}/{}/{}: {}",
            role,
            permission,
            resource,
            scope,
            if allowed { "ALLOW" } else { "DENY" }
        );
        Ok(allowed)
    }

    /// Id of the policy that authorizes the request, if any
    pub async fn lookup(
        &self,
        role: &str,
        permission: &str,
        resource: &str,
        scope: &str,
    ) -> Result<Option<PolicyId>> {
        self.cache.lookup(role, permission, resource, scope).await
    }

    /// Apply a batch of grant/revoke intents
    pub async fn reconcile(
        &self,
        intents: &[AclIntent],
        actor: Option<UserId>,
    ) -> Result<ReconcileReport> {
        self.reconciler.reconcile(intents, actor).await
    }

    /// Apply a batch, recording outcomes into `report` even when the batch
    /// aborts
    pub async fn reconcile_into(
        &self,
        intents: &[AclIntent],
        actor: Option<UserId>,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        self.reconciler.reconcile_into(intents, actor, report).await
    }

    /// Drop the cached index. Call after mutating policies or dimensions
    /// outside [`RbacEngine::reconcile`].
    pub fn invalidate_authorization_cache(&self) {
        self.cache.invalidate();
    }

    /// Active policies, offset-paginated by creation time
    pub async fn list_policies(&self, page: u32, limit: u32) -> Result<Page<Policy>> {
        self.policy_store.list_active(page, limit).await
    }

    /// Get cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
