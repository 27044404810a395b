//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use rbac_authz::{
    AuthzError, DimensionKind, DimensionRef, DimensionStore, EngineConfig, InMemoryStore, Page,
    Policy, PolicyId, PolicyStore, PolicyTuple, PolicyWithRelations, RbacEngine, Result, UserId,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Install a test-writer subscriber once; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("rbac_authz=debug")
        .with_test_writer()
        .try_init();
}

/// Seed one active row per (kind, name)
pub async fn seed(store: &InMemoryStore, rows: &[(DimensionKind, &str)]) {
    for (kind, name) in rows {
        store
            .create_dimension(*kind, name, "", None)
            .await
            .expect("seed dimension");
    }
}

/// Role "admin", permissions "read"/"write", resource "user", scope "global"
pub async fn seeded_engine() -> (RbacEngine, Arc<InMemoryStore>) {
    init_tracing();
    let (engine, store) = RbacEngine::in_memory(EngineConfig::default());
    seed(
        &store,
        &[
            (DimensionKind::Role, "admin"),
            (DimensionKind::Permission, "read"),
            (DimensionKind::Permission, "write"),
            (DimensionKind::Resource, "user"),
            (DimensionKind::Scope, "global"),
        ],
    )
    .await;
    (engine, store)
}

/// Resolve a tuple by names against the store
pub async fn tuple_of(
    store: &InMemoryStore,
    role: &str,
    permission: &str,
    resource: &str,
    scope: &str,
) -> PolicyTuple {
    let mut ids = Vec::with_capacity(4);
    for (kind, name) in [
        (DimensionKind::Role, role),
        (DimensionKind::Permission, permission),
        (DimensionKind::Resource, resource),
        (DimensionKind::Scope, scope),
    ] {
        let found: Option<DimensionRef> = store.find_active_by_name(kind, name).await.unwrap();
        ids.push(found.expect("dimension seeded").id);
    }
    PolicyTuple {
        role_id: ids[0],
        permission_id: ids[1],
        resource_id: ids[2],
        scope_id: ids[3],
    }
}

/// Store that starts failing every policy write after a number of successful ones
pub struct FlakyStore {
    inner: InMemoryStore,
    writes_allowed: usize,
    writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: InMemoryStore, writes_allowed: usize) -> Self {
        Self {
            inner,
            writes_allowed,
            writes: AtomicUsize::new(0),
        }
    }

    fn check_write(&self) -> Result<()> {
        if self.writes.fetch_add(1, Ordering::SeqCst) >= self.writes_allowed {
            return Err(AuthzError::Storage("connection reset by peer".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DimensionStore for FlakyStore {
    async fn find_active_by_name(
        &self,
        kind: DimensionKind,
        name: &str,
    ) -> Result<Option<DimensionRef>> {
        self.inner.find_active_by_name(kind, name).await
    }
}

#[async_trait]
impl PolicyStore for FlakyStore {
    async fn create(
        &self,
        tuple: PolicyTuple,
        description: Option<String>,
        actor: Option<UserId>,
    ) -> Result<Policy> {
        self.check_write()?;
        self.inner.create(tuple, description, actor).await
    }

    async fn get(&self, id: PolicyId) -> Result<Option<Policy>> {
        self.inner.get(id).await
    }

    async fn find_active(&self, tuple: &PolicyTuple) -> Result<Option<Policy>> {
        self.inner.find_active(tuple).await
    }

    async fn find_any(&self, tuple: &PolicyTuple) -> Result<Option<Policy>> {
        self.inner.find_any(tuple).await
    }

    async fn restore(
        &self,
        id: PolicyId,
        description: Option<String>,
        actor: Option<UserId>,
    ) -> Result<Policy> {
        self.check_write()?;
        self.inner.restore(id, description, actor).await
    }

    async fn soft_delete(&self, id: PolicyId, actor: Option<UserId>) -> Result<Policy> {
        self.check_write()?;
        self.inner.soft_delete(id, actor).await
    }

    async fn list_active(&self, page: u32, limit: u32) -> Result<Page<Policy>> {
        self.inner.list_active(page, limit).await
    }

    async fn list_active_with_relations(&self) -> Result<Vec<PolicyWithRelations>> {
        self.inner.list_active_with_relations().await
    }
}

/// Store whose `find_any` misses, simulating a row inserted by a concurrent
/// writer between the lookup and the insert
pub struct RacingStore {
    pub inner: InMemoryStore,
}

#[async_trait]
impl DimensionStore for RacingStore {
    async fn find_active_by_name(
        &self,
        kind: DimensionKind,
        name: &str,
    ) -> Result<Option<DimensionRef>> {
        self.inner.find_active_by_name(kind, name).await
    }
}

#[async_trait]
impl PolicyStore for RacingStore {
    async fn create(
        &self,
        tuple: PolicyTuple,
        description: Option<String>,
        actor: Option<UserId>,
    ) -> Result<Policy> {
        self.inner.create(tuple, description, actor).await
    }

    async fn get(&self, id: PolicyId) -> Result<Option<Policy>> {
        self.inner.get(id).await
    }

    async fn find_active(&self, tuple: &PolicyTuple) -> Result<Option<Policy>> {
        self.inner.find_active(tuple).await
    }

    async fn find_any(&self, _tuple: &PolicyTuple) -> Result<Option<Policy>> {
        Ok(None)
    }

    async fn restore(
        &self,
        id: PolicyId,
        description: Option<String>,
        actor: Option<UserId>,
    ) -> Result<Policy> {
        self.inner.restore(id, description, actor).await
    }

    async fn soft_delete(&self, id: PolicyId, actor: Option<UserId>) -> Result<Policy> {
        self.inner.soft_delete(id, actor).await
    }

    async fn list_active(&self, page: u32, limit: u32) -> Result<Page<Policy>> {
        self.inner.list_active(page, limit).await
    }

    async fn list_active_with_relations(&self) -> Result<Vec<PolicyWithRelations>> {
        self.inner.list_active_with_relations().await
    }
}
