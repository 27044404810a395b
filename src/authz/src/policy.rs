//! Policy persistence and the in-memory store

use crate::dimension::DimensionStore;
use crate::error::{AuthzError, Result};
use crate::types::{
    name_key, Dimension, DimensionId, DimensionKind, DimensionRef, Page, Policy, PolicyId,
    PolicyTuple, PolicyWithRelations, UserId,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

/// Policy store trait
///
/// A tuple is unique across all rows, soft-deleted ones included, so a
/// revoked tuple can only come back through [`PolicyStore::restore`].
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Insert a new active row. Fails with `ConstraintViolation` when the
    /// tuple already exists in any state.
    async fn create(
        &self,
        tuple: PolicyTuple,
        description: Option<String>,
        actor: Option<UserId>,
    ) -> Result<Policy>;

    /// Get a policy by id, active or not
    async fn get(&self, id: PolicyId) -> Result<Option<Policy>>;

    /// Find the active row for a tuple
    async fn find_active(&self, tuple: &PolicyTuple) -> Result<Option<Policy>>;

    /// Find the row for a tuple regardless of its deleted flag
    async fn find_any(&self, tuple: &PolicyTuple) -> Result<Option<Policy>>;

    /// Clear the deleted flag. `None` keeps the stored description.
    async fn restore(
        &self,
        id: PolicyId,
        description: Option<String>,
        actor: Option<UserId>,
    ) -> Result<Policy>;

    /// Set the deleted flag
    async fn soft_delete(&self, id: PolicyId, actor: Option<UserId>) -> Result<Policy>;

    /// Active rows ordered by creation time, `page` is 1-based
    async fn list_active(&self, page: u32, limit: u32) -> Result<Page<Policy>>;

    /// All active rows with their dimension relations joined
    async fn list_active_with_relations(&self) -> Result<Vec<PolicyWithRelations>>;
}

/// Validate paging arguments and return the row offset of `page`
pub(crate) fn page_offset(page: u32, limit: u32) -> Result<i64> {
    if page == 0 {
        return Err(AuthzError::InvalidInput("page must be at least 1".to_string()));
    }
    if limit == 0 {
        return Err(AuthzError::InvalidInput("limit must be at least 1".to_string()));
    }
    i64::try_from(Page::<Policy>::offset(page, limit)).map_err(|_| {
        AuthzError::InvalidInput(format!("page {} with limit {} is out of range", page, limit))
    })
}

#[derive(Default)]
struct StoreState {
    dimensions: HashMap<DimensionId, Dimension>,

    /// Active dimension rows by (kind, name key)
    active_names: HashMap<(DimensionKind, String), DimensionId>,

    policies: HashMap<PolicyId, Policy>,

    /// Every tuple ever inserted, mapped to its single row
    registry: HashMap<PolicyTuple, PolicyId>,

    /// Policy ids in creation order
    order: Vec<PolicyId>,
}

impl StoreState {
    fn active_ref(&self, id: DimensionId) -> Option<DimensionRef> {
        self.dimensions
            .get(&id)
            .filter(|d| !d.is_deleted)
            .map(Dimension::to_ref)
    }

    fn policy_mut(&mut self, id: PolicyId) -> Result<&mut Policy> {
        self.policies
            .get_mut(&id)
            .ok_or_else(|| AuthzError::NotFound(format!("policy {}", id)))
    }
}

/// In-memory dimension and policy store
///
/// Keeps policies in a registry keyed by tuple, which is what enforces the
/// uniqueness constraint across active and soft-deleted rows.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a dimension row. Active names are unique per kind by [`name_key`].
    pub async fn create_dimension(
        &self,
        kind: DimensionKind,
        name: &str,
        description: &str,
        actor: Option<UserId>,
    ) -> Result<Dimension> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthzError::InvalidInput(format!("{} name must not be empty", kind)));
        }

        let mut state = self.state.write().await;
        let key = (kind, name_key(name));
        if state.active_names.contains_key(&key) {
            return Err(AuthzError::ConstraintViolation(format!(
                "{} '{}' already exists",
                kind, name
            )));
        }

        let now = Utc::now();
        let dimension = Dimension {
            id: Uuid::new_v4(),
            kind,
            name: name.to_string(),
            description: description.to_string(),
            is_deleted: false,
            created_by: actor,
            updated_by: actor,
            created_at: now,
            updated_at: now,
        };

        state.active_names.insert(key, dimension.id);
        state.dimensions.insert(dimension.id, dimension.clone());
        Ok(dimension)
    }

    /// Soft-delete a dimension row, freeing its name for reuse
    pub async fn soft_delete_dimension(
        &self,
        kind: DimensionKind,
        id: DimensionId,
        actor: Option<UserId>,
    ) -> Result<Dimension> {
        let mut state = self.state.write().await;
        let dimension = state
            .dimensions
            .get_mut(&id)
            .filter(|d| d.kind == kind && !d.is_deleted)
            .ok_or_else(|| AuthzError::NotFound(format!("{} {}", kind, id)))?;

        dimension.is_deleted = true;
        dimension.updated_by = actor;
        dimension.updated_at = Utc::now();
        let dimension = dimension.clone();

        state.active_names.remove(&(kind, name_key(&dimension.name)));
        Ok(dimension)
    }

    /// Number of rows stored for a tuple in any state (0 or 1)
    pub async fn row_count(&self, tuple: &PolicyTuple) -> usize {
        let state = self.state.read().await;
        state
            .policies
            .values()
            .filter(|p| p.tuple() == *tuple)
            .count()
    }
}

#[async_trait]
impl DimensionStore for InMemoryStore {
    async fn find_active_by_name(
        &self,
        kind: DimensionKind,
        name: &str,
    ) -> Result<Option<DimensionRef>> {
        let state = self.state.read().await;
        Ok(state
            .active_names
            .get(&(kind, name_key(name)))
            .and_then(|id| state.active_ref(*id)))
    }
}

#[async_trait]
impl PolicyStore for InMemoryStore {
    async fn create(
        &self,
        tuple: PolicyTuple,
        description: Option<String>,
        actor: Option<UserId>,
    ) -> Result<Policy> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.registry.get(&tuple) {
            return Err(AuthzError::ConstraintViolation(format!(
                "policy tuple already stored as {}",
                existing
            )));
        }

        let policy = Policy::new(tuple, description, actor);
        state.registry.insert(tuple, policy.id);
        state.order.push(policy.id);
        state.policies.insert(policy.id, policy.clone());
        Ok(policy)
    }

    async fn get(&self, id: PolicyId) -> Result<Option<Policy>> {
        let state = self.state.read().await;
        Ok(state.policies.get(&id).cloned())
    }

    async fn find_active(&self, tuple: &PolicyTuple) -> Result<Option<Policy>> {
        Ok(self.find_any(tuple).await?.filter(Policy::is_active))
    }

    async fn find_any(&self, tuple: &PolicyTuple) -> Result<Option<Policy>> {
        let state = self.state.read().await;
        Ok(state
            .registry
            .get(tuple)
            .and_then(|id| state.policies.get(id))
            .cloned())
    }

    async fn restore(
        &self,
        id: PolicyId,
        description: Option<String>,
        actor: Option<UserId>,
    ) -> Result<Policy> {
        let mut state = self.state.write().await;
        let policy = state.policy_mut(id)?;
        policy.is_deleted = false;
        if description.is_some() {
            policy.description = description;
        }
        policy.updated_by = actor;
        policy.updated_at = Utc::now();
        Ok(policy.clone())
    }

    async fn soft_delete(&self, id: PolicyId, actor: Option<UserId>) -> Result<Policy> {
        let mut state = self.state.write().await;
        let policy = state.policy_mut(id)?;
        policy.is_deleted = true;
        policy.updated_by = actor;
        policy.updated_at = Utc::now();
        Ok(policy.clone())
    }

    async fn list_active(&self, page: u32, limit: u32) -> Result<Page<Policy>> {
        let offset = usize::try_from(page_offset(page, limit)?).unwrap_or(usize::MAX);

        let state = self.state.read().await;
        let active: Vec<&Policy> = state
            .order
            .iter()
            .filter_map(|id| state.policies.get(id))
            .filter(|p| p.is_active())
            .collect();

        let items = active
            .iter()
            .skip(offset)
            .take(limit as usize)
            .map(|p| (*p).clone())
            .collect();

        Ok(Page {
            items,
            page,
            limit,
            total: active.len() as u64,
        })
    }

    async fn list_active_with_relations(&self) -> Result<Vec<PolicyWithRelations>> {
        let state = self.state.read().await;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.policies.get(id))
            .filter(|p| p.is_active())
            .map(|p| PolicyWithRelations {
                role: state.active_ref(p.role_id),
                permission: state.active_ref(p.permission_id),
                resource: state.active_ref(p.resource_id),
                scope: state.active_ref(p.scope_id),
                policy: p.clone(),
            })
            .collect())
    }
}
