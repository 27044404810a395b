//! Dimension store contract and intent name resolution

use crate::error::Result;
use crate::types::{AclIntent, DimensionKind, DimensionRef, PolicyTuple};
use async_trait::async_trait;

/// Lookup of active roles, permissions, resources and scopes
#[async_trait]
pub trait DimensionStore: Send + Sync {
    /// Find a non-deleted row by name.
    ///
    /// Implementations trim and lower-case `name` before comparing, so lookups
    /// are case and whitespace insensitive.
    async fn find_active_by_name(
        &self,
        kind: DimensionKind,
        name: &str,
    ) -> Result<Option<DimensionRef>>;
}

/// Outcome of translating an intent's names into foreign keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(PolicyTuple),

    /// Dimensions whose name matched no active row, in column order
    Unresolved(Vec<DimensionKind>),
}

/// Resolve all four names of an intent.
///
/// Every dimension is looked up even after a miss so the caller learns the
/// complete set of unknown names. Store failures propagate.
pub async fn resolve_intent(store: &dyn DimensionStore, intent: &AclIntent) -> Result<Resolution> {
    let mut ids = Vec::with_capacity(DimensionKind::ALL.len());
    let mut missing = Vec::new();

    for kind in DimensionKind::ALL {
        match store.find_active_by_name(kind, intent.name(kind)).await? {
            Some(found) => ids.push(found.id),
            None => missing.push(kind),
        }
    }

    if !missing.is_empty() {
        return Ok(Resolution::Unresolved(missing));
    }

    Ok(Resolution::Resolved(PolicyTuple {
        role_id: ids[0],
        permission_id: ids[1],
        resource_id: ids[2],
        scope_id: ids[3],
    }))
}
