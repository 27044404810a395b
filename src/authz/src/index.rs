//! Compiled authorization index
//!
//! Four chained maps keyed by normalized names:
//!
//! ```text
//! ROLE → RESOURCE → PERMISSION → SCOPE → policy id
//! ```
//!
//! The leaf keeps the id of the authorizing policy rather than a flag, so a
//! positive answer can be traced back to its row. An index is rebuilt
//! wholesale from the active policy set and never patched in place.

use crate::types::{name_key, DimensionRef, PolicyId, PolicyWithRelations};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// Scope name → policy id
pub type ScopeMap = HashMap<String, PolicyId>;

/// Permission name → scopes
pub type PermissionMap = HashMap<String, ScopeMap>;

/// Resource name → permissions
pub type ResourceMap = HashMap<String, PermissionMap>;

/// Read-only nested lookup derived from active policies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PolicyIndex {
    roles: HashMap<String, ResourceMap>,
    entries: usize,
}

impl PolicyIndex {
    /// Compile an index from already-fetched policies. Performs no I/O.
    ///
    /// Soft-deleted policies and policies with a missing or blank dimension
    /// name are skipped. An existing leaf is never overwritten.
    pub fn build(policies: &[PolicyWithRelations]) -> Self {
        let mut index = Self::default();

        for row in policies {
            if row.policy.is_deleted {
                continue;
            }

            let keys = (
                relation_key(&row.role),
                relation_key(&row.resource),
                relation_key(&row.permission),
                relation_key(&row.scope),
            );

            let (Some(role), Some(resource), Some(permission), Some(scope)) = keys else {
                warn!(policy_id = %row.policy.id, "Skipping policy with unresolved dimension");
                continue;
            };

            if !index.insert(role, resource, permission, scope, row.policy.id) {
                warn!(policy_id = %row.policy.id, "Duplicate policy path ignored");
            }
        }

        index
    }

    /// Insert a path, creating intermediate levels on first use.
    /// Returns false when the leaf already existed.
    fn insert(
        &mut self,
        role: String,
        resource: String,
        permission: String,
        scope: String,
        policy_id: PolicyId,
    ) -> bool {
        let scopes = self
            .roles
            .entry(role)
            .or_default()
            .entry(resource)
            .or_default()
            .entry(permission)
            .or_default();

        if scopes.contains_key(&scope) {
            return false;
        }

        scopes.insert(scope, policy_id);
        self.entries += 1;
        true
    }

    /// Policy granting `permission` on `resource` within `scope` to `role`.
    /// Names are matched after trimming, ignoring case.
    pub fn lookup(
        &self,
        role: &str,
        resource: &str,
        permission: &str,
        scope: &str,
    ) -> Option<PolicyId> {
        self.roles
            .get(&name_key(role))?
            .get(&name_key(resource))?
            .get(&name_key(permission))?
            .get(&name_key(scope))
            .copied()
    }

    pub fn contains(&self, role: &str, resource: &str, permission: &str, scope: &str) -> bool {
        self.lookup(role, resource, permission, scope).is_some()
    }

    /// Resources reachable by a role
    pub fn resources(&self, role: &str) -> Option<&ResourceMap> {
        self.roles.get(&name_key(role))
    }

    /// Normalized role names present in the index
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    /// Number of leaf entries
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}

fn relation_key(relation: &Option<DimensionRef>) -> Option<String> {
    relation
        .as_ref()
        .map(|r| name_key(&r.name))
        .filter(|key| !key.is_empty())
}
