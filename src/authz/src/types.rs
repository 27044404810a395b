//! Core RBAC data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique policy identifier
pub type PolicyId = Uuid;

/// Unique identifier of a role, permission, resource or scope row
pub type DimensionId = Uuid;

/// Reference to the user performing a mutation
pub type UserId = Uuid;

/// One axis of an authorization decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionKind {
    Role,
    Permission,
    Resource,
    Scope,
}

impl DimensionKind {
    /// All dimensions, in policy column order
    pub const ALL: [DimensionKind; 4] = [
        DimensionKind::Role,
        DimensionKind::Permission,
        DimensionKind::Resource,
        DimensionKind::Scope,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DimensionKind::Role => "role",
            DimensionKind::Permission => "permission",
            DimensionKind::Resource => "resource",
            DimensionKind::Scope => "scope",
        }
    }

    /// Backing table of this dimension
    pub fn table(&self) -> &'static str {
        match self {
            DimensionKind::Role => "roles",
            DimensionKind::Permission => "permissions",
            DimensionKind::Resource => "resources",
            DimensionKind::Scope => "scopes",
        }
    }
}

impl fmt::Display for DimensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role, permission, resource or scope row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub id: DimensionId,
    pub kind: DimensionKind,

    /// Unique among non-deleted rows of the same kind, case-insensitive
    pub name: String,

    pub description: String,
    pub is_deleted: bool,
    pub created_by: Option<UserId>,
    pub updated_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dimension {
    pub fn to_ref(&self) -> DimensionRef {
        DimensionRef {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// Non-owning reference to a dimension row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimensionRef {
    pub id: DimensionId,
    pub name: String,
}

/// The four foreign keys identifying a policy, unique across all rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyTuple {
    pub role_id: DimensionId,
    pub permission_id: DimensionId,
    pub resource_id: DimensionId,
    pub scope_id: DimensionId,
}

/// A granted (role, permission, resource, scope) tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub role_id: DimensionId,
    pub permission_id: DimensionId,
    pub resource_id: DimensionId,
    pub scope_id: DimensionId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub is_deleted: bool,

    pub created_by: Option<UserId>,
    pub updated_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    /// Create a fresh, active policy row for a tuple
    pub fn new(tuple: PolicyTuple, description: Option<String>, actor: Option<UserId>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            role_id: tuple.role_id,
            permission_id: tuple.permission_id,
            resource_id: tuple.resource_id,
            scope_id: tuple.scope_id,
            description,
            is_deleted: false,
            created_by: actor,
            updated_by: actor,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn tuple(&self) -> PolicyTuple {
        PolicyTuple {
            role_id: self.role_id,
            permission_id: self.permission_id,
            resource_id: self.resource_id,
            scope_id: self.scope_id,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }
}

/// Policy row with its four dimension relations joined.
///
/// A relation is `None` when the referenced row is missing or soft-deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyWithRelations {
    pub policy: Policy,
    pub role: Option<DimensionRef>,
    pub permission: Option<DimensionRef>,
    pub resource: Option<DimensionRef>,
    pub scope: Option<DimensionRef>,
}

/// Grant or revoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AclAction {
    #[serde(alias = "grant", alias = "GRANT")]
    Grant,
    #[serde(alias = "revoke", alias = "REVOKE")]
    Revoke,
}

/// Declarative instruction to ensure a tuple is active or inactive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclIntent {
    pub role: String,
    pub permission: String,
    pub resource: String,
    pub scope: String,
    pub action: AclAction,

    /// Stored on the policy when a grant creates or restores it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AclIntent {
    pub fn new(
        role: impl Into<String>,
        permission: impl Into<String>,
        resource: impl Into<String>,
        scope: impl Into<String>,
        action: AclAction,
    ) -> Self {
        Self {
            role: role.into(),
            permission: permission.into(),
            resource: resource.into(),
            scope: scope.into(),
            action,
            description: None,
        }
    }

    pub fn grant(
        role: impl Into<String>,
        permission: impl Into<String>,
        resource: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self::new(role, permission, resource, scope, AclAction::Grant)
    }

    pub fn revoke(
        role: impl Into<String>,
        permission: impl Into<String>,
        resource: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self::new(role, permission, resource, scope, AclAction::Revoke)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Name given for a dimension
    pub fn name(&self, kind: DimensionKind) -> &str {
        match kind {
            DimensionKind::Role => &self.role,
            DimensionKind::Permission => &self.permission,
            DimensionKind::Resource => &self.resource,
            DimensionKind::Scope => &self.scope,
        }
    }
}

/// One page of an offset-paginated listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,

    /// 1-based page number
    pub page: u32,
    pub limit: u32,

    /// Total rows across all pages
    pub total: u64,
}

impl<T> Page<T> {
    /// Row offset of a 1-based page
    pub fn offset(page: u32, limit: u32) -> u64 {
        u64::from(page.saturating_sub(1)) * u64::from(limit)
    }
}

/// Canonical key of a dimension name (trimmed, upper-case)
///
/// Active-name uniqueness, store lookup and the policy index all compare on
/// this key, so names folding to the same key are the same dimension.
pub fn name_key(name: &str) -> String {
    name.trim().to_uppercase()
}
