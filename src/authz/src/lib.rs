//! # RBAC Policy Resolution & Reconciliation Engine
//!
//! Stores four-way policy tuples (role, permission, resource, scope) and
//! answers "may role R perform permission P on resource X within scope S?".
//!
//! ## Features
//!
//! - **Compiled index** of all active policies, rebuilt wholesale on demand
//! - **Cache-aside** process-wide index with TTL and explicit invalidation
//! - **Idempotent reconciliation** of grant/revoke batches
//! - **Soft-delete aware** uniqueness: revoked policies are restored, never re-inserted
//! - **PostgreSQL** store via sqlx, plus an in-memory store
//!
//! ## Example
//!
//! ```rust
//! use rbac_authz::{AclIntent, DimensionKind, EngineConfig, RbacEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (engine, store) = RbacEngine::in_memory(EngineConfig::default());
//!     store.create_dimension(DimensionKind::Role, "admin", "", None).await?;
//!     store.create_dimension(DimensionKind::Permission, "read", "", None).await?;
//!     store.create_dimension(DimensionKind::Resource, "user", "", None).await?;
//!     store.create_dimension(DimensionKind::Scope, "global", "", None).await?;
//!
//!     engine
//!         .reconcile(&[AclIntent::grant("admin", "read", "user", "global")], None)
//!         .await?;
//!
//!     if engine.authorize("Admin", "READ", " user ", "global").await? {
//!         println!("Access granted!");
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dimension;
pub mod engine;
pub mod error;
pub mod index;
pub mod policy;
pub mod types;

// Re-export commonly used types
pub use config::{CacheConfig, DatabaseConfig, EngineConfig};
pub use dimension::{DimensionStore, Resolution};
pub use engine::{
    AclReconciler, AuthorizationCache, CacheStats, IntentOutcome, RbacEngine, ReconcileReport,
};
pub use error::{AuthzError, Result};
pub use index::PolicyIndex;
pub use policy::{InMemoryStore, PolicyStore};
pub use types::{
    AclAction, AclIntent, Dimension, DimensionId, DimensionKind, DimensionRef, Page, Policy,
    PolicyId, PolicyTuple, PolicyWithRelations, UserId,
};

#[cfg(feature = "postgres")]
pub use policy::PostgresStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
