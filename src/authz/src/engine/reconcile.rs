//! Bulk grant/revoke reconciliation
//!
//! Each intent is applied on its own, in order, and is idempotent: a grant
//! ensures the tuple is active, a revoke ensures it is not. Intents naming an
//! unknown dimension are skipped without failing the batch. A storage failure
//! aborts the batch; intents applied before it stay applied.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::cache::AuthorizationCache;
use crate::dimension::{resolve_intent, DimensionStore, Resolution};
use crate::error::{AuthzError, Result};
use crate::policy::PolicyStore;
use crate::types::{AclAction, AclIntent, DimensionKind, PolicyId, PolicyTuple, UserId};

/// What a single intent did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IntentOutcome {
    /// Grant inserted a new policy row
    Created { policy_id: PolicyId },

    /// Grant reactivated a soft-deleted row
    Restored { policy_id: PolicyId },

    /// Grant found the tuple already active
    AlreadyGranted { policy_id: PolicyId },

    /// Revoke soft-deleted the active row
    Revoked { policy_id: PolicyId },

    /// Revoke found nothing active
    NotGranted,

    /// One or more names matched no active dimension row
    Unresolved { missing: Vec<DimensionKind> },
}

impl IntentOutcome {
    /// Whether the policy store was written
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            IntentOutcome::Created { .. }
                | IntentOutcome::Restored { .. }
                | IntentOutcome::Revoked { .. }
        )
    }
}

/// Per-intent outcomes of a batch, in input order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub outcomes: Vec<IntentOutcome>,
}

impl ReconcileReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Intents that wrote to the policy store
    pub fn changed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_change()).count()
    }

    /// Grants that created or restored a row
    pub fn granted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, IntentOutcome::Created { .. } | IntentOutcome::Restored { .. }))
            .count()
    }

    pub fn revoked(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, IntentOutcome::Revoked { .. }))
            .count()
    }

    /// Intents skipped because a name did not resolve
    pub fn unresolved(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, IntentOutcome::Unresolved { .. }))
            .count()
    }
}

/// Applies grant/revoke batches against the policy store
pub struct AclReconciler {
    dimensions: Arc<dyn DimensionStore>,
    policies: Arc<dyn PolicyStore>,
    cache: Arc<AuthorizationCache>,
}

impl AclReconciler {
    pub fn new(
        dimensions: Arc<dyn DimensionStore>,
        policies: Arc<dyn PolicyStore>,
        cache: Arc<AuthorizationCache>,
    ) -> Self {
        Self {
            dimensions,
            policies,
            cache,
        }
    }

    /// Apply a batch of intents in order.
    ///
    /// The authorization cache is invalidated once the batch ends, whether it
    /// completed or aborted, so the next query sees every applied intent.
    pub async fn reconcile(
        &self,
        intents: &[AclIntent],
        actor: Option<UserId>,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport {
            outcomes: Vec::with_capacity(intents.len()),
        };
        self.reconcile_into(intents, actor, &mut report).await?;
        Ok(report)
    }

    /// Like [`AclReconciler::reconcile`], appending one outcome per applied
    /// intent to `report`. After a fatal error `report` holds the outcomes
    /// of the intents applied before the abort.
    pub async fn reconcile_into(
        &self,
        intents: &[AclIntent],
        actor: Option<UserId>,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let start = report.len();
        let result = self.apply_all(intents, actor, report).await;
        self.cache.invalidate();

        let applied = report.len() - start;
        match result {
            Ok(()) => {
                let batch = ReconcileReport {
                    outcomes: report.outcomes[start..].to_vec(),
                };
                info!(
                    "Reconciled {} intents: {} granted, {} revoked, {} unresolved",
                    applied,
                    batch.granted(),
                    batch.revoked(),
                    batch.unresolved()
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    "Reconciliation aborted after {} of {} intents: {}",
                    applied,
                    intents.len(),
                    e
                );
                Err(e)
            }
        }
    }

    async fn apply_all(
        &self,
        intents: &[AclIntent],
        actor: Option<UserId>,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        for intent in intents {
            let outcome = self.apply(intent, actor).await?;
            debug!(
                "{:?} {}/{}/{}/{} -> {:?}",
                intent.action,
                intent.role,
                intent.permission,
                intent.resource,
                intent.scope,
                outcome
            );
            report.outcomes.push(outcome);
        }
        Ok(())
    }

    async fn apply(&self, intent: &AclIntent, actor: Option<UserId>) -> Result<IntentOutcome> {
        let tuple = match resolve_intent(self.dimensions.as_ref(), intent).await? {
            Resolution::Resolved(tuple) => tuple,
            Resolution::Unresolved(missing) => {
                warn!(
                    "Skipping {:?} intent {}/{}/{}/{}: unknown {:?}",
                    intent.action,
                    intent.role,
                    intent.permission,
                    intent.resource,
                    intent.scope,
                    missing
                );
                return Ok(IntentOutcome::Unresolved { missing });
            }
        };

        match intent.action {
            AclAction::Grant => self.grant(tuple, intent.description.clone(), actor).await,
            AclAction::Revoke => self.revoke(&tuple, actor).await,
        }
    }

    /// Lookup, then restore or insert. Never a blind insert.
    async fn grant(
        &self,
        tuple: PolicyTuple,
        description: Option<String>,
        actor: Option<UserId>,
    ) -> Result<IntentOutcome> {
        if let Some(active) = self.policies.find_active(&tuple).await? {
            return Ok(IntentOutcome::AlreadyGranted { policy_id: active.id });
        }

        if let Some(inactive) = self.policies.find_any(&tuple).await? {
            let restored = self.policies.restore(inactive.id, description, actor).await?;
            return Ok(IntentOutcome::Restored { policy_id: restored.id });
        }

        match self.policies.create(tuple, description, actor).await {
            Ok(created) => Ok(IntentOutcome::Created { policy_id: created.id }),
            Err(AuthzError::ConstraintViolation(msg)) => {
                error!("Concurrent writer inserted policy tuple during grant: {}", msg);
                Err(AuthzError::ConstraintViolation(msg))
            }
            Err(e) => Err(e),
        }
    }

    async fn revoke(&self, tuple: &PolicyTuple, actor: Option<UserId>) -> Result<IntentOutcome> {
        match self.policies.find_active(tuple).await? {
            Some(active) => {
                let revoked = self.policies.soft_delete(active.id, actor).await?;
                Ok(IntentOutcome::Revoked { policy_id: revoked.id })
            }
            None => Ok(IntentOutcome::NotGranted),
        }
    }
}
