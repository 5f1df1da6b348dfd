use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use ledgerline_core::{AppError, AppResult, PolicyId};
use ledgerline_domain::{
    DomainEvent, DomainEventKind, EntryField, EntrySpecification, FilterClause, FilterOperator,
    RetentionPolicy, SortClause, SortDirection,
};

use super::{
    PolicyOutcomeStatus, PolicySweepOutcome, RetentionService, SweepCancellation, SweepReport,
    SweepStatus,
};

impl RetentionService {
    /// Sweeps every active policy once, oldest policy first.
    pub async fn apply_all(&self, cancellation: &SweepCancellation) -> AppResult<SweepReport> {
        let policies = self.policy_source.list_active().await?;
        Ok(self.sweep_policies(&policies, cancellation).await)
    }

    /// Sweeps a single policy.
    ///
    /// Unknown and inactive policies are rejected before any lock is taken.
    pub async fn apply_policy(
        &self,
        policy_id: PolicyId,
        cancellation: &SweepCancellation,
    ) -> AppResult<SweepReport> {
        let policy = self
            .policy_source
            .find_by_id(policy_id)
            .await?
            .filter(RetentionPolicy::is_active)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "active retention policy '{policy_id}' does not exist"
                ))
            })?;

        Ok(self.sweep_policies(&[policy], cancellation).await)
    }

    async fn sweep_policies(
        &self,
        policies: &[RetentionPolicy],
        cancellation: &SweepCancellation,
    ) -> SweepReport {
        let started_at = self.clock.now();
        let mut outcomes = Vec::with_capacity(policies.len());

        for policy in policies {
            let outcome = self.sweep_policy(policy, cancellation).await;
            if let PolicyOutcomeStatus::Failed { reason } = &outcome.status {
                warn!(
                    policy_id = %outcome.policy_id,
                    policy_name = %outcome.policy_name,
                    error = %reason,
                    "retention sweep failed for policy"
                );
            }
            outcomes.push(outcome);
        }

        let status = if outcomes
            .iter()
            .all(|outcome| outcome.status == PolicyOutcomeStatus::Applied)
        {
            SweepStatus::Completed
        } else {
            SweepStatus::PartiallyFailed
        };

        SweepReport {
            started_at,
            finished_at: self.clock.now(),
            status,
            outcomes,
        }
    }

    async fn sweep_policy(
        &self,
        policy: &RetentionPolicy,
        cancellation: &SweepCancellation,
    ) -> PolicySweepOutcome {
        if cancellation.is_cancelled() {
            return outcome(policy, 0, 0, PolicyOutcomeStatus::Cancelled);
        }

        let lock = match self
            .lock_coordinator
            .try_acquire(policy.id(), &self.holder_id, self.config.lock_ttl_seconds)
            .await
        {
            Ok(Some(lock)) => lock,
            Ok(None) => return outcome(policy, 0, 0, PolicyOutcomeStatus::AlreadyRunning),
            Err(error) => {
                return outcome(
                    policy,
                    0,
                    0,
                    PolicyOutcomeStatus::Failed {
                        reason: error.to_string(),
                    },
                );
            }
        };

        let (records_deleted, batches, status) = self.drain_expired(policy, cancellation).await;

        if let Err(error) = self.lock_coordinator.release(&lock).await {
            warn!(
                policy_id = %policy.id(),
                error = %error,
                "failed to release sweep lock"
            );
        }

        outcome(policy, records_deleted, batches, status)
    }

    /// Deletes expired entries batch by batch until the scope is drained.
    ///
    /// The expiry cutoff is fixed once per sweep, so entries aging past the
    /// threshold mid-run wait for the next one.
    async fn drain_expired(
        &self,
        policy: &RetentionPolicy,
        cancellation: &SweepCancellation,
    ) -> (u64, u32, PolicyOutcomeStatus) {
        let cutoff = policy.expiry_cutoff(self.clock.now());
        let specification = match deletion_specification(policy, cutoff, self.config.batch_size) {
            Ok(specification) => specification,
            Err(error) => {
                return (
                    0,
                    0,
                    PolicyOutcomeStatus::Failed {
                        reason: error.to_string(),
                    },
                );
            }
        };

        let mut records_deleted: u64 = 0;
        let mut batches: u32 = 0;

        loop {
            if cancellation.is_cancelled() {
                return (records_deleted, batches, PolicyOutcomeStatus::Cancelled);
            }
            if batches >= self.config.max_batches {
                return (
                    records_deleted,
                    batches,
                    PolicyOutcomeStatus::BatchLimitReached,
                );
            }

            match self.entry_repository.delete_matching(&specification).await {
                Ok(deleted) => {
                    batches += 1;
                    records_deleted += deleted;
                    if deleted < self.config.batch_size as u64 {
                        self.emit_applied(policy, records_deleted).await;
                        return (records_deleted, batches, PolicyOutcomeStatus::Applied);
                    }
                }
                Err(error) => {
                    return (
                        records_deleted,
                        batches,
                        PolicyOutcomeStatus::Failed {
                            reason: error.to_string(),
                        },
                    );
                }
            }
        }
    }

    async fn emit_applied(&self, policy: &RetentionPolicy, records_deleted: u64) {
        let now = self.clock.now();
        let event = DomainEvent::new(
            DomainEventKind::RetentionApplied {
                policy_scope_name: policy.name().as_str().to_owned(),
                records_deleted,
                applied_at: now,
            },
            now,
        );

        if let Err(error) = self.event_publisher.publish(&event).await {
            warn!(
                event_type = event.event_type(),
                error = %error,
                "domain event publication failed"
            );
        }
    }
}

fn outcome(
    policy: &RetentionPolicy,
    records_deleted: u64,
    batches: u32,
    status: PolicyOutcomeStatus,
) -> PolicySweepOutcome {
    PolicySweepOutcome {
        policy_id: policy.id(),
        policy_name: policy.name().as_str().to_owned(),
        records_deleted,
        batches,
        status,
    }
}

fn deletion_specification(
    policy: &RetentionPolicy,
    cutoff: DateTime<Utc>,
    batch_size: usize,
) -> AppResult<EntrySpecification> {
    let mut filters = policy.scope_filters().to_vec();
    filters.push(FilterClause::new(
        EntryField::OccurredAt,
        FilterOperator::Lt,
        Value::String(cutoff.to_rfc3339()),
    )?);

    EntrySpecification::new(
        filters,
        vec![SortClause::new(EntryField::OccurredAt, SortDirection::Asc)],
        batch_size,
        0,
    )
}
