use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use ledgerline_core::{AppError, AppResult, PolicyId};
use ledgerline_domain::MAX_PAGE_SIZE;

use crate::audit_ports::{
    AuditEntryRepository, Clock, DomainEventPublisher, RetentionPolicySource, SweepLockCoordinator,
};

mod sweep;

/// Bounds for one retention sweep run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionSweepConfig {
    batch_size: usize,
    max_batches: u32,
    lock_ttl_seconds: u32,
}

impl RetentionSweepConfig {
    /// Creates a validated sweep configuration.
    ///
    /// `batch_size` is capped at [`MAX_PAGE_SIZE`].
    pub fn new(batch_size: usize, max_batches: u32, lock_ttl_seconds: u32) -> AppResult<Self> {
        if batch_size == 0 {
            return Err(AppError::Validation(
                "sweep batch size must be greater than zero".to_owned(),
            ));
        }
        if max_batches == 0 {
            return Err(AppError::Validation(
                "sweep batch limit must be greater than zero".to_owned(),
            ));
        }
        if lock_ttl_seconds == 0 {
            return Err(AppError::Validation(
                "sweep lock ttl must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            batch_size: batch_size.min(MAX_PAGE_SIZE),
            max_batches,
            lock_ttl_seconds,
        })
    }

    /// Returns the number of entries deleted per batch.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Returns the batch count after which a policy sweep stops.
    #[must_use]
    pub fn max_batches(&self) -> u32 {
        self.max_batches
    }

    /// Returns the per-policy lock lifetime in seconds.
    #[must_use]
    pub fn lock_ttl_seconds(&self) -> u32 {
        self.lock_ttl_seconds
    }
}

/// Cooperative stop signal checked between deletion batches.
///
/// Cancelling never interrupts a batch in flight; the sweep finishes the
/// current round and records how far it got.
#[derive(Debug, Clone, Default)]
pub struct SweepCancellation {
    cancelled: Arc<AtomicBool>,
}

impl SweepCancellation {
    /// Creates an uncancelled signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that in-flight sweeps stop at the next batch boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns whether a stop was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Terminal state of one policy within a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PolicyOutcomeStatus {
    /// Every expired entry in scope was deleted.
    Applied,
    /// The sweep stopped on a repository, lock, or policy error.
    Failed {
        /// Human-readable failure cause.
        reason: String,
    },
    /// The batch limit fired before the scope was drained.
    BatchLimitReached,
    /// A cancellation request stopped the sweep early.
    Cancelled,
    /// Another holder's sweep owned the policy lock.
    AlreadyRunning,
}

/// What one sweep did for one policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicySweepOutcome {
    /// Swept policy.
    pub policy_id: PolicyId,
    /// Policy name at sweep time.
    pub policy_name: String,
    /// Entries deleted across all batches.
    pub records_deleted: u64,
    /// Deletion batches issued.
    pub batches: u32,
    /// How the policy sweep ended.
    pub status: PolicyOutcomeStatus,
}

/// Overall result of a sweep run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepStatus {
    /// Every policy was fully applied.
    Completed,
    /// At least one policy ended in a state other than applied.
    PartiallyFailed,
}

/// Report for one sweep run across one or more policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Moment the run started.
    pub started_at: DateTime<Utc>,
    /// Moment the run finished.
    pub finished_at: DateTime<Utc>,
    /// Overall result.
    pub status: SweepStatus,
    /// Per-policy outcomes in the order the policies were swept.
    pub outcomes: Vec<PolicySweepOutcome>,
}

/// Applies retention policies by deleting expired audit log entries.
///
/// Policies are swept one at a time in creation order, each under an
/// advisory lock, and one policy failing never stops the others.
#[derive(Clone)]
pub struct RetentionService {
    entry_repository: Arc<dyn AuditEntryRepository>,
    policy_source: Arc<dyn RetentionPolicySource>,
    event_publisher: Arc<dyn DomainEventPublisher>,
    lock_coordinator: Arc<dyn SweepLockCoordinator>,
    clock: Arc<dyn Clock>,
    config: RetentionSweepConfig,
    holder_id: String,
}

impl RetentionService {
    /// Creates a retention service identified as `holder_id` when locking.
    #[must_use]
    pub fn new(
        entry_repository: Arc<dyn AuditEntryRepository>,
        policy_source: Arc<dyn RetentionPolicySource>,
        event_publisher: Arc<dyn DomainEventPublisher>,
        lock_coordinator: Arc<dyn SweepLockCoordinator>,
        clock: Arc<dyn Clock>,
        config: RetentionSweepConfig,
        holder_id: impl Into<String>,
    ) -> Self {
        Self {
            entry_repository,
            policy_source,
            event_publisher,
            lock_coordinator,
            clock,
            config,
            holder_id: holder_id.into(),
        }
    }

    /// Returns the configured sweep bounds.
    #[must_use]
    pub fn config(&self) -> RetentionSweepConfig {
        self.config
    }
}

#[cfg(test)]
mod tests;
