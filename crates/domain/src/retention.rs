use chrono::{DateTime, Duration, Utc};
use ledgerline_core::{AppError, AppResult, NonEmptyString, PolicyId};
use serde::{Deserialize, Serialize};

use crate::entry::AuditLogEntry;
use crate::specification::FilterClause;

/// Age-based deletion rule for audit log entries.
///
/// A policy names a scope (filter clauses combined with AND) and a maximum
/// age. Entries inside the scope whose `occurred_at` lies strictly further
/// in the past than the maximum age are due for deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    id: PolicyId,
    name: NonEmptyString,
    is_active: bool,
    scope_filters: Vec<FilterClause>,
    max_age_seconds: i64,
    created_at: DateTime<Utc>,
}

impl RetentionPolicy {
    /// Creates a validated retention policy.
    pub fn new(
        id: PolicyId,
        name: impl Into<String>,
        is_active: bool,
        scope_filters: Vec<FilterClause>,
        max_age_seconds: i64,
        created_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        if max_age_seconds <= 0 {
            return Err(AppError::Validation(
                "retention max age must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            id,
            name: NonEmptyString::new(name)?,
            is_active,
            scope_filters,
            max_age_seconds,
            created_at,
        })
    }

    /// Returns the policy identifier.
    #[must_use]
    pub fn id(&self) -> PolicyId {
        self.id
    }

    /// Returns the policy name, used as the scope label in emitted events.
    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }

    /// Returns whether sweeps consider this policy.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns the scope filter clauses, combined with AND.
    #[must_use]
    pub fn scope_filters(&self) -> &[FilterClause] {
        &self.scope_filters
    }

    /// Returns the retention window in whole seconds.
    #[must_use]
    pub fn max_age_seconds(&self) -> i64 {
        self.max_age_seconds
    }

    /// Returns the retention window as a duration.
    #[must_use]
    pub fn max_age(&self) -> Duration {
        Duration::seconds(self.max_age_seconds)
    }

    /// Returns the moment the policy was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the instant separating retained entries from expired ones.
    #[must_use]
    pub fn expiry_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.max_age()
    }

    /// Returns whether the entry is due for deletion under this policy.
    ///
    /// An entry exactly `max_age` old is not yet expired; only entries
    /// strictly older qualify.
    #[must_use]
    pub fn is_deletion_candidate(&self, entry: &AuditLogEntry, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.scope_filters.iter().all(|clause| clause.matches(entry))
            && entry.occurred_at() < self.expiry_cutoff(now)
    }
}
