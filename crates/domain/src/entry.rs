use chrono::{DateTime, Utc};
use ledgerline_core::{AppResult, EntryId, NonEmptyString, OrganizationId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One immutable audit log entry.
///
/// Entries are append-only: nothing mutates a persisted entry, and the only
/// deletion pathway is retention. Producer clocks are not trusted, so no
/// ordering between `occurred_at` and `ingested_at` is assumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    id: EntryId,
    event_type: NonEmptyString,
    occurred_at: DateTime<Utc>,
    ingested_at: DateTime<Utc>,
    payload: Value,
    organization_id: Option<OrganizationId>,
}

impl AuditLogEntry {
    /// Creates a validated audit log entry.
    pub fn new(
        id: EntryId,
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        ingested_at: DateTime<Utc>,
        payload: Value,
        organization_id: Option<OrganizationId>,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            event_type: NonEmptyString::new(event_type)?,
            occurred_at,
            ingested_at,
            payload,
            organization_id,
        })
    }

    /// Returns the entry identifier.
    #[must_use]
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Returns the event type label.
    #[must_use]
    pub fn event_type(&self) -> &NonEmptyString {
        &self.event_type
    }

    /// Returns the moment the audited action happened.
    #[must_use]
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Returns the moment the entry was accepted for storage.
    #[must_use]
    pub fn ingested_at(&self) -> DateTime<Utc> {
        self.ingested_at
    }

    /// Returns the structured event payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the owning organization, absent for system-level entries.
    #[must_use]
    pub fn organization_id(&self) -> Option<OrganizationId> {
        self.organization_id
    }
}
