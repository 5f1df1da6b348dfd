use chrono::{DateTime, Utc};
use ledgerline_core::{EntryId, OrganizationId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version stamped into every event envelope.
///
/// Consumers branch on it when the wire shape evolves.
pub const EVENT_SCHEMA_VERSION: u16 = 1;

/// Envelope data shared by every domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    event_id: Uuid,
    published_at: DateTime<Utc>,
    schema_version: u16,
}

impl EventMetadata {
    /// Creates envelope metadata stamped with the current schema version.
    #[must_use]
    pub fn new(published_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            published_at,
            schema_version: EVENT_SCHEMA_VERSION,
        }
    }

    /// Returns the unique event identifier.
    #[must_use]
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    /// Returns the moment the event was handed to the publisher.
    #[must_use]
    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    /// Returns the envelope schema version.
    #[must_use]
    pub fn schema_version(&self) -> u16 {
        self.schema_version
    }
}

/// Payload of one domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data")]
pub enum DomainEventKind {
    /// An incoming audit event was mapped and stored.
    #[serde(rename = "audit.entry.persisted")]
    EntryPersisted {
        /// Identifier of the stored entry.
        entry_id: EntryId,
        /// Event type label of the stored entry.
        event_type: String,
        /// Organization the entry belongs to, if any.
        organization_id: Option<OrganizationId>,
        /// Moment the entry was accepted for storage.
        ingested_at: DateTime<Utc>,
    },
    /// An incoming audit event could not be turned into a stored entry.
    #[serde(rename = "audit.ingestion.failed")]
    IngestionFailed {
        /// Event type labelled on the incoming event, when one was present.
        event_type: Option<String>,
        /// Reason ingestion stopped, naming the offending field or fault.
        failure_reason: String,
        /// Moment the incoming event arrived.
        received_at: DateTime<Utc>,
    },
    /// A retention sweep finished deleting expired entries for one policy.
    #[serde(rename = "audit.retention.applied")]
    RetentionApplied {
        /// Name of the policy whose scope was swept.
        policy_scope_name: String,
        /// Exact number of entries the sweep deleted.
        records_deleted: u64,
        /// Moment the sweep finished.
        applied_at: DateTime<Utc>,
    },
}

impl DomainEventKind {
    /// Returns the stable event type tag.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::EntryPersisted { .. } => "audit.entry.persisted",
            Self::IngestionFailed { .. } => "audit.ingestion.failed",
            Self::RetentionApplied { .. } => "audit.retention.applied",
        }
    }
}

/// One domain event wrapped in its envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    metadata: EventMetadata,
    #[serde(flatten)]
    kind: DomainEventKind,
}

impl DomainEvent {
    /// Wraps an event payload in a freshly stamped envelope.
    #[must_use]
    pub fn new(kind: DomainEventKind, published_at: DateTime<Utc>) -> Self {
        Self {
            metadata: EventMetadata::new(published_at),
            kind,
        }
    }

    /// Returns the envelope metadata.
    #[must_use]
    pub fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    /// Returns the event payload.
    #[must_use]
    pub fn kind(&self) -> &DomainEventKind {
        &self.kind
    }

    /// Returns the stable event type tag.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}
