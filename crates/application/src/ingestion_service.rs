use std::sync::Arc;

use chrono::{DateTime, Utc};
use ledgerline_core::{AppError, AppResult, EntryId, OrganizationId};
use ledgerline_domain::{AuditLogEntry, DomainEvent, DomainEventKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::audit_ports::{AuditEntryRepository, Clock, DomainEventPublisher};

/// One incoming audit event before mapping.
///
/// Fields arrive as loose text so a malformed producer payload reaches the
/// mapping step and becomes a reportable failure instead of dying in
/// transport decoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAuditEvent {
    /// Event type label.
    pub event_type: Option<String>,
    /// RFC 3339 moment the audited action happened.
    pub occurred_at: Option<String>,
    /// Structured event payload.
    pub payload: Option<Value>,
    /// UUID of the owning organization, when the event is scoped to one.
    pub organization_id: Option<String>,
}

/// Ingests raw audit events into the trail.
///
/// Every call publishes exactly one domain event: persisted on success, or
/// ingestion-failed when mapping or storage rejects the event. No outcome
/// reaches the caller any other way, so producers stay fire-and-forget.
#[derive(Clone)]
pub struct AuditIngestionService {
    repository: Arc<dyn AuditEntryRepository>,
    event_publisher: Arc<dyn DomainEventPublisher>,
    clock: Arc<dyn Clock>,
}

impl AuditIngestionService {
    /// Creates an ingestion service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn AuditEntryRepository>,
        event_publisher: Arc<dyn DomainEventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            event_publisher,
            clock,
        }
    }

    /// Accepts one raw event.
    ///
    /// Mapping failures and storage failures are reported through the
    /// published event stream only; neither is retried.
    pub async fn ingest(&self, raw: RawAuditEvent) {
        let received_at = self.clock.now();

        let outcome = match self.map_entry(&raw, received_at) {
            Ok(entry) => match self.repository.save(&entry).await {
                Ok(()) => DomainEventKind::EntryPersisted {
                    entry_id: entry.id(),
                    event_type: entry.event_type().as_str().to_owned(),
                    organization_id: entry.organization_id(),
                    ingested_at: entry.ingested_at(),
                },
                Err(error) => DomainEventKind::IngestionFailed {
                    event_type: raw.event_type.clone(),
                    failure_reason: error.to_string(),
                    received_at,
                },
            },
            Err(error) => DomainEventKind::IngestionFailed {
                event_type: raw.event_type.clone(),
                failure_reason: failure_reason(&error),
                received_at,
            },
        };

        self.publish(outcome).await;
    }

    fn map_entry(&self, raw: &RawAuditEvent, ingested_at: DateTime<Utc>) -> AppResult<AuditLogEntry> {
        let event_type = raw
            .event_type
            .as_deref()
            .ok_or_else(|| AppError::Validation("missing field 'event_type'".to_owned()))?;
        if event_type.trim().is_empty() {
            return Err(AppError::Validation(
                "field 'event_type' must not be blank".to_owned(),
            ));
        }

        let occurred_at_text = raw
            .occurred_at
            .as_deref()
            .ok_or_else(|| AppError::Validation("missing field 'occurred_at'".to_owned()))?;
        let occurred_at = DateTime::parse_from_rfc3339(occurred_at_text)
            .map_err(|_| {
                AppError::Validation(
                    "field 'occurred_at' is not an RFC 3339 timestamp".to_owned(),
                )
            })?
            .with_timezone(&Utc);

        let payload = raw
            .payload
            .clone()
            .ok_or_else(|| AppError::Validation("missing field 'payload'".to_owned()))?;

        let organization_id = raw
            .organization_id
            .as_deref()
            .map(|value| {
                Uuid::parse_str(value)
                    .map(OrganizationId::from_uuid)
                    .map_err(|_| {
                        AppError::Validation("field 'organization_id' is not a UUID".to_owned())
                    })
            })
            .transpose()?;

        AuditLogEntry::new(
            EntryId::new(),
            event_type,
            occurred_at,
            ingested_at,
            payload,
            organization_id,
        )
    }

    async fn publish(&self, kind: DomainEventKind) {
        let event = DomainEvent::new(kind, self.clock.now());
        if let Err(error) = self.event_publisher.publish(&event).await {
            warn!(
                event_type = event.event_type(),
                error = %error,
                "domain event publication failed"
            );
        }
    }
}

fn failure_reason(error: &AppError) -> String {
    match error {
        AppError::Validation(message) => message.clone(),
        other => other.to_string(),
    }
}
