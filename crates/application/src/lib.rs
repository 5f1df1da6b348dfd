//! Application services and ports for the audit trail.

#![forbid(unsafe_code)]

mod audit_ports;
mod audit_query_service;
mod ingestion_service;
mod retention_service;

pub use audit_ports::{
    AuditEntryRepository, Clock, DomainEventPublisher, RetentionPolicySource, SweepLock,
    SweepLockCoordinator,
};
pub use audit_query_service::AuditQueryService;
pub use ingestion_service::{AuditIngestionService, RawAuditEvent};
pub use retention_service::{
    PolicyOutcomeStatus, PolicySweepOutcome, RetentionService, RetentionSweepConfig,
    SweepCancellation, SweepReport, SweepStatus,
};
