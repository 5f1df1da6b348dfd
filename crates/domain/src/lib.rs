//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod entry;
mod event;
mod retention;
mod specification;

pub use entry::AuditLogEntry;
pub use event::{DomainEvent, DomainEventKind, EVENT_SCHEMA_VERSION, EventMetadata};
pub use retention::RetentionPolicy;
pub use specification::{
    DEFAULT_PAGE_SIZE, EntryField, EntrySpecification, FilterClause, FilterOperator, MAX_PAGE_SIZE,
    SortClause, SortDirection,
};
