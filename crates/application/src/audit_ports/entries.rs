use async_trait::async_trait;
use ledgerline_core::{AppResult, EntryId};
use ledgerline_domain::{AuditLogEntry, EntrySpecification};

/// Storage port for audit log entries.
///
/// Implementations must answer `query` and `delete_matching` with the exact
/// semantics of [`EntrySpecification::apply`], so every backend filters,
/// orders, and pages identically.
#[async_trait]
pub trait AuditEntryRepository: Send + Sync {
    /// Persists one entry atomically. A reused identifier is a conflict.
    async fn save(&self, entry: &AuditLogEntry) -> AppResult<()>;

    /// Loads one entry by identifier.
    async fn find_by_id(&self, entry_id: EntryId) -> AppResult<Option<AuditLogEntry>>;

    /// Returns the page of entries the specification selects.
    async fn query(&self, specification: &EntrySpecification) -> AppResult<Vec<AuditLogEntry>>;

    /// Deletes the entries the specification selects and returns the exact
    /// number removed. Repeating a delete finds nothing and returns zero.
    async fn delete_matching(&self, specification: &EntrySpecification) -> AppResult<u64>;
}
