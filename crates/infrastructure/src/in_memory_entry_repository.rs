use async_trait::async_trait;
use tokio::sync::RwLock;

use ledgerline_application::AuditEntryRepository;
use ledgerline_core::{AppError, AppResult, EntryId};
use ledgerline_domain::{AuditLogEntry, EntrySpecification};

/// In-memory audit entry repository implementation.
///
/// Filtering, ordering, and paging are delegated to the domain evaluator,
/// so this adapter and the PostgreSQL one answer queries identically.
#[derive(Debug, Default)]
pub struct InMemoryAuditEntryRepository {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryAuditEntryRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditEntryRepository for InMemoryAuditEntryRepository {
    async fn save(&self, entry: &AuditLogEntry) -> AppResult<()> {
        let mut entries = self.entries.write().await;

        if entries.iter().any(|stored| stored.id() == entry.id()) {
            return Err(AppError::Conflict(format!(
                "audit log entry '{}' already exists",
                entry.id()
            )));
        }

        entries.push(entry.clone());
        Ok(())
    }

    async fn find_by_id(&self, entry_id: EntryId) -> AppResult<Option<AuditLogEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .find(|entry| entry.id() == entry_id)
            .cloned())
    }

    async fn query(&self, specification: &EntrySpecification) -> AppResult<Vec<AuditLogEntry>> {
        Ok(specification.apply(&self.entries.read().await))
    }

    async fn delete_matching(&self, specification: &EntrySpecification) -> AppResult<u64> {
        let mut entries = self.entries.write().await;

        let selected: Vec<EntryId> = specification
            .apply(&entries)
            .iter()
            .map(AuditLogEntry::id)
            .collect();
        entries.retain(|entry| !selected.contains(&entry.id()));

        Ok(selected.len() as u64)
    }
}
