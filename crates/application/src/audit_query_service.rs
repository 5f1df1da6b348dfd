use std::sync::Arc;

use ledgerline_core::{AppError, AppResult, EntryId};
use ledgerline_domain::{AuditLogEntry, EntrySpecification};

use crate::audit_ports::AuditEntryRepository;

/// Read-side access to the audit trail.
#[derive(Clone)]
pub struct AuditQueryService {
    repository: Arc<dyn AuditEntryRepository>,
}

impl AuditQueryService {
    /// Creates a query service.
    #[must_use]
    pub fn new(repository: Arc<dyn AuditEntryRepository>) -> Self {
        Self { repository }
    }

    /// Returns the entries selected by the specification, in its order.
    pub async fn query(
        &self,
        specification: &EntrySpecification,
    ) -> AppResult<Vec<AuditLogEntry>> {
        self.repository.query(specification).await
    }

    /// Looks up a single entry.
    pub async fn entry_by_id(&self, entry_id: EntryId) -> AppResult<AuditLogEntry> {
        self.repository
            .find_by_id(entry_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("audit log entry '{entry_id}' does not exist"))
            })
    }
}
