use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use ledgerline_core::AppResult;
use ledgerline_domain::{
    AuditLogEntry, DEFAULT_PAGE_SIZE, EntrySpecification, FilterClause, SortClause,
};

/// Liveness payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// One filter clause in transport form.
#[derive(Debug, Deserialize)]
pub struct FilterClauseRequest {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

/// One sort key in transport form.
#[derive(Debug, Deserialize)]
pub struct SortClauseRequest {
    pub field: String,
    pub direction: String,
}

/// Body of the entry query route.
#[derive(Debug, Deserialize)]
pub struct QueryEntriesRequest {
    #[serde(default)]
    pub filters: Vec<FilterClauseRequest>,
    #[serde(default)]
    pub sort: Vec<SortClauseRequest>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl QueryEntriesRequest {
    /// Parses the transport form into a validated specification.
    ///
    /// Unknown field, operator, or direction names fail here, before any
    /// entry is read.
    pub fn into_specification(self) -> AppResult<EntrySpecification> {
        let mut filters = Vec::with_capacity(self.filters.len());
        for clause in self.filters {
            filters.push(FilterClause::new(
                clause.field.parse()?,
                clause.operator.parse()?,
                clause.value,
            )?);
        }

        let mut sort = Vec::with_capacity(self.sort.len());
        for key in self.sort {
            sort.push(SortClause::new(key.field.parse()?, key.direction.parse()?));
        }

        EntrySpecification::new(
            filters,
            sort,
            self.limit.unwrap_or(DEFAULT_PAGE_SIZE),
            self.offset.unwrap_or(0),
        )
    }
}

/// One audit log entry in transport form.
#[derive(Debug, Serialize)]
pub struct EntryResponse {
    pub id: Uuid,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub payload: Value,
    pub organization_id: Option<Uuid>,
}

impl From<AuditLogEntry> for EntryResponse {
    fn from(entry: AuditLogEntry) -> Self {
        Self {
            id: entry.id().as_uuid(),
            event_type: entry.event_type().as_str().to_owned(),
            occurred_at: entry.occurred_at(),
            ingested_at: entry.ingested_at(),
            payload: entry.payload().clone(),
            organization_id: entry.organization_id().map(|id| id.as_uuid()),
        }
    }
}

/// Body of the internal sweep route.
#[derive(Debug, Deserialize)]
pub struct SweepRequest {
    /// Sweeps only this policy when set; all active policies otherwise.
    #[serde(default)]
    pub policy_id: Option<String>,
}
