use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use ledgerline_application::AuditEntryRepository;
use ledgerline_core::{AppError, AppResult, EntryId, OrganizationId};
use ledgerline_domain::{
    AuditLogEntry, EntryField, EntrySpecification, FilterClause, FilterOperator, SortDirection,
};

/// PostgreSQL-backed audit entry repository.
///
/// Specifications are translated to SQL so filtering, ordering, and paging
/// return the same pages the in-memory evaluator produces.
#[derive(Clone)]
pub struct PostgresAuditEntryRepository {
    pool: PgPool,
}

impl PostgresAuditEntryRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    id: Uuid,
    event_type: String,
    occurred_at: DateTime<Utc>,
    ingested_at: DateTime<Utc>,
    payload: Value,
    organization_id: Option<Uuid>,
}

fn entry_from_row(row: EntryRow) -> AppResult<AuditLogEntry> {
    AuditLogEntry::new(
        EntryId::from_uuid(row.id),
        row.event_type,
        row.occurred_at,
        row.ingested_at,
        row.payload,
        row.organization_id.map(OrganizationId::from_uuid),
    )
}

#[async_trait]
impl AuditEntryRepository for PostgresAuditEntryRepository {
    async fn save(&self, entry: &AuditLogEntry) -> AppResult<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO audit_log_entries (
                id,
                event_type,
                occurred_at,
                ingested_at,
                payload,
                organization_id
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(entry.id().as_uuid())
        .bind(entry.event_type().as_str())
        .bind(entry.occurred_at())
        .bind(entry.ingested_at())
        .bind(entry.payload())
        .bind(entry.organization_id().map(|id| id.as_uuid()))
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Persistence(format!("failed to save audit log entry: {error}"))
        })?;

        if inserted.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "audit log entry '{}' already exists",
                entry.id()
            )));
        }

        Ok(())
    }

    async fn find_by_id(&self, entry_id: EntryId) -> AppResult<Option<AuditLogEntry>> {
        let row = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT id, event_type, occurred_at, ingested_at, payload, organization_id
            FROM audit_log_entries
            WHERE id = $1
            "#,
        )
        .bind(entry_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Persistence(format!("failed to load audit log entry: {error}"))
        })?;

        row.map(entry_from_row).transpose()
    }

    async fn query(&self, specification: &EntrySpecification) -> AppResult<Vec<AuditLogEntry>> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT id, event_type, occurred_at, ingested_at, payload, organization_id FROM audit_log_entries",
        );
        push_specification(&mut builder, specification)?;

        let rows = builder
            .build_query_as::<EntryRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Persistence(format!("failed to query audit log entries: {error}"))
            })?;

        rows.into_iter().map(entry_from_row).collect()
    }

    async fn delete_matching(&self, specification: &EntrySpecification) -> AppResult<u64> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "DELETE FROM audit_log_entries WHERE id IN (SELECT id FROM audit_log_entries",
        );
        push_specification(&mut builder, specification)?;
        builder.push(")");

        let deleted = builder.build().execute(&self.pool).await.map_err(|error| {
            AppError::Persistence(format!("failed to delete audit log entries: {error}"))
        })?;

        Ok(deleted.rows_affected())
    }
}

fn push_specification(
    builder: &mut QueryBuilder<'_, Postgres>,
    specification: &EntrySpecification,
) -> AppResult<()> {
    if !specification.filters().is_empty() {
        builder.push(" WHERE ");
        for (index, clause) in specification.filters().iter().enumerate() {
            if index > 0 {
                builder.push(" AND ");
            }
            push_filter_condition(builder, clause)?;
        }
    }

    // Postgres places NULLs last ascending and first descending, matching
    // how the in-memory evaluator orders missing values.
    builder.push(" ORDER BY ");
    for sort in specification.sort() {
        builder.push(sort.field().as_str());
        match sort.direction() {
            SortDirection::Asc => builder.push(" ASC"),
            SortDirection::Desc => builder.push(" DESC"),
        };
        builder.push(", ");
    }
    builder.push("id ASC");

    let limit = i64::try_from(specification.limit())
        .map_err(|error| AppError::Validation(format!("invalid query limit: {error}")))?;
    let offset = i64::try_from(specification.offset())
        .map_err(|error| AppError::Validation(format!("invalid query offset: {error}")))?;
    builder.push(" LIMIT ");
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);

    Ok(())
}

fn push_filter_condition(
    builder: &mut QueryBuilder<'_, Postgres>,
    clause: &FilterClause,
) -> AppResult<()> {
    let column = clause.field().as_str();

    match clause.operator() {
        FilterOperator::Eq => {
            builder.push(column);
            if clause.value().is_null() {
                builder.push(" IS NULL");
            } else {
                builder.push(" = ");
                push_scalar_bind(builder, clause.field(), clause.value())?;
            }
        }
        FilterOperator::Neq => {
            builder.push(column);
            if clause.value().is_null() {
                builder.push(" IS NOT NULL");
            } else {
                builder.push(" <> ");
                push_scalar_bind(builder, clause.field(), clause.value())?;
            }
        }
        FilterOperator::Gt
        | FilterOperator::Gte
        | FilterOperator::Lt
        | FilterOperator::Lte => {
            let operator = match clause.operator() {
                FilterOperator::Gt => " > ",
                FilterOperator::Gte => " >= ",
                FilterOperator::Lt => " < ",
                FilterOperator::Lte => " <= ",
                _ => unreachable!(),
            };
            builder.push(column);
            builder.push(operator);
            push_scalar_bind(builder, clause.field(), clause.value())?;
        }
        FilterOperator::Contains => {
            // strpos keeps the case-sensitive substring semantics of the
            // in-memory evaluator and needs no LIKE escaping.
            builder.push("strpos(");
            builder.push(column);
            builder.push(", ");
            builder.push_bind(clause.value().as_str().unwrap_or_default().to_owned());
            builder.push(") > 0");
        }
        FilterOperator::In => {
            let values = clause.value().as_array().cloned().unwrap_or_default();
            builder.push('(');
            for (index, value) in values.iter().enumerate() {
                if index > 0 {
                    builder.push(" OR ");
                }
                builder.push(column);
                builder.push(" = ");
                push_scalar_bind(builder, clause.field(), value)?;
            }
            builder.push(')');
        }
    }

    Ok(())
}

fn push_scalar_bind(
    builder: &mut QueryBuilder<'_, Postgres>,
    field: EntryField,
    value: &Value,
) -> AppResult<()> {
    match field {
        EntryField::Id | EntryField::OrganizationId => {
            let text = value.as_str().ok_or_else(|| malformed_value(field))?;
            let id = Uuid::parse_str(text).map_err(|_| malformed_value(field))?;
            builder.push_bind(id);
        }
        EntryField::EventType => {
            let text = value.as_str().ok_or_else(|| malformed_value(field))?;
            builder.push_bind(text.to_owned());
        }
        EntryField::OccurredAt | EntryField::IngestedAt => {
            let text = value.as_str().ok_or_else(|| malformed_value(field))?;
            let moment = DateTime::parse_from_rfc3339(text)
                .map_err(|_| malformed_value(field))?
                .with_timezone(&Utc);
            builder.push_bind(moment);
        }
    }

    Ok(())
}

fn malformed_value(field: EntryField) -> AppError {
    AppError::Validation(format!(
        "filter value for field '{}' is malformed",
        field.as_str()
    ))
}
