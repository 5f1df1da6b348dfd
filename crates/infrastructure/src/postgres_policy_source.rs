//! Postgres-backed retention policy source.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use ledgerline_application::RetentionPolicySource;
use ledgerline_core::{AppError, AppResult, PolicyId};
use ledgerline_domain::{FilterClause, RetentionPolicy};

/// Reads retention policies from the `retention_policies` table.
#[derive(Clone)]
pub struct PostgresRetentionPolicySource {
    pool: PgPool,
}

impl PostgresRetentionPolicySource {
    /// Creates a policy source backed by the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PolicyRow {
    id: Uuid,
    name: String,
    is_active: bool,
    scope_filters: Value,
    max_age_seconds: i64,
    created_at: DateTime<Utc>,
}

// Stored policies are operator-edited, so every row passes back through the
// domain constructors before a sweep may act on it.
fn policy_from_row(row: PolicyRow) -> AppResult<RetentionPolicy> {
    let decoded: Vec<FilterClause> = serde_json::from_value(row.scope_filters).map_err(|error| {
        AppError::Internal(format!(
            "persisted scope filters are invalid for retention policy '{}': {error}",
            row.id
        ))
    })?;

    let mut scope_filters = Vec::with_capacity(decoded.len());
    for filter in decoded {
        scope_filters.push(FilterClause::new(
            filter.field(),
            filter.operator(),
            filter.value().clone(),
        )?);
    }

    RetentionPolicy::new(
        PolicyId::from_uuid(row.id),
        row.name,
        row.is_active,
        scope_filters,
        row.max_age_seconds,
        row.created_at,
    )
}

#[async_trait]
impl RetentionPolicySource for PostgresRetentionPolicySource {
    async fn list_active(&self) -> AppResult<Vec<RetentionPolicy>> {
        let rows = sqlx::query_as::<_, PolicyRow>(
            r#"
            SELECT id, name, is_active, scope_filters, max_age_seconds, created_at
            FROM retention_policies
            WHERE is_active
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Persistence(format!("failed to list active retention policies: {error}"))
        })?;

        rows.into_iter().map(policy_from_row).collect()
    }

    async fn find_by_id(&self, policy_id: PolicyId) -> AppResult<Option<RetentionPolicy>> {
        let row = sqlx::query_as::<_, PolicyRow>(
            r#"
            SELECT id, name, is_active, scope_filters, max_age_seconds, created_at
            FROM retention_policies
            WHERE id = $1
            "#,
        )
        .bind(policy_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Persistence(format!(
                "failed to load retention policy '{policy_id}': {error}"
            ))
        })?;

        row.map(policy_from_row).transpose()
    }
}

#[cfg(test)]
mod tests;
