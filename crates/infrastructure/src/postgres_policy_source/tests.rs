use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use ledgerline_application::RetentionPolicySource;
use ledgerline_core::{AppError, PolicyId};
use ledgerline_domain::{EntryField, FilterOperator};

use super::PostgresRetentionPolicySource;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres policy tests: {error}");
    }

    Some(pool)
}

async fn insert_policy(
    pool: &PgPool,
    id: PolicyId,
    name: &str,
    is_active: bool,
    scope_filters: Value,
    created_at: DateTime<Utc>,
) {
    let inserted = sqlx::query(
        r#"
        INSERT INTO retention_policies (id, name, is_active, scope_filters, max_age_seconds, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id.as_uuid())
    .bind(name)
    .bind(is_active)
    .bind(scope_filters)
    .bind(86_400_i64)
    .bind(created_at)
    .execute(pool)
    .await;
    assert!(inserted.is_ok());
}

#[tokio::test]
async fn active_policies_are_listed_in_creation_order() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let source = PostgresRetentionPolicySource::new(pool.clone());

    let run = Uuid::new_v4();
    let older = PolicyId::new();
    let newer = PolicyId::new();
    let retired = PolicyId::new();
    let base = Utc::now() - Duration::days(10);
    insert_policy(
        &pool,
        newer,
        format!("listing {run} newer").as_str(),
        true,
        serde_json::json!([]),
        base + Duration::days(1),
    )
    .await;
    insert_policy(
        &pool,
        older,
        format!("listing {run} older").as_str(),
        true,
        serde_json::json!([]),
        base,
    )
    .await;
    insert_policy(
        &pool,
        retired,
        format!("listing {run} retired").as_str(),
        false,
        serde_json::json!([]),
        base,
    )
    .await;

    let listed = source.list_active().await;
    assert!(listed.is_ok());
    let ids: Vec<PolicyId> = listed
        .unwrap_or_default()
        .iter()
        .map(|policy| policy.id())
        .collect();

    // Other rows may exist in a shared database; only relative order matters.
    let older_at = ids.iter().position(|id| *id == older);
    let newer_at = ids.iter().position(|id| *id == newer);
    assert!(older_at.is_some());
    assert!(newer_at.is_some());
    assert!(older_at < newer_at);
    assert!(!ids.contains(&retired));
}

#[tokio::test]
async fn find_by_id_returns_inactive_policies_with_decoded_filters() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let source = PostgresRetentionPolicySource::new(pool.clone());

    let policy_id = PolicyId::new();
    insert_policy(
        &pool,
        policy_id,
        "retired billing purge",
        false,
        serde_json::json!([
            {"field": "event_type", "operator": "contains", "value": "billing."}
        ]),
        Utc::now() - Duration::days(30),
    )
    .await;

    let found = source.find_by_id(policy_id).await;
    assert!(found.is_ok());
    let Ok(Some(policy)) = found else {
        panic!("inserted policy was not found");
    };

    assert_eq!(policy.id(), policy_id);
    assert!(!policy.is_active());
    assert_eq!(policy.max_age_seconds(), 86_400);
    assert_eq!(policy.scope_filters().len(), 1);
    assert_eq!(policy.scope_filters()[0].field(), EntryField::EventType);
    assert_eq!(
        policy.scope_filters()[0].operator(),
        FilterOperator::Contains
    );
    assert_eq!(
        policy.scope_filters()[0].value(),
        &serde_json::json!("billing.")
    );
}

#[tokio::test]
async fn unknown_policy_ids_find_nothing() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let source = PostgresRetentionPolicySource::new(pool);

    let found = source.find_by_id(PolicyId::new()).await;
    assert!(found.is_ok());
    assert_eq!(found.unwrap_or_default(), None);
}

#[tokio::test]
async fn malformed_scope_filters_fail_to_load() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let source = PostgresRetentionPolicySource::new(pool.clone());

    // Inactive so parallel listing tests never trip over the corrupt row.
    let policy_id = PolicyId::new();
    insert_policy(
        &pool,
        policy_id,
        "corrupted scope shape",
        false,
        serde_json::json!({"filters": "not a list"}),
        Utc::now(),
    )
    .await;

    let found = source.find_by_id(policy_id).await;
    assert!(matches!(
        found,
        Err(AppError::Internal(ref message)) if message.contains("persisted scope filters")
    ));
}

#[tokio::test]
async fn stored_filters_are_revalidated_against_the_operator_rules() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let source = PostgresRetentionPolicySource::new(pool.clone());

    let policy_id = PolicyId::new();
    insert_policy(
        &pool,
        policy_id,
        "contains on a timestamp",
        false,
        serde_json::json!([
            {"field": "occurred_at", "operator": "contains", "value": "2026"}
        ]),
        Utc::now(),
    )
    .await;

    let found = source.find_by_id(policy_id).await;
    assert!(matches!(
        found,
        Err(AppError::Validation(ref message)) if message.contains("contains")
    ));
}
