//! Ledgerline API composition root.

#![forbid(unsafe_code)]

mod dto;
mod error;
mod handlers;
mod middleware;
mod state;

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use ledgerline_application::{
    AuditIngestionService, AuditQueryService, DomainEventPublisher, RetentionService,
    RetentionSweepConfig, SweepLockCoordinator,
};
use ledgerline_core::{AppError, AppResult};
use ledgerline_infrastructure::{
    InMemorySweepLockCoordinator, PostgresAuditEntryRepository, PostgresRetentionPolicySource,
    RedisSweepLockCoordinator, SystemClock, TracingEventPublisher, WebhookEventPublisher,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let migrate_only = env::args().nth(1).as_deref() == Some("migrate");

    let database_url = required_env("DATABASE_URL")?;
    let internal_api_token = required_env("INTERNAL_API_TOKEN")?;

    if internal_api_token.trim().is_empty() {
        return Err(AppError::Validation(
            "INTERNAL_API_TOKEN must not be empty".to_owned(),
        ));
    }

    let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
    let api_port = env::var("API_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3001);

    let webhook_url = optional_env("EVENT_WEBHOOK_URL");
    let redis_url = optional_env("REDIS_URL");
    let sweep_batch_size = parse_env_usize("SWEEP_BATCH_SIZE", 100)?;
    let sweep_max_batches = parse_env_u32("SWEEP_MAX_BATCHES", 10)?;
    let sweep_lock_seconds = parse_env_u32("SWEEP_LOCK_SECONDS", 60)?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    if migrate_only {
        info!("database migrations applied successfully");
        return Ok(());
    }

    let entry_repository = Arc::new(PostgresAuditEntryRepository::new(pool.clone()));
    let policy_source = Arc::new(PostgresRetentionPolicySource::new(pool));
    let clock = Arc::new(SystemClock::new());
    let event_publisher = build_event_publisher(webhook_url)?;
    let lock_coordinator = build_lock_coordinator(redis_url)?;
    let sweep_config =
        RetentionSweepConfig::new(sweep_batch_size, sweep_max_batches, sweep_lock_seconds)?;

    let app_state = AppState {
        ingestion_service: AuditIngestionService::new(
            entry_repository.clone(),
            event_publisher.clone(),
            clock.clone(),
        ),
        query_service: AuditQueryService::new(entry_repository.clone()),
        retention_service: RetentionService::new(
            entry_repository,
            policy_source,
            event_publisher,
            lock_coordinator,
            clock,
            sweep_config,
            format!("ledgerline-api-{}", std::process::id()),
        ),
        internal_api_token,
    };

    let internal_routes = Router::new()
        .route(
            "/api/internal/retention/sweep",
            post(handlers::run_sweep_handler),
        )
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::require_internal_auth,
        ));

    let app = Router::new()
        .route("/api/health", get(handlers::health_handler))
        .route("/api/audit/events", post(handlers::ingest_event_handler))
        .route(
            "/api/audit/entries/query",
            post(handlers::query_entries_handler),
        )
        .route(
            "/api/audit/entries/{entry_id}",
            get(handlers::get_entry_handler),
        )
        .merge(internal_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let host = IpAddr::from_str(&api_host)
        .map_err(|error| AppError::Internal(format!("invalid API_HOST '{api_host}': {error}")))?;
    let address = SocketAddr::from((host, api_port));

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(%address, "ledgerline-api listening");

    axum::serve(listener, app)
        .await
        .map_err(|error| AppError::Internal(format!("api server error: {error}")))
}

fn build_event_publisher(webhook_url: Option<String>) -> AppResult<Arc<dyn DomainEventPublisher>> {
    let Some(webhook_url) = webhook_url else {
        return Ok(Arc::new(TracingEventPublisher::new()));
    };

    let endpoint = Url::parse(webhook_url.as_str())
        .map_err(|error| AppError::Validation(format!("invalid EVENT_WEBHOOK_URL: {error}")))?;
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;

    Ok(Arc::new(WebhookEventPublisher::new(
        http_client,
        endpoint,
        3,
        250,
    )))
}

fn build_lock_coordinator(redis_url: Option<String>) -> AppResult<Arc<dyn SweepLockCoordinator>> {
    let Some(redis_url) = redis_url else {
        return Ok(Arc::new(InMemorySweepLockCoordinator::new()));
    };

    let client = redis::Client::open(redis_url.as_str())
        .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))?;

    Ok(Arc::new(RedisSweepLockCoordinator::new(
        client,
        "ledgerline:sweep",
    )))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
