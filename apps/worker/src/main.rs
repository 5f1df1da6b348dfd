//! Ledgerline retention sweep worker.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use ledgerline_application::{
    DomainEventPublisher, PolicyOutcomeStatus, RetentionService, RetentionSweepConfig,
    SweepCancellation, SweepLockCoordinator, SweepReport, SweepStatus,
};
use ledgerline_core::{AppError, AppResult};
use ledgerline_infrastructure::{
    InMemorySweepLockCoordinator, PostgresAuditEntryRepository, PostgresRetentionPolicySource,
    RedisSweepLockCoordinator, SystemClock, TracingEventPublisher, WebhookEventPublisher,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    redis_url: Option<String>,
    webhook_url: Option<String>,
    worker_id: String,
    sweep_interval_seconds: u64,
    sweep_batch_size: usize,
    sweep_max_batches: u32,
    sweep_lock_seconds: u32,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let retention_service = build_retention_service(pool, &config)?;
    let cancellation = SweepCancellation::new();

    info!(
        worker_id = %config.worker_id,
        sweep_interval_seconds = config.sweep_interval_seconds,
        sweep_batch_size = config.sweep_batch_size,
        sweep_max_batches = config.sweep_max_batches,
        sweep_lock_seconds = config.sweep_lock_seconds,
        "ledgerline-worker started"
    );

    // A sweep in flight must run to its next batch boundary so held locks are
    // released; the signal only trips the flag, it never aborts the future.
    let shutdown = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested, stopping after the current batch");
            shutdown.cancel();
        }
    });

    let interval = Duration::from_secs(config.sweep_interval_seconds);
    loop {
        match retention_service.apply_all(&cancellation).await {
            Ok(report) => log_report(config.worker_id.as_str(), &report),
            Err(error) => warn!(
                worker_id = %config.worker_id,
                error = %error,
                "retention sweep failed to start"
            ),
        }

        if cancellation.is_cancelled() {
            break;
        }

        interruptible_sleep(interval, &cancellation).await;

        if cancellation.is_cancelled() {
            break;
        }
    }

    info!(worker_id = %config.worker_id, "ledgerline-worker stopped");
    Ok(())
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn build_retention_service(pool: PgPool, config: &WorkerConfig) -> AppResult<RetentionService> {
    let entry_repository = Arc::new(PostgresAuditEntryRepository::new(pool.clone()));
    let policy_source = Arc::new(PostgresRetentionPolicySource::new(pool));
    let event_publisher = build_event_publisher(config.webhook_url.as_deref())?;
    let lock_coordinator = build_lock_coordinator(config.redis_url.as_deref())?;
    let sweep_config = RetentionSweepConfig::new(
        config.sweep_batch_size,
        config.sweep_max_batches,
        config.sweep_lock_seconds,
    )?;

    Ok(RetentionService::new(
        entry_repository,
        policy_source,
        event_publisher,
        lock_coordinator,
        Arc::new(SystemClock::new()),
        sweep_config,
        config.worker_id.clone(),
    ))
}

fn build_event_publisher(webhook_url: Option<&str>) -> AppResult<Arc<dyn DomainEventPublisher>> {
    let Some(webhook_url) = webhook_url else {
        return Ok(Arc::new(TracingEventPublisher::new()));
    };

    let endpoint = Url::parse(webhook_url)
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

fn build_lock_coordinator(redis_url: Option<&str>) -> AppResult<Arc<dyn SweepLockCoordinator>> {
    let Some(redis_url) = redis_url else {
        return Ok(Arc::new(InMemorySweepLockCoordinator::new()));
    };

    let client = redis::Client::open(redis_url)
        .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))?;

    Ok(Arc::new(RedisSweepLockCoordinator::new(
        client,
        "ledgerline:sweep",
    )))
}

// Sleeps in one-second slices so a shutdown request never waits out a full
// sweep interval.
async fn interruptible_sleep(total: Duration, cancellation: &SweepCancellation) {
    let mut remaining = total;
    while !cancellation.is_cancelled() && !remaining.is_zero() {
        let slice = remaining.min(Duration::from_secs(1));
        tokio::time::sleep(slice).await;
        remaining = remaining.saturating_sub(slice);
    }
}

fn log_report(worker_id: &str, report: &SweepReport) {
    for outcome in &report.outcomes {
        match &outcome.status {
            PolicyOutcomeStatus::Applied => info!(
                worker_id,
                policy_id = %outcome.policy_id,
                policy_name = outcome.policy_name.as_str(),
                records_deleted = outcome.records_deleted,
                batches = outcome.batches,
                "retention policy applied"
            ),
            PolicyOutcomeStatus::Failed { reason } => warn!(
                worker_id,
                policy_id = %outcome.policy_id,
                policy_name = outcome.policy_name.as_str(),
                records_deleted = outcome.records_deleted,
                batches = outcome.batches,
                reason = reason.as_str(),
                "retention policy sweep failed"
            ),
            PolicyOutcomeStatus::BatchLimitReached => warn!(
                worker_id,
                policy_id = %outcome.policy_id,
                policy_name = outcome.policy_name.as_str(),
                records_deleted = outcome.records_deleted,
                batches = outcome.batches,
                "batch limit reached, the rest waits for the next interval"
            ),
            PolicyOutcomeStatus::Cancelled => info!(
                worker_id,
                policy_id = %outcome.policy_id,
                policy_name = outcome.policy_name.as_str(),
                records_deleted = outcome.records_deleted,
                "sweep cancelled before this policy finished"
            ),
            PolicyOutcomeStatus::AlreadyRunning => info!(
                worker_id,
                policy_id = %outcome.policy_id,
                policy_name = outcome.policy_name.as_str(),
                "policy sweep already running elsewhere"
            ),
        }
    }

    match report.status {
        SweepStatus::Completed => info!(
            worker_id,
            policies = report.outcomes.len(),
            "retention sweep completed"
        ),
        SweepStatus::PartiallyFailed => warn!(
            worker_id,
            policies = report.outcomes.len(),
            "retention sweep finished with unapplied policies"
        ),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let redis_url = optional_env("REDIS_URL");
        let webhook_url = optional_env("EVENT_WEBHOOK_URL");
        let worker_id = env::var("WORKER_ID")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));
        let sweep_interval_seconds = parse_env_u64("SWEEP_INTERVAL_SECONDS", 300)?;
        let sweep_batch_size = parse_env_usize("SWEEP_BATCH_SIZE", 100)?;
        let sweep_max_batches = parse_env_u32("SWEEP_MAX_BATCHES", 10)?;
        let sweep_lock_seconds = parse_env_u32("SWEEP_LOCK_SECONDS", 60)?;

        if sweep_interval_seconds == 0 {
            return Err(AppError::Validation(
                "SWEEP_INTERVAL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            redis_url,
            webhook_url,
            worker_id,
            sweep_interval_seconds,
            sweep_batch_size,
            sweep_max_batches,
            sweep_lock_seconds,
        })
    }
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

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
