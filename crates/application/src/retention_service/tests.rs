use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::Mutex;

use ledgerline_core::{AppError, AppResult, EntryId, PolicyId};
use ledgerline_domain::{
    AuditLogEntry, DomainEvent, DomainEventKind, EntryField, EntrySpecification, FilterClause,
    FilterOperator, MAX_PAGE_SIZE, RetentionPolicy,
};

use super::{
    PolicyOutcomeStatus, RetentionService, RetentionSweepConfig, SweepCancellation, SweepStatus,
};
use crate::audit_ports::{
    AuditEntryRepository, Clock, DomainEventPublisher, RetentionPolicySource, SweepLock,
    SweepLockCoordinator,
};

#[derive(Default)]
struct FakeEntryRepository {
    entries: Mutex<Vec<AuditLogEntry>>,
    delete_calls: Mutex<u32>,
    failing_deletes: Mutex<u32>,
    cancel_during_delete: Option<SweepCancellation>,
}

#[async_trait]
impl AuditEntryRepository for FakeEntryRepository {
    async fn save(&self, entry: &AuditLogEntry) -> AppResult<()> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }

    async fn find_by_id(&self, entry_id: EntryId) -> AppResult<Option<AuditLogEntry>> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .find(|entry| entry.id() == entry_id)
            .cloned())
    }

    async fn query(&self, specification: &EntrySpecification) -> AppResult<Vec<AuditLogEntry>> {
        Ok(specification.apply(&self.entries.lock().await))
    }

    async fn delete_matching(&self, specification: &EntrySpecification) -> AppResult<u64> {
        *self.delete_calls.lock().await += 1;
        if let Some(cancellation) = &self.cancel_during_delete {
            cancellation.cancel();
        }
        {
            let mut failing = self.failing_deletes.lock().await;
            if *failing > 0 {
                *failing -= 1;
                return Err(AppError::Persistence("deadlock detected".to_owned()));
            }
        }

        let mut entries = self.entries.lock().await;
        let selected: Vec<EntryId> = specification
            .apply(&entries)
            .iter()
            .map(AuditLogEntry::id)
            .collect();
        entries.retain(|entry| !selected.contains(&entry.id()));
        Ok(selected.len() as u64)
    }
}

struct FakePolicySource {
    policies: Vec<RetentionPolicy>,
}

#[async_trait]
impl RetentionPolicySource for FakePolicySource {
    async fn list_active(&self) -> AppResult<Vec<RetentionPolicy>> {
        Ok(self
            .policies
            .iter()
            .filter(|policy| policy.is_active())
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, policy_id: PolicyId) -> AppResult<Option<RetentionPolicy>> {
        Ok(self
            .policies
            .iter()
            .find(|policy| policy.id() == policy_id)
            .cloned())
    }
}

#[derive(Default)]
struct FakeEventPublisher {
    events: Mutex<Vec<DomainEvent>>,
    fail_publishes: bool,
}

#[async_trait]
impl DomainEventPublisher for FakeEventPublisher {
    async fn publish(&self, event: &DomainEvent) -> AppResult<()> {
        if self.fail_publishes {
            return Err(AppError::Internal("event sink offline".to_owned()));
        }
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
struct FakeLockCoordinator {
    busy: bool,
    failing: bool,
    acquired: Mutex<Vec<PolicyId>>,
    released: Mutex<Vec<SweepLock>>,
}

#[async_trait]
impl SweepLockCoordinator for FakeLockCoordinator {
    async fn try_acquire(
        &self,
        policy_id: PolicyId,
        holder_id: &str,
        _ttl_seconds: u32,
    ) -> AppResult<Option<SweepLock>> {
        if self.failing {
            return Err(AppError::Persistence("lock backend unreachable".to_owned()));
        }
        if self.busy {
            return Ok(None);
        }
        self.acquired.lock().await.push(policy_id);
        Ok(Some(SweepLock {
            policy_id,
            token: format!("token-{policy_id}"),
            holder_id: holder_id.to_owned(),
        }))
    }

    async fn release(&self, lock: &SweepLock) -> AppResult<()> {
        self.released.lock().await.push(lock.clone());
        Ok(())
    }
}

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

struct Harness {
    service: RetentionService,
    repository: Arc<FakeEntryRepository>,
    publisher: Arc<FakeEventPublisher>,
    locks: Arc<FakeLockCoordinator>,
}

fn harness(
    repository: FakeEntryRepository,
    policies: Vec<RetentionPolicy>,
    publisher: FakeEventPublisher,
    locks: FakeLockCoordinator,
    config: RetentionSweepConfig,
) -> Harness {
    let repository = Arc::new(repository);
    let publisher = Arc::new(publisher);
    let locks = Arc::new(locks);
    let service = RetentionService::new(
        repository.clone(),
        Arc::new(FakePolicySource { policies }),
        publisher.clone(),
        locks.clone(),
        Arc::new(FixedClock(test_now())),
        config,
        "sweeper-under-test",
    );
    Harness {
        service,
        repository,
        publisher,
        locks,
    }
}

fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 15, 8, 0, 0)
        .single()
        .unwrap_or_else(|| unreachable!())
}

fn days_ago(days: i64) -> DateTime<Utc> {
    test_now() - Duration::days(days)
}

fn entry_occurred(event_type: &str, occurred_at: DateTime<Utc>) -> AuditLogEntry {
    AuditLogEntry::new(
        EntryId::new(),
        event_type,
        occurred_at,
        occurred_at + Duration::seconds(1),
        serde_json::json!({}),
        None,
    )
    .unwrap_or_else(|_| unreachable!())
}

fn repository_with_ages(days: &[i64]) -> FakeEntryRepository {
    let entries = days
        .iter()
        .map(|age| entry_occurred("user.login", days_ago(*age)))
        .collect();
    FakeEntryRepository {
        entries: Mutex::new(entries),
        ..FakeEntryRepository::default()
    }
}

fn thirty_day_policy(name: &str) -> RetentionPolicy {
    policy_with_scope(name, Vec::new())
}

fn policy_with_scope(name: &str, scope_filters: Vec<FilterClause>) -> RetentionPolicy {
    RetentionPolicy::new(
        PolicyId::new(),
        name,
        true,
        scope_filters,
        30 * 86_400,
        days_ago(365),
    )
    .unwrap_or_else(|_| unreachable!())
}

fn event_type_scope(event_type: &str) -> Vec<FilterClause> {
    vec![
        FilterClause::new(
            EntryField::EventType,
            FilterOperator::Eq,
            serde_json::json!(event_type),
        )
        .unwrap_or_else(|_| unreachable!()),
    ]
}

fn config(batch_size: usize, max_batches: u32) -> RetentionSweepConfig {
    RetentionSweepConfig::new(batch_size, max_batches, 60).unwrap_or_else(|_| unreachable!())
}

#[test]
fn sweep_config_rejects_zero_bounds() {
    assert!(matches!(
        RetentionSweepConfig::new(0, 10, 60),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        RetentionSweepConfig::new(100, 0, 60),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        RetentionSweepConfig::new(100, 10, 0),
        Err(AppError::Validation(_))
    ));
}

#[test]
fn sweep_config_caps_the_batch_size() {
    let config = RetentionSweepConfig::new(MAX_PAGE_SIZE * 2, 10, 60)
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(config.batch_size(), MAX_PAGE_SIZE);
}

#[tokio::test]
async fn expired_entries_are_drained_in_batches_with_one_event() {
    let ages = [3, 7, 11, 15, 19, 23, 31, 33, 37, 41];
    let harness = harness(
        repository_with_ages(&ages),
        vec![thirty_day_policy("stale-logins")],
        FakeEventPublisher::default(),
        FakeLockCoordinator::default(),
        config(3, 10),
    );

    let report = harness
        .service
        .apply_all(&SweepCancellation::new())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.status, SweepStatus::Completed);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].records_deleted, 4);
    assert_eq!(report.outcomes[0].batches, 2);
    assert_eq!(report.outcomes[0].status, PolicyOutcomeStatus::Applied);

    let remaining = harness.repository.entries.lock().await;
    assert_eq!(remaining.len(), 6);
    assert!(remaining.iter().all(|entry| entry.occurred_at() >= days_ago(30)));

    let events = harness.publisher.events.lock().await;
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0].kind(),
        DomainEventKind::RetentionApplied { policy_scope_name, records_deleted: 4, applied_at }
            if policy_scope_name == "stale-logins" && *applied_at == test_now()
    ));
}

#[tokio::test]
async fn entry_exactly_at_the_age_limit_survives_the_sweep() {
    let boundary = days_ago(30);
    let repository = FakeEntryRepository {
        entries: Mutex::new(vec![
            entry_occurred("user.login", boundary),
            entry_occurred("user.login", boundary - Duration::seconds(1)),
        ]),
        ..FakeEntryRepository::default()
    };
    let harness = harness(
        repository,
        vec![thirty_day_policy("stale-logins")],
        FakeEventPublisher::default(),
        FakeLockCoordinator::default(),
        config(10, 10),
    );

    let report = harness
        .service
        .apply_all(&SweepCancellation::new())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.outcomes[0].records_deleted, 1);

    let remaining = harness.repository.entries.lock().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].occurred_at(), boundary);
}

#[tokio::test]
async fn overlapping_policies_sweep_in_creation_order() {
    let harness = harness(
        repository_with_ages(&[40, 50, 60]),
        vec![
            thirty_day_policy("first-policy"),
            thirty_day_policy("second-policy"),
        ],
        FakeEventPublisher::default(),
        FakeLockCoordinator::default(),
        config(3, 10),
    );

    let report = harness
        .service
        .apply_all(&SweepCancellation::new())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.status, SweepStatus::Completed);
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.outcomes[0].policy_name, "first-policy");
    assert_eq!(report.outcomes[0].records_deleted, 3);
    assert_eq!(report.outcomes[1].policy_name, "second-policy");
    assert_eq!(report.outcomes[1].records_deleted, 0);

    let events = harness.publisher.events.lock().await;
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[0].kind(),
        DomainEventKind::RetentionApplied { records_deleted: 3, .. }
    ));
    assert!(matches!(
        events[1].kind(),
        DomainEventKind::RetentionApplied { records_deleted: 0, .. }
    ));
}

#[tokio::test]
async fn batch_limit_stops_a_runaway_sweep() {
    let harness = harness(
        repository_with_ages(&[31, 32, 33, 34, 35, 36, 37]),
        vec![thirty_day_policy("stale-logins")],
        FakeEventPublisher::default(),
        FakeLockCoordinator::default(),
        config(2, 2),
    );

    let report = harness
        .service
        .apply_all(&SweepCancellation::new())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.status, SweepStatus::PartiallyFailed);
    assert_eq!(report.outcomes[0].records_deleted, 4);
    assert_eq!(report.outcomes[0].batches, 2);
    assert_eq!(
        report.outcomes[0].status,
        PolicyOutcomeStatus::BatchLimitReached
    );

    assert_eq!(harness.repository.entries.lock().await.len(), 3);
    assert!(harness.publisher.events.lock().await.is_empty());
}

#[tokio::test]
async fn cancellation_between_batches_keeps_partial_progress() {
    let cancellation = SweepCancellation::new();
    let repository = FakeEntryRepository {
        cancel_during_delete: Some(cancellation.clone()),
        ..repository_with_ages(&[31, 32, 33, 34, 35, 36])
    };
    let harness = harness(
        repository,
        vec![thirty_day_policy("stale-logins")],
        FakeEventPublisher::default(),
        FakeLockCoordinator::default(),
        config(3, 10),
    );

    let report = harness
        .service
        .apply_all(&cancellation)
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.status, SweepStatus::PartiallyFailed);
    assert_eq!(report.outcomes[0].records_deleted, 3);
    assert_eq!(report.outcomes[0].batches, 1);
    assert_eq!(report.outcomes[0].status, PolicyOutcomeStatus::Cancelled);

    assert_eq!(harness.repository.entries.lock().await.len(), 3);
    assert!(harness.publisher.events.lock().await.is_empty());
}

#[tokio::test]
async fn cancellation_before_the_sweep_touches_nothing() {
    let cancellation = SweepCancellation::new();
    cancellation.cancel();
    let harness = harness(
        repository_with_ages(&[40]),
        vec![thirty_day_policy("stale-logins")],
        FakeEventPublisher::default(),
        FakeLockCoordinator::default(),
        config(3, 10),
    );

    let report = harness
        .service
        .apply_all(&cancellation)
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.outcomes[0].status, PolicyOutcomeStatus::Cancelled);
    assert_eq!(*harness.repository.delete_calls.lock().await, 0);
    assert!(harness.locks.acquired.lock().await.is_empty());
    assert_eq!(harness.repository.entries.lock().await.len(), 1);
}

#[tokio::test]
async fn held_lock_reports_the_policy_as_already_running() {
    let harness = harness(
        repository_with_ages(&[40, 50]),
        vec![thirty_day_policy("stale-logins")],
        FakeEventPublisher::default(),
        FakeLockCoordinator {
            busy: true,
            ..FakeLockCoordinator::default()
        },
        config(3, 10),
    );

    let report = harness
        .service
        .apply_all(&SweepCancellation::new())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.status, SweepStatus::PartiallyFailed);
    assert_eq!(
        report.outcomes[0].status,
        PolicyOutcomeStatus::AlreadyRunning
    );
    assert_eq!(report.outcomes[0].records_deleted, 0);
    assert_eq!(harness.repository.entries.lock().await.len(), 2);
    assert!(harness.publisher.events.lock().await.is_empty());
}

#[tokio::test]
async fn unreachable_lock_backend_fails_the_policy() {
    let harness = harness(
        repository_with_ages(&[40]),
        vec![thirty_day_policy("stale-logins")],
        FakeEventPublisher::default(),
        FakeLockCoordinator {
            failing: true,
            ..FakeLockCoordinator::default()
        },
        config(3, 10),
    );

    let report = harness
        .service
        .apply_all(&SweepCancellation::new())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.status, SweepStatus::PartiallyFailed);
    assert!(matches!(
        &report.outcomes[0].status,
        PolicyOutcomeStatus::Failed { reason } if reason.contains("lock backend")
    ));
    assert_eq!(*harness.repository.delete_calls.lock().await, 0);
}

#[tokio::test]
async fn sweep_releases_the_lock_after_draining() {
    let policy = thirty_day_policy("stale-logins");
    let harness = harness(
        repository_with_ages(&[40]),
        vec![policy.clone()],
        FakeEventPublisher::default(),
        FakeLockCoordinator::default(),
        config(3, 10),
    );

    harness
        .service
        .apply_all(&SweepCancellation::new())
        .await
        .unwrap_or_else(|_| unreachable!());

    let released = harness.locks.released.lock().await;
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].policy_id, policy.id());
    assert_eq!(released[0].holder_id, "sweeper-under-test");
}

#[tokio::test]
async fn storage_failure_does_not_stop_later_policies() {
    let repository = FakeEntryRepository {
        failing_deletes: Mutex::new(1),
        ..repository_with_ages(&[40, 50])
    };
    let harness = harness(
        repository,
        vec![
            thirty_day_policy("first-policy"),
            thirty_day_policy("second-policy"),
        ],
        FakeEventPublisher::default(),
        FakeLockCoordinator::default(),
        config(3, 10),
    );

    let report = harness
        .service
        .apply_all(&SweepCancellation::new())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.status, SweepStatus::PartiallyFailed);
    assert!(matches!(
        &report.outcomes[0].status,
        PolicyOutcomeStatus::Failed { reason } if reason.contains("deadlock")
    ));
    assert_eq!(report.outcomes[0].records_deleted, 0);
    assert_eq!(report.outcomes[1].status, PolicyOutcomeStatus::Applied);
    assert_eq!(report.outcomes[1].records_deleted, 2);

    let events = harness.publisher.events.lock().await;
    assert_eq!(events.len(), 1);
    assert_eq!(harness.locks.released.lock().await.len(), 2);
}

#[tokio::test]
async fn scoped_policy_leaves_other_event_types_alone() {
    let repository = FakeEntryRepository {
        entries: Mutex::new(vec![
            entry_occurred("user.login", days_ago(40)),
            entry_occurred("user.logout", days_ago(40)),
        ]),
        ..FakeEntryRepository::default()
    };
    let harness = harness(
        repository,
        vec![policy_with_scope("stale-logins", event_type_scope("user.login"))],
        FakeEventPublisher::default(),
        FakeLockCoordinator::default(),
        config(10, 10),
    );

    let report = harness
        .service
        .apply_all(&SweepCancellation::new())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.outcomes[0].records_deleted, 1);

    let remaining = harness.repository.entries.lock().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].event_type().as_str(), "user.logout");
}

#[tokio::test]
async fn inactive_policies_are_skipped_by_a_full_sweep() {
    let inactive = RetentionPolicy::new(
        PolicyId::new(),
        "dormant",
        false,
        Vec::new(),
        30 * 86_400,
        days_ago(365),
    )
    .unwrap_or_else(|_| unreachable!());
    let harness = harness(
        repository_with_ages(&[40]),
        vec![inactive, thirty_day_policy("stale-logins")],
        FakeEventPublisher::default(),
        FakeLockCoordinator::default(),
        config(3, 10),
    );

    let report = harness
        .service
        .apply_all(&SweepCancellation::new())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].policy_name, "stale-logins");
}

#[tokio::test]
async fn apply_policy_rejects_unknown_identifiers() {
    let harness = harness(
        FakeEntryRepository::default(),
        vec![thirty_day_policy("stale-logins")],
        FakeEventPublisher::default(),
        FakeLockCoordinator::default(),
        config(3, 10),
    );

    let result = harness
        .service
        .apply_policy(PolicyId::new(), &SweepCancellation::new())
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn apply_policy_rejects_inactive_policies() {
    let inactive = RetentionPolicy::new(
        PolicyId::new(),
        "dormant",
        false,
        Vec::new(),
        30 * 86_400,
        days_ago(365),
    )
    .unwrap_or_else(|_| unreachable!());
    let harness = harness(
        FakeEntryRepository::default(),
        vec![inactive.clone()],
        FakeEventPublisher::default(),
        FakeLockCoordinator::default(),
        config(3, 10),
    );

    let result = harness
        .service
        .apply_policy(inactive.id(), &SweepCancellation::new())
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn apply_policy_sweeps_only_the_requested_policy() {
    let first = thirty_day_policy("first-policy");
    let second = thirty_day_policy("second-policy");
    let harness = harness(
        repository_with_ages(&[40]),
        vec![first, second.clone()],
        FakeEventPublisher::default(),
        FakeLockCoordinator::default(),
        config(3, 10),
    );

    let report = harness
        .service
        .apply_policy(second.id(), &SweepCancellation::new())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].policy_id, second.id());
    assert_eq!(report.outcomes[0].records_deleted, 1);
}

#[tokio::test]
async fn publisher_failure_never_rolls_back_deletions() {
    let harness = harness(
        repository_with_ages(&[40]),
        vec![thirty_day_policy("stale-logins")],
        FakeEventPublisher {
            fail_publishes: true,
            ..FakeEventPublisher::default()
        },
        FakeLockCoordinator::default(),
        config(3, 10),
    );

    let report = harness
        .service
        .apply_all(&SweepCancellation::new())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.status, SweepStatus::Completed);
    assert_eq!(report.outcomes[0].status, PolicyOutcomeStatus::Applied);
    assert_eq!(report.outcomes[0].records_deleted, 1);
    assert!(harness.repository.entries.lock().await.is_empty());
    assert!(harness.publisher.events.lock().await.is_empty());
}
