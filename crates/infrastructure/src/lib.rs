//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_entry_repository;
mod in_memory_policy_source;
mod in_memory_sweep_lock;
mod postgres_entry_repository;
mod postgres_policy_source;
mod redis_sweep_lock;
mod system_clock;
mod tracing_event_publisher;
mod webhook_event_publisher;

pub use in_memory_entry_repository::InMemoryAuditEntryRepository;
pub use in_memory_policy_source::InMemoryRetentionPolicySource;
pub use in_memory_sweep_lock::InMemorySweepLockCoordinator;
pub use postgres_entry_repository::PostgresAuditEntryRepository;
pub use postgres_policy_source::PostgresRetentionPolicySource;
pub use redis_sweep_lock::RedisSweepLockCoordinator;
pub use system_clock::SystemClock;
pub use tracing_event_publisher::TracingEventPublisher;
pub use webhook_event_publisher::WebhookEventPublisher;
