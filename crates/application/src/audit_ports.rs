mod entries;
mod events;
mod policies;
mod sweep_lock;
mod time;

pub use entries::AuditEntryRepository;
pub use events::DomainEventPublisher;
pub use policies::RetentionPolicySource;
pub use sweep_lock::{SweepLock, SweepLockCoordinator};
pub use time::Clock;
