use chrono::{DateTime, Utc};

/// Clock port so retention cutoffs and event stamps are testable.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}
