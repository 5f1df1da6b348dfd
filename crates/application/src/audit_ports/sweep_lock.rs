use async_trait::async_trait;
use ledgerline_core::{AppResult, PolicyId};

/// Advisory lock held while one policy sweep runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepLock {
    /// Policy the lock covers.
    pub policy_id: PolicyId,
    /// Lock token used for safe release.
    pub token: String,
    /// Lock holder identity.
    pub holder_id: String,
}

/// Distributed coordination port keeping sweeps per policy exclusive.
#[async_trait]
pub trait SweepLockCoordinator: Send + Sync {
    /// Attempts to acquire the lock for one policy.
    ///
    /// Returns `None` while another holder's sweep is active.
    async fn try_acquire(
        &self,
        policy_id: PolicyId,
        holder_id: &str,
        ttl_seconds: u32,
    ) -> AppResult<Option<SweepLock>>;

    /// Releases one lock using token compare-and-delete semantics.
    async fn release(&self, lock: &SweepLock) -> AppResult<()>;
}
