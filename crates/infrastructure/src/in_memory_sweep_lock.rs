use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use ledgerline_application::{SweepLock, SweepLockCoordinator};
use ledgerline_core::{AppError, AppResult, PolicyId};

/// Process-local sweep lock coordinator.
///
/// The TTL is validated but not enforced; a lock lives until released.
#[derive(Debug, Default)]
pub struct InMemorySweepLockCoordinator {
    held: Mutex<HashMap<PolicyId, String>>,
}

impl InMemorySweepLockCoordinator {
    /// Creates a coordinator with no held locks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SweepLockCoordinator for InMemorySweepLockCoordinator {
    async fn try_acquire(
        &self,
        policy_id: PolicyId,
        holder_id: &str,
        ttl_seconds: u32,
    ) -> AppResult<Option<SweepLock>> {
        if holder_id.trim().is_empty() {
            return Err(AppError::Validation(
                "sweep lock holder_id must not be empty".to_owned(),
            ));
        }

        if ttl_seconds == 0 {
            return Err(AppError::Validation(
                "sweep lock ttl_seconds must be greater than zero".to_owned(),
            ));
        }

        let mut held = self.held.lock().await;
        if held.contains_key(&policy_id) {
            return Ok(None);
        }

        let token = format!("{holder_id}:{}", Uuid::new_v4());
        held.insert(policy_id, token.clone());

        Ok(Some(SweepLock {
            policy_id,
            token,
            holder_id: holder_id.to_owned(),
        }))
    }

    async fn release(&self, lock: &SweepLock) -> AppResult<()> {
        let mut held = self.held.lock().await;
        if held.get(&lock.policy_id) == Some(&lock.token) {
            held.remove(&lock.policy_id);
        }

        Ok(())
    }
}
