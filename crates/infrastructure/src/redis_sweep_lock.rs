//! Redis-backed distributed lock coordinator for retention sweeps.

use async_trait::async_trait;
use redis::{AsyncCommands, Script};

use ledgerline_application::{SweepLock, SweepLockCoordinator};
use ledgerline_core::{AppError, AppResult, PolicyId};

const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

/// Redis implementation of sweep lock coordination.
///
/// The TTL bounds how long a crashed holder keeps a policy blocked.
#[derive(Clone)]
pub struct RedisSweepLockCoordinator {
    client: redis::Client,
    key_prefix: String,
}

impl RedisSweepLockCoordinator {
    /// Creates one coordinator adapter.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, policy_id: PolicyId) -> String {
        format!("{}:{policy_id}", self.key_prefix)
    }
}

#[async_trait]
impl SweepLockCoordinator for RedisSweepLockCoordinator {
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

        let key = self.key_for(policy_id);
        let token = format!("{holder_id}:{}", uuid::Uuid::new_v4());

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        let acquired: bool = connection
            .set_nx(key.as_str(), token.as_str())
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to acquire sweep lock: {error}"))
            })?;

        if !acquired {
            return Ok(None);
        }

        connection
            .expire::<_, ()>(key.as_str(), i64::from(ttl_seconds))
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to set sweep lock ttl: {error}"))
            })?;

        Ok(Some(SweepLock {
            policy_id,
            token,
            holder_id: holder_id.to_owned(),
        }))
    }

    async fn release(&self, lock: &SweepLock) -> AppResult<()> {
        let key = self.key_for(lock.policy_id);
        let script = Script::new(RELEASE_LOCK_SCRIPT);

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        script
            .key(key)
            .arg(lock.token.as_str())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to release sweep lock: {error}"))
            })?;

        Ok(())
    }
}
