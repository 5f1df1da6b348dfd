use async_trait::async_trait;
use tokio::sync::RwLock;

use ledgerline_application::RetentionPolicySource;
use ledgerline_core::{AppResult, PolicyId};
use ledgerline_domain::RetentionPolicy;

/// Seedable in-memory retention policy source.
#[derive(Debug, Default)]
pub struct InMemoryRetentionPolicySource {
    policies: RwLock<Vec<RetentionPolicy>>,
}

impl InMemoryRetentionPolicySource {
    /// Creates an empty policy source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one policy.
    pub async fn add(&self, policy: RetentionPolicy) {
        self.policies.write().await.push(policy);
    }
}

#[async_trait]
impl RetentionPolicySource for InMemoryRetentionPolicySource {
    async fn list_active(&self) -> AppResult<Vec<RetentionPolicy>> {
        let policies = self.policies.read().await;

        let mut active: Vec<RetentionPolicy> = policies
            .iter()
            .filter(|policy| policy.is_active())
            .cloned()
            .collect();
        active.sort_by(|left, right| {
            left.created_at()
                .cmp(&right.created_at())
                .then_with(|| left.id().as_uuid().cmp(&right.id().as_uuid()))
        });

        Ok(active)
    }

    async fn find_by_id(&self, policy_id: PolicyId) -> AppResult<Option<RetentionPolicy>> {
        Ok(self
            .policies
            .read()
            .await
            .iter()
            .find(|policy| policy.id() == policy_id)
            .cloned())
    }
}
