use async_trait::async_trait;
use ledgerline_core::{AppResult, PolicyId};
use ledgerline_domain::RetentionPolicy;

/// Read port for retention policy definitions.
///
/// Policy management lives outside this service; sweeps only read.
#[async_trait]
pub trait RetentionPolicySource: Send + Sync {
    /// Lists active policies ordered by creation time, oldest first.
    async fn list_active(&self) -> AppResult<Vec<RetentionPolicy>>;

    /// Loads one policy by identifier, active or not.
    async fn find_by_id(&self, policy_id: PolicyId) -> AppResult<Option<RetentionPolicy>>;
}
