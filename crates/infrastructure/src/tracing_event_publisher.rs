use async_trait::async_trait;
use tracing::info;

use ledgerline_application::DomainEventPublisher;
use ledgerline_core::{AppError, AppResult};
use ledgerline_domain::DomainEvent;

/// Event publisher that writes each event to the structured log.
///
/// The default sink when no webhook endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventPublisher;

impl TracingEventPublisher {
    /// Creates a log-backed publisher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DomainEventPublisher for TracingEventPublisher {
    async fn publish(&self, event: &DomainEvent) -> AppResult<()> {
        let payload = serde_json::to_string(event).map_err(|error| {
            AppError::Internal(format!("failed to encode domain event: {error}"))
        })?;

        info!(
            event_type = event.event_type(),
            event_id = %event.metadata().event_id(),
            payload = payload.as_str(),
            "domain event published"
        );

        Ok(())
    }
}
