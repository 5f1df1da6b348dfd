use async_trait::async_trait;
use ledgerline_core::AppResult;
use ledgerline_domain::DomainEvent;

/// Outbound port for domain event delivery.
///
/// Delivery is best-effort at-least-once. Callers treat a failed publish as
/// lost observability, never as grounds to roll back state.
#[async_trait]
pub trait DomainEventPublisher: Send + Sync {
    /// Publishes one event.
    async fn publish(&self, event: &DomainEvent) -> AppResult<()>;

    /// Publishes a batch of events in order, stopping at the first failure.
    async fn publish_all(&self, events: &[DomainEvent]) -> AppResult<()> {
        for event in events {
            self.publish(event).await?;
        }

        Ok(())
    }
}
