use std::time::Duration;

use async_trait::async_trait;

use ledgerline_application::DomainEventPublisher;
use ledgerline_core::{AppError, AppResult};
use ledgerline_domain::DomainEvent;

/// Event publisher that POSTs each serialized event to a webhook endpoint.
///
/// Delivery is at-least-once: transient failures are retried with linear
/// backoff, and consumers deduplicate on the `Idempotency-Key` header, which
/// carries the event id.
pub struct WebhookEventPublisher {
    http_client: reqwest::Client,
    endpoint: reqwest::Url,
    max_attempts: u8,
    retry_backoff_ms: u64,
}

impl WebhookEventPublisher {
    /// Creates a webhook publisher for the given endpoint.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        endpoint: reqwest::Url,
        max_attempts: u8,
        retry_backoff_ms: u64,
    ) -> Self {
        Self {
            http_client,
            endpoint,
            max_attempts: max_attempts.max(1),
            retry_backoff_ms: retry_backoff_ms.max(50),
        }
    }
}

#[async_trait]
impl DomainEventPublisher for WebhookEventPublisher {
    async fn publish(&self, event: &DomainEvent) -> AppResult<()> {
        let event_id = event.metadata().event_id().to_string();
        let mut attempt = 0_u8;
        let mut last_error: Option<String> = None;

        while attempt < self.max_attempts {
            attempt = attempt.saturating_add(1);
            let response = self
                .http_client
                .post(self.endpoint.clone())
                .header("Idempotency-Key", event_id.as_str())
                .json(event)
                .send()
                .await;

            match response {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response)
                    if response.status().is_server_error()
                        || response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS =>
                {
                    last_error = Some(format!(
                        "transient HTTP status {} for event '{event_id}'",
                        response.status()
                    ));
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<response body unavailable>".to_owned());
                    return Err(AppError::Internal(format!(
                        "event webhook rejected event '{event_id}' with status {status}: {body}"
                    )));
                }
                Err(error) => {
                    last_error = Some(format!(
                        "event webhook transport error for event '{event_id}': {error}"
                    ));
                }
            }

            if attempt < self.max_attempts {
                let delay = self.retry_backoff_ms.saturating_mul(u64::from(attempt));
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(AppError::Internal(last_error.unwrap_or_else(|| {
            format!("event webhook exhausted retries for event '{event_id}'")
        })))
    }
}
