use ledgerline_application::{AuditIngestionService, AuditQueryService, RetentionService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub ingestion_service: AuditIngestionService,
    pub query_service: AuditQueryService,
    pub retention_service: RetentionService,
    pub internal_api_token: String,
}
