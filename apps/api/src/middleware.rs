use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use ledgerline_core::AppError;

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn require_internal_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .unwrap_or_default();

    if provided.is_empty() || provided != state.internal_api_token {
        return Err(AppError::Unauthorized("internal token required".to_owned()).into());
    }

    Ok(next.run(request).await)
}
