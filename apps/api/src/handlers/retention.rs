use super::*;

/// Runs a retention sweep and reports the per-policy outcomes.
///
/// With a `policy_id` in the body only that policy is swept; otherwise every
/// active policy is. The sweep runs to completion before responding.
pub async fn run_sweep_handler(
    State(state): State<AppState>,
    Json(request): Json<SweepRequest>,
) -> ApiResult<Json<SweepReport>> {
    let cancellation = SweepCancellation::new();
    let report = match request.policy_id {
        Some(policy_id) => {
            let policy_id = Uuid::parse_str(policy_id.as_str())
                .map(PolicyId::from_uuid)
                .map_err(|error| {
                    AppError::Validation(format!("invalid policy id '{policy_id}': {error}"))
                })?;
            state
                .retention_service
                .apply_policy(policy_id, &cancellation)
                .await?
        }
        None => state.retention_service.apply_all(&cancellation).await?,
    };

    Ok(Json(report))
}
