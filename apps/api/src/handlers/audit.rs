use super::*;

/// Accepts one raw audit event.
///
/// Always answers 202: ingestion outcomes surface on the event stream, so
/// producers never block on validation or storage.
pub async fn ingest_event_handler(
    State(state): State<AppState>,
    Json(raw_event): Json<RawAuditEvent>,
) -> StatusCode {
    state.ingestion_service.ingest(raw_event).await;
    StatusCode::ACCEPTED
}

pub async fn query_entries_handler(
    State(state): State<AppState>,
    Json(request): Json<QueryEntriesRequest>,
) -> ApiResult<Json<Vec<EntryResponse>>> {
    let specification = request.into_specification()?;
    let entries = state
        .query_service
        .query(&specification)
        .await?
        .into_iter()
        .map(EntryResponse::from)
        .collect();

    Ok(Json(entries))
}

pub async fn get_entry_handler(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
) -> ApiResult<Json<EntryResponse>> {
    let entry = state
        .query_service
        .entry_by_id(EntryId::from_uuid(entry_id))
        .await?;

    Ok(Json(EntryResponse::from(entry)))
}
