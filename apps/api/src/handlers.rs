use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use uuid::Uuid;

use ledgerline_application::{RawAuditEvent, SweepCancellation, SweepReport};
use ledgerline_core::{AppError, EntryId, PolicyId};

use crate::dto::{EntryResponse, HealthResponse, QueryEntriesRequest, SweepRequest};
use crate::error::ApiResult;
use crate::state::AppState;

mod audit;
mod health;
mod retention;

pub use audit::{get_entry_handler, ingest_event_handler, query_entries_handler};
pub use health::health_handler;
pub use retention::run_sweep_handler;
