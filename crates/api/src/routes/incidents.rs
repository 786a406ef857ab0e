//! Reconciliation incidents awaiting manual repair.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use purchase::{Incident, ReconciliationQueue};
use record_store::RecordStore;

use super::AppState;
use crate::error::ApiError;

/// GET /incidents — list purchases whose rollback did not complete.
pub async fn list<S: RecordStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Incident>>, ApiError> {
    let incidents = state
        .orchestrator
        .reconciliation()
        .incidents()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(incidents))
}
