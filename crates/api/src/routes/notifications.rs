//! Scheduled notification triggers.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use chrono::Utc;
use purchase::ReminderReport;
use record_store::RecordStore;

use super::AppState;
use crate::error::ApiError;

/// POST /notifications/expiry-reminder — remind buyers of coupons expiring
/// tomorrow. Requires `Authorization: Bearer <CRON_SECRET>`.
#[tracing::instrument(skip(state, headers))]
pub async fn expiry_reminder<S: RecordStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<Json<ReminderReport>, ApiError> {
    let Some(secret) = state.cron_secret.as_deref() else {
        tracing::warn!("expiry reminder called but CRON_SECRET is not configured");
        return Err(ApiError::Unauthorized);
    };
    let authorized = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == secret);
    if !authorized {
        return Err(ApiError::Unauthorized);
    }

    let report = state.reminders.run(Utc::now()).await?;
    Ok(Json(report))
}
