//! Account endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{AccountId, Credits};
use record_store::{Account, NewAccount, RecordStore};
use serde::{Deserialize, Serialize};

use super::{AppState, parse_id};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateAccountRequest {
    pub email: Option<String>,
    pub credits: i64,
}

#[derive(Serialize)]
pub struct AccountResponse {
    pub id: String,
    pub email: Option<String>,
    pub credits: i64,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id.to_string(),
            email: account.email,
            credits: account.credits.amount(),
            created_at: account.created_at,
        }
    }
}

/// POST /accounts — open an account with a starting balance.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: RecordStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let credits = Credits::new(req.credits).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let mut account = NewAccount::new(credits);
    if let Some(email) = req.email {
        account = account.with_email(email);
    }

    let account = state.store().insert_account(account).await?;
    tracing::info!(account_id = %account.id, "account created");
    Ok((StatusCode::CREATED, Json(account.into())))
}

/// GET /accounts/:id — load an account and its balance.
#[tracing::instrument(skip(state))]
pub async fn get<S: RecordStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account_id: AccountId = parse_id(&id, "account id")?;
    let account = state
        .store()
        .get_account(account_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Account not found: {account_id}")))?;
    Ok(Json(account.into()))
}
