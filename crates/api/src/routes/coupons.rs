//! Coupon listing and purchase endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{AccountId, CouponId, Credits};
use record_store::{Coupon, LedgerEntry, NewCoupon, RecordStore};
use serde::{Deserialize, Serialize};

use super::{AppState, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateCouponRequest {
    pub seller_id: String,
    pub title: String,
    pub code: String,
    pub price_credits: i64,
    pub description: Option<String>,
    pub category: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
}

#[derive(Deserialize)]
pub struct PurchaseRequest {
    pub buyer_id: String,
}

// -- Response types --

/// Public view of a coupon. The redeemable code is only ever returned to
/// its buyer, in the purchase response.
#[derive(Serialize)]
pub struct CouponResponse {
    pub id: String,
    pub seller_id: String,
    pub buyer_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub price_credits: i64,
    pub category: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    pub is_sold: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Coupon> for CouponResponse {
    fn from(coupon: Coupon) -> Self {
        Self {
            id: coupon.id.to_string(),
            seller_id: coupon.seller_id.to_string(),
            buyer_id: coupon.buyer_id.map(|id| id.to_string()),
            is_sold: coupon.is_sold(),
            title: coupon.title,
            description: coupon.description,
            price_credits: coupon.price.amount(),
            category: coupon.category,
            expiry_date: coupon.expiry_date,
            image_url: coupon.image_url,
            created_at: coupon.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct PurchaseResponse {
    pub coupon_id: String,
    pub code: String,
    pub ledger_entry_id: String,
    pub amount: i64,
    pub notification_warning: Option<String>,
}

#[derive(Serialize)]
pub struct LedgerEntryResponse {
    pub id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub amount: i64,
    pub coupon_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            buyer_id: entry.buyer_id.to_string(),
            seller_id: entry.seller_id.to_string(),
            amount: entry.amount.amount(),
            coupon_id: entry.coupon_id.to_string(),
            created_at: entry.created_at,
        }
    }
}

// -- Handlers --

/// POST /coupons — list a coupon for sale.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: RecordStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateCouponRequest>,
) -> Result<(StatusCode, Json<CouponResponse>), ApiError> {
    let seller_id: AccountId = parse_id(&req.seller_id, "seller_id")?;
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Title is required".to_string()));
    }
    if req.code.trim().is_empty() {
        return Err(ApiError::BadRequest("Code is required".to_string()));
    }
    let price = Credits::new(req.price_credits).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let mut coupon = NewCoupon::new(seller_id, req.title, req.code, price);
    if let Some(description) = req.description {
        coupon = coupon.with_description(description);
    }
    if let Some(category) = req.category {
        coupon = coupon.with_category(category);
    }
    if let Some(expiry_date) = req.expiry_date {
        coupon = coupon.with_expiry_date(expiry_date);
    }
    if let Some(image_url) = req.image_url {
        coupon = coupon.with_image_url(image_url);
    }

    let coupon = state.store().insert_coupon(coupon).await?;
    tracing::info!(coupon_id = %coupon.id, %seller_id, "coupon listed");
    Ok((StatusCode::CREATED, Json(coupon.into())))
}

/// GET /coupons/:id — load a coupon without its code.
#[tracing::instrument(skip(state))]
pub async fn get<S: RecordStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<CouponResponse>, ApiError> {
    let coupon_id: CouponId = parse_id(&id, "coupon id")?;
    let coupon = state
        .store()
        .get_coupon(coupon_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Coupon not found: {coupon_id}")))?;
    Ok(Json(coupon.into()))
}

/// POST /coupons/:id/purchase — buy a coupon.
#[tracing::instrument(skip(state, req))]
pub async fn purchase<S: RecordStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<PurchaseRequest>,
) -> Result<Json<PurchaseResponse>, ApiError> {
    let coupon_id: CouponId = parse_id(&id, "coupon id")?;
    let buyer_id: AccountId = parse_id(&req.buyer_id, "buyer_id")?;

    let receipt = state.orchestrator.purchase(coupon_id, buyer_id).await?;

    Ok(Json(PurchaseResponse {
        coupon_id: receipt.coupon_id.to_string(),
        code: receipt.code,
        ledger_entry_id: receipt.ledger_entry_id.to_string(),
        amount: receipt.amount.amount(),
        notification_warning: receipt.notification_warning.map(|w| w.message),
    }))
}

/// GET /coupons/:id/ledger — the ledger entries proving the coupon's sale.
#[tracing::instrument(skip(state))]
pub async fn ledger<S: RecordStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<LedgerEntryResponse>>, ApiError> {
    let coupon_id: CouponId = parse_id(&id, "coupon id")?;
    let entries = state.store().ledger_entries_for_coupon(coupon_id).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}
