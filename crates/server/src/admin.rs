//! Admin discount-code management.
//!
//! - `GET    /api/v1/admin/discount-codes`             : list, split into unexpired and expired
//! - `POST   /api/v1/admin/discount-codes`             : create from a validated draft
//! - `POST   /api/v1/admin/discount-codes/{id}/active` : activate or deactivate
//! - `DELETE /api/v1/admin/discount-codes/{id}`        : delete an unused code

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use storefront_core::domain::discount::{
    DiscountCode, DiscountCodeDraft, DiscountCodeId, DiscountType, FieldErrors, ProductScope,
};
use storefront_core::errors::PurchaseRejection;
use storefront_core::format::{format_date, format_discount};
use storefront_db::repositories::RepositoryError;
use tracing::info;

use crate::error::{correlation_id, persistence, reject, ApiFailure, ApiResult};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/admin/discount-codes", get(list_discount_codes).post(create_discount_code))
        .route("/api/v1/admin/discount-codes/{id}/active", post(set_discount_code_active))
        .route("/api/v1/admin/discount-codes/{id}", delete(delete_discount_code))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct DiscountCodeView {
    pub id: String,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_amount: Decimal,
    pub discount_label: String,
    pub is_active: bool,
    pub all_products: bool,
    pub product_names: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub formatted_expires_at: Option<String>,
    pub uses: i64,
    /// `None` means unlimited.
    pub remaining_uses: Option<i64>,
    pub can_delete: bool,
}

#[derive(Debug, Serialize)]
pub struct DiscountCodeList {
    pub unexpired: Vec<DiscountCodeView>,
    pub expired: Vec<DiscountCodeView>,
}

#[derive(Debug, Deserialize)]
pub struct ActiveBody {
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct ActiveResponse {
    pub id: String,
    pub is_active: bool,
}

/// Past its expiry or out of redemptions.
fn is_spent(code: &DiscountCode, now: DateTime<Utc>) -> bool {
    code.expires_at.is_some_and(|expires_at| expires_at <= now)
        || code.limit.is_some_and(|limit| code.uses >= limit)
}

fn view(code: DiscountCode, names: &HashMap<String, String>) -> DiscountCodeView {
    let product_names = code
        .scope
        .product_ids()
        .iter()
        .map(|id| names.get(&id.0).cloned().unwrap_or_else(|| id.0.clone()))
        .collect();

    DiscountCodeView {
        discount_label: format_discount(&code.kind),
        discount_type: code.kind.discount_type(),
        discount_amount: code.kind.amount(),
        all_products: code.scope.is_all_products(),
        product_names,
        formatted_expires_at: code.expires_at.map(|at| format_date(at.date_naive())),
        remaining_uses: code.limit.map(|limit| (limit - code.uses).max(0)),
        can_delete: code.uses == 0,
        id: code.id.0,
        code: code.code,
        is_active: code.is_active,
        expires_at: code.expires_at,
        uses: code.uses,
    }
}

async fn product_names(state: &AppState) -> Result<HashMap<String, String>, RepositoryError> {
    Ok(state
        .products
        .list()
        .await?
        .into_iter()
        .map(|product| (product.id.0, product.name))
        .collect())
}

pub async fn list_discount_codes(State(state): State<AppState>) -> ApiResult<DiscountCodeList> {
    let correlation_id = correlation_id();
    let now = Utc::now();
    let codes = state
        .discount_codes
        .list()
        .await
        .map_err(|e| reject(persistence(e), &correlation_id))?;
    let names = product_names(&state).await.map_err(|e| reject(persistence(e), &correlation_id))?;

    let (expired, unexpired): (Vec<_>, Vec<_>) =
        codes.into_iter().partition(|code| is_spent(code, now));

    Ok(Json(DiscountCodeList {
        unexpired: unexpired.into_iter().map(|code| view(code, &names)).collect(),
        expired: expired.into_iter().map(|code| view(code, &names)).collect(),
    }))
}

pub async fn create_discount_code(
    State(state): State<AppState>,
    Json(draft): Json<DiscountCodeDraft>,
) -> Result<(StatusCode, Json<DiscountCodeView>), ApiFailure> {
    let correlation_id = correlation_id();
    let now = Utc::now();
    let new_code = draft.validate(now).map_err(|errors| reject(errors.into(), &correlation_id))?;

    let names = product_names(&state).await.map_err(|e| reject(persistence(e), &correlation_id))?;
    if let ProductScope::Products(ids) = &new_code.scope {
        let mut errors = FieldErrors::default();
        for id in ids.iter().filter(|id| !names.contains_key(&id.0)) {
            errors.add("product_ids", format!("Unknown product `{}`", id.0));
        }
        if !errors.is_empty() {
            return Err(reject(errors.into(), &correlation_id));
        }
    }

    let code_text = new_code.code.clone();
    let created = state.discount_codes.create(new_code, now).await.map_err(|e| match e {
        RepositoryError::Conflict(_) => {
            reject(
                PurchaseRejection::DuplicateDiscountCode(code_text.clone()).into(),
                &correlation_id,
            )
        }
        other => reject(persistence(other), &correlation_id),
    })?;

    info!(
        event_name = "admin.discount_code.created",
        correlation_id,
        discount_code_id = %created.id.0,
        code = %created.code,
        "discount code created"
    );
    Ok((StatusCode::CREATED, Json(view(created, &names))))
}

pub async fn set_discount_code_active(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<ActiveBody>,
) -> ApiResult<ActiveResponse> {
    let correlation_id = correlation_id();
    let updated = state
        .discount_codes
        .set_active(&DiscountCodeId(id.clone()), body.is_active)
        .await
        .map_err(|e| reject(persistence(e), &correlation_id))?;
    if !updated {
        return Err(reject(PurchaseRejection::DiscountCodeNotFound.into(), &correlation_id));
    }

    info!(
        event_name = "admin.discount_code.toggled",
        correlation_id,
        discount_code_id = %id,
        is_active = body.is_active,
        "discount code availability changed"
    );
    Ok(Json(ActiveResponse { id, is_active: body.is_active }))
}

pub async fn delete_discount_code(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiFailure> {
    let correlation_id = correlation_id();
    let id = DiscountCodeId(id);
    let code = state
        .discount_codes
        .find_by_id(&id)
        .await
        .map_err(|e| reject(persistence(e), &correlation_id))?
        .ok_or_else(|| reject(PurchaseRejection::DiscountCodeNotFound.into(), &correlation_id))?;
    if code.uses > 0 {
        return Err(reject(PurchaseRejection::DiscountCodeInUse.into(), &correlation_id));
    }

    let deleted = state
        .discount_codes
        .delete(&id)
        .await
        .map_err(|e| reject(persistence(e), &correlation_id))?;
    if !deleted {
        return Err(reject(PurchaseRejection::DiscountCodeNotFound.into(), &correlation_id));
    }

    info!(
        event_name = "admin.discount_code.deleted",
        correlation_id,
        discount_code_id = %id.0,
        "discount code deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}
