//! Shopper-facing purchase routes.
//!
//! - `GET  /api/v1/products/{product_id}/checkout?coupon=CODE` : price preview
//! - `POST /api/v1/checkout/payment-intent`                   : check coupon, open a payment intent
//! - `POST /api/v1/checkout/confirm`                          : record the order once paid
//! - `POST /api/v1/orders/history-email`                      : email purchases with download links
//!
//! A coupon use is consumed only when the order is recorded. Opening an intent
//! checks usability without writing, so declined or abandoned checkouts cost
//! nothing.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storefront_core::checkout::{
    intent_id_from_client_secret, is_payment_intent_id, PaymentIntentRequest, PaymentMetadata,
    PaymentStatus,
};
use storefront_core::discount::{checkout_amount, is_usable, quote_price};
use storefront_core::domain::discount::{DiscountCodeId, FieldErrors};
use storefront_core::domain::download::DownloadVerification;
use storefront_core::domain::order::NewPurchase;
use storefront_core::domain::product::{Product, ProductId};
use storefront_core::domain::user::is_valid_email;
use storefront_core::errors::{ApplicationError, PurchaseRejection};
use storefront_core::format::format_cents;
use storefront_db::repositories::RepositoryError;
use tracing::{info, warn};

use crate::email::{download_url, order_history_email, render_order_history, OrderDownload};
use crate::error::{correlation_id, payment_failure, persistence, reject, ApiError, ApiResult};
use crate::state::AppState;

/// Returned whether or not the address has orders, so the endpoint cannot be
/// used to discover customers.
pub const ORDER_HISTORY_MESSAGE: &str =
    "Check your email to view your order history and download your products.";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/products/{product_id}/checkout", get(checkout_preview))
        .route("/api/v1/checkout/payment-intent", post(create_payment_intent))
        .route("/api/v1/checkout/confirm", post(confirm_purchase))
        .route("/api/v1/orders/history-email", post(email_order_history))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct PreviewQuery {
    pub coupon: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProductSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image_path: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutPreview {
    pub product: ProductSummary,
    pub original_in_cents: i64,
    pub amount_in_cents: i64,
    pub formatted_original: String,
    pub formatted_amount: String,
    pub is_discounted: bool,
    pub discount_label: Option<String>,
    pub discount_code_id: Option<String>,
    /// A coupon was supplied but cannot be used for this product right now.
    pub invalid_coupon: bool,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentBody {
    pub product_id: String,
    pub email: String,
    #[serde(default)]
    pub discount_code_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentIntentResponse {
    pub client_secret: String,
    pub amount_in_cents: i64,
    pub formatted_amount: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmBody {
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PurchaseReceipt {
    pub order_id: String,
    pub product_id: String,
    pub price_paid_in_cents: i64,
    pub formatted_price_paid: String,
    pub download_url: String,
    pub download_expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct OrderHistoryBody {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

async fn purchasable_product(
    state: &AppState,
    product_id: &ProductId,
) -> Result<Product, ApplicationError> {
    state
        .products
        .find_by_id(product_id)
        .await
        .map_err(persistence)?
        .filter(|product| product.is_available_for_purchase)
        .ok_or_else(|| PurchaseRejection::ProductNotFound.into())
}

fn email_errors(email: &str) -> Option<FieldErrors> {
    if is_valid_email(email) {
        return None;
    }
    let mut errors = FieldErrors::default();
    errors.add("email", "Invalid email");
    Some(errors)
}

pub async fn checkout_preview(
    Path(product_id): Path<String>,
    Query(query): Query<PreviewQuery>,
    State(state): State<AppState>,
) -> ApiResult<CheckoutPreview> {
    let correlation_id = correlation_id();
    let now = Utc::now();
    let product_id = ProductId(product_id);
    let product =
        purchasable_product(&state, &product_id).await.map_err(|e| reject(e, &correlation_id))?;

    let coupon = query.coupon.as_deref().map(str::trim).filter(|code| !code.is_empty());
    let code = match coupon {
        Some(coupon) => state
            .discount_codes
            .find_usable(coupon, &product.id, now)
            .await
            .map_err(|e| reject(persistence(e), &correlation_id))?,
        None => None,
    };

    let invalid_coupon = coupon.is_some() && code.is_none();
    let quote = quote_price(product.price_in_cents, code.as_ref());
    Ok(Json(CheckoutPreview {
        formatted_original: format_cents(quote.original_in_cents),
        formatted_amount: format_cents(quote.amount_in_cents),
        original_in_cents: quote.original_in_cents,
        amount_in_cents: quote.amount_in_cents,
        is_discounted: quote.is_discounted,
        discount_label: quote.discount_label,
        discount_code_id: code.map(|code| code.id.0),
        invalid_coupon,
        product: ProductSummary {
            id: product.id.0,
            name: product.name,
            description: product.description,
            image_path: product.image_path,
        },
    }))
}

pub async fn create_payment_intent(
    State(state): State<AppState>,
    Json(body): Json<PaymentIntentBody>,
) -> ApiResult<PaymentIntentResponse> {
    let correlation_id = correlation_id();
    let now = Utc::now();
    let email = body.email.trim().to_string();
    if let Some(errors) = email_errors(&email) {
        return Err(reject(errors.into(), &correlation_id));
    }

    let product = purchasable_product(&state, &ProductId(body.product_id))
        .await
        .map_err(|e| reject(e, &correlation_id))?;

    let already_purchased = state
        .orders
        .has_purchased(&email, &product.id)
        .await
        .map_err(|e| reject(persistence(e), &correlation_id))?;
    if already_purchased {
        return Err(reject(PurchaseRejection::AlreadyPurchased.into(), &correlation_id));
    }

    let code = match body.discount_code_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => {
            let code = state
                .discount_codes
                .find_by_id(&DiscountCodeId(id))
                .await
                .map_err(|e| reject(persistence(e), &correlation_id))?
                .filter(|code| is_usable(code, &product.id, now));
            Some(code.ok_or_else(|| {
                reject(PurchaseRejection::CouponExpired.into(), &correlation_id)
            })?)
        }
        None => None,
    };

    let amount_in_cents = checkout_amount(product.price_in_cents, code.as_ref());
    let request = PaymentIntentRequest {
        amount_in_cents,
        currency: state.settings.currency.clone(),
        metadata: PaymentMetadata {
            product_id: product.id.clone(),
            discount_code_id: code.as_ref().map(|code| code.id.clone()),
            email,
        },
    };

    let intent = state
        .payments
        .create_payment_intent(request)
        .await
        .map_err(|e| payment_failure(e, &correlation_id))?;
    info!(
        event_name = "checkout.payment_intent.opened",
        correlation_id,
        product_id = %product.id.0,
        amount_in_cents,
        discounted = code.is_some(),
        "payment intent opened"
    );
    Ok(Json(PaymentIntentResponse {
        client_secret: intent.client_secret,
        amount_in_cents,
        formatted_amount: format_cents(amount_in_cents),
    }))
}

pub async fn confirm_purchase(
    State(state): State<AppState>,
    Json(body): Json<ConfirmBody>,
) -> ApiResult<PurchaseReceipt> {
    let correlation_id = correlation_id();
    let now = Utc::now();

    let intent_id = body
        .payment_intent_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .or_else(|| body.client_secret.as_deref().and_then(intent_id_from_client_secret));
    let Some(intent_id) = intent_id else {
        let mut errors = FieldErrors::default();
        errors.add("payment_intent_id", "Payment intent is required");
        return Err(reject(errors.into(), &correlation_id));
    };
    if !is_payment_intent_id(intent_id) {
        let mut errors = FieldErrors::default();
        errors.add("payment_intent_id", "Payment intent is invalid");
        return Err(reject(errors.into(), &correlation_id));
    }

    let confirmation = state
        .payments
        .confirm_payment(intent_id)
        .await
        .map_err(|e| payment_failure(e, &correlation_id))?;
    if confirmation.status != PaymentStatus::Succeeded {
        warn!(
            event_name = "checkout.confirm.not_settled",
            correlation_id,
            intent_id,
            status = ?confirmation.status,
            "payment intent has not succeeded"
        );
        return Err((
            StatusCode::PAYMENT_REQUIRED,
            Json(ApiError {
                error: "Payment has not completed".to_string(),
                correlation_id,
                field_errors: None,
                retryable: matches!(confirmation.status, PaymentStatus::Processing),
            }),
        ));
    }

    let metadata = confirmation.metadata;
    let requested_code = metadata.discount_code_id.clone();
    let order = state
        .orders
        .record_purchase(NewPurchase {
            email: metadata.email,
            product_id: metadata.product_id.clone(),
            discount_code_id: metadata.discount_code_id,
            price_paid_in_cents: confirmation.amount_in_cents,
            created_at: now,
        })
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => {
                reject(PurchaseRejection::AlreadyPurchased.into(), &correlation_id)
            }
            other => reject(persistence(other), &correlation_id),
        })?;

    if let (Some(code_id), None) = (&requested_code, &order.discount_code_id) {
        warn!(
            event_name = "checkout.coupon.exhausted_at_settlement",
            correlation_id,
            order_id = %order.id.0,
            discount_code_id = %code_id.0,
            "coupon was no longer usable when the order was recorded"
        );
    }

    let expires_at = DownloadVerification::expiry_from(now, state.settings.verification_ttl_hours);
    let verification = state
        .downloads
        .create(&order.product_id, expires_at, now)
        .await
        .map_err(|e| reject(persistence(e), &correlation_id))?;

    info!(
        event_name = "checkout.order.recorded",
        correlation_id,
        order_id = %order.id.0,
        product_id = %order.product_id.0,
        price_paid_in_cents = order.price_paid_in_cents,
        "order recorded"
    );

    Ok(Json(PurchaseReceipt {
        order_id: order.id.0,
        product_id: order.product_id.0,
        price_paid_in_cents: order.price_paid_in_cents,
        formatted_price_paid: format_cents(order.price_paid_in_cents),
        download_url: download_url(&state.settings.public_url, &verification),
        download_expires_at: verification.expires_at,
    }))
}

pub async fn email_order_history(
    State(state): State<AppState>,
    Json(body): Json<OrderHistoryBody>,
) -> ApiResult<MessageResponse> {
    let correlation_id = correlation_id();
    let now = Utc::now();
    let email = body.email.trim().to_string();
    if let Some(errors) = email_errors(&email) {
        return Err(reject(errors.into(), &correlation_id));
    }

    let neutral = || Json(MessageResponse { message: ORDER_HISTORY_MESSAGE.to_string() });

    let user = state
        .users
        .find_by_email(&email)
        .await
        .map_err(|e| reject(persistence(e), &correlation_id))?;
    let Some(user) = user else {
        info!(
            event_name = "orders.history_email.unknown_user",
            correlation_id,
            "no account for address"
        );
        return Ok(neutral());
    };

    let history = state
        .orders
        .history_for_user(&user.id)
        .await
        .map_err(|e| reject(persistence(e), &correlation_id))?;
    if history.is_empty() {
        return Ok(neutral());
    }

    let ttl_hours = state.settings.verification_ttl_hours;
    let expires_at = DownloadVerification::expiry_from(now, ttl_hours);
    let mut verifications = Vec::with_capacity(history.len());
    for entry in &history {
        let verification = state
            .downloads
            .create(&entry.product_id, expires_at, now)
            .await
            .map_err(|e| reject(persistence(e), &correlation_id))?;
        verifications.push(verification);
    }

    let downloads: Vec<OrderDownload<'_>> = history
        .iter()
        .zip(&verifications)
        .map(|(order, verification)| OrderDownload { order, verification })
        .collect();
    let send_failed = |error: storefront_core::notify::EmailError| {
        reject(ApplicationError::Integration(error.to_string()), &correlation_id)
    };
    let html =
        render_order_history(&state.templates, &state.settings.public_url, ttl_hours, &downloads)
            .map_err(send_failed)?;

    let message_id = state
        .mailer
        .send(order_history_email(&state.settings.sender, &user.email, html))
        .await
        .map_err(send_failed)?;

    info!(
        event_name = "orders.history_email.sent",
        correlation_id,
        message_id = %message_id,
        orders = history.len(),
        "order history email sent"
    );
    Ok(neutral())
}
