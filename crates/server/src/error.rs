use axum::{http::StatusCode, Json};
use serde::Serialize;
use storefront_core::checkout::PaymentError;
use storefront_core::domain::discount::FieldErrors;
use storefront_core::errors::{ApplicationError, InterfaceError};
use storefront_db::repositories::RepositoryError;
use tracing::{error, warn};
use uuid::Uuid;

/// JSON body of every failed request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub error: String,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<FieldErrors>,
    pub retryable: bool,
}

pub type ApiFailure = (StatusCode, Json<ApiError>);
pub type ApiResult<T> = Result<Json<T>, ApiFailure>;

pub fn correlation_id() -> String {
    format!("req-{}", Uuid::new_v4())
}

pub fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

/// Maps an application error onto a status code and a user-safe body.
pub fn reject(error: ApplicationError, correlation_id: &str) -> ApiFailure {
    let retryable = matches!(
        error,
        ApplicationError::Persistence(_) | ApplicationError::Integration(_)
    );
    let integration = matches!(error, ApplicationError::Integration(_));
    let interface = error.into_interface(correlation_id);

    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::ServiceUnavailable { .. } if integration => StatusCode::BAD_GATEWAY,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!(
            event_name = "http.request.failed",
            correlation_id,
            status = status.as_u16(),
            error = %interface,
            "request failed"
        );
    } else {
        warn!(
            event_name = "http.request.rejected",
            correlation_id,
            status = status.as_u16(),
            error = %interface,
            "request rejected"
        );
    }

    let field_errors = match &interface {
        InterfaceError::Unprocessable { errors, .. } => Some(errors.clone()),
        _ => None,
    };

    (
        status,
        Json(ApiError {
            error: interface.user_message(),
            correlation_id: correlation_id.to_string(),
            field_errors,
            retryable,
        }),
    )
}

/// Card and validation failures are the shopper's to fix and keep the
/// provider's wording. Anything else is a retryable provider failure.
pub fn payment_failure(error: PaymentError, correlation_id: &str) -> ApiFailure {
    let (status, retryable) = match error {
        PaymentError::Card(_) => (StatusCode::PAYMENT_REQUIRED, false),
        PaymentError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, false),
        PaymentError::Unknown(_) => (StatusCode::BAD_GATEWAY, true),
    };
    warn!(
        event_name = "checkout.payment.failed",
        correlation_id,
        status = status.as_u16(),
        error = %error,
        "payment provider call failed"
    );

    (
        status,
        Json(ApiError {
            error: error.user_message().to_string(),
            correlation_id: correlation_id.to_string(),
            field_errors: None,
            retryable,
        }),
    )
}
