use thiserror::Error;

use crate::domain::discount::FieldErrors;

/// Business-rule rejections surfaced to the shopper or admin as-is.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PurchaseRejection {
    #[error("Product not found")]
    ProductNotFound,
    #[error("Coupon has expired")]
    CouponExpired,
    #[error("You have already purchased this product. Try downloading it from the My Orders page")]
    AlreadyPurchased,
    #[error("Discount code not found")]
    DiscountCodeNotFound,
    #[error("Discount code `{0}` already exists")]
    DuplicateDiscountCode(String),
    #[error("Discount code has been used and cannot be deleted")]
    DiscountCodeInUse,
}

impl PurchaseRejection {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ProductNotFound | Self::DiscountCodeNotFound)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error(transparent)]
    Rejected(#[from] PurchaseRejection),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl From<FieldErrors> for DomainError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<PurchaseRejection> for ApplicationError {
    fn from(rejection: PurchaseRejection) -> Self {
        Self::Domain(DomainError::Rejected(rejection))
    }
}

impl From<FieldErrors> for ApplicationError {
    fn from(errors: FieldErrors) -> Self {
        Self::Domain(DomainError::Validation(errors))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("validation failed: {errors}")]
    Unprocessable { errors: FieldErrors, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Text safe to show an end user. Rejections carry their own reason.
    pub fn user_message(&self) -> String {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again.".to_string()
            }
            Self::Unprocessable { .. } => "Some fields are invalid.".to_string(),
            Self::NotFound { message, .. } | Self::Conflict { message, .. } => message.clone(),
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly.".to_string()
            }
            Self::Internal { .. } => "An unexpected internal error occurred.".to_string(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unprocessable { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Unprocessable { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::Validation(errors)) => {
                Self::Unprocessable { errors, correlation_id }
            }
            ApplicationError::Domain(DomainError::Rejected(rejection))
                if rejection.is_not_found() =>
            {
                Self::NotFound { message: rejection.to_string(), correlation_id }
            }
            ApplicationError::Domain(DomainError::Rejected(rejection)) => {
                Self::Conflict { message: rejection.to_string(), correlation_id }
            }
            ApplicationError::Domain(DomainError::InvariantViolation(_)) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id,
            },
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
