//! Payment provider port.
//!
//! The storefront never handles card data. It asks the provider for a payment
//! intent sized by the discount engine, hands the client secret to the browser,
//! and later reads the settled intent back to record the order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::discount::DiscountCodeId;
use crate::domain::product::ProductId;

pub const UNKNOWN_PAYMENT_ERROR: &str = "An unknown error occurred";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMetadata {
    pub product_id: ProductId,
    pub discount_code_id: Option<DiscountCodeId>,
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentRequest {
    pub amount_in_cents: i64,
    pub currency: String,
    pub metadata: PaymentMetadata,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Succeeded,
    Processing,
    RequiresAction,
    RequiresPaymentMethod,
    Canceled,
}

impl PaymentStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "succeeded" => Some(Self::Succeeded),
            "processing" => Some(Self::Processing),
            "requires_action" | "requires_confirmation" => Some(Self::RequiresAction),
            "requires_payment_method" => Some(Self::RequiresPaymentMethod),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

/// A payment intent as read back from the provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub intent_id: String,
    pub status: PaymentStatus,
    pub amount_in_cents: i64,
    pub metadata: PaymentMetadata,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("card error: {0}")]
    Card(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("payment provider failure: {0}")]
    Unknown(String),
}

impl PaymentError {
    /// Card and validation messages are written for shoppers; anything else is not.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Card(message) | Self::Validation(message) => message,
            Self::Unknown(_) => UNKNOWN_PAYMENT_ERROR,
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntent, PaymentError>;

    async fn confirm_payment(&self, intent_id: &str) -> Result<PaymentConfirmation, PaymentError>;
}

/// Intent ids are the prefix of the client secret: `pi_123_secret_abc` -> `pi_123`.
pub fn intent_id_from_client_secret(client_secret: &str) -> Option<&str> {
    client_secret.split_once("_secret_").map(|(id, _)| id).filter(|id| !id.is_empty())
}

/// Provider intent ids are `pi_` followed by ASCII letters, digits and `_`.
/// Anything else never reaches a provider URL.
pub fn is_payment_intent_id(id: &str) -> bool {
    id.strip_prefix("pi_").is_some_and(|rest| {
        !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
    })
}
