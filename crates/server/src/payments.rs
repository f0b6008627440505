//! Stripe-compatible payment intent client.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use storefront_core::checkout::{
    is_payment_intent_id, PaymentConfirmation, PaymentError, PaymentGateway, PaymentIntent,
    PaymentIntentRequest, PaymentMetadata, PaymentStatus,
};
use storefront_core::domain::discount::DiscountCodeId;
use storefront_core::domain::product::ProductId;
use tracing::{error, info};

const METADATA_PRODUCT_ID: &str = "productId";
const METADATA_DISCOUNT_CODE_ID: &str = "discountCodeId";
const METADATA_EMAIL: &str = "email";

pub struct StripeGateway {
    client: Client,
    api_base_url: String,
    secret_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ProviderError,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(client: Client, api_base_url: &str, secret_key: SecretString) -> Self {
        Self { client, api_base_url: api_base_url.trim_end_matches('/').to_string(), secret_key }
    }

    async fn read_intent(
        &self,
        response: reqwest::Response,
    ) -> Result<IntentResponse, PaymentError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &body));
        }

        response
            .json()
            .await
            .map_err(|error| {
                PaymentError::Unknown(format!("failed to decode payment intent: {error}"))
            })
    }
}

/// Maps a provider error body onto the shopper-facing taxonomy.
fn classify_error(status: reqwest::StatusCode, body: &str) -> PaymentError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|envelope| envelope.error);
    let message = parsed
        .as_ref()
        .and_then(|error| error.message.clone())
        .unwrap_or_else(|| format!("payment provider returned {status}"));

    match parsed.and_then(|error| error.kind).as_deref() {
        Some("card_error") => PaymentError::Card(message),
        Some("validation_error") => PaymentError::Validation(message),
        _ => PaymentError::Unknown(message),
    }
}

fn metadata_from(fields: &HashMap<String, String>) -> Result<PaymentMetadata, PaymentError> {
    let product_id = fields
        .get(METADATA_PRODUCT_ID)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| PaymentError::Unknown("payment intent has no product id".to_string()))?;
    let email = fields
        .get(METADATA_EMAIL)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| PaymentError::Unknown("payment intent has no email".to_string()))?;

    Ok(PaymentMetadata {
        product_id: ProductId(product_id.clone()),
        discount_code_id: fields
            .get(METADATA_DISCOUNT_CODE_ID)
            .filter(|value| !value.is_empty())
            .cloned()
            .map(DiscountCodeId),
        email: email.clone(),
    })
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntent, PaymentError> {
        let amount = request.amount_in_cents.to_string();
        let discount_code_id =
            request.metadata.discount_code_id.as_ref().map(|id| id.0.as_str()).unwrap_or_default();
        let product_key = format!("metadata[{METADATA_PRODUCT_ID}]");
        let discount_key = format!("metadata[{METADATA_DISCOUNT_CODE_ID}]");
        let email_key = format!("metadata[{METADATA_EMAIL}]");

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base_url))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&[
                ("amount", amount.as_str()),
                ("currency", request.currency.as_str()),
                ("automatic_payment_methods[enabled]", "true"),
                (product_key.as_str(), request.metadata.product_id.0.as_str()),
                (discount_key.as_str(), discount_code_id),
                (email_key.as_str(), request.metadata.email.as_str()),
            ])
            .send()
            .await
            .map_err(|error| {
                error!(
                    event_name = "checkout.payment_intent.transport_error",
                    error = %error,
                    "payment intent request failed"
                );
                PaymentError::Unknown(error.to_string())
            })?;

        let intent = self.read_intent(response).await?;
        let client_secret = intent
            .client_secret
            .ok_or_else(|| {
                PaymentError::Unknown("payment intent has no client secret".to_string())
            })?;

        info!(
            event_name = "checkout.payment_intent.created",
            intent_id = %intent.id,
            amount_in_cents = request.amount_in_cents,
            "payment intent created"
        );
        Ok(PaymentIntent { id: intent.id, client_secret })
    }

    async fn confirm_payment(&self, intent_id: &str) -> Result<PaymentConfirmation, PaymentError> {
        if !is_payment_intent_id(intent_id) {
            return Err(PaymentError::Validation("Payment intent is invalid".to_string()));
        }
        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{intent_id}", self.api_base_url))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await
            .map_err(|error| PaymentError::Unknown(error.to_string()))?;

        let intent = self.read_intent(response).await?;
        let status = intent
            .status
            .as_deref()
            .and_then(PaymentStatus::parse)
            .ok_or_else(|| {
                PaymentError::Unknown("payment intent has an unknown status".to_string())
            })?;
        let amount_in_cents = intent
            .amount
            .ok_or_else(|| PaymentError::Unknown("payment intent has no amount".to_string()))?;

        Ok(PaymentConfirmation {
            intent_id: intent.id,
            status,
            amount_in_cents,
            metadata: metadata_from(&intent.metadata)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::{
        extract::{Form, Path, State},
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use secrecy::SecretString;
    use serde_json::json;
    use storefront_core::checkout::{
        PaymentError, PaymentGateway, PaymentIntentRequest, PaymentMetadata, PaymentStatus,
    };
    use storefront_core::domain::discount::DiscountCodeId;
    use storefront_core::domain::product::ProductId;

    use super::{classify_error, StripeGateway};

    type Forms = Arc<Mutex<Vec<HashMap<String, String>>>>;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{address}")
    }

    async fn record_intent_form(
        State(forms): State<Forms>,
        Form(form): Form<HashMap<String, String>>,
    ) -> Json<serde_json::Value> {
        forms.lock().expect("lock").push(form);
        Json(json!({ "id": "pi_1", "client_secret": "pi_1_secret_abc" }))
    }

    fn gateway(base: &str) -> StripeGateway {
        StripeGateway::new(reqwest::Client::new(), base, SecretString::from("sk_test_123"))
    }

    #[tokio::test]
    async fn creates_intent_with_amount_and_metadata() {
        let forms: Forms = Arc::default();
        let router = Router::new()
            .route(
                "/v1/payment_intents",
                post(record_intent_form),
            )
            .with_state(forms.clone());
        let base = serve(router).await;

        let intent = gateway(&base)
            .create_payment_intent(PaymentIntentRequest {
                amount_in_cents: 750,
                currency: "usd".to_string(),
                metadata: PaymentMetadata {
                    product_id: ProductId("ebook".to_string()),
                    discount_code_id: Some(DiscountCodeId("dc-1".to_string())),
                    email: "jane@example.com".to_string(),
                },
            })
            .await
            .expect("intent");

        assert_eq!(intent.client_secret, "pi_1_secret_abc");
        let forms = forms.lock().expect("lock");
        assert_eq!(forms[0]["amount"], "750");
        assert_eq!(forms[0]["metadata[productId]"], "ebook");
        assert_eq!(forms[0]["metadata[discountCodeId]"], "dc-1");
        assert_eq!(forms[0]["metadata[email]"], "jane@example.com");
    }

    #[tokio::test]
    async fn confirm_reads_status_amount_and_metadata() {
        let router = Router::new().route(
            "/v1/payment_intents/{id}",
            get(|Path(id): Path<String>| async move {
                Json(json!({
                    "id": id,
                    "status": "succeeded",
                    "amount": 750,
                    "metadata": {
                        "productId": "ebook",
                        "discountCodeId": "",
                        "email": "jane@example.com"
                    }
                }))
            }),
        );
        let base = serve(router).await;

        let confirmation = gateway(&base).confirm_payment("pi_9").await.expect("confirm");
        assert_eq!(confirmation.intent_id, "pi_9");
        assert_eq!(confirmation.status, PaymentStatus::Succeeded);
        assert_eq!(confirmation.amount_in_cents, 750);
        assert_eq!(confirmation.metadata.discount_code_id, None);
    }

    #[tokio::test]
    async fn malformed_intent_ids_never_reach_the_provider() {
        let hits = Arc::new(Mutex::new(0_usize));
        let counter = Arc::clone(&hits);
        let router = Router::new().fallback(move || {
            let counter = Arc::clone(&counter);
            async move {
                *counter.lock().expect("lock") += 1;
                StatusCode::OK
            }
        });
        let base = serve(router).await;

        let error = gateway(&base)
            .confirm_payment("../charges/ch_x")
            .await
            .expect_err("rejected");
        assert!(matches!(error, PaymentError::Validation(_)));
        assert_eq!(*hits.lock().expect("lock"), 0);
    }

    #[tokio::test]
    async fn card_errors_keep_provider_message() {
        let router = Router::new().route(
            "/v1/payment_intents",
            post(|| async {
                (
                    StatusCode::PAYMENT_REQUIRED,
                    Json(json!({
                        "error": { "type": "card_error", "message": "Your card was declined." }
                    })),
                )
            }),
        );
        let base = serve(router).await;

        let error = gateway(&base)
            .create_payment_intent(PaymentIntentRequest {
                amount_in_cents: 100,
                currency: "usd".to_string(),
                metadata: PaymentMetadata {
                    product_id: ProductId("ebook".to_string()),
                    discount_code_id: None,
                    email: "jane@example.com".to_string(),
                },
            })
            .await
            .expect_err("declined");
        assert_eq!(error, PaymentError::Card("Your card was declined.".to_string()));
    }

    #[test]
    fn unparseable_errors_are_unknown() {
        let error = classify_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>");
        assert!(matches!(error, PaymentError::Unknown(message) if message.contains("500")));

        let error = classify_error(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"error":{"type":"validation_error","message":"Your postal code is incomplete."}}"#,
        );
        assert_eq!(error, PaymentError::Validation("Your postal code is incomplete.".to_string()));
    }
}
