use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use storefront_core::checkout::{
    PaymentConfirmation, PaymentError, PaymentGateway, PaymentIntent, PaymentIntentRequest,
    PaymentStatus,
};
use storefront_core::config::AppConfig;
use storefront_core::domain::product::{Product, ProductId};
use storefront_core::notify::{EmailError, Mailer, OutboundEmail};
use storefront_db::repositories::{InMemoryStore, ProductRepository};

use crate::state::{AppState, StoreSettings};

/// Payment provider double. Every created intent settles with `settle_as`.
pub struct FakeGateway {
    requests: Mutex<Vec<PaymentIntentRequest>>,
    intents: Mutex<HashMap<String, PaymentConfirmation>>,
    fail_with: Option<PaymentError>,
    settle_as: PaymentStatus,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            requests: Mutex::default(),
            intents: Mutex::default(),
            fail_with: None,
            settle_as: PaymentStatus::Succeeded,
        }
    }
}

impl FakeGateway {
    pub fn failing(error: PaymentError) -> Self {
        Self { fail_with: Some(error), ..Self::default() }
    }

    pub fn settling_as(status: PaymentStatus) -> Self {
        Self { settle_as: status, ..Self::default() }
    }

    pub fn requests(&self) -> Vec<PaymentIntentRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntent, PaymentError> {
        self.requests.lock().expect("lock").push(request.clone());
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }

        let mut intents = self.intents.lock().expect("lock");
        let id = format!("pi_test_{}", intents.len() + 1);
        intents.insert(
            id.clone(),
            PaymentConfirmation {
                intent_id: id.clone(),
                status: self.settle_as,
                amount_in_cents: request.amount_in_cents,
                metadata: request.metadata,
            },
        );
        Ok(PaymentIntent { client_secret: format!("{id}_secret_test"), id })
    }

    async fn confirm_payment(&self, intent_id: &str) -> Result<PaymentConfirmation, PaymentError> {
        self.intents
            .lock()
            .expect("lock")
            .get(intent_id)
            .cloned()
            .ok_or_else(|| {
                PaymentError::Validation(format!("No such payment_intent: '{intent_id}'"))
            })
    }
}

#[derive(Default)]
pub struct FakeMailer {
    sent: Mutex<Vec<OutboundEmail>>,
    fail_with: Option<EmailError>,
}

impl FakeMailer {
    pub fn failing(error: EmailError) -> Self {
        Self { fail_with: Some(error), ..Self::default() }
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, email: OutboundEmail) -> Result<String, EmailError> {
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }
        let mut sent = self.sent.lock().expect("lock");
        sent.push(email);
        Ok(format!("email-{}", sent.len()))
    }
}

pub fn product(id: &str, available: bool) -> Product {
    let created_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    Product {
        id: ProductId(id.to_string()),
        name: format!("{} Edition", id.to_uppercase()),
        description: format!("All about {id}"),
        price_in_cents: 1000,
        file_path: format!("products/{id}.zip"),
        image_path: format!("/products/{id}.png"),
        is_available_for_purchase: available,
        created_at,
        updated_at: created_at,
    }
}

/// `ebook` and `course` for sale at $10, `retired` withdrawn.
pub async fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::default());
    for (id, available) in [("ebook", true), ("course", true), ("retired", false)] {
        store.save(product(id, available)).await.expect("save product");
    }
    store
}

pub fn test_state(
    store: Arc<InMemoryStore>,
    gateway: Arc<FakeGateway>,
    mailer: Arc<FakeMailer>,
) -> AppState {
    AppState::in_memory(store, gateway, mailer, StoreSettings::from(&AppConfig::default()))
        .expect("templates")
}
