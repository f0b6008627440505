use std::sync::Arc;

use storefront_core::checkout::PaymentGateway;
use storefront_core::config::AppConfig;
use storefront_core::notify::Mailer;
use storefront_db::repositories::{
    DiscountCodeRepository, DownloadVerificationRepository, InMemoryStore, OrderRepository,
    ProductRepository, SqlDiscountCodeRepository, SqlDownloadVerificationRepository,
    SqlOrderRepository, SqlProductRepository, SqlUserRepository, UserRepository,
};
use storefront_db::DbPool;
use tera::Tera;

use crate::email::ORDER_HISTORY_TEMPLATE;

/// Store-level settings the handlers read on every request.
#[derive(Clone, Debug)]
pub struct StoreSettings {
    pub currency: String,
    pub public_url: String,
    pub sender: String,
    pub verification_ttl_hours: i64,
}

impl From<&AppConfig> for StoreSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            currency: config.payments.currency.clone(),
            public_url: config.server.public_url.trim_end_matches('/').to_string(),
            sender: config.email.sender.clone(),
            verification_ttl_hours: config.downloads.verification_ttl_hours,
        }
    }
}

/// Everything a storefront handler may touch. Providers and repositories are
/// constructed once by the entry point and shared behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub products: Arc<dyn ProductRepository>,
    pub discount_codes: Arc<dyn DiscountCodeRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub users: Arc<dyn UserRepository>,
    pub downloads: Arc<dyn DownloadVerificationRepository>,
    pub payments: Arc<dyn PaymentGateway>,
    pub mailer: Arc<dyn Mailer>,
    pub templates: Arc<Tera>,
    pub settings: StoreSettings,
}

impl AppState {
    pub fn from_pool(
        pool: DbPool,
        payments: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn Mailer>,
        settings: StoreSettings,
    ) -> Result<Self, tera::Error> {
        Ok(Self {
            products: Arc::new(SqlProductRepository::new(pool.clone())),
            discount_codes: Arc::new(SqlDiscountCodeRepository::new(pool.clone())),
            orders: Arc::new(SqlOrderRepository::new(pool.clone())),
            users: Arc::new(SqlUserRepository::new(pool.clone())),
            downloads: Arc::new(SqlDownloadVerificationRepository::new(pool)),
            payments,
            mailer,
            templates: init_templates()?,
            settings,
        })
    }

    pub fn in_memory(
        store: Arc<InMemoryStore>,
        payments: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn Mailer>,
        settings: StoreSettings,
    ) -> Result<Self, tera::Error> {
        Ok(Self {
            products: store.clone(),
            discount_codes: store.clone(),
            orders: store.clone(),
            users: store.clone(),
            downloads: store,
            payments,
            mailer,
            templates: init_templates()?,
            settings,
        })
    }
}

pub fn init_templates() -> Result<Arc<Tera>, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_template(
        ORDER_HISTORY_TEMPLATE,
        include_str!("../templates/email/order_history.html"),
    )?;
    Ok(Arc::new(tera))
}
