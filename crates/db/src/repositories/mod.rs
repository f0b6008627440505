use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use storefront_core::analytics::{ProductCounts, ProductSales, TimeRange};
use storefront_core::domain::discount::{DiscountCode, DiscountCodeId, NewDiscountCode};
use storefront_core::domain::download::{DownloadVerification, DownloadVerificationId};
use storefront_core::domain::order::{
    NewPurchase, Order, OrderHistoryEntry, OrderSale, OrderTotals,
};
use storefront_core::domain::product::{Product, ProductId};
use storefront_core::domain::user::{User, UserId, UserSignup};

pub mod discount_code;
pub mod download;
pub mod memory;
pub mod order;
pub mod product;
pub mod user;

pub use discount_code::SqlDiscountCodeRepository;
pub use download::SqlDownloadVerificationRepository;
pub use memory::InMemoryStore;
pub use order::SqlOrderRepository;
pub use product::SqlProductRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl RepositoryError {
    pub(crate) fn from_write(error: sqlx::Error, conflict: impl FnOnce() -> String) -> Self {
        match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict(conflict()),
            _ => Self::Database(error),
        }
    }
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError>;
    async fn save(&self, product: Product) -> Result<(), RepositoryError>;
    async fn list(&self) -> Result<Vec<Product>, RepositoryError>;
    async fn count_by_availability(&self) -> Result<ProductCounts, RepositoryError>;
    /// Every product with the prices paid for it inside `range`, by name.
    async fn sales_by_product(&self, range: &TimeRange)
        -> Result<Vec<ProductSales>, RepositoryError>;
}

#[async_trait]
pub trait DiscountCodeRepository: Send + Sync {
    async fn create(
        &self,
        code: NewDiscountCode,
        now: DateTime<Utc>,
    ) -> Result<DiscountCode, RepositoryError>;

    async fn find_by_id(&self, id: &DiscountCodeId)
        -> Result<Option<DiscountCode>, RepositoryError>;

    /// The code named `code` if it is usable for `product_id` at `now`.
    async fn find_usable(
        &self,
        code: &str,
        product_id: &ProductId,
        now: DateTime<Utc>,
    ) -> Result<Option<DiscountCode>, RepositoryError>;

    async fn list(&self) -> Result<Vec<DiscountCode>, RepositoryError>;

    async fn set_active(&self, id: &DiscountCodeId, is_active: bool)
        -> Result<bool, RepositoryError>;

    async fn delete(&self, id: &DiscountCodeId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Upserts the buyer by email and inserts the order in one transaction.
    /// A second order for the same buyer and product is a `Conflict`.
    ///
    /// A referenced discount code has one use consumed in the same transaction,
    /// but only while it is still usable for the product. Otherwise the order
    /// is recorded without the code and the returned `discount_code_id` is `None`.
    async fn record_purchase(&self, purchase: NewPurchase) -> Result<Order, RepositoryError>;

    async fn has_purchased(
        &self,
        email: &str,
        product_id: &ProductId,
    ) -> Result<bool, RepositoryError>;

    async fn totals(&self) -> Result<OrderTotals, RepositoryError>;

    /// Sales inside `range`, oldest first.
    async fn sales_in_range(&self, range: &TimeRange) -> Result<Vec<OrderSale>, RepositoryError>;

    async fn history_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<OrderHistoryEntry>, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    async fn count(&self) -> Result<i64, RepositoryError>;
    /// Signups inside `range`, oldest first.
    async fn signups_in_range(&self, range: &TimeRange)
        -> Result<Vec<UserSignup>, RepositoryError>;
}

#[async_trait]
pub trait DownloadVerificationRepository: Send + Sync {
    async fn create(
        &self,
        product_id: &ProductId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DownloadVerification, RepositoryError>;

    /// The verification if it exists and has not expired at `now`.
    async fn find_valid(
        &self,
        id: &DownloadVerificationId,
        now: DateTime<Utc>,
    ) -> Result<Option<DownloadVerification>, RepositoryError>;
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Fixed-width so stored values sort chronologically as text.
pub(crate) fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {error}")))
}

pub(crate) fn encode_range(range: &TimeRange) -> (Option<String>, Option<String>) {
    (range.start.map(encode_timestamp), range.end.map(encode_timestamp))
}
