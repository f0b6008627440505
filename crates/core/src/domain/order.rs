use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::discount::DiscountCodeId;
use crate::domain::product::ProductId;
use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub discount_code_id: Option<DiscountCodeId>,
    pub price_paid_in_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// Sale row consumed by the sales analytics series.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSale {
    pub created_at: DateTime<Utc>,
    pub price_paid_in_cents: i64,
}

/// Sum and count over every recorded order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub sum_in_cents: i64,
    pub count: i64,
}

/// A purchase confirmed by the payment provider, ready to be recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchase {
    pub email: String,
    pub product_id: ProductId,
    pub discount_code_id: Option<DiscountCodeId>,
    pub price_paid_in_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// Order joined with the product fields the order-history email needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHistoryEntry {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_description: String,
    pub product_image_path: String,
    pub price_paid_in_cents: i64,
    pub created_at: DateTime<Utc>,
}
