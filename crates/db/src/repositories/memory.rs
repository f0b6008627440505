use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use storefront_core::analytics::{ProductCounts, ProductSales, TimeRange};
use storefront_core::discount::is_usable;
use storefront_core::domain::discount::{DiscountCode, DiscountCodeId, NewDiscountCode};
use storefront_core::domain::download::{DownloadVerification, DownloadVerificationId};
use storefront_core::domain::order::{
    NewPurchase, Order, OrderHistoryEntry, OrderId, OrderSale, OrderTotals,
};
use storefront_core::domain::product::{Product, ProductId};
use storefront_core::domain::user::{User, UserId, UserSignup};

use super::{
    new_id, DiscountCodeRepository, DownloadVerificationRepository, OrderRepository,
    ProductRepository, RepositoryError, UserRepository,
};

#[derive(Default)]
struct State {
    products: HashMap<String, Product>,
    users: HashMap<String, User>,
    orders: Vec<Order>,
    codes: HashMap<String, DiscountCode>,
    verifications: HashMap<String, DownloadVerification>,
}

/// One store behind every repository trait, so cross-table operations such as
/// recording a purchase see a single consistent state.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

fn in_range(range: &TimeRange, at: DateTime<Utc>) -> bool {
    range.start.map_or(true, |start| at >= start) && range.end.map_or(true, |end| at <= end)
}

#[async_trait::async_trait]
impl ProductRepository for InMemoryStore {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.products.get(&id.0).cloned())
    }

    async fn save(&self, product: Product) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.products.insert(product.id.0.clone(), product);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Product>, RepositoryError> {
        let state = self.state.read().await;
        let mut products: Vec<Product> = state.products.values().cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(products)
    }

    async fn count_by_availability(&self) -> Result<ProductCounts, RepositoryError> {
        let state = self.state.read().await;
        let active_count =
            state.products.values().filter(|product| product.is_available_for_purchase).count();
        Ok(ProductCounts {
            active_count: active_count as i64,
            inactive_count: (state.products.len() - active_count) as i64,
        })
    }

    async fn sales_by_product(
        &self,
        range: &TimeRange,
    ) -> Result<Vec<ProductSales>, RepositoryError> {
        let products = ProductRepository::list(self).await?;
        let state = self.state.read().await;

        Ok(products
            .into_iter()
            .map(|product| {
                let mut orders: Vec<&Order> = state
                    .orders
                    .iter()
                    .filter(|order| {
                        order.product_id == product.id && in_range(range, order.created_at)
                    })
                    .collect();
                orders.sort_by_key(|order| order.created_at);
                ProductSales {
                    name: product.name,
                    paid_in_cents: orders.iter().map(|order| order.price_paid_in_cents).collect(),
                }
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl DiscountCodeRepository for InMemoryStore {
    async fn create(
        &self,
        code: NewDiscountCode,
        now: DateTime<Utc>,
    ) -> Result<DiscountCode, RepositoryError> {
        let mut state = self.state.write().await;
        if state.codes.values().any(|existing| existing.code == code.code) {
            return Err(RepositoryError::Conflict(format!(
                "discount code `{}` already exists",
                code.code
            )));
        }

        let created = DiscountCode {
            id: DiscountCodeId(new_id()),
            code: code.code,
            kind: code.kind,
            is_active: true,
            scope: code.scope,
            limit: code.limit,
            uses: 0,
            expires_at: code.expires_at,
            created_at: now,
        };
        state.codes.insert(created.id.0.clone(), created.clone());
        Ok(created)
    }

    async fn find_by_id(
        &self,
        id: &DiscountCodeId,
    ) -> Result<Option<DiscountCode>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.codes.get(&id.0).cloned())
    }

    async fn find_usable(
        &self,
        code: &str,
        product_id: &ProductId,
        now: DateTime<Utc>,
    ) -> Result<Option<DiscountCode>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .codes
            .values()
            .find(|candidate| candidate.code == code && is_usable(candidate, product_id, now))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<DiscountCode>, RepositoryError> {
        let state = self.state.read().await;
        let mut codes: Vec<DiscountCode> = state.codes.values().cloned().collect();
        codes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.code.cmp(&b.code)));
        Ok(codes)
    }

    async fn set_active(
        &self,
        id: &DiscountCodeId,
        is_active: bool,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        Ok(state.codes.get_mut(&id.0).map(|code| code.is_active = is_active).is_some())
    }

    async fn delete(&self, id: &DiscountCodeId) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        Ok(state.codes.remove(&id.0).is_some())
    }
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryStore {
    async fn record_purchase(&self, purchase: NewPurchase) -> Result<Order, RepositoryError> {
        let mut state = self.state.write().await;
        let email = purchase.email.trim().to_string();

        let user_id = match state.users.get(&email) {
            Some(user) => user.id.clone(),
            None => UserId(new_id()),
        };
        let duplicate = state
            .orders
            .iter()
            .any(|order| order.user_id == user_id && order.product_id == purchase.product_id);
        if duplicate {
            return Err(RepositoryError::Conflict(format!(
                "`{email}` already owns product `{}`",
                purchase.product_id.0
            )));
        }

        let discount_code_id = purchase.discount_code_id.filter(|code_id| {
            match state.codes.get_mut(&code_id.0) {
                Some(code) if is_usable(code, &purchase.product_id, purchase.created_at) => {
                    code.uses += 1;
                    true
                }
                _ => false,
            }
        });

        state.users.entry(email.clone()).or_insert_with(|| User {
            id: user_id.clone(),
            email,
            created_at: purchase.created_at,
        });

        let order = Order {
            id: OrderId(new_id()),
            user_id,
            product_id: purchase.product_id,
            discount_code_id,
            price_paid_in_cents: purchase.price_paid_in_cents,
            created_at: purchase.created_at,
        };
        state.orders.push(order.clone());
        Ok(order)
    }

    async fn has_purchased(
        &self,
        email: &str,
        product_id: &ProductId,
    ) -> Result<bool, RepositoryError> {
        let state = self.state.read().await;
        let Some(user) = state.users.get(email.trim()) else {
            return Ok(false);
        };
        Ok(state
            .orders
            .iter()
            .any(|order| order.user_id == user.id && &order.product_id == product_id))
    }

    async fn totals(&self) -> Result<OrderTotals, RepositoryError> {
        let state = self.state.read().await;
        Ok(OrderTotals {
            sum_in_cents: state.orders.iter().map(|order| order.price_paid_in_cents).sum(),
            count: state.orders.len() as i64,
        })
    }

    async fn sales_in_range(&self, range: &TimeRange) -> Result<Vec<OrderSale>, RepositoryError> {
        let state = self.state.read().await;
        let mut sales: Vec<OrderSale> = state
            .orders
            .iter()
            .filter(|order| in_range(range, order.created_at))
            .map(|order| OrderSale {
                created_at: order.created_at,
                price_paid_in_cents: order.price_paid_in_cents,
            })
            .collect();
        sales.sort_by_key(|sale| sale.created_at);
        Ok(sales)
    }

    async fn history_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<OrderHistoryEntry>, RepositoryError> {
        let state = self.state.read().await;
        let mut entries: Vec<OrderHistoryEntry> = state
            .orders
            .iter()
            .filter(|order| &order.user_id == user_id)
            .filter_map(|order| {
                let product = state.products.get(&order.product_id.0)?;
                Some(OrderHistoryEntry {
                    order_id: order.id.clone(),
                    product_id: product.id.clone(),
                    product_name: product.name.clone(),
                    product_description: product.description.clone(),
                    product_image_path: product.image_path.clone(),
                    price_paid_in_cents: order.price_paid_in_cents,
                    created_at: order.created_at,
                })
            })
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }
}

#[async_trait::async_trait]
impl UserRepository for InMemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.users.get(email.trim()).cloned())
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.users.len() as i64)
    }

    async fn signups_in_range(
        &self,
        range: &TimeRange,
    ) -> Result<Vec<UserSignup>, RepositoryError> {
        let state = self.state.read().await;
        let mut signups: Vec<UserSignup> = state
            .users
            .values()
            .filter(|user| in_range(range, user.created_at))
            .map(|user| UserSignup { created_at: user.created_at })
            .collect();
        signups.sort_by_key(|signup| signup.created_at);
        Ok(signups)
    }
}

#[async_trait::async_trait]
impl DownloadVerificationRepository for InMemoryStore {
    async fn create(
        &self,
        product_id: &ProductId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DownloadVerification, RepositoryError> {
        let verification = DownloadVerification {
            id: DownloadVerificationId(new_id()),
            product_id: product_id.clone(),
            expires_at,
            created_at: now,
        };
        let mut state = self.state.write().await;
        state.verifications.insert(verification.id.0.clone(), verification.clone());
        Ok(verification)
    }

    async fn find_valid(
        &self,
        id: &DownloadVerificationId,
        now: DateTime<Utc>,
    ) -> Result<Option<DownloadVerification>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.verifications.get(&id.0).filter(|found| found.is_valid_at(now)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use storefront_core::analytics::TimeRange;
    use storefront_core::domain::discount::{DiscountKind, NewDiscountCode, ProductScope};
    use storefront_core::domain::order::NewPurchase;
    use storefront_core::domain::product::{Product, ProductId};

    use super::InMemoryStore;
    use crate::repositories::{
        DiscountCodeRepository, OrderRepository, ProductRepository, RepositoryError,
        UserRepository,
    };

    fn product(id: &str) -> Product {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Product {
            id: ProductId(id.to_string()),
            name: id.to_uppercase(),
            description: String::new(),
            price_in_cents: 1500,
            file_path: format!("products/{id}"),
            image_path: format!("/products/{id}.png"),
            is_available_for_purchase: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn in_memory_product_repo_round_trip() {
        let store = InMemoryStore::default();
        store.save(product("ebook")).await.expect("save");

        let found = ProductRepository::find_by_id(&store, &ProductId("ebook".to_string()))
            .await
            .expect("find");
        assert_eq!(found, Some(product("ebook")));
    }

    #[tokio::test]
    async fn in_memory_purchases_mirror_sql_semantics() {
        let store = InMemoryStore::default();
        store.save(product("ebook")).await.expect("save");
        let at = Utc.with_ymd_and_hms(2026, 3, 3, 3, 3, 3).unwrap();
        let purchase = NewPurchase {
            email: "jane@example.com".to_string(),
            product_id: ProductId("ebook".to_string()),
            discount_code_id: None,
            price_paid_in_cents: 1500,
            created_at: at,
        };

        store.record_purchase(purchase.clone()).await.expect("first");
        let error = store.record_purchase(purchase).await.expect_err("duplicate");
        assert!(matches!(error, RepositoryError::Conflict(_)));

        assert_eq!(store.count().await.expect("count"), 1);
        assert_eq!(store.totals().await.expect("totals").sum_in_cents, 1500);
        let window = TimeRange { start: Some(at - Duration::days(1)), end: Some(at) };
        assert_eq!(store.sales_in_range(&window).await.expect("sales").len(), 1);
        let by_product = store.sales_by_product(&window).await.expect("by product");
        assert_eq!(by_product[0].paid_in_cents, vec![1500]);
    }

    #[tokio::test]
    async fn in_memory_orders_consume_coupon_until_exhausted() {
        let store = InMemoryStore::default();
        let now = Utc::now();
        let code = store
            .create(
                NewDiscountCode {
                    code: "ONCE".to_string(),
                    kind: DiscountKind::Fixed(Decimal::from(3)),
                    scope: ProductScope::AllProducts,
                    limit: Some(1),
                    expires_at: None,
                },
                now,
            )
            .await
            .expect("create");
        let ebook = ProductId("ebook".to_string());
        let purchase = |email: &str| NewPurchase {
            email: email.to_string(),
            product_id: ebook.clone(),
            discount_code_id: Some(code.id.clone()),
            price_paid_in_cents: 700,
            created_at: now,
        };

        let first = store.record_purchase(purchase("jane@example.com")).await.expect("first");
        assert_eq!(first.discount_code_id.as_ref(), Some(&code.id));
        assert!(store.record_purchase(purchase("jane@example.com")).await.is_err());
        let second = store.record_purchase(purchase("bob@example.com")).await.expect("second");
        assert_eq!(second.discount_code_id, None);

        assert_eq!(DiscountCodeRepository::find_by_id(&store, &code.id).await.expect("find").expect("exists").uses, 1);
        assert!(store.find_usable("ONCE", &ebook, now).await.expect("find").is_none());
    }
}
