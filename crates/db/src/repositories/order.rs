use sqlx::Row;

use storefront_core::analytics::TimeRange;
use storefront_core::domain::order::{
    NewPurchase, Order, OrderHistoryEntry, OrderId, OrderSale, OrderTotals,
};
use storefront_core::domain::product::ProductId;
use storefront_core::domain::user::UserId;

use super::discount_code::USABLE_PREDICATE;
use super::{
    decode_timestamp, encode_range, encode_timestamp, new_id, OrderRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode_err(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn record_purchase(&self, purchase: NewPurchase) -> Result<Order, RepositoryError> {
        let email = purchase.email.trim().to_string();
        let created_at = encode_timestamp(purchase.created_at);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO app_user (id, email, created_at, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(email) DO UPDATE SET updated_at = excluded.updated_at",
        )
        .bind(new_id())
        .bind(&email)
        .bind(&created_at)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;

        let user_id: String = sqlx::query("SELECT id FROM app_user WHERE email = ?")
            .bind(&email)
            .fetch_one(&mut *tx)
            .await?
            .try_get("id")
            .map_err(decode_err)?;

        let discount_code_id = match &purchase.discount_code_id {
            Some(code_id) => sqlx::query(&format!(
                "UPDATE discount_code SET uses = uses + 1
                 WHERE id = ? AND {USABLE_PREDICATE}
                 RETURNING id"
            ))
            .bind(&code_id.0)
            .bind(&purchase.product_id.0)
            .bind(&created_at)
            .fetch_optional(&mut *tx)
            .await?
            .map(|_| code_id.clone()),
            None => None,
        };

        let order_id = new_id();
        sqlx::query(
            "INSERT INTO purchase_order (id, price_paid_in_cents, user_id, product_id,
                                         discount_code_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&order_id)
        .bind(purchase.price_paid_in_cents)
        .bind(&user_id)
        .bind(&purchase.product_id.0)
        .bind(discount_code_id.as_ref().map(|id| id.0.as_str()))
        .bind(&created_at)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(|error| {
            RepositoryError::from_write(error, || {
                format!("`{email}` already owns product `{}`", purchase.product_id.0)
            })
        })?;

        tx.commit().await?;

        Ok(Order {
            id: OrderId(order_id),
            user_id: UserId(user_id),
            product_id: purchase.product_id,
            discount_code_id,
            price_paid_in_cents: purchase.price_paid_in_cents,
            created_at: purchase.created_at,
        })
    }

    async fn has_purchased(
        &self,
        email: &str,
        product_id: &ProductId,
    ) -> Result<bool, RepositoryError> {
        let row = sqlx::query(
            "SELECT o.id FROM purchase_order o
             JOIN app_user u ON u.id = o.user_id
             WHERE u.email = ? AND o.product_id = ?
             LIMIT 1",
        )
        .bind(email.trim())
        .bind(&product_id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn totals(&self) -> Result<OrderTotals, RepositoryError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(price_paid_in_cents), 0) AS sum_in_cents, COUNT(*) AS count
             FROM purchase_order",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(OrderTotals {
            sum_in_cents: row.try_get("sum_in_cents").map_err(decode_err)?,
            count: row.try_get("count").map_err(decode_err)?,
        })
    }

    async fn sales_in_range(&self, range: &TimeRange) -> Result<Vec<OrderSale>, RepositoryError> {
        let (start, end) = encode_range(range);
        let rows = sqlx::query(
            "SELECT created_at, price_paid_in_cents FROM purchase_order
             WHERE (? IS NULL OR created_at >= ?) AND (? IS NULL OR created_at <= ?)
             ORDER BY created_at ASC",
        )
        .bind(&start)
        .bind(&start)
        .bind(&end)
        .bind(&end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let created_at: String = row.try_get("created_at").map_err(decode_err)?;
                Ok(OrderSale {
                    created_at: decode_timestamp(&created_at)?,
                    price_paid_in_cents: row.try_get("price_paid_in_cents").map_err(decode_err)?,
                })
            })
            .collect()
    }

    async fn history_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<OrderHistoryEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT o.id AS order_id, o.price_paid_in_cents, o.created_at,
                    p.id AS product_id, p.name, p.description, p.image_path
             FROM purchase_order o
             JOIN product p ON p.id = o.product_id
             WHERE o.user_id = ?
             ORDER BY o.created_at DESC",
        )
        .bind(&user_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let created_at: String = row.try_get("created_at").map_err(decode_err)?;
                Ok(OrderHistoryEntry {
                    order_id: OrderId(row.try_get("order_id").map_err(decode_err)?),
                    product_id: ProductId(row.try_get("product_id").map_err(decode_err)?),
                    product_name: row.try_get("name").map_err(decode_err)?,
                    product_description: row.try_get("description").map_err(decode_err)?,
                    product_image_path: row.try_get("image_path").map_err(decode_err)?,
                    price_paid_in_cents: row.try_get("price_paid_in_cents").map_err(decode_err)?,
                    created_at: decode_timestamp(&created_at)?,
                })
            })
            .collect()
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

    use super::SqlOrderRepository;
    use crate::repositories::{
        DiscountCodeRepository, OrderRepository, ProductRepository, RepositoryError,
        SqlDiscountCodeRepository, SqlProductRepository, SqlUserRepository, UserRepository,
    };
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let products = SqlProductRepository::new(pool.clone());
        for (id, name) in [("ebook", "Rust Ebook"), ("course", "Rust Course")] {
            let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
            products
                .save(Product {
                    id: ProductId(id.to_string()),
                    name: name.to_string(),
                    description: format!("{name} description"),
                    price_in_cents: 2500,
                    file_path: format!("products/{id}"),
                    image_path: format!("/products/{id}.png"),
                    is_available_for_purchase: true,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .expect("save product");
        }
        pool
    }

    fn purchase(email: &str, product: &str, paid: i64, day: u32) -> NewPurchase {
        NewPurchase {
            email: email.to_string(),
            product_id: ProductId(product.to_string()),
            discount_code_id: None,
            price_paid_in_cents: paid,
            created_at: Utc.with_ymd_and_hms(2026, 2, day, 9, 30, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn record_purchase_upserts_user_once() {
        let pool = setup().await;
        let orders = SqlOrderRepository::new(pool.clone());
        let users = SqlUserRepository::new(pool);

        let first = orders
            .record_purchase(purchase("jane@example.com", "ebook", 2500, 1))
            .await
            .expect("first");
        let second = orders
            .record_purchase(purchase("jane@example.com", "course", 1875, 2))
            .await
            .expect("second");

        assert_eq!(first.user_id, second.user_id);
        assert_eq!(users.count().await.expect("count"), 1);
        let user = users.find_by_email("jane@example.com").await.expect("find").expect("exists");
        assert_eq!(user.created_at, Utc.with_ymd_and_hms(2026, 2, 1, 9, 30, 0).unwrap());
    }

    #[tokio::test]
    async fn second_purchase_of_same_product_conflicts() {
        let orders = SqlOrderRepository::new(setup().await);
        orders
            .record_purchase(purchase("jane@example.com", "ebook", 2500, 1))
            .await
            .expect("first");

        let error = orders
            .record_purchase(purchase("jane@example.com", "ebook", 2500, 3))
            .await
            .expect_err("duplicate");
        assert!(matches!(error, RepositoryError::Conflict(_)));

        let ebook = ProductId("ebook".to_string());
        let course = ProductId("course".to_string());
        assert!(orders.has_purchased("jane@example.com", &ebook).await.expect("check"));
        assert!(!orders.has_purchased("jane@example.com", &course).await.expect("check"));
        assert!(!orders.has_purchased("bob@example.com", &ebook).await.expect("check"));
    }

    #[tokio::test]
    async fn recorded_orders_consume_coupon_uses_up_to_the_limit() {
        let pool = setup().await;
        let orders = SqlOrderRepository::new(pool.clone());
        let codes = SqlDiscountCodeRepository::new(pool);
        let code = codes
            .create(
                NewDiscountCode {
                    code: "ONCE".to_string(),
                    kind: DiscountKind::Percentage(Decimal::from(20)),
                    scope: ProductScope::AllProducts,
                    limit: Some(1),
                    expires_at: None,
                },
                Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap(),
            )
            .await
            .expect("create code");
        let with_code = |email: &str, product: &str, day: u32| NewPurchase {
            discount_code_id: Some(code.id.clone()),
            ..purchase(email, product, 2000, day)
        };

        let first =
            orders.record_purchase(with_code("jane@example.com", "ebook", 1)).await.expect("first");
        assert_eq!(first.discount_code_id.as_ref(), Some(&code.id));

        let duplicate = orders.record_purchase(with_code("jane@example.com", "ebook", 2)).await;
        assert!(matches!(duplicate, Err(RepositoryError::Conflict(_))));

        let late =
            orders.record_purchase(with_code("bob@example.com", "course", 3)).await.expect("late");
        assert_eq!(late.discount_code_id, None);
        assert_eq!(late.price_paid_in_cents, 2000);

        let stored = codes.find_by_id(&code.id).await.expect("find").expect("exists");
        assert_eq!(stored.uses, 1);
    }

    #[tokio::test]
    async fn totals_and_sales_in_range() {
        let orders = SqlOrderRepository::new(setup().await);
        let empty = orders.totals().await.expect("empty totals");
        assert_eq!((empty.sum_in_cents, empty.count), (0, 0));

        orders.record_purchase(purchase("a@example.com", "ebook", 2500, 1)).await.expect("a");
        orders.record_purchase(purchase("b@example.com", "ebook", 1000, 10)).await.expect("b");
        orders.record_purchase(purchase("c@example.com", "course", 500, 20)).await.expect("c");

        let totals = orders.totals().await.expect("totals");
        assert_eq!((totals.sum_in_cents, totals.count), (4000, 3));

        let start = Utc.with_ymd_and_hms(2026, 2, 5, 0, 0, 0).unwrap();
        let range = TimeRange { start: Some(start), end: Some(start + Duration::days(10)) };
        let sales = orders.sales_in_range(&range).await.expect("in range");
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].price_paid_in_cents, 1000);

        let all = orders.sales_in_range(&TimeRange::default()).await.expect("all");
        let paid: Vec<i64> = all.iter().map(|sale| sale.price_paid_in_cents).collect();
        assert_eq!(paid, vec![2500, 1000, 500]);
    }

    #[tokio::test]
    async fn history_joins_product_details_newest_first() {
        let pool = setup().await;
        let orders = SqlOrderRepository::new(pool.clone());
        let users = SqlUserRepository::new(pool);
        orders
            .record_purchase(purchase("jane@example.com", "ebook", 2500, 1))
            .await
            .expect("ebook");
        orders
            .record_purchase(purchase("jane@example.com", "course", 2000, 4))
            .await
            .expect("course");
        orders.record_purchase(purchase("bob@example.com", "course", 2500, 5)).await.expect("bob");

        let jane = users.find_by_email("jane@example.com").await.expect("find").expect("exists");
        let history = orders.history_for_user(&jane.id).await.expect("history");

        let names: Vec<&str> = history.iter().map(|entry| entry.product_name.as_str()).collect();
        assert_eq!(names, vec!["Rust Course", "Rust Ebook"]);
        assert_eq!(history[0].price_paid_in_cents, 2000);
        assert_eq!(history[1].product_image_path, "/products/ebook.png");
    }
}
