use chrono::{DateTime, Duration, Utc};

use crate::connection::DbPool;
use crate::repositories::{encode_timestamp, RepositoryError};

/// Catalog rows seeded for local demos: id, name, price in cents, available.
const SEED_PRODUCTS: &[SeedProduct] = &[
    SeedProduct {
        id: "prod-rust-ebook",
        name: "Rust in Practice (Ebook)",
        description: "A hands-on guide to shipping production Rust services.",
        price_in_cents: 2900,
        is_available: true,
    },
    SeedProduct {
        id: "prod-async-course",
        name: "Async Rust Video Course",
        description: "Six hours of video on tokio, futures and structured concurrency.",
        price_in_cents: 9900,
        is_available: true,
    },
    SeedProduct {
        id: "prod-sqlx-cheatsheet",
        name: "SQLx Cheatsheet",
        description: "A printable reference for everyday SQLx queries.",
        price_in_cents: 500,
        is_available: true,
    },
    SeedProduct {
        id: "prod-legacy-bundle",
        name: "2019 Bundle (Retired)",
        description: "Retired bundle kept so past buyers can still download it.",
        price_in_cents: 4900,
        is_available: false,
    },
];

const SEED_DISCOUNT_CODES: &[SeedDiscountCode] = &[
    SeedDiscountCode {
        id: "dc-welcome10",
        code: "WELCOME10",
        discount_type: "PERCENTAGE",
        amount: "10",
        product_ids: &[],
        usage_limit: None,
    },
    SeedDiscountCode {
        id: "dc-course20",
        code: "COURSE20",
        discount_type: "FIXED",
        amount: "20",
        product_ids: &["prod-async-course"],
        usage_limit: Some(50),
    },
];

/// Orders seeded relative to load time: buyer, product, days ago, paid cents, code.
const SEED_ORDERS: &[SeedOrder] = &[
    SeedOrder::new("ada@example.com", "prod-rust-ebook", 80, 2900, None),
    SeedOrder::new("ada@example.com", "prod-async-course", 41, 7900, Some("dc-course20")),
    SeedOrder::new("grace@example.com", "prod-rust-ebook", 25, 2610, Some("dc-welcome10")),
    SeedOrder::new("linus@example.com", "prod-sqlx-cheatsheet", 12, 500, None),
    SeedOrder::new("grace@example.com", "prod-async-course", 5, 9900, None),
    SeedOrder::new("barbara@example.com", "prod-legacy-bundle", 300, 4900, None),
    SeedOrder::new("ken@example.com", "prod-rust-ebook", 1, 2900, None),
];

/// Demo catalog, discount codes and order history for local development.
///
/// Every row has a fixed id, so loading twice leaves the database unchanged.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub async fn load(pool: &DbPool, now: DateTime<Utc>) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        let stamp = encode_timestamp(now - Duration::days(365));
        let mut result = SeedResult::default();

        for product in SEED_PRODUCTS {
            let inserted = sqlx::query(
                "INSERT INTO product (id, name, description, price_in_cents, file_path, image_path,
                                      is_available_for_purchase, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO NOTHING",
            )
            .bind(product.id)
            .bind(product.name)
            .bind(product.description)
            .bind(product.price_in_cents)
            .bind(format!("products/{}.zip", product.id))
            .bind(format!("/products/{}.png", product.id))
            .bind(product.is_available)
            .bind(&stamp)
            .bind(&stamp)
            .execute(&mut *tx)
            .await?;
            result.products_seeded += inserted.rows_affected() as usize;
        }

        for code in SEED_DISCOUNT_CODES {
            let inserted = sqlx::query(
                "INSERT INTO discount_code (id, code, discount_amount, discount_type, uses,
                                            is_active, all_products, usage_limit, expires_at,
                                            created_at)
                 VALUES (?, ?, ?, ?, 0, 1, ?, ?, NULL, ?)
                 ON CONFLICT(id) DO NOTHING",
            )
            .bind(code.id)
            .bind(code.code)
            .bind(code.amount)
            .bind(code.discount_type)
            .bind(code.product_ids.is_empty())
            .bind(code.usage_limit)
            .bind(&stamp)
            .execute(&mut *tx)
            .await?;
            if inserted.rows_affected() == 0 {
                continue;
            }
            result.discount_codes_seeded += 1;

            for product_id in code.product_ids {
                sqlx::query(
                    "INSERT INTO discount_code_product (discount_code_id, product_id)
                     VALUES (?, ?)",
                )
                .bind(code.id)
                .bind(product_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        for (index, order) in SEED_ORDERS.iter().enumerate() {
            let created_at = encode_timestamp(now - Duration::days(order.days_ago));
            let user_id = format!("user-{}", order.email.split('@').next().unwrap_or(order.email));

            sqlx::query(
                "INSERT INTO app_user (id, email, created_at, updated_at) VALUES (?, ?, ?, ?)
                 ON CONFLICT(email) DO NOTHING",
            )
            .bind(&user_id)
            .bind(order.email)
            .bind(&created_at)
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;

            let inserted = sqlx::query(
                "INSERT INTO purchase_order (id, price_paid_in_cents, user_id, product_id,
                                             discount_code_id, created_at, updated_at)
                 SELECT ?, ?, u.id, ?, ?, ?, ? FROM app_user u WHERE u.email = ?
                 ON CONFLICT DO NOTHING",
            )
            .bind(format!("order-seed-{:03}", index + 1))
            .bind(order.paid_in_cents)
            .bind(order.product_id)
            .bind(order.discount_code_id)
            .bind(&created_at)
            .bind(&created_at)
            .bind(order.email)
            .execute(&mut *tx)
            .await?;
            if inserted.rows_affected() == 0 {
                continue;
            }
            result.orders_seeded += 1;

            if let Some(code_id) = order.discount_code_id {
                sqlx::query("UPDATE discount_code SET uses = uses + 1 WHERE id = ?")
                    .bind(code_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(result)
    }

    /// Checks that every seeded row is present.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for product in SEED_PRODUCTS {
            let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product WHERE id = ?")
                .bind(product.id)
                .fetch_one(pool)
                .await?;
            checks.push((product.id.to_string(), found == 1));
        }
        for code in SEED_DISCOUNT_CODES {
            let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM discount_code WHERE id = ?")
                .bind(code.id)
                .fetch_one(pool)
                .await?;
            checks.push((code.code.to_string(), found == 1));
        }
        for order in SEED_ORDERS {
            let found: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM purchase_order o JOIN app_user u ON u.id = o.user_id
                 WHERE u.email = ? AND o.product_id = ?",
            )
            .bind(order.email)
            .bind(order.product_id)
            .fetch_one(pool)
            .await?;
            checks.push((format!("{}:{}", order.email, order.product_id), found == 1));
        }

        Ok(VerificationResult { all_present: checks.iter().all(|(_, ok)| *ok), checks })
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedProduct {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    price_in_cents: i64,
    is_available: bool,
}

#[derive(Debug, Clone, Copy)]
struct SeedDiscountCode {
    id: &'static str,
    code: &'static str,
    discount_type: &'static str,
    amount: &'static str,
    product_ids: &'static [&'static str],
    usage_limit: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
struct SeedOrder {
    email: &'static str,
    product_id: &'static str,
    days_ago: i64,
    paid_in_cents: i64,
    discount_code_id: Option<&'static str>,
}

impl SeedOrder {
    const fn new(
        email: &'static str,
        product_id: &'static str,
        days_ago: i64,
        paid_in_cents: i64,
        discount_code_id: Option<&'static str>,
    ) -> Self {
        Self { email, product_id, days_ago, paid_in_cents, discount_code_id }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedResult {
    pub products_seeded: usize,
    pub discount_codes_seeded: usize,
    pub orders_seeded: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(String, bool)>,
}
