use sqlx::Row;

use storefront_core::analytics::{ProductCounts, ProductSales, TimeRange};
use storefront_core::domain::product::{Product, ProductId};

use super::{decode_timestamp, encode_range, encode_timestamp, ProductRepository, RepositoryError};
use crate::DbPool;

const PRODUCT_COLUMNS: &str = "id, name, description, price_in_cents, file_path, image_path,
     is_available_for_purchase, created_at, updated_at";

pub struct SqlProductRepository {
    pool: DbPool,
}

impl SqlProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_product(row: &sqlx::sqlite::SqliteRow) -> Result<Product, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode)?;

    Ok(Product {
        id: ProductId(row.try_get("id").map_err(decode)?),
        name: row.try_get("name").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        price_in_cents: row.try_get("price_in_cents").map_err(decode)?,
        file_path: row.try_get("file_path").map_err(decode)?,
        image_path: row.try_get("image_path").map_err(decode)?,
        is_available_for_purchase: row.try_get("is_available_for_purchase").map_err(decode)?,
        created_at: decode_timestamp(&created_at)?,
        updated_at: decode_timestamp(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl ProductRepository for SqlProductRepository {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM product WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn save(&self, product: Product) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO product (id, name, description, price_in_cents, file_path, image_path,
                                  is_available_for_purchase, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 price_in_cents = excluded.price_in_cents,
                 file_path = excluded.file_path,
                 image_path = excluded.image_path,
                 is_available_for_purchase = excluded.is_available_for_purchase,
                 updated_at = excluded.updated_at",
        )
        .bind(&product.id.0)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price_in_cents)
        .bind(&product.file_path)
        .bind(&product.image_path)
        .bind(product.is_available_for_purchase)
        .bind(encode_timestamp(product.created_at))
        .bind(encode_timestamp(product.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM product ORDER BY name, id"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_product).collect()
    }

    async fn count_by_availability(&self) -> Result<ProductCounts, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                 COALESCE(SUM(CASE WHEN is_available_for_purchase = 1 THEN 1 ELSE 0 END), 0)
                     AS active_count,
                 COALESCE(SUM(CASE WHEN is_available_for_purchase = 0 THEN 1 ELSE 0 END), 0)
                     AS inactive_count
             FROM product",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(ProductCounts {
            active_count: row
                .try_get("active_count")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
            inactive_count: row
                .try_get("inactive_count")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        })
    }

    async fn sales_by_product(
        &self,
        range: &TimeRange,
    ) -> Result<Vec<ProductSales>, RepositoryError> {
        let (start, end) = encode_range(range);
        let rows = sqlx::query(
            "SELECT p.id, p.name, o.price_paid_in_cents
             FROM product p
             LEFT JOIN purchase_order o
               ON o.product_id = p.id
              AND (? IS NULL OR o.created_at >= ?)
              AND (? IS NULL OR o.created_at <= ?)
             ORDER BY p.name, p.id, o.created_at",
        )
        .bind(&start)
        .bind(&start)
        .bind(&end)
        .bind(&end)
        .fetch_all(&self.pool)
        .await?;

        let mut products: Vec<(String, ProductSales)> = Vec::new();
        for row in &rows {
            let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let paid: Option<i64> = row
                .try_get("price_paid_in_cents")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?;

            if let Some((_, sales)) = products.last_mut().filter(|(last_id, _)| *last_id == id) {
                sales.paid_in_cents.extend(paid);
                continue;
            }

            let name: String =
                row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            products.push((id, ProductSales { name, paid_in_cents: paid.into_iter().collect() }));
        }

        Ok(products.into_iter().map(|(_, sales)| sales).collect())
    }
}
