use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use storefront_core::domain::discount::{
    DiscountCode, DiscountCodeId, DiscountKind, DiscountType, NewDiscountCode, ProductScope,
};
use storefront_core::domain::product::ProductId;

use super::{decode_timestamp, encode_timestamp, new_id, DiscountCodeRepository, RepositoryError};
use crate::DbPool;

const CODE_COLUMNS: &str = "id, code, discount_amount, discount_type, uses, is_active,
     all_products, usage_limit, expires_at, created_at";

/// Usability for product `?` at time `?`, in that bind order.
pub(super) const USABLE_PREDICATE: &str = "is_active = 1
     AND (all_products = 1 OR EXISTS (
            SELECT 1 FROM discount_code_product dcp
            WHERE dcp.discount_code_id = discount_code.id AND dcp.product_id = ?))
     AND (usage_limit IS NULL OR usage_limit > uses)
     AND (expires_at IS NULL OR expires_at > ?)";

pub struct SqlDiscountCodeRepository {
    pool: DbPool,
}

impl SqlDiscountCodeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn product_ids_for(&self, id: &str) -> Result<Vec<ProductId>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT product_id FROM discount_code_product
             WHERE discount_code_id = ? ORDER BY product_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("product_id")
                    .map(ProductId)
                    .map_err(|e| RepositoryError::Decode(e.to_string()))
            })
            .collect()
    }

    async fn hydrate(
        &self,
        row: Option<sqlx::sqlite::SqliteRow>,
    ) -> Result<Option<DiscountCode>, RepositoryError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let product_ids = self.product_ids_for(&id).await?;
        row_to_code(&row, product_ids).map(Some)
    }
}

fn row_to_code(
    row: &sqlx::sqlite::SqliteRow,
    product_ids: Vec<ProductId>,
) -> Result<DiscountCode, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
    let amount_text: String = row.try_get("discount_amount").map_err(decode)?;
    let type_text: String = row.try_get("discount_type").map_err(decode)?;
    let all_products: bool = row.try_get("all_products").map_err(decode)?;
    let expires_at: Option<String> = row.try_get("expires_at").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;

    let amount = amount_text.parse::<Decimal>().map_err(|error| {
        RepositoryError::Decode(format!("invalid discount amount `{amount_text}`: {error}"))
    })?;
    let discount_type = DiscountType::parse(&type_text)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown discount type `{type_text}`")))?;

    Ok(DiscountCode {
        id: DiscountCodeId(row.try_get("id").map_err(decode)?),
        code: row.try_get("code").map_err(decode)?,
        kind: DiscountKind::new(discount_type, amount),
        is_active: row.try_get("is_active").map_err(decode)?,
        scope: if all_products {
            ProductScope::AllProducts
        } else {
            ProductScope::Products(product_ids)
        },
        limit: row.try_get("usage_limit").map_err(decode)?,
        uses: row.try_get("uses").map_err(decode)?,
        expires_at: expires_at.as_deref().map(decode_timestamp).transpose()?,
        created_at: decode_timestamp(&created_at)?,
    })
}

#[async_trait::async_trait]
impl DiscountCodeRepository for SqlDiscountCodeRepository {
    async fn create(
        &self,
        code: NewDiscountCode,
        now: DateTime<Utc>,
    ) -> Result<DiscountCode, RepositoryError> {
        let id = new_id();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO discount_code (id, code, discount_amount, discount_type, uses, is_active,
                                        all_products, usage_limit, expires_at, created_at)
             VALUES (?, ?, ?, ?, 0, 1, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&code.code)
        .bind(code.kind.amount().to_string())
        .bind(code.kind.discount_type().as_str())
        .bind(code.scope.is_all_products())
        .bind(code.limit)
        .bind(code.expires_at.map(encode_timestamp))
        .bind(encode_timestamp(now))
        .execute(&mut *tx)
        .await
        .map_err(|error| {
            RepositoryError::from_write(error, || {
                format!("discount code `{}` already exists", code.code)
            })
        })?;

        for product_id in code.scope.product_ids() {
            sqlx::query(
                "INSERT INTO discount_code_product (discount_code_id, product_id) VALUES (?, ?)",
            )
            .bind(&id)
            .bind(&product_id.0)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(DiscountCode {
            id: DiscountCodeId(id),
            code: code.code,
            kind: code.kind,
            is_active: true,
            scope: code.scope,
            limit: code.limit,
            uses: 0,
            expires_at: code.expires_at,
            created_at: now,
        })
    }

    async fn find_by_id(
        &self,
        id: &DiscountCodeId,
    ) -> Result<Option<DiscountCode>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {CODE_COLUMNS} FROM discount_code WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        self.hydrate(row).await
    }

    async fn find_usable(
        &self,
        code: &str,
        product_id: &ProductId,
        now: DateTime<Utc>,
    ) -> Result<Option<DiscountCode>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CODE_COLUMNS} FROM discount_code WHERE code = ? AND {USABLE_PREDICATE}"
        ))
        .bind(code)
        .bind(&product_id.0)
        .bind(encode_timestamp(now))
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate(row).await
    }

    async fn list(&self) -> Result<Vec<DiscountCode>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {CODE_COLUMNS} FROM discount_code ORDER BY created_at DESC, code"
        ))
        .fetch_all(&self.pool)
        .await?;

        let links = sqlx::query(
            "SELECT discount_code_id, product_id FROM discount_code_product
             ORDER BY discount_code_id, product_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut products_by_code: HashMap<String, Vec<ProductId>> = HashMap::new();
        for link in &links {
            let code_id: String = link
                .try_get("discount_code_id")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let product_id: String =
                link.try_get("product_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            products_by_code.entry(code_id).or_default().push(ProductId(product_id));
        }

        rows.iter()
            .map(|row| {
                let id: String =
                    row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                row_to_code(row, products_by_code.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn set_active(
        &self,
        id: &DiscountCodeId,
        is_active: bool,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE discount_code SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &DiscountCodeId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM discount_code WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
