use chrono::{DateTime, Utc};
use sqlx::Row;

use storefront_core::domain::download::{DownloadVerification, DownloadVerificationId};
use storefront_core::domain::product::ProductId;

use super::{
    decode_timestamp, encode_timestamp, new_id, DownloadVerificationRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlDownloadVerificationRepository {
    pool: DbPool,
}

impl SqlDownloadVerificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DownloadVerificationRepository for SqlDownloadVerificationRepository {
    async fn create(
        &self,
        product_id: &ProductId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DownloadVerification, RepositoryError> {
        let id = new_id();
        sqlx::query(
            "INSERT INTO download_verification (id, product_id, expires_at, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&product_id.0)
        .bind(encode_timestamp(expires_at))
        .bind(encode_timestamp(now))
        .execute(&self.pool)
        .await?;

        Ok(DownloadVerification {
            id: DownloadVerificationId(id),
            product_id: product_id.clone(),
            expires_at,
            created_at: now,
        })
    }

    async fn find_valid(
        &self,
        id: &DownloadVerificationId,
        now: DateTime<Utc>,
    ) -> Result<Option<DownloadVerification>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, product_id, expires_at, created_at FROM download_verification
             WHERE id = ? AND expires_at > ?",
        )
        .bind(&id.0)
        .bind(encode_timestamp(now))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
        let expires_at: String = row.try_get("expires_at").map_err(decode)?;
        let created_at: String = row.try_get("created_at").map_err(decode)?;

        Ok(Some(DownloadVerification {
            id: DownloadVerificationId(row.try_get("id").map_err(decode)?),
            product_id: ProductId(row.try_get("product_id").map_err(decode)?),
            expires_at: decode_timestamp(&expires_at)?,
            created_at: decode_timestamp(&created_at)?,
        }))
    }
}
