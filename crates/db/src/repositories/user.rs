use sqlx::Row;

use storefront_core::analytics::TimeRange;
use storefront_core::domain::user::{User, UserId, UserSignup};

use super::{decode_timestamp, encode_range, RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT id, email, created_at FROM app_user WHERE email = ?")
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let created_at: String =
            row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

        Ok(Some(User {
            id: UserId(row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?),
            email: row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?,
            created_at: decode_timestamp(&created_at)?,
        }))
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query("SELECT COUNT(*) AS count FROM app_user")
            .fetch_one(&self.pool)
            .await?
            .try_get("count")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        Ok(count)
    }

    async fn signups_in_range(
        &self,
        range: &TimeRange,
    ) -> Result<Vec<UserSignup>, RepositoryError> {
        let (start, end) = encode_range(range);
        let rows = sqlx::query(
            "SELECT created_at FROM app_user
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
                let created_at: String =
                    row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                Ok(UserSignup { created_at: decode_timestamp(&created_at)? })
            })
            .collect()
    }
}
