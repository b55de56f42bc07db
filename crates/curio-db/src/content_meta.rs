//! Per-user content metadata repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::instrument;
use uuid::Uuid;

use curio_core::{ContentMetaRepository, ContentType, Error, Result, UserContentMeta};

fn row_to_meta(row: &PgRow) -> Result<UserContentMeta> {
    let content_type: String = row.try_get("content_type")?;
    Ok(UserContentMeta {
        user_id: row.try_get("user_id")?,
        content_id: row.try_get("content_id")?,
        content_type: content_type.parse().map_err(Error::Serialization)?,
        labels: row.try_get("labels")?,
        last_read_at: row.try_get("last_read_at")?,
        read_count: row.try_get("read_count")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// PostgreSQL implementation of ContentMetaRepository.
#[derive(Clone)]
pub struct PgContentMetaRepository {
    pool: Pool<Postgres>,
}

impl PgContentMetaRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentMetaRepository for PgContentMetaRepository {
    #[instrument(skip(self, rows), fields(subsystem = "db", component = "content_meta", op = "insert_many", input_count = rows.len()))]
    async fn insert_many(&self, rows: &[UserContentMeta]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        for meta in rows {
            sqlx::query(
                r#"
                INSERT INTO user_content_meta (
                    user_id, content_id, content_type, labels,
                    last_read_at, read_count, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(meta.user_id)
            .bind(meta.content_id)
            .bind(meta.content_type.as_str())
            .bind(&meta.labels)
            .bind(meta.last_read_at)
            .bind(meta.read_count)
            .bind(meta.created_at)
            .bind(meta.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn set_labels(
        &self,
        user_id: Uuid,
        content_id: Uuid,
        content_type: ContentType,
        labels: &[Uuid],
    ) -> Result<()> {
        // Upsert: a row may be missing if the item predates the user's access.
        sqlx::query(
            r#"
            INSERT INTO user_content_meta (user_id, content_id, content_type, labels, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, content_id, content_type)
            DO UPDATE SET labels = EXCLUDED.labels, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user_id)
        .bind(content_id)
        .bind(content_type.as_str())
        .bind(labels)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn list_for_content(&self, content_id: Uuid) -> Result<Vec<UserContentMeta>> {
        let rows = sqlx::query(
            "SELECT user_id, content_id, content_type, labels, last_read_at, read_count,
                    created_at, updated_at
             FROM user_content_meta WHERE content_id = $1 ORDER BY user_id",
        )
        .bind(content_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        rows.iter().map(row_to_meta).collect()
    }

    async fn record_read(
        &self,
        user_id: Uuid,
        content_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE user_content_meta
             SET read_count = read_count + 1, last_read_at = $3, updated_at = $3
             WHERE user_id = $1 AND content_id = $2",
        )
        .bind(user_id)
        .bind(content_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "content meta for user {} on {}",
                user_id, content_id
            )));
        }
        Ok(())
    }

    async fn delete_for_contents(&self, content_ids: &[Uuid]) -> Result<u64> {
        if content_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM user_content_meta WHERE content_id = ANY($1)")
            .bind(content_ids)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
