//! Label repository implementation.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use curio_core::{Error, Label, LabelRepository, Result};

const LABEL_COLUMNS: &str =
    "id, owner, name, description, vector, include_keywords, exclude_keywords, is_deleted, created_at";

fn row_to_label(row: &PgRow) -> Result<Label> {
    let vector: Vector = row.try_get("vector")?;
    Ok(Label {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        vector: vector.to_vec(),
        include_keywords: row.try_get("include_keywords")?,
        exclude_keywords: row.try_get("exclude_keywords")?,
        is_deleted: row.try_get("is_deleted")?,
        created_at: row.try_get("created_at")?,
    })
}

/// PostgreSQL implementation of LabelRepository.
#[derive(Clone)]
pub struct PgLabelRepository {
    pool: Pool<Postgres>,
}

impl PgLabelRepository {
    /// Create a new PgLabelRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LabelRepository for PgLabelRepository {
    async fn list_for_owner(&self, owner: Uuid) -> Result<Vec<Label>> {
        let sql = format!(
            "SELECT {} FROM label WHERE owner = $1 AND is_deleted = FALSE ORDER BY created_at, id",
            LABEL_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(owner)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.iter().map(row_to_label).collect()
    }

    async fn exists(&self, owner: Uuid, name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM label WHERE owner = $1 AND name = $2 AND is_deleted = FALSE)",
        )
        .bind(owner)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(exists)
    }

    #[instrument(skip(self, label), fields(subsystem = "db", component = "labels", op = "insert", user_id = %label.owner))]
    async fn insert(&self, label: &Label) -> Result<Uuid> {
        let result = sqlx::query(
            r#"
            INSERT INTO label (
                id, owner, name, description, vector,
                include_keywords, exclude_keywords, is_deleted, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(label.id)
        .bind(label.owner)
        .bind(&label.name)
        .bind(&label.description)
        .bind(Vector::from(label.vector.clone()))
        .bind(&label.include_keywords)
        .bind(&label.exclude_keywords)
        .bind(label.is_deleted)
        .bind(label.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(label_id = %label.id, "Label inserted");
                Ok(label.id)
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(Error::Conflict(
                format!("label '{}' already exists", label.name),
            )),
            Err(e) => Err(Error::Database(e)),
        }
    }

    async fn soft_delete(&self, owner: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE label SET is_deleted = TRUE WHERE id = $1 AND owner = $2 AND is_deleted = FALSE",
        )
        .bind(id)
        .bind(owner)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
