//! Content item repository implementation.
//!
//! Every variant lives in the `content_item` table; the variant-specific part
//! is stored as JSONB in `payload`. `search_text` carries the payload text
//! plus the description text and feeds the generated `tsv` column used by
//! lexical search.

use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, QueryBuilder, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use curio_core::{
    ContentFilter, ContentItem, ContentMetadata, ContentPayload, ContentRepository, ContentType,
    Description, Error, Result, ScoredContent, SortOrder,
};

/// Columns shared by every content query, excluding the vector.
const ITEM_COLUMNS: &str = "id, uploader, authorized_users, payload, auto_title, summary, \
     keywords, ocr_text, thumbnail_url, is_deleted, is_processed, created_at, updated_at, \
     processed_at, upload_source, group_id";

/// SQL expression for the payload part of `search_text`.
const PAYLOAD_TEXT_SQL: &str =
    "COALESCE(payload->>'content', payload->>'title', payload->>'url')";

fn vector_projection(include: bool) -> &'static str {
    if include {
        "summary_vector"
    } else {
        "NULL::vector AS summary_vector"
    }
}

fn search_text(item: &ContentItem) -> String {
    let payload = item.payload.searchable_text();
    let description = item.description.searchable_text();
    match (payload.is_empty(), description.is_empty()) {
        (true, _) => description,
        (false, true) => payload.to_string(),
        (false, false) => format!("{} {}", payload, description),
    }
}

fn optional_vector(v: &[f32]) -> Option<Vector> {
    if v.is_empty() {
        None
    } else {
        Some(Vector::from(v.to_vec()))
    }
}

/// Map a row (with a `summary_vector` column) into a content item.
pub(crate) fn row_to_item(row: &PgRow) -> Result<ContentItem> {
    let Json(payload): Json<ContentPayload> = row.try_get("payload")?;
    let upload_source: String = row.try_get("upload_source")?;
    let upload_source = upload_source.parse().map_err(Error::Serialization)?;
    let summary_vector: Option<Vector> = row.try_get("summary_vector")?;

    Ok(ContentItem {
        id: row.try_get("id")?,
        uploader: row.try_get("uploader")?,
        authorized_users: row.try_get("authorized_users")?,
        payload,
        description: Description {
            auto_title: row.try_get("auto_title")?,
            summary: row.try_get("summary")?,
            summary_vector: summary_vector.map(|v| v.to_vec()).unwrap_or_default(),
            keywords: row.try_get("keywords")?,
            ocr_text: row.try_get("ocr_text")?,
            thumbnail_url: row.try_get("thumbnail_url")?,
        },
        metadata: ContentMetadata {
            is_deleted: row.try_get("is_deleted")?,
            is_processed: row.try_get("is_processed")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            processed_at: row.try_get("processed_at")?,
            upload_source,
            group_id: row.try_get("group_id")?,
        },
    })
}

fn row_to_scored(row: &PgRow) -> Result<ScoredContent> {
    Ok(ScoredContent {
        item: row_to_item(row)?,
        score: row.try_get("score")?,
    })
}

/// PostgreSQL implementation of ContentRepository.
#[derive(Clone)]
pub struct PgContentRepository {
    pool: Pool<Postgres>,
}

impl PgContentRepository {
    /// Create a new PgContentRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn insert_with<'e, E>(executor: E, item: &ContentItem) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO content_item (
                id, content_type, uploader, authorized_users, payload,
                auto_title, summary, summary_vector, keywords, ocr_text, thumbnail_url,
                search_text, is_deleted, is_processed, created_at, updated_at,
                processed_at, upload_source, group_id
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19
            )
            "#,
        )
        .bind(item.id)
        .bind(item.content_type().as_str())
        .bind(item.uploader)
        .bind(&item.authorized_users)
        .bind(Json(&item.payload))
        .bind(&item.description.auto_title)
        .bind(&item.description.summary)
        .bind(optional_vector(&item.description.summary_vector))
        .bind(&item.description.keywords)
        .bind(&item.description.ocr_text)
        .bind(&item.description.thumbnail_url)
        .bind(search_text(item))
        .bind(item.metadata.is_deleted)
        .bind(item.metadata.is_processed)
        .bind(item.metadata.created_at)
        .bind(item.metadata.updated_at)
        .bind(item.metadata.processed_at)
        .bind(item.metadata.upload_source.as_str())
        .bind(&item.metadata.group_id)
        .execute(executor)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn set_children(
        &self,
        id: Uuid,
        content_type: ContentType,
        field: &str,
        children: &[Uuid],
    ) -> Result<()> {
        let path = format!("{{{}}}", field);
        let result = sqlx::query(
            "UPDATE content_item
             SET payload = jsonb_set(payload, $2::text[], $3), updated_at = $4
             WHERE id = $1 AND content_type = $5",
        )
        .bind(id)
        .bind(path)
        .bind(Json(children))
        .bind(Utc::now())
        .bind(content_type.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("{} {}", content_type, id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentRepository for PgContentRepository {
    #[instrument(skip(self, item), fields(subsystem = "db", component = "content", op = "insert", content_id = %item.id))]
    async fn insert(&self, item: &ContentItem) -> Result<Uuid> {
        Self::insert_with(&self.pool, item).await?;
        Ok(item.id)
    }

    #[instrument(skip(self, items), fields(subsystem = "db", component = "content", op = "insert_many", input_count = items.len()))]
    async fn insert_many(&self, items: &[ContentItem]) -> Result<Vec<Uuid>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        for item in items {
            Self::insert_with(&mut *tx, item).await?;
        }
        tx.commit().await.map_err(Error::Database)?;
        Ok(items.iter().map(|i| i.id).collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ContentItem>> {
        let sql = format!(
            "SELECT {}, summary_vector FROM content_item WHERE id = $1",
            ITEM_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.as_ref().map(row_to_item).transpose()
    }

    #[instrument(skip(self, filter), fields(subsystem = "db", component = "content", op = "find"))]
    async fn find(&self, filter: &ContentFilter) -> Result<Vec<ContentItem>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
        qb.push(ITEM_COLUMNS)
            .push(", ")
            .push(vector_projection(filter.include_vectors))
            .push(" FROM content_item WHERE TRUE");

        if let Some(ref ids) = filter.ids {
            qb.push(" AND id = ANY(").push_bind(ids.clone()).push(")");
        }
        if let Some(ct) = filter.content_type {
            qb.push(" AND content_type = ").push_bind(ct.as_str());
        }
        if let Some(user) = filter.authorized_user {
            qb.push(" AND ").push_bind(user).push(" = ANY(authorized_users)");
        }
        if let Some(processed) = filter.is_processed {
            qb.push(" AND is_processed = ").push_bind(processed);
        }
        if !filter.include_deleted {
            qb.push(" AND is_deleted = FALSE");
        }
        qb.push(match filter.order {
            SortOrder::NewestFirst => " ORDER BY created_at DESC, id DESC",
            SortOrder::OldestFirst => " ORDER BY created_at ASC, id ASC",
        });
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        let items = rows.iter().map(row_to_item).collect::<Result<Vec<_>>>()?;
        debug!(result_count = items.len(), "Content find complete");
        Ok(items)
    }

    #[instrument(skip(self, description), fields(subsystem = "db", component = "content", op = "update_description", content_id = %id))]
    async fn update_description(&self, id: Uuid, description: &Description) -> Result<()> {
        let sql = format!(
            "UPDATE content_item
             SET auto_title = $2, summary = $3, summary_vector = $4, keywords = $5,
                 ocr_text = $6, thumbnail_url = $7,
                 search_text = concat_ws(' ', {}, NULLIF($8, '')),
                 updated_at = $9
             WHERE id = $1",
            PAYLOAD_TEXT_SQL
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(&description.auto_title)
            .bind(&description.summary)
            .bind(optional_vector(&description.summary_vector))
            .bind(&description.keywords)
            .bind(&description.ocr_text)
            .bind(&description.thumbnail_url)
            .bind(description.searchable_text())
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("content {}", id)));
        }
        Ok(())
    }

    async fn mark_processed(&self, id: Uuid, processed: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE content_item
             SET is_processed = $2,
                 processed_at = CASE WHEN $2 THEN $3 ELSE NULL END,
                 updated_at = $3
             WHERE id = $1",
        )
        .bind(id)
        .bind(processed)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("content {}", id)));
        }
        Ok(())
    }

    #[instrument(skip(self, description), fields(subsystem = "db", component = "content", op = "complete", content_id = %id))]
    async fn complete(&self, id: Uuid, description: &Description) -> Result<()> {
        let sql = format!(
            "UPDATE content_item
             SET auto_title = $2, summary = $3, summary_vector = $4, keywords = $5,
                 ocr_text = $6, thumbnail_url = $7,
                 search_text = concat_ws(' ', {}, NULLIF($8, '')),
                 is_processed = TRUE, processed_at = $9, updated_at = $9
             WHERE id = $1",
            PAYLOAD_TEXT_SQL
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(&description.auto_title)
            .bind(&description.summary)
            .bind(optional_vector(&description.summary_vector))
            .bind(&description.keywords)
            .bind(&description.ocr_text)
            .bind(&description.thumbnail_url)
            .bind(description.searchable_text())
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("content {}", id)));
        }
        Ok(())
    }

    async fn set_child_urls(&self, text_id: Uuid, url_ids: &[Uuid]) -> Result<()> {
        self.set_children(text_id, ContentType::Text, "child_urls", url_ids)
            .await
    }

    async fn set_child_texts(&self, file_id: Uuid, text_ids: &[Uuid]) -> Result<()> {
        self.set_children(file_id, ContentType::File, "child_texts", text_ids)
            .await
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE content_item SET is_deleted = TRUE, updated_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("content {}", id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM content_item WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM content_item WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, query), fields(subsystem = "db", component = "content", op = "full_text_search", user_id = %user_id, limit))]
    async fn full_text_search(
        &self,
        query: &str,
        user_id: Uuid,
        content_type: Option<ContentType>,
        limit: i64,
    ) -> Result<Vec<ScoredContent>> {
        let sql = format!(
            r#"
            SELECT {}, NULL::vector AS summary_vector, ts_rank(tsv, q) AS score
            FROM content_item, websearch_to_tsquery('simple', $1) q
            WHERE tsv @@ q
              AND $2 = ANY(authorized_users)
              AND is_deleted = FALSE
              AND ($3::text IS NULL OR content_type = $3)
            ORDER BY score DESC, created_at DESC
            LIMIT $4
            "#,
            ITEM_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(query)
            .bind(user_id)
            .bind(content_type.map(|c| c.as_str()))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let hits = rows.iter().map(row_to_scored).collect::<Result<Vec<_>>>()?;
        debug!(result_count = hits.len(), "Full-text search complete");
        Ok(hits)
    }

    #[instrument(skip(self, vector), fields(subsystem = "db", component = "content", op = "vector_search", user_id = %user_id, limit))]
    async fn vector_search(
        &self,
        vector: &[f32],
        user_id: Uuid,
        content_type: Option<ContentType>,
        limit: i64,
    ) -> Result<Vec<ScoredContent>> {
        if vector.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"
            SELECT {}, NULL::vector AS summary_vector,
                   (1.0 - (summary_vector <=> $1::vector))::real AS score
            FROM content_item
            WHERE summary_vector IS NOT NULL
              AND vector_dims(summary_vector) = $5
              AND vector_norm(summary_vector) > 0
              AND $2 = ANY(authorized_users)
              AND is_deleted = FALSE
              AND ($3::text IS NULL OR content_type = $3)
            ORDER BY summary_vector <=> $1::vector
            LIMIT $4
            "#,
            ITEM_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(Vector::from(vector.to_vec()))
            .bind(user_id)
            .bind(content_type.map(|c| c.as_str()))
            .bind(limit)
            .bind(vector.len() as i32)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let hits = rows.iter().map(row_to_scored).collect::<Result<Vec<_>>>()?;
        debug!(result_count = hits.len(), "Vector search complete");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curio_core::UploadSource;

    fn item(payload: ContentPayload) -> ContentItem {
        ContentItem::new(
            Uuid::new_v4(),
            vec![],
            payload,
            ContentMetadata::new(UploadSource::Web, None),
        )
    }

    #[test]
    fn test_search_text_combines_payload_and_description() {
        let mut text = item(ContentPayload::Text {
            content: "meeting notes".into(),
            child_urls: vec![],
            parent_file: None,
            page_number: None,
        });
        assert_eq!(search_text(&text), "meeting notes");

        text.description.auto_title = "Standup".into();
        assert_eq!(search_text(&text), "meeting notes Standup");
    }

    #[test]
    fn test_search_text_for_image_is_description_only() {
        let mut image = item(ContentPayload::Image {
            file_url: "mem://k".into(),
            object_key: "k".into(),
            file_size: 3,
            file_type: "png".into(),
        });
        assert_eq!(search_text(&image), "");
        image.description.ocr_text = "receipt".into();
        assert_eq!(search_text(&image), "receipt");
    }

    #[test]
    fn test_optional_vector_empty_is_null() {
        assert!(optional_vector(&[]).is_none());
        assert_eq!(
            optional_vector(&[0.5, 0.25]).map(|v| v.to_vec()),
            Some(vec![0.5, 0.25])
        );
    }

    #[test]
    fn test_vector_projection() {
        assert_eq!(vector_projection(true), "summary_vector");
        assert!(vector_projection(false).starts_with("NULL::vector"));
    }
}
