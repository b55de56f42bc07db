//! Messaging group membership.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use curio_core::{Error, GroupResolver, Result};

/// PostgreSQL-backed group membership, resolving a group id to its members.
#[derive(Clone)]
pub struct PgGroupRepository {
    pool: Pool<Postgres>,
}

impl PgGroupRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Add a user to a group. Adding an existing member is a no-op.
    pub async fn add_member(&self, group_id: &str, user_id: Uuid) -> Result<()> {
        sqlx::query(
            "INSERT INTO group_member (group_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(group_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Remove a user from a group. Returns whether they were a member.
    pub async fn remove_member(&self, group_id: &str, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM group_member WHERE group_id = $1 AND user_id = $2")
            .bind(group_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl GroupResolver for PgGroupRepository {
    async fn members(&self, group_id: &str) -> Result<Vec<Uuid>> {
        let members: Vec<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM group_member WHERE group_id = $1 ORDER BY user_id",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(members)
    }
}
