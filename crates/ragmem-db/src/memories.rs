//! Memory repository implementation.
//!
//! Retrieval selects and touches memories in one `UPDATE ... RETURNING`
//! statement, so concurrent retrievals each add exactly one to
//! `access_count`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use ragmem_core::{
    Error, Memory, MemoryQuery, MemoryRepository, MemoryUpdate, NewMemory, Result,
};

use crate::escape_like;

const MEMORY_COLUMNS: &str = "id, user_id, content, importance, category, tags, source, \
     access_count, last_accessed, expires_at, is_active, created_at, updated_at";

const MEMORY_COLUMNS_QUALIFIED: &str = "m.id, m.user_id, m.content, m.importance, m.category, \
     m.tags, m.source, m.access_count, m.last_accessed, m.expires_at, m.is_active, \
     m.created_at, m.updated_at";

/// PostgreSQL implementation of MemoryRepository.
#[derive(Clone)]
pub struct PgMemoryRepository {
    pool: Pool<Postgres>,
}

impl PgMemoryRepository {
    /// Create a new PgMemoryRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn row_to_memory(row: &PgRow) -> Result<Memory> {
    let source: String = row.get("source");
    Ok(Memory {
        id: row.get("id"),
        user_id: row.get("user_id"),
        content: row.get("content"),
        importance: row.get("importance"),
        category: row.get("category"),
        tags: row.get("tags"),
        source: source.parse().map_err(Error::Internal)?,
        access_count: row.get("access_count"),
        last_accessed: row.get("last_accessed"),
        expires_at: row.get("expires_at"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Importance descending, then insertion order.
fn retrieval_order(a: &Memory, b: &Memory) -> std::cmp::Ordering {
    b.importance
        .total_cmp(&a.importance)
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}

#[async_trait]
impl MemoryRepository for PgMemoryRepository {
    async fn insert(
        &self,
        user_id: Uuid,
        memory: &NewMemory,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Memory> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "INSERT INTO memories
                 (id, user_id, content, importance, category, tags, source,
                  access_count, expires_at, is_active, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8, TRUE, $9, $9)
             RETURNING {}",
            MEMORY_COLUMNS
        ))
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(&memory.content)
        .bind(memory.importance)
        .bind(memory.category_or_default())
        .bind(&memory.tags)
        .bind(memory.source.to_string())
        .bind(expires_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        row_to_memory(&row)
    }

    async fn retrieve_and_touch(&self, user_id: Uuid, query: &MemoryQuery) -> Result<Vec<Memory>> {
        let patterns: Vec<String> = query
            .tokens()
            .iter()
            .map(|t| format!("%{}%", escape_like(t)))
            .collect();

        let rows = sqlx::query(&format!(
            r#"
            WITH picked AS (
                SELECT id FROM memories
                WHERE user_id = $1
                  AND is_active
                  AND importance >= $2
                  AND ($3::text IS NULL OR category = $3)
                  AND (cardinality($4::text[]) = 0 OR content ILIKE ANY($4))
                ORDER BY importance DESC, created_at ASC, id ASC
                LIMIT $5
                FOR UPDATE
            )
            UPDATE memories m
            SET access_count = m.access_count + 1, last_accessed = $6
            FROM picked
            WHERE m.id = picked.id
            RETURNING {}
            "#,
            MEMORY_COLUMNS_QUALIFIED
        ))
        .bind(user_id)
        .bind(query.min_importance)
        .bind(query.category.as_deref())
        .bind(&patterns)
        .bind(query.limit as i64)
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut memories = rows.iter().map(row_to_memory).collect::<Result<Vec<_>>>()?;
        // RETURNING does not preserve the CTE's order
        memories.sort_by(retrieval_order);
        Ok(memories)
    }

    async fn get_and_touch(&self, id: Uuid, user_id: Uuid) -> Result<Option<Memory>> {
        let row = sqlx::query(&format!(
            "UPDATE memories
             SET access_count = access_count + 1, last_accessed = $3
             WHERE id = $1 AND user_id = $2
             RETURNING {}",
            MEMORY_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(row_to_memory).transpose()
    }

    async fn fetch(&self, id: Uuid, user_id: Uuid) -> Result<Option<Memory>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM memories WHERE id = $1 AND user_id = $2",
            MEMORY_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(row_to_memory).transpose()
    }

    async fn list(
        &self,
        user_id: Uuid,
        include_inactive: bool,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM memories
             WHERE user_id = $1 AND ($2 OR is_active)
             ORDER BY created_at DESC, id DESC
             LIMIT $3",
            MEMORY_COLUMNS
        ))
        .bind(user_id)
        .bind(include_inactive)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(row_to_memory).collect()
    }

    async fn update(
        &self,
        id: Uuid,
        user_id: Uuid,
        update: &MemoryUpdate,
        expires_at: Option<Option<DateTime<Utc>>>,
    ) -> Result<Option<Memory>> {
        let row = sqlx::query(&format!(
            "UPDATE memories SET
                 content = COALESCE($3, content),
                 importance = COALESCE($4, importance),
                 category = COALESCE($5, category),
                 tags = COALESCE($6, tags),
                 is_active = COALESCE($7, is_active),
                 expires_at = CASE WHEN $8 THEN $9 ELSE expires_at END,
                 updated_at = $10
             WHERE id = $1 AND user_id = $2
             RETURNING {}",
            MEMORY_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .bind(update.content.as_deref())
        .bind(update.importance)
        .bind(update.category.as_deref())
        .bind(update.tags.as_ref())
        .bind(update.is_active)
        .bind(expires_at.is_some())
        .bind(expires_at.flatten())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(row_to_memory).transpose()
    }

    async fn set_active(&self, id: Uuid, user_id: Uuid, active: bool) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE memories SET is_active = $3, updated_at = $4
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .bind(active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_expired(&self, user_id: Option<Uuid>, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE memories SET is_active = FALSE, updated_at = $2
             WHERE is_active
               AND expires_at IS NOT NULL
               AND expires_at < $2
               AND ($1::uuid IS NULL OR user_id = $1)",
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }
}
