//! Chunk repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use ragmem_core::{ChunkRepository, DocumentChunk, Error, NewChunk, Result, SearchResult};

use crate::escape_like;

/// PostgreSQL implementation of ChunkRepository.
#[derive(Clone)]
pub struct PgChunkRepository {
    pool: Pool<Postgres>,
}

impl PgChunkRepository {
    /// Create a new PgChunkRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert chunks within an existing transaction.
    pub async fn insert_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        chunks: &[NewChunk],
        embeddings: Option<&[Vector]>,
    ) -> Result<Vec<Uuid>> {
        if let Some(vectors) = embeddings {
            if vectors.len() != chunks.len() {
                return Err(Error::IndexInconsistency(format!(
                    "{} chunks but {} embeddings",
                    chunks.len(),
                    vectors.len()
                )));
            }
        }

        let now = Utc::now();
        let mut ids = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let id = Uuid::now_v7();
            let embedding = embeddings.map(|v| v[i].clone());
            sqlx::query(
                "INSERT INTO document_chunks
                     (id, document_id, user_id, chunk_index, content, title, embedding, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(id)
            .bind(chunk.document_id)
            .bind(chunk.user_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.title)
            .bind(embedding)
            .bind(now)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
            ids.push(id);
        }
        Ok(ids)
    }
}

#[async_trait]
impl ChunkRepository for PgChunkRepository {
    async fn insert_batch(
        &self,
        chunks: &[NewChunk],
        embeddings: Option<&[Vector]>,
    ) -> Result<Vec<Uuid>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let ids = self.insert_tx(&mut tx, chunks, embeddings).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(ids)
    }

    async fn find_similar(
        &self,
        user_id: Uuid,
        query: &Vector,
        document_ids: Option<&[Uuid]>,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, title, content, created_at,
                   (1.0 - (embedding <=> $1::vector))::float8 AS score
            FROM document_chunks
            WHERE user_id = $2
              AND embedding IS NOT NULL
              AND ($3::uuid[] IS NULL OR document_id = ANY($3))
              AND (1.0 - (embedding <=> $1::vector)) >= $4
            ORDER BY score DESC, created_at DESC, id DESC
            LIMIT $5
            "#,
        )
        .bind(query)
        .bind(user_id)
        .bind(document_ids.map(<[Uuid]>::to_vec))
        .bind(min_score as f64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| SearchResult {
                chunk_id: row.get("id"),
                document_id: row.get("document_id"),
                title: row.get("title"),
                content: row.get("content"),
                score: row.get::<f64, _>("score") as f32,
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn find_containing(
        &self,
        user_id: Uuid,
        tokens: &[String],
        document_ids: Option<&[Uuid]>,
        limit: usize,
    ) -> Result<Vec<DocumentChunk>> {
        if tokens.is_empty() {
            return Ok(vec![]);
        }
        let patterns: Vec<String> = tokens
            .iter()
            .map(|t| format!("%{}%", escape_like(t)))
            .collect();

        let rows = sqlx::query(
            r#"
            SELECT id, document_id, user_id, chunk_index, content, title, created_at
            FROM document_chunks
            WHERE user_id = $1
              AND content ILIKE ANY($2)
              AND ($3::uuid[] IS NULL OR document_id = ANY($3))
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(user_id)
        .bind(&patterns)
        .bind(document_ids.map(<[Uuid]>::to_vec))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| DocumentChunk {
                id: row.get("id"),
                document_id: row.get("document_id"),
                user_id: row.get("user_id"),
                chunk_index: row.get("chunk_index"),
                content: row.get("content"),
                title: row.get("title"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn delete_for_document(&self, document_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM document_chunks WHERE document_id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
