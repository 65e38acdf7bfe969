//! Document repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use ragmem_core::{
    Document, DocumentRepository, DocumentStats, DocumentStatus, Error, NewDocument, Result,
};

const DOCUMENT_COLUMNS: &str = "id, user_id, title, file_name, file_path, file_type, mime_type, \
     file_size, file_hash, status, error_message, chunk_count, total_chars, summary, \
     created_at, processed_at";

/// PostgreSQL implementation of DocumentRepository.
#[derive(Clone)]
pub struct PgDocumentRepository {
    pool: Pool<Postgres>,
}

impl PgDocumentRepository {
    /// Create a new PgDocumentRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn row_to_document(row: &PgRow) -> Result<Document> {
    let status: String = row.get("status");
    Ok(Document {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        file_name: row.get("file_name"),
        file_path: row.get("file_path"),
        file_type: row.get("file_type"),
        mime_type: row.get("mime_type"),
        file_size: row.get("file_size"),
        file_hash: row.get("file_hash"),
        status: status.parse().map_err(Error::Internal)?,
        error_message: row.get("error_message"),
        chunk_count: row.get("chunk_count"),
        total_chars: row.get("total_chars"),
        summary: row.get("summary"),
        created_at: row.get("created_at"),
        processed_at: row.get("processed_at"),
    })
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn insert(&self, doc: &NewDocument) -> Result<Document> {
        let row = sqlx::query(&format!(
            "INSERT INTO documents
                 (id, user_id, title, file_name, file_path, file_type, mime_type,
                  file_size, file_hash, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {}",
            DOCUMENT_COLUMNS
        ))
        .bind(Uuid::now_v7())
        .bind(doc.user_id)
        .bind(&doc.title)
        .bind(&doc.file_name)
        .bind(&doc.file_path)
        .bind(&doc.file_type)
        .bind(&doc.mime_type)
        .bind(doc.file_size)
        .bind(&doc.file_hash)
        .bind(DocumentStatus::Processing.to_string())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        row_to_document(&row)
    }

    async fn get(&self, id: Uuid, user_id: Uuid) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = $1 AND user_id = $2",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn find_by_hash(&self, user_id: Uuid, file_hash: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE user_id = $1 AND file_hash = $2",
            DOCUMENT_COLUMNS
        ))
        .bind(user_id)
        .bind(file_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn list(
        &self,
        user_id: Uuid,
        status: Option<DocumentStatus>,
        limit: usize,
    ) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents
             WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
             ORDER BY created_at DESC, id DESC
             LIMIT $3",
            DOCUMENT_COLUMNS
        ))
        .bind(user_id)
        .bind(status.map(|s| s.to_string()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(row_to_document).collect()
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        chunk_count: i32,
        total_chars: i64,
        summary: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE documents
             SET status = 'completed', chunk_count = $2, total_chars = $3, summary = $4,
                 error_message = NULL, processed_at = $5
             WHERE id = $1",
        )
        .bind(id)
        .bind(chunk_count)
        .bind(total_chars)
        .bind(summary)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id));
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE documents
             SET status = 'failed', error_message = $2, processed_at = $3
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id));
        }
        Ok(())
    }

    async fn reset_failed(
        &self,
        id: Uuid,
        user_id: Uuid,
        file_path: &str,
    ) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "UPDATE documents
             SET status = 'processing', file_path = $3, error_message = NULL,
                 chunk_count = 0, total_chars = 0, summary = NULL, processed_at = NULL
             WHERE id = $1 AND user_id = $2 AND status = 'failed'
             RETURNING {}",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .bind(file_path)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let owned = sqlx::query("SELECT 1 FROM documents WHERE id = $1 AND user_id = $2 FOR UPDATE")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::Database)?;
        if owned.is_none() {
            return Ok(false);
        }

        sqlx::query("DELETE FROM document_chunks WHERE document_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(true)
    }

    async fn stats(&self, user_id: Uuid) -> Result<DocumentStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*)::bigint AS total_documents,
                   COALESCE(SUM(chunk_count), 0)::bigint AS total_chunks,
                   COALESCE(SUM(file_size), 0)::bigint AS total_size,
                   COUNT(*) FILTER (WHERE status = 'processing')::bigint AS processing,
                   COUNT(*) FILTER (WHERE status = 'completed')::bigint AS completed,
                   COUNT(*) FILTER (WHERE status = 'failed')::bigint AS failed
            FROM documents
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(DocumentStats {
            total_documents: row.get("total_documents"),
            total_chunks: row.get("total_chunks"),
            total_size: row.get("total_size"),
            processing: row.get("processing"),
            completed: row.get("completed"),
            failed: row.get("failed"),
        })
    }
}
