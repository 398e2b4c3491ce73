use super::{DbPool, DocumentChunk, UserDocument};
use anyhow::Result;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::{FromRow, Row};
use tracing::debug;

use super::models::{DocumentMetadata, DocumentOverview};

pub struct Repository {
    pub pool: DbPool,
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Check if user has access to document
    pub async fn check_user_document_access(
        &self,
        user_id: i32,
        document_id: i32,
    ) -> Result<bool> {
        let result = sqlx::query_scalar::<_, bool>("SELECT check_user_document_access($1, $2)")
            .bind(user_id)
            .bind(document_id)
            .fetch_one(self.pool.get_pool())
            .await?;

        Ok(result)
    }

    /// Get all document IDs accessible by user
    pub async fn get_user_document_ids(&self, user_id: i32) -> Result<Vec<i32>> {
        let rows = sqlx::query_scalar::<_, i32>("SELECT document_id FROM get_user_document_ids($1)")
            .bind(user_id)
            .fetch_all(self.pool.get_pool())
            .await?;

        Ok(rows)
    }

    /// Get user's accessible documents with metadata
    pub async fn get_user_documents(&self, user_id: i32) -> Result<Vec<UserDocument>> {
        let docs = sqlx::query_as::<_, UserDocument>(
            r#"SELECT
                document_id,
                owner_user_id,
                document_title,
                created_at,
                user_id,
                permission_level
               FROM vw_user_documents
               WHERE user_id = $1
               ORDER BY created_at DESC"#,
        )
        .bind(user_id)
        .persistent(false)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(docs)
    }

    /// Vector search dengan user authorization
    pub async fn search_user_documents(
        &self,
        user_id: i32,
        query_embedding: Vector,
        limit: i32,
        document_ids: Option<Vec<i32>>,
    ) -> Result<Vec<DocumentChunk>> {
        let chunks = sqlx::query_as::<_, DocumentChunk>(
            r#"SELECT
                chunk_id,
                document_id,
                document_title,
                content,
                similarity,
                chunk_index,
                page_number
               FROM search_user_documents($1, $2, $3, $4)"#,
        )
        .bind(user_id)
        .bind(query_embedding)
        .bind(limit)
        .bind(document_ids)
        .persistent(false)
        .fetch_all(self.pool.get_pool())
        .await?;

        debug!("Found {} relevant chunks for user {}", chunks.len(), user_id);

        Ok(chunks)
    }

    /// Hybrid search (vector + full-text)
    pub async fn hybrid_search_user_documents(
        &self,
        user_id: i32,
        query_embedding: Vector,
        query_text: String,
        limit: i32,
        document_ids: Option<Vec<i32>>,
    ) -> Result<Vec<DocumentChunk>> {
        #[derive(FromRow)]
        struct HybridResult {
            chunk_id: i64,
            document_id: i32,
            document_title: String,
            content: String,
            hybrid_score: f32,
            chunk_index: i32,
        }

        let results = sqlx::query_as::<_, HybridResult>(
            r#"SELECT
                chunk_id,
                document_id,
                document_title,
                content,
                hybrid_score,
                chunk_index
               FROM hybrid_search_user_documents($1, $2, $3, $4, $5)"#,
        )
        .bind(user_id)
        .bind(query_embedding)
        .bind(&query_text)
        .bind(limit)
        .bind(document_ids)
        .persistent(false)
        .fetch_all(self.pool.get_pool())
        .await?;

        let chunks = results
            .into_iter()
            .map(|r| DocumentChunk {
                chunk_id: r.chunk_id,
                document_id: r.document_id,
                document_title: r.document_title,
                content: r.content,
                similarity: r.hybrid_score,
                chunk_index: r.chunk_index,
                page_number: None,
            })
            .collect();

        Ok(chunks)
    }

    /// Dense-vector leg of session-scoped hybrid retrieval. `document_ids`
    /// must come from the session's own attachment set
    /// (`get_session_active_docs`) — never from a raw user/document scan —
    /// so a chunk can only surface for the session it's attached to.
    pub async fn vector_search_by_documents(
        &self,
        document_ids: &[i32],
        query_embedding: Vector,
        num_candidates: i32,
    ) -> Result<Vec<DocumentChunk>> {
        if document_ids.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = sqlx::query_as::<_, DocumentChunk>(
            r#"
            SELECT
                c.id as chunk_id,
                c.document_id,
                d."DocumentTitle" as document_title,
                c.content,
                1.0 - (c.embedding <=> $2) as similarity,
                c.chunk_index,
                c.page_number
            FROM rag_document_chunks c
            JOIN "TblDocuments" d ON d."Id" = c.document_id
            WHERE c.document_id = ANY($1)
            ORDER BY c.embedding <=> $2
            LIMIT $3
            "#,
        )
        .bind(document_ids)
        .bind(query_embedding)
        .bind(num_candidates)
        .persistent(false)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(chunks)
    }

    /// Keyword (BM25-style) leg of session-scoped hybrid retrieval, boosting
    /// title matches over body matches. Same `document_ids` contract as
    /// [`Repository::vector_search_by_documents`].
    pub async fn keyword_search_by_documents(
        &self,
        document_ids: &[i32],
        query_text: &str,
        num_candidates: i32,
    ) -> Result<Vec<DocumentChunk>> {
        if document_ids.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = sqlx::query_as::<_, DocumentChunk>(
            r#"
            SELECT
                c.id as chunk_id,
                c.document_id,
                d."DocumentTitle" as document_title,
                c.content,
                ts_rank(
                    setweight(to_tsvector('simple', coalesce(d."DocumentTitle", '')), 'A') ||
                    setweight(to_tsvector('simple', c.content), 'D'),
                    plainto_tsquery('simple', $2)
                ) as similarity,
                c.chunk_index,
                c.page_number
            FROM rag_document_chunks c
            JOIN "TblDocuments" d ON d."Id" = c.document_id
            WHERE c.document_id = ANY($1)
              AND (
                setweight(to_tsvector('simple', coalesce(d."DocumentTitle", '')), 'A') ||
                setweight(to_tsvector('simple', c.content), 'D')
              ) @@ plainto_tsquery('simple', $2)
            ORDER BY similarity DESC
            LIMIT $3
            "#,
        )
        .bind(document_ids)
        .bind(query_text)
        .bind(num_candidates)
        .persistent(false)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(chunks)
    }

    /// Purge a session's document attachments (`rag_chat_session_documents`
    /// rows), the chunk-index side of `DeleteSession`. Idempotent: calling
    /// this twice for the same session removes zero rows the second time.
    pub async fn delete_session_documents(&self, session_id: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"DELETE FROM rag_chat_session_documents scd
               USING rag_chat_sessions s
               WHERE s."Id" = scd."SessionHistoryId" AND s."SessionId" = $1"#,
        )
        .bind(session_id)
        .execute(self.pool.get_pool())
        .await?;

        Ok(result.rows_affected())
    }

    /// Get the first chunk of a document (usually contains title/intro)
    pub async fn get_first_chunk(&self, document_id: i32) -> Result<Option<DocumentChunk>> {
        let chunk = sqlx::query_as::<_, DocumentChunk>(
            r#"
            SELECT
                c.id as chunk_id,
                c.document_id,
                d."DocumentTitle" as document_title,
                c.content,
                1.0 as similarity,
                c.chunk_index,
                c.page_number
            FROM rag_document_chunks c
            JOIN "TblDocuments" d ON d."Id" = c.document_id
            WHERE c.document_id = $1 AND c.chunk_index = 0
            LIMIT 1
            "#,
        )
        .bind(document_id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(chunk)
    }

    /// Get chunks for a set of documents regardless of similarity (used by deep-scan retrieval)
    pub async fn get_chunks_by_document_ids(&self, document_ids: &[i64]) -> Result<Vec<DocumentChunk>> {
        if document_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i32> = document_ids.iter().map(|id| *id as i32).collect();

        let chunks = sqlx::query_as::<_, DocumentChunk>(
            r#"
            SELECT
                c.id as chunk_id,
                c.document_id,
                d."DocumentTitle" as document_title,
                c.content,
                1.0 as similarity,
                c.chunk_index,
                c.page_number
            FROM rag_document_chunks c
            JOIN "TblDocuments" d ON d."Id" = c.document_id
            WHERE c.document_id = ANY($1)
            ORDER BY c.document_id, c.chunk_index ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(chunks)
    }

    /// Get document metadata for overview questions
    pub async fn get_document_metadata(&self, document_id: i32) -> Result<DocumentMetadata> {
        #[derive(FromRow)]
        struct MetadataRow {
            document_id: i32,
            title: String,
            description: Option<String>,
            auto_summary: Option<String>,
            file_size: Option<i32>,
            total_chunks: Option<i64>,
            created_at: DateTime<Utc>,
        }

        let row = sqlx::query_as::<_, MetadataRow>(
            r#"
            SELECT
                d."Id" as document_id,
                d."DocumentTitle" as title,
                d."DocumentDesc" as description,
                d.auto_summary,
                d."FileSize" as file_size,
                COUNT(c.id) as total_chunks,
                d."InsertedAt" as created_at
            FROM "TblDocuments" d
            LEFT JOIN rag_document_chunks c ON c.document_id = d."Id"
            WHERE d."Id" = $1 AND d."IsDeleted" = false
            GROUP BY d."Id"
            "#,
        )
        .bind(document_id)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(DocumentMetadata {
            document_id: row.document_id,
            title: row.title,
            description: row.description,
            auto_summary: row.auto_summary,
            file_size: row.file_size,
            total_chunks: row.total_chunks.unwrap_or(0) as i32,
            created_at: row.created_at,
        })
    }

    /// Get first N chunks of a document (for overview generation)
    pub async fn get_document_overview_chunks(
        &self,
        document_id: i32,
        limit: i32,
    ) -> Result<Vec<DocumentChunk>> {
        let chunks = sqlx::query_as::<_, DocumentChunk>(
            r#"
            SELECT
                c.id as chunk_id,
                c.document_id,
                d."DocumentTitle" as document_title,
                c.content,
                1.0 as similarity,
                c.chunk_index,
                c.page_number
            FROM rag_document_chunks c
            JOIN "TblDocuments" d ON d."Id" = c.document_id
            WHERE c.document_id = $1
            ORDER BY c.chunk_index ASC
            LIMIT $2
            "#,
        )
        .bind(document_id)
        .bind(limit)
        .fetch_all(self.pool.get_pool())
        .await?;

        debug!("Retrieved {} overview chunks for document {}", chunks.len(), document_id);

        Ok(chunks)
    }

    /// Get complete document overview (metadata + first chunks)
    pub async fn get_document_overview(
        &self,
        document_id: i32,
        chunk_limit: i32,
    ) -> Result<DocumentOverview> {
        let metadata = self.get_document_metadata(document_id).await?;
        let first_chunks = self.get_document_overview_chunks(document_id, chunk_limit).await?;

        Ok(DocumentOverview { metadata, first_chunks })
    }

    /// Update document auto_summary field
    pub async fn update_document_summary(&self, document_id: i32, auto_summary: String) -> Result<()> {
        sqlx::query(
            r#"UPDATE "TblDocuments"
               SET auto_summary = $1, "UpdatedAt" = NOW()
               WHERE "Id" = $2"#,
        )
        .bind(auto_summary)
        .bind(document_id)
        .execute(self.pool.get_pool())
        .await?;

        debug!("Updated auto_summary for document {}", document_id);

        Ok(())
    }

    /// Insert uploaded document chunks (after processing)
    pub async fn insert_document_chunks(
        &self,
        document_id: i32,
        chunks: Vec<(String, Vector)>,
    ) -> Result<()> {
        let mut transaction = self.pool.get_pool().begin().await?;

        for (index, (content, embedding)) in chunks.into_iter().enumerate() {
            sqlx::query(
                r#"INSERT INTO rag_document_chunks
                   (document_id, chunk_index, content, char_count, embedding)
                   VALUES ($1, $2, $3, $4, $5)"#,
            )
            .bind(document_id)
            .bind(index as i32)
            .bind(&content)
            .bind(content.len() as i32)
            .bind(embedding)
            .execute(&mut *transaction)
            .await?;
        }

        transaction.commit().await?;
        debug!("Inserted chunks for document {}", document_id);

        Ok(())
    }

    /// Ensure the user has a personal "AI Upload" category, returning its id.
    pub async fn ensure_ai_upload_category(&self, user_id: i32) -> Result<i32> {
        if let Some(id) = sqlx::query_scalar::<_, i32>(
            r#"SELECT "Id" FROM "TblCategories" WHERE "Owner" = $1 AND "CategoryName" = 'AI Upload' AND "IsDeleted" = false"#,
        )
        .bind(user_id)
        .fetch_optional(self.pool.get_pool())
        .await?
        {
            return Ok(id);
        }

        let id: i32 = sqlx::query_scalar(
            r#"INSERT INTO "TblCategories"
               ("CategoryName", "Owner", "InsertedBy", "InsertedAt", "UpdatedAt", "IsActive", "IsDeleted")
               VALUES ('AI Upload', $1, $1, NOW(), NOW(), true, false)
               RETURNING "Id""#,
        )
        .bind(user_id)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(id)
    }

    /// Create document metadata records (category + physical file path already resolved by caller)
    pub async fn create_document(
        &self,
        user_id: i32,
        filename: &str,
        file_size: i32,
        file_type: &str,
        category_id: i32,
        file_path: &str,
    ) -> Result<i32> {
        let mut transaction = self.pool.get_pool().begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO "TblDocuments"
            ("CategoryID", "DocumentTitle", "DocumentDesc", "Owner", "FileSize",
             "InsertedBy", "InsertedAt", "UpdatedAt", "IsActive", "IsDeleted")
            VALUES
            ($1, $2, $3, $4, $5, $6, NOW(), NOW(), true, false)
            RETURNING "Id"
            "#,
        )
        .bind(category_id)
        .bind(filename)
        .bind("Uploaded via RAG Chat")
        .bind(user_id)
        .bind(file_size)
        .bind(user_id)
        .fetch_one(&mut *transaction)
        .await?;

        let document_id: i32 = row.get("Id");

        sqlx::query(
            r#"
            INSERT INTO "TblDocumentFiles"
            ("DocumentID", "DocumentType", "DocumentFileName", "DocumentFileSize",
             "DocumentFilePath", "IsMainDocumentFile", "InsertedBy", "InsertedAt",
             "UpdatedAt", "IsActive", "IsDeleted")
            VALUES
            ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW(), true, false)
            "#,
        )
        .bind(document_id)
        .bind(file_type)
        .bind(filename)
        .bind(file_size)
        .bind(file_path)
        .bind(true)
        .bind(user_id)
        .execute(&mut *transaction)
        .await?;

        transaction.commit().await?;

        Ok(document_id)
    }

    /// Ensure the processing status table exists
    pub async fn ensure_processing_table(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS rag_document_processing (
                document_id INT PRIMARY KEY,
                status VARCHAR(50) NOT NULL,
                progress FLOAT NOT NULL DEFAULT 0,
                message TEXT,
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )"#,
        )
        .execute(self.pool.get_pool())
        .await?;
        Ok(())
    }

    /// Ensure necessary indexes exist for performance optimization
    pub async fn ensure_indices(&self) -> Result<()> {
        let pool = self.pool.get_pool();

        debug!("Ensuring vector index exists...");
        sqlx::query(
            r#"CREATE INDEX IF NOT EXISTS idx_rag_chunks_embedding
               ON rag_document_chunks
               USING ivfflat (embedding vector_cosine_ops)
               WITH (lists = 100)"#,
        )
        .execute(pool)
        .await?;

        debug!("Ensuring filtering index exists...");
        sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_rag_chunks_doc_id ON rag_document_chunks(document_id)"#)
            .execute(pool)
            .await?;

        debug!("Ensuring FTS index exists...");
        sqlx::query(
            r#"CREATE INDEX IF NOT EXISTS idx_rag_chunks_content_fts
               ON rag_document_chunks
               USING gin(to_tsvector('english', content))"#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Update or insert document processing status
    pub async fn upsert_document_processing_status(
        &self,
        document_id: i32,
        status: &str,
        progress: f32,
        message: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO rag_document_processing
               (document_id, status, progress, message, updated_at)
               VALUES ($1, $2, $3, $4, NOW())
               ON CONFLICT (document_id)
               DO UPDATE SET
                  status = EXCLUDED.status,
                  progress = EXCLUDED.progress,
                  message = EXCLUDED.message,
                  updated_at = NOW()"#,
        )
        .bind(document_id)
        .bind(status)
        .bind(progress)
        .bind(message)
        .execute(self.pool.get_pool())
        .await?;

        Ok(())
    }

    /// Get documents that are currently being processed for a user
    pub async fn get_user_processing_documents(
        &self,
        user_id: i32,
    ) -> Result<Vec<super::DocumentProcessingStatus>> {
        let docs = sqlx::query_as::<_, super::DocumentProcessingStatus>(
            r#"SELECT
                p.document_id,
                p.status,
                p.progress,
                p.message,
                p.updated_at
               FROM rag_document_processing p
               JOIN "TblDocuments" d ON d."Id" = p.document_id
               WHERE d."Owner" = $1 AND p.status != 'completed'
               ORDER BY p.updated_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(docs)
    }

    // ============ CHAT HISTORY PERSISTENCE ============

    /// Ensure a chat session header row exists, returning its internal id.
    pub async fn create_chat_session(&self, user_id: i64, session_id: i64) -> Result<i64> {
        if let Some(id) = sqlx::query_scalar::<_, i64>(
            r#"SELECT "Id" FROM rag_chat_sessions WHERE "SessionId" = $1"#,
        )
        .bind(session_id)
        .fetch_optional(self.pool.get_pool())
        .await?
        {
            return Ok(id);
        }

        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO rag_chat_sessions ("SessionId", "UserId", "CreatedAt", "UpdatedAt")
               VALUES ($1, $2, NOW(), NOW())
               ON CONFLICT ("SessionId") DO UPDATE SET "UpdatedAt" = NOW()
               RETURNING "Id""#,
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(id)
    }

    /// Persist a single chat turn (user or assistant message) under a session.
    pub async fn save_chat_message(&self, history_id: i64, role: &str, message: &str) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO rag_chat_messages ("SessionHistoryId", "Role", "Content", "CreatedAt")
               VALUES ($1, $2, $3, NOW())"#,
        )
        .bind(history_id)
        .bind(role)
        .bind(message)
        .execute(self.pool.get_pool())
        .await?;

        Ok(())
    }

    /// Record which documents were active when a session turn occurred.
    pub async fn save_chat_docs(&self, history_id: i64, doc_ids: &[i64]) -> Result<()> {
        if doc_ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<i32> = doc_ids.iter().map(|id| *id as i32).collect();

        sqlx::query(
            r#"INSERT INTO rag_chat_session_documents ("SessionHistoryId", "DocumentId")
               SELECT $1, unnest($2::int[])
               ON CONFLICT DO NOTHING"#,
        )
        .bind(history_id)
        .bind(&ids)
        .execute(self.pool.get_pool())
        .await?;

        Ok(())
    }

    /// Fetch the set of documents currently attached to a session (implicit context).
    pub async fn get_session_active_docs(&self, session_id: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i32>(
            r#"SELECT DISTINCT scd."DocumentId"
               FROM rag_chat_session_documents scd
               JOIN rag_chat_sessions s ON s."Id" = scd."SessionHistoryId"
               WHERE s."SessionId" = $1"#,
        )
        .bind(session_id)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(ids.into_iter().map(|id| id as i64).collect())
    }

    // ============ SEMANTIC MEMORY ============

    /// Ensure the session-memory table exists (mirrors `ensure_processing_table`).
    pub async fn ensure_memory_table(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS rag_session_memories (
                id BIGSERIAL PRIMARY KEY,
                session_id BIGINT NOT NULL,
                user_id BIGINT NOT NULL,
                memory_type VARCHAR(20) NOT NULL,
                content TEXT NOT NULL,
                importance REAL NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )"#,
        )
        .execute(self.pool.get_pool())
        .await?;

        sqlx::query(
            r#"CREATE INDEX IF NOT EXISTS idx_rag_session_memories_session
               ON rag_session_memories(session_id)"#,
        )
        .execute(self.pool.get_pool())
        .await?;

        Ok(())
    }

    pub async fn insert_memory(
        &self,
        session_id: i64,
        user_id: i64,
        memory_type: &str,
        content: &str,
        importance: f32,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO rag_session_memories (session_id, user_id, memory_type, content, importance)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id"#,
        )
        .bind(session_id)
        .bind(user_id)
        .bind(memory_type)
        .bind(content)
        .bind(importance)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(id)
    }

    pub async fn get_session_memories(&self, session_id: i64) -> Result<Vec<super::MemoryRecord>> {
        let memories = sqlx::query_as::<_, super::MemoryRecord>(
            r#"SELECT id as memory_id, session_id, user_id, memory_type, content, importance, created_at
               FROM rag_session_memories
               WHERE session_id = $1
               ORDER BY importance DESC, created_at DESC"#,
        )
        .bind(session_id)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(memories)
    }

    /// Drop the lowest-importance memories once a session exceeds its cap.
    pub async fn trim_session_memories(&self, session_id: i64, keep: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"DELETE FROM rag_session_memories
               WHERE id IN (
                   SELECT id FROM rag_session_memories
                   WHERE session_id = $1
                   ORDER BY importance ASC, created_at ASC
                   OFFSET $2
               )"#,
        )
        .bind(session_id)
        .bind(keep)
        .execute(self.pool.get_pool())
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete_memories_by_session(&self, session_id: i64) -> Result<u64> {
        let result = sqlx::query(r#"DELETE FROM rag_session_memories WHERE session_id = $1"#)
            .bind(session_id)
            .execute(self.pool.get_pool())
            .await?;

        Ok(result.rows_affected())
    }

    // ============ LIFECYCLE CLEANUP ============

    /// Cascade-delete a session's persisted chat turns, document attachments
    /// and the session header row itself. Returns the number of message rows
    /// removed. Safe to call on a session that was never persisted.
    pub async fn delete_chat_messages_by_session(&self, session_id: i64) -> Result<u64> {
        let Some(history_id) = sqlx::query_scalar::<_, i64>(
            r#"SELECT "Id" FROM rag_chat_sessions WHERE "SessionId" = $1"#,
        )
        .bind(session_id)
        .fetch_optional(self.pool.get_pool())
        .await?
        else {
            return Ok(0);
        };

        let message_result = sqlx::query(r#"DELETE FROM rag_chat_messages WHERE "SessionHistoryId" = $1"#)
            .bind(history_id)
            .execute(self.pool.get_pool())
            .await?;

        sqlx::query(r#"DELETE FROM rag_chat_session_documents WHERE "SessionHistoryId" = $1"#)
            .bind(history_id)
            .execute(self.pool.get_pool())
            .await?;

        sqlx::query(r#"DELETE FROM rag_chat_sessions WHERE "Id" = $1"#)
            .bind(history_id)
            .execute(self.pool.get_pool())
            .await?;

        Ok(message_result.rows_affected())
    }
}
