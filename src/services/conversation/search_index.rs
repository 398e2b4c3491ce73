//! Uniform fetch/delete surface over the three session-scoped stores a chat
//! turn touches: retrieved chunks, persisted chat turns, and extracted
//! memories. `delete_session` walks all three in order so cleanup can't
//! leave one store stale because a caller only remembered two of them.

use async_trait::async_trait;
use pgvector::Vector;
use std::sync::Arc;
use thiserror::Error;

use crate::database::{DocumentChunk, MemoryRecord, Repository};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("backing store unavailable: {0}")]
    Unavailable(String),
    #[error("conflicting write for id {0}")]
    Conflict(String),
    #[error("malformed record: {0}")]
    Malformed(String),
}

impl From<anyhow::Error> for IndexError {
    fn from(e: anyhow::Error) -> Self {
        IndexError::Unavailable(e.to_string())
    }
}

/// `Id` is whatever key this particular store is naturally addressed by;
/// `delete_by_session` is always keyed by the chat session regardless,
/// since that's the granularity lifecycle cleanup operates at. `refresh`
/// exists so callers can treat every store uniformly even though, on this
/// Postgres-backed implementation, writes are visible to the next query
/// without a separate commit step — it's a no-op here, not a missing
/// feature, kept so `delete_session`'s "delete then refresh" sequence reads
/// the same regardless of backing store.
#[async_trait]
pub trait SearchIndex<T, Id>: Send + Sync {
    async fn init_index(&self) -> Result<(), IndexError> {
        Ok(())
    }
    async fn fetch(&self, id: Id) -> Result<Option<T>, IndexError>;
    async fn delete_by_session(&self, session_id: i64) -> Result<u64, IndexError>;
    async fn refresh(&self) -> Result<(), IndexError> {
        Ok(())
    }
}

/// Retrieved document chunks, scoped by the documents attached to a session
/// rather than by session id directly (chunks have no `session_id` column —
/// they belong to documents, which are attached to sessions via
/// `rag_chat_session_documents`). `delete_by_session` purges that
/// attachment table, not the underlying document content, which is
/// deliberately left alone since other sessions may still reference it.
pub struct ChunkIndex {
    repository: Arc<Repository>,
}

impl ChunkIndex {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }

    /// Bulk write: used by ingestion, kept here so the index abstraction
    /// owns every write path into the chunk store, not just reads.
    pub async fn index_partial(&self, document_id: i32, chunks: Vec<(String, Vector)>) -> Result<(), IndexError> {
        if chunks.is_empty() {
            return Ok(());
        }
        self.repository.insert_document_chunks(document_id, chunks).await?;
        Ok(())
    }

    /// Dense vector search over chunks attached to the given documents.
    /// `num_candidates = max(top_k * 2, 50)`, the oversampling factor the
    /// hybrid retriever relies on before fusing with the keyword leg.
    pub async fn vector_search(
        &self,
        document_ids: &[i32],
        query_embedding: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<DocumentChunk>, IndexError> {
        let num_candidates = (top_k * 2).max(50) as i32;
        Ok(self
            .repository
            .vector_search_by_documents(document_ids, Vector::from(query_embedding), num_candidates)
            .await?)
    }

    /// Boosted keyword (BM25-style) search over the same document scope.
    pub async fn keyword_search(
        &self,
        document_ids: &[i32],
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<DocumentChunk>, IndexError> {
        let num_candidates = (top_k * 2).max(50) as i32;
        Ok(self.repository.keyword_search_by_documents(document_ids, query_text, num_candidates).await?)
    }
}

#[async_trait]
impl SearchIndex<DocumentChunk, i32> for ChunkIndex {
    async fn init_index(&self) -> Result<(), IndexError> {
        self.repository.ensure_indices().await?;
        Ok(())
    }

    async fn fetch(&self, document_id: i32) -> Result<Option<DocumentChunk>, IndexError> {
        Ok(self.repository.get_first_chunk(document_id).await?)
    }

    async fn delete_by_session(&self, session_id: i64) -> Result<u64, IndexError> {
        Ok(self.repository.delete_session_documents(session_id).await?)
    }
}

/// Persisted chat turns. `Id` here is the session id itself, since messages
/// are only ever meaningfully fetched as "everything said in this session".
pub struct ChatMessageIndex {
    repository: Arc<Repository>,
}

impl ChatMessageIndex {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl SearchIndex<Vec<i64>, i64> for ChatMessageIndex {
    async fn fetch(&self, session_id: i64) -> Result<Option<Vec<i64>>, IndexError> {
        let docs = self.repository.get_session_active_docs(session_id).await?;
        Ok(if docs.is_empty() { None } else { Some(docs) })
    }

    async fn delete_by_session(&self, session_id: i64) -> Result<u64, IndexError> {
        Ok(self.repository.delete_chat_messages_by_session(session_id).await?)
    }
}

/// Semantic memories (facts/preferences/insights) extracted during
/// compaction.
pub struct MemoryIndex {
    repository: Arc<Repository>,
}

impl MemoryIndex {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl SearchIndex<Vec<MemoryRecord>, i64> for MemoryIndex {
    async fn fetch(&self, session_id: i64) -> Result<Option<Vec<MemoryRecord>>, IndexError> {
        let memories = self.repository.get_session_memories(session_id).await?;
        Ok(if memories.is_empty() { None } else { Some(memories) })
    }

    async fn delete_by_session(&self, session_id: i64) -> Result<u64, IndexError> {
        Ok(self.repository.delete_memories_by_session(session_id).await?)
    }
}

/// Deletes a session's data across all three indexes. The chunk index goes
/// first, with a forced refresh, so a retrieval racing the delete can never
/// observe chunk attachments for a session whose chat history is about to
/// disappear; memories and chat turns follow since nothing downstream reads
/// them once the session record itself is gone.
pub async fn delete_session(
    memory_index: &MemoryIndex,
    message_index: &ChatMessageIndex,
    chunk_index: &ChunkIndex,
    session_id: i64,
) -> Result<SessionDeletionSummary, IndexError> {
    let chunks_removed = chunk_index.delete_by_session(session_id).await?;
    chunk_index.refresh().await?;
    let memories_removed = memory_index.delete_by_session(session_id).await?;
    let messages_removed = message_index.delete_by_session(session_id).await?;

    Ok(SessionDeletionSummary { memories_removed, messages_removed, chunks_removed })
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SessionDeletionSummary {
    pub memories_removed: u64,
    pub messages_removed: u64,
    pub chunks_removed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_error_wraps_anyhow() {
        let err: IndexError = anyhow::anyhow!("db down").into();
        assert!(matches!(err, IndexError::Unavailable(_)));
    }
}
