use crate::config::{ReformulationConfig, RerankingConfig, RetrievalConfig};
use crate::database::models::{DocumentMetadata, DocumentOverview};
use crate::database::{DocumentChunk, Repository};
use crate::retrieval::confidence::{score_retrieval, ConfidenceBreakdown};
use crate::retrieval::rrf::{apply_anchor_boost, reciprocal_rank_fusion};
use crate::retrieval::{CrossEncoderReranker, DiversityReranker, Reranker};
use crate::services::conversation::manager::{RetrievalChunk, RetrievalProvider};
use crate::services::{EmbeddingService, LlmService};
use crate::utils::limiters::Limiters;
use crate::utils::token_estimator;
use anyhow::Result;
use pgvector::Vector;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Context building metrics, including how much the retrieved set should be
/// trusted (`confidence`) before it's handed to the generator.
#[derive(Debug, Default, Clone)]
pub struct ContextMetrics {
    pub total_tokens: usize,
    pub documents_included: usize,
    pub chunks_included: usize,
    pub truncated: bool,
    pub confidence: f32,
}

#[derive(Clone)]
pub struct RagService {
    pub repository: Arc<Repository>,
    pub embedding_service: Arc<EmbeddingService>,
    pub llm_service: Arc<LlmService>,
    pub limiters: Arc<Limiters>,
    reranking_config: RerankingConfig,
    retrieval_config: RetrievalConfig,
    reformulation_config: ReformulationConfig,
    cross_encoder: Option<Arc<CrossEncoderReranker>>,
}

fn zero_confidence() -> ConfidenceBreakdown {
    ConfidenceBreakdown { rrf: 0.0, agreement: 0.0, coverage: 0.0, diversity: 0.0, overall: 0.0 }
}

impl RagService {
    pub fn new(
        repository: Arc<Repository>,
        embedding_service: Arc<EmbeddingService>,
        llm_service: Arc<LlmService>,
        limiters: Arc<Limiters>,
        reranking_config: RerankingConfig,
        retrieval_config: RetrievalConfig,
        reformulation_config: ReformulationConfig,
        reranker_base_url: String,
    ) -> Self {
        let cross_encoder = if reranking_config.enabled {
            Some(Arc::new(CrossEncoderReranker::new(reranker_base_url, limiters.clone(), &reranking_config)))
        } else {
            None
        };

        Self {
            repository,
            embedding_service,
            llm_service,
            limiters,
            reranking_config,
            retrieval_config,
            reformulation_config,
            cross_encoder,
        }
    }

    /// Session-scoped hybrid retrieval. `document_ids` must already be the
    /// session's own attached-document set (from `get_session_active_docs`),
    /// never a raw user-wide scan, so a document outside that set can never
    /// surface here regardless of how the query is phrased. Empty
    /// `document_ids` fails closed with an empty result rather than falling
    /// back to the user's full corpus.
    pub async fn retrieve_for_session(
        &self,
        document_ids: &[i64],
        query_text: &str,
        query_embedding: Vec<f32>,
        anchor_doc_ids: &[i64],
        top_k: usize,
    ) -> Result<(Vec<DocumentChunk>, ConfidenceBreakdown)> {
        if document_ids.is_empty() {
            debug!("retrieve_for_session called with no attached documents, returning empty result");
            return Ok((Vec::new(), zero_confidence()));
        }

        let doc_ids_i32: Vec<i32> = document_ids.iter().map(|&id| id as i32).collect();
        let top_k = top_k.max(1);
        let num_candidates = (top_k * self.retrieval_config.candidates_multiplier.max(1)).max(50) as i32;
        let deadline = Duration::from_millis(self.retrieval_config.timeout_ms.max(1));

        let (_permit, wait) = Limiters::acquire_timed(self.limiters.db_search.clone(), self.limiters.acquire_timeout, "db_search").await?;
        debug!(wait_ms = wait.as_millis() as u64, op = "db_search", "wait_queue");

        let exec_start = Instant::now();

        // Vector and keyword legs fan out concurrently under a shared soft
        // deadline; a leg missing it degrades to the other rather than
        // failing the whole search.
        let vector_leg = async {
            if query_embedding.is_empty() {
                // Empty embedding is the fallback signal from EmbeddingService, not an error.
                return Vec::new();
            }
            let vector = Vector::from(query_embedding.clone());
            match tokio::time::timeout(deadline, self.repository.vector_search_by_documents(&doc_ids_i32, vector, num_candidates)).await {
                Ok(Ok(chunks)) => chunks,
                Ok(Err(e)) => {
                    warn!("Vector leg failed, degrading to keyword-only: {}", e);
                    Vec::new()
                }
                Err(_) => {
                    warn!("Vector leg missed {:?} deadline, degrading to keyword-only", deadline);
                    Vec::new()
                }
            }
        };

        let keyword_leg = async {
            match tokio::time::timeout(deadline, self.repository.keyword_search_by_documents(&doc_ids_i32, query_text, num_candidates)).await {
                Ok(Ok(chunks)) => chunks,
                Ok(Err(e)) => {
                    warn!("Keyword leg failed, degrading to vector-only: {}", e);
                    Vec::new()
                }
                Err(_) => {
                    warn!("Keyword leg missed {:?} deadline, degrading to vector-only", deadline);
                    Vec::new()
                }
            }
        };

        let (vector_chunks, keyword_chunks) = tokio::join!(vector_leg, keyword_leg);
        debug!(exec_ms = exec_start.elapsed().as_millis() as u64, op = "db_search", "exec");

        if vector_chunks.is_empty() && keyword_chunks.is_empty() {
            return Ok((Vec::new(), zero_confidence()));
        }

        let vector_ids: Vec<i64> = vector_chunks.iter().map(|c| c.chunk_id).collect();
        let keyword_ids: Vec<i64> = keyword_chunks.iter().map(|c| c.chunk_id).collect();
        let list_count = [!vector_ids.is_empty(), !keyword_ids.is_empty()].iter().filter(|x| **x).count();

        let mut fused = reciprocal_rank_fusion(&[vector_ids, keyword_ids], self.retrieval_config.rrf_k);

        let mut by_chunk_id: HashMap<i64, DocumentChunk> = HashMap::new();
        for chunk in vector_chunks.into_iter().chain(keyword_chunks.into_iter()) {
            by_chunk_id.entry(chunk.chunk_id).or_insert(chunk);
        }

        if !anchor_doc_ids.is_empty() {
            let anchor_chunk_ids: Vec<i64> = by_chunk_id
                .values()
                .filter(|c| anchor_doc_ids.contains(&(c.document_id as i64)))
                .map(|c| c.chunk_id)
                .collect();
            apply_anchor_boost(&mut fused, &anchor_chunk_ids, self.reformulation_config.source_anchoring_boost);
        }

        let mut fused_scores: Vec<f32> = Vec::with_capacity(fused.len());
        let mut chunks: Vec<DocumentChunk> = Vec::with_capacity(fused.len());
        for (chunk_id, score) in &fused {
            if let Some(mut chunk) = by_chunk_id.remove(chunk_id) {
                chunk.similarity = *score;
                fused_scores.push(*score);
                chunks.push(chunk);
            }
        }

        // Single-document "Introduction Context": make sure an overview
        // question about a lone attached document always has the intro
        // chunk available even if it didn't rank highly on its own.
        if doc_ids_i32.len() == 1 {
            let doc_id = doc_ids_i32[0];
            let has_intro = chunks.iter().any(|c| c.chunk_index == 0 && c.document_id == doc_id);
            if !has_intro {
                match self.repository.get_first_chunk(doc_id).await {
                    Ok(Some(intro_chunk)) => chunks.insert(0, intro_chunk),
                    Ok(None) => {}
                    Err(e) => warn!("Failed to fetch intro chunk: {}", e),
                }
            }
        }

        let confidence = score_retrieval(&chunks, &fused_scores, list_count.max(1));

        chunks.truncate((num_candidates as usize).min(chunks.len()));

        if let Some(cross_encoder) = &self.cross_encoder {
            match cross_encoder.rerank(query_text, chunks.clone()).await {
                Ok(reranked) => chunks = reranked,
                Err(e) => warn!("Cross-encoder rerank failed, keeping RRF order: {}", e),
            }
        }

        if self.reranking_config.enabled {
            let diversity = DiversityReranker::new(&self.reranking_config);
            chunks = diversity.rerank_sync(chunks);
        }

        chunks.truncate(top_k.max(self.reranking_config.final_top_n));

        debug!(
            "Retrieved {} chunks across {} attached documents (confidence={:.3})",
            chunks.len(),
            document_ids.len(),
            confidence.overall
        );

        Ok((chunks, confidence))
    }

    /// Build STRUCTURED context with XML tags for multi-document clarity,
    /// grouped by document and ordered by average chunk relevance.
    pub fn build_structured_context(chunks: Vec<DocumentChunk>, confidence: f32) -> (String, ContextMetrics) {
        if chunks.is_empty() {
            return (
                "Tidak ada konteks yang relevan ditemukan.".to_string(),
                ContextMetrics { confidence, ..ContextMetrics::default() },
            );
        }

        let mut grouped: HashMap<i32, Vec<DocumentChunk>> = HashMap::new();
        for chunk in chunks {
            grouped.entry(chunk.document_id).or_default().push(chunk);
        }

        let mut doc_order: Vec<i32> = grouped.keys().copied().collect();
        doc_order.sort_by(|a, b| {
            let avg = |id: &i32| {
                let bucket = &grouped[id];
                bucket.iter().map(|c| c.similarity).sum::<f32>() / bucket.len().max(1) as f32
            };
            avg(b).partial_cmp(&avg(a)).unwrap_or(std::cmp::Ordering::Equal)
        });

        use std::fmt::Write;
        let max_tokens = 16_000;
        let mut context = String::from("DOKUMEN YANG TERSEDIA:\n\n");
        let mut metrics = ContextMetrics { confidence, ..ContextMetrics::default() };
        let mut current_tokens = token_estimator::estimate_tokens(&context);

        for doc_id in doc_order {
            let doc_chunks = &grouped[&doc_id];
            let doc_title = doc_chunks.first().map(|c| c.document_title.as_str()).unwrap_or("Unknown");
            let avg_sim: f32 = doc_chunks.iter().map(|c| c.similarity).sum::<f32>() / doc_chunks.len() as f32;

            let header_start = context.len();
            let _ = write!(context, "<document id=\"doc_{}\" title=\"{}\" relevance=\"{:.3}\">\n", doc_id, doc_title, avg_sim);
            let header_tokens = token_estimator::estimate_tokens(&context[header_start..]);

            if current_tokens + header_tokens > max_tokens {
                context.truncate(header_start);
                metrics.truncated = true;
                break;
            }
            current_tokens += header_tokens;
            metrics.documents_included += 1;

            for chunk in doc_chunks {
                let chunk_start = context.len();
                let _ = write!(
                    context,
                    "<chunk id=\"chunk_{}\" page=\"{}\" similarity=\"{:.3}\">\n{}\n</chunk>\n\n",
                    chunk.chunk_id, chunk.page_number.unwrap_or(0), chunk.similarity, chunk.content.trim()
                );
                let chunk_tokens = token_estimator::estimate_tokens(&context[chunk_start..]);
                if current_tokens + chunk_tokens > max_tokens {
                    context.truncate(chunk_start);
                    metrics.truncated = true;
                    break;
                }
                current_tokens += chunk_tokens;
                metrics.chunks_included += 1;
            }

            if metrics.truncated {
                break;
            }
            context.push_str("</document>\n\n");
            current_tokens += 2;
        }

        metrics.total_tokens = current_tokens;
        info!(
            "Built structured context: {} tokens, {} docs, {} chunks, confidence={:.3}{}",
            metrics.total_tokens,
            metrics.documents_included,
            metrics.chunks_included,
            metrics.confidence,
            if metrics.truncated { " (TRUNCATED)" } else { "" }
        );

        (context, metrics)
    }
}

#[async_trait::async_trait]
impl RetrievalProvider for RagService {
    async fn search(
        &self,
        _user_id: i64,
        embedding: &[f32],
        query_text: &str,
        document_id: Option<i64>,
        document_ids: Option<Vec<i64>>,
        anchor_doc_ids: &[i64],
        top_k: usize,
    ) -> Result<(Vec<RetrievalChunk>, ConfidenceBreakdown)> {
        let mut scoped_ids: Vec<i64> = document_ids.unwrap_or_default();
        if let Some(single_id) = document_id {
            if !scoped_ids.contains(&single_id) {
                scoped_ids.push(single_id);
            }
        }

        let (chunks, confidence) = self
            .retrieve_for_session(&scoped_ids, query_text, embedding.to_vec(), anchor_doc_ids, top_k)
            .await?;

        let retrieval_chunks = chunks
            .into_iter()
            .map(|d| RetrievalChunk {
                chunk_id: d.chunk_id,
                document_id: d.document_id as i64,
                document_title: Some(d.document_title),
                content: d.content,
                similarity: d.similarity,
            })
            .collect();

        Ok((retrieval_chunks, confidence))
    }

    async fn get_document_metadata(&self, document_id: i32) -> Result<DocumentMetadata> {
        self.repository.get_document_metadata(document_id).await
    }

    async fn get_document_overview_chunks(&self, document_id: i32, limit: i32) -> Result<Vec<RetrievalChunk>> {
        let chunks = self.repository.get_document_overview_chunks(document_id, limit).await?;
        Ok(chunks
            .into_iter()
            .map(|c| RetrievalChunk {
                chunk_id: c.chunk_id,
                document_id: c.document_id as i64,
                content: c.content,
                document_title: Some(c.document_title),
                similarity: c.similarity,
            })
            .collect())
    }

    async fn get_document_overview(&self, document_id: i32, chunk_limit: i32) -> Result<DocumentOverview> {
        self.repository.get_document_overview(document_id, chunk_limit).await
    }

    async fn persist_chat_event(
        &self,
        user_id: i64,
        session_id: i64,
        role: &str,
        message: &str,
        doc_ids: Option<Vec<i64>>,
    ) -> Result<()> {
        let history_id = self.repository.create_chat_session(user_id, session_id).await?;
        self.repository.save_chat_message(history_id, role, message).await?;
        if let Some(ids) = doc_ids {
            self.repository.save_chat_docs(history_id, &ids).await?;
        }
        Ok(())
    }

    async fn persist_session_documents(&self, user_id: i64, session_id: i64, doc_ids: Vec<i64>) -> Result<()> {
        if doc_ids.is_empty() {
            return Ok(());
        }
        let history_id = self.repository.create_chat_session(user_id, session_id).await?;
        self.repository.save_chat_docs(history_id, &doc_ids).await?;
        Ok(())
    }

    async fn get_session_active_docs(&self, session_id: i64) -> Result<Vec<i64>> {
        self.repository.get_session_active_docs(session_id).await
    }

    async fn fetch_all_chunks(&self, doc_ids: &[i64]) -> Result<Vec<RetrievalChunk>> {
        let chunks = self.repository.get_chunks_by_document_ids(doc_ids).await?;

        Ok(chunks
            .into_iter()
            .map(|c| RetrievalChunk {
                chunk_id: c.chunk_id,
                document_id: c.document_id as i64,
                document_title: Some(c.document_title),
                content: c.content,
                similarity: 1.0,
            })
            .collect())
    }

    async fn fetch_chunks_from_file_fallback(&self, doc_id: i64) -> Result<Vec<RetrievalChunk>> {
        info!("Executing Direct Read Fallback for doc_id: {}", doc_id);

        #[derive(sqlx::FromRow)]
        struct DocPath {
            file_path: String,
            title: String,
        }

        let doc_info = sqlx::query_as::<_, DocPath>(
            r#"SELECT "DocumentFilePath" as file_path, "DocumentFileName" as title FROM "TblDocumentFiles" WHERE "DocumentID" = $1"#,
        )
        .bind(doc_id as i32)
        .fetch_optional(self.repository.pool.get_pool())
        .await?;

        let (path_str, title) = match doc_info {
            Some(d) => (d.file_path, d.title),
            None => anyhow::bail!("Document {} not found in DB", doc_id),
        };

        let path_buf = std::path::PathBuf::from(&path_str);
        if !path_buf.exists() {
            anyhow::bail!("File not found on disk: {}", path_str);
        }

        let content = tokio::task::spawn_blocking(move || {
            match crate::document::parser::DocumentParser::parse(&path_buf) {
                Ok(parsed) => Ok(parsed.content),
                Err(e) => {
                    warn!("Parser failed for {}: {}. Retrying with lossy byte read...", path_buf.display(), e);
                    std::fs::read(&path_buf)
                        .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
                        .map_err(|e2| anyhow::anyhow!("Parser failed ({}) and lossy read failed ({})", e, e2))
                }
            }
        })
        .await??;

        let chunk_size = 1500;
        let mut chunks = Vec::new();
        let mut current_chunk = String::new();

        for line in content.lines() {
            if current_chunk.len() + line.len() > chunk_size {
                chunks.push(current_chunk.trim().to_string());
                current_chunk = String::new();
            }
            current_chunk.push_str(line);
            current_chunk.push('\n');
        }
        if !current_chunk.trim().is_empty() {
            chunks.push(current_chunk.trim().to_string());
        }

        Ok(chunks
            .into_iter()
            .enumerate()
            .map(|(i, text)| RetrievalChunk {
                chunk_id: -(i as i64) - 1,
                document_id: doc_id,
                document_title: Some(title.clone()),
                content: text,
                similarity: 1.0,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(chunk_id: i64, document_id: i32, similarity: f32) -> DocumentChunk {
        DocumentChunk {
            chunk_id,
            document_id,
            document_title: "doc".to_string(),
            content: "some content".to_string(),
            similarity,
            chunk_index: 1,
            page_number: None,
        }
    }

    #[test]
    fn structured_context_carries_the_confidence_score_through() {
        let (_, metrics) = RagService::build_structured_context(vec![chunk(1, 10, 0.9)], 0.42);
        assert_eq!(metrics.confidence, 0.42);
        assert_eq!(metrics.documents_included, 1);
        assert_eq!(metrics.chunks_included, 1);
    }

    #[test]
    fn empty_chunks_yield_zero_metrics_but_keep_confidence() {
        let (context, metrics) = RagService::build_structured_context(vec![], 0.1);
        assert!(context.contains("Tidak ada konteks"));
        assert_eq!(metrics.documents_included, 0);
        assert_eq!(metrics.confidence, 0.1);
    }

    #[test]
    fn groups_multiple_chunks_under_one_document() {
        let chunks = vec![chunk(1, 10, 0.9), chunk(2, 10, 0.8)];
        let (context, metrics) = RagService::build_structured_context(chunks, 0.5);
        assert_eq!(metrics.documents_included, 1);
        assert_eq!(metrics.chunks_included, 2);
        assert_eq!(context.matches("<document").count(), 1);
    }
}
