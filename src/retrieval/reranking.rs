use crate::config::RerankingConfig;
use crate::database::DocumentChunk;
use crate::utils::error::ApiError;
use crate::utils::limiters::Limiters;
use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Reorders an already vector/hybrid-retrieved candidate pool. Implementors
/// never fetch new candidates, only reorder (and optionally truncate) what
/// they're given.
#[async_trait::async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, chunks: Vec<DocumentChunk>) -> Result<Vec<DocumentChunk>>;
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Debug, Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

/// Calls an external cross-encoder model (served alongside the embedding
/// model) that scores (query, document) pairs directly rather than via
/// separately-embedded vectors.
pub struct CrossEncoderReranker {
    client: Client,
    base_url: String,
    limiters: Arc<Limiters>,
    top_n: usize,
}

impl CrossEncoderReranker {
    pub fn new(base_url: String, limiters: Arc<Limiters>, config: &RerankingConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            base_url,
            limiters,
            top_n: config.final_top_n,
        }
    }
}

#[async_trait::async_trait]
impl Reranker for CrossEncoderReranker {
    async fn rerank(&self, query: &str, chunks: Vec<DocumentChunk>) -> Result<Vec<DocumentChunk>> {
        if chunks.is_empty() {
            return Ok(chunks);
        }

        let (_permit, wait) = Limiters::acquire_timed(
            self.limiters.reranker.clone(),
            self.limiters.acquire_timeout,
            "reranker",
        )
        .await?;
        debug!(wait_ms = wait.as_millis() as u64, op = "reranker", "wait_queue");

        let documents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let request = RerankRequest { query, documents };

        let response = self
            .client
            .post(format!("{}/v1/rerank", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::LlmError(format!("Reranker call failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("Reranker returned {}, falling back to original order", status);
            return Ok(chunks);
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| ApiError::LlmError(format!("Failed to parse reranker response: {}", e)))?;

        let mut scored: Vec<(usize, f32)> = parsed.results.iter().map(|r| (r.index, r.relevance_score)).collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut reranked: Vec<DocumentChunk> = Vec::with_capacity(chunks.len());
        let mut pool: Vec<Option<DocumentChunk>> = chunks.into_iter().map(Some).collect();
        for (idx, score) in scored.into_iter().take(self.top_n.max(1)) {
            if let Some(slot) = pool.get_mut(idx) {
                if let Some(mut chunk) = slot.take() {
                    chunk.similarity = score;
                    reranked.push(chunk);
                }
            }
        }

        Ok(reranked)
    }
}

/// Interleaves candidates round-robin by `document_id` so that a single
/// dominant document can't crowd out every other source, generalizing the
/// per-document grouping `RagService` already does for context assembly.
pub struct DiversityReranker {
    lambda: f32,
}

impl DiversityReranker {
    pub fn new(config: &RerankingConfig) -> Self {
        Self { lambda: config.diversity_lambda }
    }

    /// Pure, sync variant used directly by `RagService` where no LLM round
    /// trip is warranted.
    pub fn rerank_sync(&self, chunks: Vec<DocumentChunk>) -> Vec<DocumentChunk> {
        if chunks.len() <= 1 {
            return chunks;
        }

        let mut by_doc: HashMap<i32, Vec<DocumentChunk>> = HashMap::new();
        let mut doc_order: Vec<i32> = Vec::new();
        for chunk in chunks {
            if !by_doc.contains_key(&chunk.document_id) {
                doc_order.push(chunk.document_id);
            }
            by_doc.entry(chunk.document_id).or_default().push(chunk);
        }

        // Each document's own chunks stay ranked by original similarity.
        for bucket in by_doc.values_mut() {
            bucket.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        }

        let lambda = self.lambda.clamp(0.0, 1.0);
        let mut interleaved = Vec::new();
        let mut round = 0;
        loop {
            let mut added = false;
            for doc_id in &doc_order {
                if let Some(bucket) = by_doc.get_mut(doc_id) {
                    if round < bucket.len() {
                        let mut chunk = bucket[round].clone();
                        // Penalize later rounds within a document so that
                        // breadth (lambda-weighted) competes with raw
                        // relevance instead of always preserving per-doc order globally.
                        chunk.similarity *= 1.0 - lambda * (round as f32 * 0.1).min(0.9);
                        interleaved.push(chunk);
                        added = true;
                    }
                }
            }
            if !added {
                break;
            }
            round += 1;
        }

        interleaved
    }
}

#[async_trait::async_trait]
impl Reranker for DiversityReranker {
    async fn rerank(&self, _query: &str, chunks: Vec<DocumentChunk>) -> Result<Vec<DocumentChunk>> {
        Ok(self.rerank_sync(chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(document_id: i32, similarity: f32) -> DocumentChunk {
        DocumentChunk {
            chunk_id: document_id as i64,
            document_id,
            document_title: "doc".to_string(),
            content: "content".to_string(),
            similarity,
            chunk_index: 0,
            page_number: None,
        }
    }

    #[test]
    fn interleaves_round_robin_across_documents() {
        let chunks = vec![chunk(1, 0.9), chunk(1, 0.85), chunk(1, 0.8), chunk(2, 0.5)];
        let reranker = DiversityReranker { lambda: 0.5 };
        let reranked = reranker.rerank_sync(chunks);

        // doc 2's only chunk should surface before doc 1's third chunk.
        let pos_doc2 = reranked.iter().position(|c| c.document_id == 2).unwrap();
        let pos_doc1_third = reranked.iter().rposition(|c| c.document_id == 1).unwrap();
        assert!(pos_doc2 < pos_doc1_third);
    }

    #[test]
    fn single_chunk_passthrough() {
        let reranker = DiversityReranker { lambda: 0.5 };
        let reranked = reranker.rerank_sync(vec![chunk(1, 0.9)]);
        assert_eq!(reranked.len(), 1);
    }
}
