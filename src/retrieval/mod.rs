//! Hybrid retrieval support: rank fusion, confidence scoring, reranking and
//! query reformulation sit on top of `RagService`'s raw chunk search.

pub mod confidence;
pub mod reformulation;
pub mod reranking;
pub mod rrf;

pub use confidence::{score_retrieval, ConfidenceBreakdown};
pub use reformulation::QueryReformulator;
pub use reranking::{CrossEncoderReranker, DiversityReranker, Reranker};
pub use rrf::reciprocal_rank_fusion;
