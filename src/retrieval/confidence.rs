use crate::database::DocumentChunk;

/// Weighted-sum breakdown of how much a retrieved set of chunks should be
/// trusted before it's handed to the generator. Mirrors the rank-agreement,
/// source-coverage and document-diversity signals RRF and the reranking
/// stack already compute, instead of leaning on similarity score alone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceBreakdown {
    pub rrf: f32,
    pub agreement: f32,
    pub coverage: f32,
    pub diversity: f32,
    pub overall: f32,
}

const WEIGHT_RRF: f32 = 0.4;
const WEIGHT_AGREEMENT: f32 = 0.25;
const WEIGHT_COVERAGE: f32 = 0.2;
const WEIGHT_DIVERSITY: f32 = 0.15;

/// `fused_scores` is the RRF output for the chunks actually returned (same
/// order as `chunks`); `list_count` is how many ranked lists fed the fusion
/// (e.g. 2 for dense + sparse), used to normalize the agreement signal.
pub fn score_retrieval(chunks: &[DocumentChunk], fused_scores: &[f32], list_count: usize) -> ConfidenceBreakdown {
    if chunks.is_empty() {
        return ConfidenceBreakdown { rrf: 0.0, agreement: 0.0, coverage: 0.0, diversity: 0.0, overall: 0.0 };
    }

    let max_possible_rrf = list_count.max(1) as f32;
    let rrf = fused_scores
        .iter()
        .copied()
        .fold(0.0_f32, f32::max)
        .min(max_possible_rrf)
        / max_possible_rrf;

    let agreeing = chunks.iter().filter(|c| c.similarity > 0.0).count();
    let agreement = agreeing as f32 / chunks.len() as f32;

    let distinct_docs: std::collections::HashSet<i32> = chunks.iter().map(|c| c.document_id).collect();
    let coverage = (distinct_docs.len() as f32 / chunks.len() as f32).min(1.0);

    // Shannon-style diversity: more evenly spread chunks across documents
    // score higher than many chunks from a single source.
    let mut per_doc_counts: std::collections::HashMap<i32, usize> = std::collections::HashMap::new();
    for c in chunks {
        *per_doc_counts.entry(c.document_id).or_insert(0) += 1;
    }
    let total = chunks.len() as f32;
    let entropy: f32 = per_doc_counts
        .values()
        .map(|&count| {
            let p = count as f32 / total;
            -p * p.log2()
        })
        .sum();
    let max_entropy = (distinct_docs.len().max(1) as f32).log2().max(1.0);
    let diversity = (entropy / max_entropy).clamp(0.0, 1.0);

    let overall = WEIGHT_RRF * rrf + WEIGHT_AGREEMENT * agreement + WEIGHT_COVERAGE * coverage + WEIGHT_DIVERSITY * diversity;

    ConfidenceBreakdown { rrf, agreement, coverage, diversity, overall: overall.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(document_id: i32, similarity: f32) -> DocumentChunk {
        DocumentChunk {
            chunk_id: 1,
            document_id,
            document_title: "doc".to_string(),
            content: "content".to_string(),
            similarity,
            chunk_index: 0,
            page_number: None,
        }
    }

    #[test]
    fn empty_retrieval_has_zero_confidence() {
        let score = score_retrieval(&[], &[], 2);
        assert_eq!(score.overall, 0.0);
    }

    #[test]
    fn single_document_has_low_diversity() {
        let chunks = vec![chunk(1, 0.9), chunk(1, 0.8), chunk(1, 0.85)];
        let score = score_retrieval(&chunks, &[0.3, 0.2, 0.1], 2);
        assert_eq!(score.diversity, 0.0);
        assert!(score.coverage < 0.5);
    }

    #[test]
    fn multi_document_has_higher_diversity_than_single() {
        let single = vec![chunk(1, 0.9), chunk(1, 0.8)];
        let multi = vec![chunk(1, 0.9), chunk(2, 0.8)];
        let single_score = score_retrieval(&single, &[0.3, 0.2], 2);
        let multi_score = score_retrieval(&multi, &[0.3, 0.2], 2);
        assert!(multi_score.diversity > single_score.diversity);
        assert!(multi_score.overall >= single_score.overall);
    }
}
