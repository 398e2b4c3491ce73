use crate::database::DocumentChunk;

/// Single token estimator used across the crate (context assembly, chat
/// history accounting, compaction triggers). One token is approximated as
/// four characters, which holds up reasonably across the Indonesian/English
/// mixed content this service handles and avoids keeping two divergent
/// heuristics in sync.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let char_count = text.chars().count();
    (char_count + 3) / 4
}

/// Estimate tokens for multiple chunks
pub fn estimate_chunks_tokens(chunks: &[DocumentChunk]) -> usize {
    chunks.iter()
        .map(|chunk| estimate_tokens(&chunk.content))
        .sum()
}

/// Check if adding text would exceed limit
pub fn would_exceed_limit(
    current_tokens: usize,
    new_text: &str,
    max_tokens: usize,
) -> bool {
    let new_tokens = estimate_tokens(new_text);
    current_tokens + new_tokens > max_tokens
}

/// Estimate tokens for system prompt + context
pub fn estimate_system_tokens(system_prompt: &str, context: &str) -> usize {
    estimate_tokens(system_prompt) + estimate_tokens(context) + 10 // overhead
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimation() {
        let text = "Ini adalah dokumen test yang berisi informasi"; // 46 chars
        assert_eq!(estimate_tokens(text), (46 + 3) / 4);
    }

    #[test]
    fn test_empty_string() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_would_exceed() {
        let current = 1000;
        let text = "word ".repeat(500); // 2500 chars -> 625 tokens
        assert!(would_exceed_limit(current, &text, 1500));
        assert!(!would_exceed_limit(current, &text, 2000));
    }
}