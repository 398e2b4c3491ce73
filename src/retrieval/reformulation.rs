use crate::config::ReformulationConfig;
use crate::models::chat::ChatMessage;
use crate::services::conversation::manager::{extract_first_json_object, LlmProvider};
use anyhow::Result;
use tracing::{debug, warn};

#[derive(Debug, serde::Deserialize)]
struct ReformulationOut {
    standalone_query: String,
}

/// Rewrites a follow-up question ("what about page 2?") into a standalone
/// query that carries enough of the conversation's subject for retrieval to
/// work without the history attached, mirroring the planner's
/// prompt-then-extract-JSON pattern used for intent classification.
pub struct QueryReformulator {
    max_history_turns: usize,
}

impl QueryReformulator {
    pub fn new(config: &ReformulationConfig) -> Self {
        Self { max_history_turns: config.max_history_turns }
    }

    pub async fn reformulate(
        &self,
        llm: &dyn LlmProvider,
        current_message: &str,
        history: &[ChatMessage],
    ) -> Result<String> {
        if history.is_empty() {
            return Ok(current_message.to_string());
        }

        let recent: Vec<&ChatMessage> = history.iter().rev().take(self.max_history_turns * 2).collect();
        let mut transcript = String::new();
        for msg in recent.into_iter().rev() {
            transcript.push_str(&format!("{}: {}\n", msg.role, msg.content));
        }

        let system_prompt = format!(
            "Anda membantu menulis ulang pertanyaan lanjutan agar berdiri sendiri (standalone), \
             dengan menyerap konteks yang relevan dari riwayat percakapan di bawah. \
             Jangan menjawab pertanyaannya, hanya tulis ulang.\n\n\
             Riwayat:\n{}\n\n\
             Balas HANYA dalam format JSON: {{\"standalone_query\": \"...\"}}",
            transcript
        );

        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(current_message.to_string()),
        ];

        let response = match llm.generate_with(&messages, 300, 0.0).await {
            Ok(r) => r,
            Err(e) => {
                warn!("Query reformulation failed, using original query: {}", e);
                return Ok(current_message.to_string());
            }
        };

        let Some(json_str) = extract_first_json_object(&response) else {
            debug!("Reformulation response had no JSON object, using original query");
            return Ok(current_message.to_string());
        };

        match serde_json::from_str::<ReformulationOut>(json_str) {
            Ok(out) if !out.standalone_query.trim().is_empty() => Ok(out.standalone_query),
            _ => Ok(current_message.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversation::manager::RetrievalChunk;
    use std::pin::Pin;

    struct UnreachableLlm;

    #[async_trait::async_trait]
    impl LlmProvider for UnreachableLlm {
        async fn generate(&self, _messages: &[ChatMessage]) -> Result<String> {
            unreachable!("should not be called when history is empty")
        }
        async fn generate_with(&self, _messages: &[ChatMessage], _max_tokens: usize, _temperature: f32) -> Result<String> {
            unreachable!("should not be called when history is empty")
        }
        async fn generate_stream(
            &self,
            _messages: &[ChatMessage],
        ) -> Result<Pin<Box<dyn futures::Stream<Item = Result<String, anyhow::Error>> + Send>>> {
            unreachable!()
        }
        async fn summarize_chunks(&self, _chunks: &[RetrievalChunk], _query: &str) -> Result<String> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn empty_history_skips_llm_call_and_returns_original_query() {
        let config = ReformulationConfig {
            enabled: true,
            source_anchoring_boost: 0.05,
            max_history_turns: 3,
        };
        let reformulator = QueryReformulator::new(&config);
        let result = reformulator.reformulate(&UnreachableLlm, "halo?", &[]).await.unwrap();
        assert_eq!(result, "halo?");
    }
}
