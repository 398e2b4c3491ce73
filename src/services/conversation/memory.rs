use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::MemoryConfig;
use crate::database::Repository;
use crate::models::chat::ChatMessage;
use crate::services::conversation::manager::{extract_first_json_object, LlmProvider};

#[derive(Debug, Deserialize)]
struct ExtractedMemory {
    #[serde(rename = "type")]
    memory_type: String,
    content: String,
    importance: f32,
}

#[derive(Debug, Deserialize)]
struct ExtractedMemories {
    memories: Vec<ExtractedMemory>,
}

/// Pulls durable facts, preferences and insights out of a turn and persists
/// them so later sessions can recall them without replaying full history.
pub struct MemoryExtractor {
    config: MemoryConfig,
    repository: Arc<Repository>,
}

impl MemoryExtractor {
    pub fn new(config: MemoryConfig, repository: Arc<Repository>) -> Self {
        Self { config, repository }
    }

    fn prompt(user_message: &str, assistant_reply: &str) -> String {
        format!(
            r#"Dari pertukaran berikut, ekstrak fakta, preferensi, atau insight penting \
tentang pengguna yang layak diingat untuk percakapan mendatang. Abaikan basa-basi. \
Jika tidak ada yang layak diingat, kembalikan daftar kosong.

User: {}
Assistant: {}

Jawab HANYA dengan JSON:
{{"memories": [{{"type": "fact|preference|insight", "content": "...", "importance": 0.0}}]}}"#,
            user_message, assistant_reply
        )
    }

    async fn extract_candidates(llm: &dyn LlmProvider, user_message: &str, assistant_reply: &str) -> Result<Vec<ExtractedMemory>> {
        let raw = llm
            .generate_with(&[ChatMessage::user(Self::prompt(user_message, assistant_reply))], 512, 0.0)
            .await?;

        let json_str = extract_first_json_object(&raw).unwrap_or(&raw);
        let parsed: ExtractedMemories = serde_json::from_str(json_str)?;
        Ok(parsed.memories)
    }

    /// Extracts and persists memories for one turn, then trims the session
    /// down to `max_items_per_session`. Intended to be driven via
    /// `tokio::spawn` so it never adds latency to the chat response.
    pub async fn extract_and_store(
        &self,
        llm: &dyn LlmProvider,
        session_id: i64,
        user_id: i64,
        user_message: &str,
        assistant_reply: &str,
    ) -> Result<usize> {
        if !self.config.enabled {
            return Ok(0);
        }

        let candidates = match Self::extract_candidates(llm, user_message, assistant_reply).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Memory extraction failed for session {}: {}", session_id, e);
                return Ok(0);
            }
        };

        let mut stored = 0usize;
        for candidate in candidates {
            if candidate.importance < self.config.min_importance || candidate.content.trim().is_empty() {
                continue;
            }
            self.repository
                .insert_memory(session_id, user_id, &candidate.memory_type, &candidate.content, candidate.importance)
                .await?;
            stored += 1;
        }

        if stored > 0 {
            self.repository
                .trim_session_memories(session_id, self.config.max_items_per_session as i64)
                .await?;
            debug!("Stored {} memories for session {}", stored, session_id);
        }

        Ok(stored)
    }

    /// Fire-and-forget variant for use from the chat handling path: spawns
    /// the extraction so it never blocks the response stream.
    pub fn spawn_extract_and_store(
        self: Arc<Self>,
        llm: Arc<dyn LlmProvider>,
        session_id: i64,
        user_id: i64,
        user_message: String,
        assistant_reply: String,
    ) {
        tokio::spawn(async move {
            if let Err(e) = self
                .extract_and_store(llm.as_ref(), session_id, user_id, &user_message, &assistant_reply)
                .await
            {
                warn!("Background memory extraction failed for session {}: {}", session_id, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversation::manager::RetrievalChunk;
    use std::pin::Pin;

    struct StubLlm {
        reply: String,
    }

    #[async_trait::async_trait]
    impl LlmProvider for StubLlm {
        async fn generate(&self, _messages: &[ChatMessage]) -> Result<String> {
            Ok(self.reply.clone())
        }
        async fn generate_with(&self, _messages: &[ChatMessage], _max_tokens: usize, _temperature: f32) -> Result<String> {
            Ok(self.reply.clone())
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
    async fn parses_well_formed_memory_json() {
        let llm = StubLlm {
            reply: r#"{"memories": [{"type": "preference", "content": "suka kopi hitam", "importance": 0.8}]}"#
                .to_string(),
        };
        let extracted = MemoryExtractor::extract_candidates(&llm, "saya suka kopi hitam", "baik, dicatat")
            .await
            .unwrap();

        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].memory_type, "preference");
    }

    #[tokio::test]
    async fn tolerates_prose_wrapped_json() {
        let llm = StubLlm {
            reply: "Tentu, berikut hasilnya:\n{\"memories\": []}\nSemoga membantu.".to_string(),
        };
        let extracted = MemoryExtractor::extract_candidates(&llm, "hai", "halo").await.unwrap();

        assert!(extracted.is_empty());
    }
}
