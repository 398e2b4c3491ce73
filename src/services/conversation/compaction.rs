use crate::config::CompactionConfig;
use crate::models::chat::ChatMessage;
use crate::services::conversation::manager::LlmProvider;
use anyhow::Result;
use tracing::{debug, warn};

/// A user/assistant pair compacted this far back gets folded into a single
/// summary turn so the sliding window stops dropping old context outright
/// (the prior behavior) and instead keeps a lossy but present trace of it.
pub struct Compactor {
    config: CompactionConfig,
}

impl Compactor {
    pub fn new(config: CompactionConfig) -> Self {
        Self { config }
    }

    fn pair_count(messages: &[ChatMessage]) -> usize {
        messages.iter().filter(|m| m.role == "user").count()
    }

    /// If the session has accumulated more pairs than `trigger_pair_count`,
    /// summarizes everything older than the most recent `keep_recent_pairs`
    /// pairs into one `isCompacted`-marked assistant turn prepended to what's
    /// kept. Returns `true` if compaction actually happened.
    pub async fn maybe_compact(&self, llm: &dyn LlmProvider, messages: &mut Vec<ChatMessage>) -> Result<bool> {
        if !self.config.enabled {
            return Ok(false);
        }

        if Self::pair_count(messages) <= self.config.trigger_pair_count {
            return Ok(false);
        }

        let keep_messages = self.config.keep_recent_pairs * 2;
        if messages.len() <= keep_messages {
            return Ok(false);
        }

        let split_at = messages.len() - keep_messages;
        let to_compact = &messages[..split_at];

        let transcript: String = to_compact
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Ringkas percakapan berikut menjadi poin-poin singkat yang mempertahankan \
             fakta, preferensi, dan keputusan penting. Jangan tambahkan informasi baru.\n\n{}",
            transcript
        );

        let summary = match llm.generate(&[ChatMessage::user(prompt)]).await {
            Ok(s) => s,
            Err(e) => {
                warn!("Compaction summarization failed, leaving history untouched: {}", e);
                return Ok(false);
            }
        };

        let compacted_marker = ChatMessage::assistant(format!("[isCompacted] Ringkasan percakapan sebelumnya:\n{}", summary));

        let mut new_messages = Vec::with_capacity(keep_messages + 1);
        new_messages.push(compacted_marker);
        new_messages.extend_from_slice(&messages[split_at..]);

        debug!(
            "Compacted {} older messages into 1 summary turn, kept {} recent messages",
            to_compact.len(),
            keep_messages
        );

        *messages = new_messages;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversation::manager::RetrievalChunk;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubLlm {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl LlmProvider for StubLlm {
        async fn generate(&self, _messages: &[ChatMessage]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("ringkasan singkat".to_string())
        }
        async fn generate_with(&self, _messages: &[ChatMessage], _max_tokens: usize, _temperature: f32) -> Result<String> {
            unreachable!()
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

    fn config(trigger: usize, keep: usize) -> CompactionConfig {
        CompactionConfig { enabled: true, trigger_pair_count: trigger, keep_recent_pairs: keep }
    }

    #[tokio::test]
    async fn compacts_once_trigger_exceeded() {
        let compactor = Compactor::new(config(2, 1));
        let llm = StubLlm { calls: AtomicUsize::new(0) };
        let mut messages = vec![
            ChatMessage::user("q1"),
            ChatMessage::assistant("a1"),
            ChatMessage::user("q2"),
            ChatMessage::assistant("a2"),
            ChatMessage::user("q3"),
            ChatMessage::assistant("a3"),
        ];

        let compacted = compactor.maybe_compact(&llm, &mut messages).await.unwrap();
        assert!(compacted);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
        assert!(messages[0].content.contains("isCompacted"));
        assert_eq!(messages.len(), 3); // 1 summary + last pair
    }

    #[tokio::test]
    async fn does_not_compact_below_threshold() {
        let compactor = Compactor::new(config(5, 2));
        let llm = StubLlm { calls: AtomicUsize::new(0) };
        let mut messages = vec![ChatMessage::user("q1"), ChatMessage::assistant("a1")];

        let compacted = compactor.maybe_compact(&llm, &mut messages).await.unwrap();
        assert!(!compacted);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disabled_config_never_compacts() {
        let compactor = Compactor::new(CompactionConfig { enabled: false, trigger_pair_count: 0, keep_recent_pairs: 0 });
        let llm = StubLlm { calls: AtomicUsize::new(0) };
        let mut messages = vec![ChatMessage::user("q1"), ChatMessage::assistant("a1")];
        assert!(!compactor.maybe_compact(&llm, &mut messages).await.unwrap());
    }
}
