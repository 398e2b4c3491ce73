use anyhow::{Context, Result};
use tracing::{debug, info};
use crate::models::chat::ChatMessage;
use crate::utils::similarity::cosine_similarity;
use crate::services::query_analyzer::{QueryAnalyzer, QueryIntent};
use super::types::{
    ConversationState, RetrievalDecision, RetrievalReason, 
    SkipReason, SystemContextComponents, WeightedEmbeddingConfig
};

/// Conversation posture requested by the client. Each mode layers its own
/// guidance onto the common preamble; `Default` is used when the client
/// doesn't ask for a specific posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PromptMode {
    Exploring,
    Research,
    Learning,
    Default,
}

impl PromptMode {
    const COMMON_PREAMBLE: &'static str = "You are a helpful AI assistant for document Q&A. ";

    fn mode_guidance(&self) -> &'static str {
        match self {
            PromptMode::Exploring => {
                "In EXPLORING mode, encourage broad discovery. Suggest related topics and \
                 connections. Help the user discover new insights from their documents."
            }
            PromptMode::Research => {
                "In RESEARCH mode, focus on precision and citations. Always cite specific \
                 sources. Provide fact-focused, accurate responses with clear references."
            }
            PromptMode::Learning => {
                "In LEARNING mode, use the Socratic method. Ask clarifying questions. Build \
                 understanding progressively. Explain concepts step by step."
            }
            PromptMode::Default => "Provide helpful, accurate responses based on the available information.",
        }
    }

    /// The full system prompt for this mode, with the context-append suffix
    /// attached when document context was actually assembled.
    pub fn system_prompt(&self, context_assembled: bool) -> String {
        let mut prompt = format!("{}{}", Self::COMMON_PREAMBLE, self.mode_guidance());
        if context_assembled {
            prompt.push_str(
                "\n\nProvide helpful, accurate responses based on the available information. \
                 If you don't know something or it's not in the provided context, say so clearly.",
            );
        }
        prompt
    }
}

pub struct ContextBuilder {
    base_instruction: String,
    similarity_threshold: f32,
    weighted_config: WeightedEmbeddingConfig,
}

impl ContextBuilder {
    pub fn new(base_instruction: String) -> Self {
        Self {
            base_instruction,
            similarity_threshold: 0.75,
            weighted_config: WeightedEmbeddingConfig::default(),
        }
    }
    pub fn base_instruction(&self) -> &str {
        &self.base_instruction
    }

    /// System prompt for a specific conversation mode, per the mode table.
    pub fn instruction_for_mode(mode: PromptMode, context_assembled: bool) -> String {
        mode.system_prompt(context_assembled)
    }

    pub fn default_base_instruction() -> String {
        PromptMode::Default.system_prompt(false)
    }

    pub fn decide_retrieval(
        &self,
        state: &ConversationState,
        current_message: &str,
        current_document_ids: Option<Vec<i64>>,
        current_embedding: Option<&Vec<f32>>,
    ) -> Result<RetrievalDecision> {
        // 1. Analyze Intent (POC Meta-Question Enhancement)
        let intent = QueryAnalyzer::analyze_intent(current_message);
        
        match intent {
            QueryIntent::DocumentOverview | QueryIntent::DocumentSummary => {
                debug!("Meta-question detected, triggering MetadataQuery retrieval");
                return Ok(RetrievalDecision::Retrieve {
                    reason: RetrievalReason::DocumentMetadataQuery,
                    context_aware: false,
                });
            }
            QueryIntent::Clarification => {
                debug!("Clarification intent detected, triggering ContextAware retrieval");
                return Ok(RetrievalDecision::Retrieve {
                    reason: RetrievalReason::ClarificationWithContext,
                    context_aware: true,
                });
            }
            _ => {} // Continue to normal logic for SpecificContent
        }

        if state.messages.is_empty() {
            debug!("First message in session, need retrieval");
            return Ok(RetrievalDecision::Retrieve {
                reason: RetrievalReason::FirstMessage,
                context_aware: false,
            });
        }

        if state.document_ids != current_document_ids {
            info!(
                "Document Context changed from {:?} to {:?}, need new retrieval",
                state.document_ids, current_document_ids
            );
            return Ok(RetrievalDecision::Retrieve {
                reason: RetrievalReason::DocumentContextChanged,
                context_aware: true,
            });
        }

        if let (Some(current_emb), Some(last_emb)) = 
            (current_embedding, &state.last_query_embedding) 
        {
            let similarity = cosine_similarity(current_emb, last_emb)
                .context("Failed to calculate similarity")?;

            debug!("Similarity with last query: {:.4}", similarity);

            if similarity > self.similarity_threshold {
                info!(
                    "High similarity ({:.4} > {}), skipping retrieval",
                    similarity, self.similarity_threshold
                );
                return Ok(RetrievalDecision::Skip {
                    reason: SkipReason::SameDocumentAndHighSimilarity(similarity),
                });
            } else {
                info!(
                    "Low similarity ({:.4} <= {}), need new retrieval",
                    similarity, self.similarity_threshold
                );
                return Ok(RetrievalDecision::Retrieve {
                    reason: RetrievalReason::LowSimilarity(similarity),
                    context_aware: true,
                });
            }
        }

        debug!("No previous embedding found, performing retrieval");
        Ok(RetrievalDecision::Retrieve {
            reason: RetrievalReason::FirstMessage,
            context_aware: false,
        })
    }

    pub fn build_system_context(
        &self,
        retrieval_summary: &str,
        document_metadata: Option<&str>,
    ) -> String {
        let components = SystemContextComponents {
            base_instruction: self.base_instruction.clone(),
            retrieval_context: retrieval_summary.to_string(),
            metadata_section: document_metadata.map(|s| s.to_string()),
        };

        components.build()
    }

    pub fn prepare_context_aware_text(
        &self,
        current_message: &str,
        history: &[ChatMessage],
    ) -> String {
        if history.is_empty() {
            return current_message.to_string();
        }

        let last_user_messages: Vec<String> = history
            .iter()
            .filter(|msg| msg.role == "user")
            .rev()
            .take(self.weighted_config.max_history_messages)
            .map(|msg| msg.content.clone())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        if last_user_messages.is_empty() {
            return current_message.to_string();
        }

        let history_text = last_user_messages.join(" ");
        format!("{} {}", history_text, current_message)
    }

    pub fn weighted_config(&self) -> &WeightedEmbeddingConfig {
        &self.weighted_config
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(Self::default_base_instruction())
    }
}

#[cfg(test)]
mod prompt_mode_tests {
    use super::PromptMode;

    #[test]
    fn modes_carry_the_common_preamble() {
        for mode in [PromptMode::Exploring, PromptMode::Research, PromptMode::Learning, PromptMode::Default] {
            assert!(mode.system_prompt(false).starts_with("You are a helpful AI assistant for document Q&A. "));
        }
    }

    #[test]
    fn context_assembled_appends_the_fallback_disclaimer() {
        let with_context = PromptMode::Research.system_prompt(true);
        let without_context = PromptMode::Research.system_prompt(false);
        assert!(with_context.contains("If you don't know something or it's not in the provided context"));
        assert!(!without_context.contains("If you don't know something"));
    }
}
