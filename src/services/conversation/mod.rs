//! Conversation memory management module
//! 
//! Provides in-memory conversation state management with:
//! - Thread-safe caching (DashMap)
//! - Dynamic system context building
//! - Token management and sliding window
//! - Context-aware retrieval decisions

mod cache;
pub mod compaction;
mod context_builder;
pub mod manager;
pub mod memory;
pub mod search_index;
mod token_counter;
pub mod types;
pub mod verification;

pub use cache::{ConversationCache, CacheStats};
pub use compaction::Compactor;
pub use context_builder::{ContextBuilder, PromptMode};
pub use manager::ConversationManager;
pub use memory::MemoryExtractor;
pub use search_index::{delete_session, ChatMessageIndex, ChunkIndex, IndexError, MemoryIndex, SessionDeletionSummary};
pub use token_counter::TokenCounter;
pub use types::{
    ConversationState, RetrievalDecision,
    SystemContextComponents, WeightedEmbeddingConfig,
};

// Re-export common types for convenience if needed, but ChatMessage/SessionId are in models
pub use crate::models::chat::{ChatMessage, SessionId};
