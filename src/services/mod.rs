pub mod conversation;
pub mod document_service;
pub mod embedding_service;
pub mod event_bus;
pub mod llm_service;
pub mod query_analyzer;
pub mod rag_service;

pub use document_service::DocumentService;
pub use embedding_service::EmbeddingService;
pub use event_bus::EventBus;
pub use llm_service::LlmService;
pub use rag_service::RagService;
