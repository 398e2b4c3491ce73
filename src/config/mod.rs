pub mod settings;

pub use settings::{
    CompactionConfig, CustomHeadersConfig, DatabaseConfig, EmbeddingConfig, JwtConfig,
    LimitsConfig, LlmConfig, MemoryConfig, PromptsConfig, RagConfig, ReformulationConfig,
    RerankingConfig, ResilienceConfig, RetrievalConfig, SecurityConfig, ServerConfig, Settings,
    VerificationConfig,
};
