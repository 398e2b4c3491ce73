use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub rag: RagConfig,
    pub prompts: PromptsConfig,
    pub limits: LimitsConfig,
    pub retrieval: RetrievalConfig,
    pub reranking: RerankingConfig,
    pub reformulation: ReformulationConfig,
    pub compaction: CompactionConfig,
    pub memory: MemoryConfig,
    pub verification: VerificationConfig,
    pub resilience: ResilienceConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SecurityConfig {
    pub allowed_ips: Vec<String>,
    pub custom_headers: CustomHeadersConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_seconds: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: "change-me".to_string(),
            expiration_seconds: 86_400,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CustomHeadersConfig {
    pub app_id: String,
    pub api_key: String,
    pub request_signature: String,
    pub timestamp_tolerance: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
    pub pool_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    pub model: String,
    pub base_url: String, // Added base_url for embedding server
    pub dimension: usize,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Bounds on concurrent work per external dependency, enforced via semaphores.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LimitsConfig {
    pub embedding_concurrency: usize,
    pub db_search_concurrency: usize,
    pub llm_generate_concurrency: usize,
    pub llm_stream_concurrency: usize,
    pub reranker_concurrency: usize,
    pub acquire_timeout_ms: u64,
    pub embedding_batch_size: usize,
}

/// Hybrid retrieval and reciprocal-rank-fusion tuning.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    pub vector_top_k: usize,
    pub keyword_top_k: usize,
    pub rrf_k: f32,
    pub min_confidence: f32,
    /// Candidate pool fetched per leg before fusion: `max(topK * multiplier, 50)`.
    pub candidates_multiplier: usize,
    /// Soft deadline for the vector+keyword fan-out; a leg that misses it is
    /// dropped rather than failing the whole search.
    pub timeout_ms: u64,
    pub top_k_exploring: usize,
    pub top_k_research: usize,
    pub top_k_learning: usize,
    pub top_k_default: usize,
}

impl RetrievalConfig {
    pub fn top_k_for_mode(&self, mode: crate::services::conversation::PromptMode) -> usize {
        use crate::services::conversation::PromptMode;
        match mode {
            PromptMode::Exploring => self.top_k_exploring,
            PromptMode::Research => self.top_k_research,
            PromptMode::Learning => self.top_k_learning,
            PromptMode::Default => self.top_k_default,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RerankingConfig {
    pub enabled: bool,
    pub candidate_pool_size: usize,
    pub final_top_n: usize,
    pub diversity_lambda: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReformulationConfig {
    pub enabled: bool,
    pub source_anchoring_boost: f32,
    pub max_history_turns: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CompactionConfig {
    pub enabled: bool,
    pub trigger_pair_count: usize,
    pub keep_recent_pairs: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub max_items_per_session: usize,
    pub min_importance: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VerificationConfig {
    pub enabled: bool,
    pub max_iterations: usize,
    pub min_citation_support: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResilienceConfig {
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub cold_start_backoff_ms: u64,
    pub circuit_failure_threshold: u32,
    pub circuit_open_duration_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub max_tokens: usize,
    pub stream_response: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RagConfig {
    pub retrieval_top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap_percentage: f32,
    pub rerank_enabled: bool,
    pub max_context_length: usize,  // Keep for backward compat
    pub max_context_tokens: usize,  // NEW: token-based limit
    pub document_path: String,
}


#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptsConfig {
    pub main_system_prompt: String,
    pub context_extraction_system_prompt: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        
        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(true))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;
        
        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }
    
    pub fn config_path(&self) -> PathBuf {
        PathBuf::from("config/settings.toml")
    }
}
