use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Extension, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;

mod auth;
mod config;
mod database;
mod document;
mod handlers;
mod logging;
mod models;
mod retrieval;
mod security;
mod services;
mod state;
mod utils;

use auth::JwtManager;
use config::Settings;
use database::{DbPool, Repository};
use logging::{ActivityLogger, LoggerConfig};
use security::{CustomHeaderValidator, DocumentAuthorization, IpWhitelist};
use services::conversation::ConversationManager;
use services::event_bus::EventBus;
use services::{DocumentService, EmbeddingService, LlmService, RagService};
use state::AppState;
use utils::limiters::Limiters;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,rag_api_server=debug".to_string()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .init();

    info!("Starting RAG API Server...");

    let settings = Settings::load()?;
    info!("Configuration loaded");

    let db_pool = DbPool::new(&settings.database).await?;
    info!("Database connection established");

    let repository = Arc::new(Repository::new(db_pool.clone()));
    repository.ensure_memory_table().await?;
    let limiters = Arc::new(Limiters::new(&settings.limits));

    let embedding_service = Arc::new(EmbeddingService::new(
        settings.llm.base_url.clone(),
        settings.embedding.clone(),
        limiters.clone(),
        settings.limits.embedding_batch_size,
    ));

    let llm_service = Arc::new(LlmService::new(settings.llm.clone()));

    let document_service = Arc::new(DocumentService::new(
        repository.clone(),
        embedding_service.clone(),
        llm_service.clone(),
        &settings.rag,
        &settings.limits,
    ));

    let rag_service = Arc::new(RagService::new(
        repository.clone(),
        embedding_service.clone(),
        llm_service.clone(),
        limiters.clone(),
        settings.reranking.clone(),
        settings.retrieval.clone(),
        settings.reformulation.clone(),
        settings.llm.base_url.clone(),
    ));

    let activity_logger = ActivityLogger::new(db_pool.get_pool().clone(), LoggerConfig::default());

    let conversation_manager = Arc::new(ConversationManager::new(
        Box::new((*embedding_service).clone()),
        Box::new((*rag_service).clone()),
        Box::new((*llm_service).clone()),
        activity_logger,
        settings.llm.stream_response,
        settings.prompts.main_system_prompt.clone(),
        repository.clone(),
        settings.reformulation.clone(),
        settings.compaction.clone(),
        settings.memory.clone(),
        settings.retrieval.clone(),
        settings.resilience.clone(),
    ));

    let event_bus = Arc::new(EventBus::new(1024));

    let jwt_manager = Arc::new(JwtManager::new(
        &settings.security.jwt.secret,
        settings.security.jwt.expiration_seconds,
    ));

    let ip_whitelist = Arc::new(IpWhitelist::new(
        settings.config_path(),
        settings.security.allowed_ips.clone(),
    )?);

    (*ip_whitelist).clone().start_watcher()?;
    info!("IP whitelist watcher started");

    let header_validator = Arc::new(CustomHeaderValidator::new(
        settings.security.custom_headers.app_id.clone(),
        settings.security.custom_headers.api_key.clone(),
        settings.security.custom_headers.request_signature == "enabled",
        settings.security.custom_headers.timestamp_tolerance,
    ));

    let document_auth = Arc::new(DocumentAuthorization::new(repository.clone()));

    let app_state = Arc::new(AppState {
        db_pool,
        embedding_service,
        rag_service,
        llm_service,
        conversation_manager,
        settings: settings.clone(),
        document_service,
        document_auth,
        ip_whitelist: ip_whitelist.clone(),
        header_validator: header_validator.clone(),
        event_bus,
        limiters,
        jwt_manager,
    });

    let app = build_router(app_state, ip_whitelist, header_validator);

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn build_router(
    app_state: Arc<AppState>,
    ip_whitelist: Arc<IpWhitelist>,
    header_validator: Arc<CustomHeaderValidator>,
) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check));

    let protected_routes = Router::new()
        .route("/api/chat/stream", post(handlers::chat::chat_stream_handler))
        .route("/api/chat/session/new", post(handlers::chat::new_session_handler))
        .route("/api/chat/stats", get(handlers::chat::cache_stats_handler))
        .route("/api/chat/cleanup", post(handlers::chat::cleanup_sessions_handler))
        .route("/api/chat/logger/stats", get(handlers::chat::logger_stats_handler))
        .route("/api/chat/init", post(handlers::chat::init_handler))
        .route("/api/chat/events", get(handlers::chat::events_handler))
        .route("/api/search", post(handlers::search::search_handler))
        .route("/api/upload", post(handlers::upload::upload_handler))
        .route("/api/documents", get(handlers::search::list_documents_handler))
        .route("/api/sessions/:id", delete(handlers::chat::delete_session_handler))
        .route_layer(middleware::from_fn_with_state(app_state.clone(), auth::middleware::auth_middleware))
        .layer(middleware::from_fn(security::middleware::security_middleware))
        .layer(Extension(ip_whitelist))
        .layer(Extension(header_validator))
        .with_state(app_state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            CorsLayer::permissive()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024))
}
