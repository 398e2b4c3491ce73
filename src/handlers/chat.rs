use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::handlers::search::DocumentInfo;
use crate::models::chat::ChatRequest;
use crate::services::conversation::manager::ChatStreamChunk;
use crate::services::conversation::{delete_session, ChatMessageIndex, ChunkIndex, ConversationManager, MemoryIndex};
use crate::state::AppState;
use crate::utils::error::ApiError;
use axum::extract::Query;
use futures::stream as fstream;

/// Handle streaming chat request
/// POST /api/chat/stream
pub async fn chat_stream_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (axum::http::StatusCode, String)> {
    info!(
        "Chat stream request: session_id={}, user_id={}, document_id={:?}, document_ids={:?}",
        req.session_id, req.user_id, req.document_id, req.document_ids
    );

    if req.message.trim().is_empty() {
        return Err((
            axum::http::StatusCode::BAD_REQUEST,
            "Message cannot be empty".to_string(),
        ));
    }

    let request_id = req.request_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

    let inner = state
        .conversation_manager
        .clone()
        .handle_message(
            req.session_id,
            req.user_id,
            req.message.clone(),
            req.document_id,
            req.document_ids.clone(),
            request_id,
        )
        .await
        .map_err(|e| {
            error!("Failed to start conversation stream: {}", e);
            (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    let mapped = inner.map(|item| {
        let event = match item {
            Ok(ChatStreamChunk::Stage { request_id, phase, progress, text, detail }) => {
                let payload = serde_json::json!({
                    "request_id": request_id,
                    "phase": phase,
                    "progress": progress,
                    "text": text,
                    "detail": detail,
                });
                Event::default().event("stage").data(payload.to_string())
            }
            Ok(ChatStreamChunk::Message { request_id, delta }) => {
                let payload = serde_json::json!({ "request_id": request_id, "delta": delta });
                Event::default().event("message").data(payload.to_string())
            }
            Ok(ChatStreamChunk::Done { request_id }) => {
                let payload = serde_json::json!({ "request_id": request_id });
                Event::default().event("done").data(payload.to_string())
            }
            Err(e) => {
                error!("Error while streaming chat response: {}", e);
                let payload = serde_json::json!({ "message": e.to_string() });
                Event::default().event("error").data(payload.to_string())
            }
        };
        Ok(event)
    });

    Ok(Sse::new(mapped.boxed()).keep_alive(KeepAlive::default()))
}

/// Generate new session ID for user
/// POST /api/chat/session/new
#[derive(serde::Deserialize)]
pub struct NewSessionRequest {
    pub user_id: i64,
}

#[derive(serde::Serialize)]
pub struct NewSessionResponse {
    pub session_id: i64,
}

pub async fn new_session_handler(
    Json(req): Json<NewSessionRequest>,
) -> Result<Json<NewSessionResponse>, (axum::http::StatusCode, String)> {
    let session_id = ConversationManager::generate_session_id(req.user_id);
    
    info!("Generated new session ID {} for user {}", session_id, req.user_id);
    
    Ok(Json(NewSessionResponse { session_id }))
}

/// Get conversation cache statistics
/// GET /api/chat/stats
#[derive(serde::Serialize)]
pub struct CacheStatsResponse {
    pub active_sessions: usize,
    pub memory_usage_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f64,
}

pub async fn cache_stats_handler(
    State(state): State<Arc<AppState>>,
) -> Json<CacheStatsResponse> {
    let stats = state.conversation_manager.cache_stats();
    
    Json(CacheStatsResponse {
        active_sessions: stats.active_sessions,
        memory_usage_mb: stats.memory_usage_mb,
        memory_total_mb: stats.memory_total_mb,
        memory_usage_percent: stats.memory_usage_percent,
    })
}

/// Manual cleanup of expired sessions
/// POST /api/chat/cleanup
#[derive(serde::Serialize)]
pub struct CleanupResponse {
    pub sessions_removed: usize,
}

pub async fn cleanup_sessions_handler(
    State(state): State<Arc<AppState>>,
) -> Json<CleanupResponse> {
    let count = state.conversation_manager.cleanup_expired_sessions();
    
    info!("Manual cleanup removed {} expired sessions", count);
    
    Json(CleanupResponse {
        sessions_removed: count,
    })
}

/// Get logging queue statistics
#[derive(serde::Serialize)]
pub struct LoggerStatsResponse {
    pub queue_length: usize,
    pub is_full: bool,
}

pub async fn logger_stats_handler(
    State(state): State<Arc<AppState>>,
) -> Json<LoggerStatsResponse> {
    let logger = &state.conversation_manager.logger();
    
    Json(LoggerStatsResponse {
        queue_length: logger.queue_len(),
        is_full: logger.is_queue_full(),
    })
}

/// Initialize chat session and fetch documents
/// POST /api/chat/init
#[derive(serde::Deserialize)]
pub struct ChatInitRequest {
    pub user_id: i32,
    pub session_id: Option<i64>,
}

#[derive(serde::Serialize)]
pub struct ChatInitResponse {
    pub session_id: i64,
    pub documents: Vec<DocumentInfo>,
    pub processing_docs: Vec<crate::database::DocumentProcessingStatus>,
}

pub async fn init_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatInitRequest>,
) -> Result<Json<ChatInitResponse>, ApiError> {
    info!("Chat init request from user {}", req.user_id);

    // 1. Get or Generate Session ID
    let session_id = req.session_id.unwrap_or_else(|| {
        ConversationManager::generate_session_id(req.user_id as i64)
    });

    // 2. Fetch Document List
    let repository = crate::database::Repository::new(state.db_pool.clone());
    let docs = repository
        .get_user_documents(req.user_id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    let documents: Vec<DocumentInfo> = docs
        .into_iter()
        .map(|doc| DocumentInfo {
            document_id: doc.document_id,
            title: doc.document_title,
            owner_user_id: doc.owner_user_id,
            permission_level: doc.permission_level,
            created_at: doc.created_at.to_rfc3339(),
        })
        .collect();

    // 3. Fetch In-Progress Documents (Phase 2 Resilience)
    let processing_docs = repository
        .get_user_processing_documents(req.user_id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    info!("Initialized session {} with {} docs and {} in-progress docs for user {}", 
        session_id, documents.len(), processing_docs.len(), req.user_id);

    Ok(Json(ChatInitResponse {
        session_id,
        documents,
        processing_docs,
    }))
}

/// Persistent SSE stream for session events
/// GET /api/chat/events
#[derive(serde::Deserialize)]
pub struct EventsParams {
    pub session_id: i64,
}

pub async fn events_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EventsParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = params.session_id;
    let rx = state.event_bus.subscribe();

    let stream = fstream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(session_event) => {
                    if session_event.session_id == session_id {
                        let data = serde_json::to_string(&session_event.event).unwrap_or_default();
                        let event = Event::default()
                            .event("system_event")
                            .data(data);
                        return Some((Ok(event), rx));
                    }
                    // Continue loop if not our session
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    // Send error or skip? Let's skip and keep going
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    return None;
                }
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Permanently remove a session: its persisted chat turns, extracted
/// memories, and in-memory cached state.
/// DELETE /api/sessions/:id
pub async fn delete_session_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i64>,
) -> Result<Json<crate::services::conversation::SessionDeletionSummary>, ApiError> {
    let repository = Arc::new(crate::database::Repository::new(state.db_pool.clone()));
    let memory_index = MemoryIndex::new(repository.clone());
    let message_index = ChatMessageIndex::new(repository.clone());
    let chunk_index = ChunkIndex::new(repository);

    let summary = delete_session(&memory_index, &message_index, &chunk_index, session_id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    state.conversation_manager.forget_session(session_id);

    info!(
        "Deleted session {}: {} messages, {} memories removed",
        session_id, summary.messages_removed, summary.memories_removed
    );

    Ok(Json(summary))
}
