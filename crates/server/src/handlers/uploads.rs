//! Chunked upload handlers.
//!
//! A session is opened with the declared file name, size and chunk count.
//! Chunks then arrive in any order; the request that delivers the final
//! missing chunk triggers the merge-and-commit inline while holding the
//! session lock, so a session commits at most once.

use crate::error::{ApiError, ApiResult};
use crate::ingest::IngestRequest;
use crate::sessions::{ChunkSession, ReceiveOutcome};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use bytes::Bytes;
use depot_core::file::extension_of;
use depot_core::upload::{SessionId, UploadProgress};
use depot_metadata::FileRow;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateUploadRequest {
    pub owner_id: Uuid,
    pub file_name: String,
    pub total_size: u64,
    pub total_chunks: u32,
    pub content_type: Option<String>,
    pub parent_id: Option<Uuid>,
    /// Optional client-chosen id so an interrupted client can tell whether
    /// its session still exists before re-opening.
    pub session_id: Option<String>,
}

/// POST /v1/uploads
pub async fn create_upload(
    State(state): State<AppState>,
    Json(request): Json<CreateUploadRequest>,
) -> ApiResult<(StatusCode, Json<UploadProgress>)> {
    let server = &state.config.server;

    if request.file_name.trim().is_empty() {
        return Err(ApiError::BadRequest("file name must not be empty".into()));
    }
    // Deny bad extensions at open time, before any chunk bytes are spent.
    if let Some(ext) = extension_of(&request.file_name) {
        if server.is_extension_denied(&ext) {
            return Err(ApiError::BadRequest(format!(
                "file extension '{ext}' is not allowed"
            )));
        }
    }
    if request.total_chunks == 0 || request.total_chunks > server.max_chunk_count {
        return Err(ApiError::BadRequest(format!(
            "total_chunks must be in 1..={}",
            server.max_chunk_count
        )));
    }
    if request.total_size > server.max_file_size {
        return Err(ApiError::BadRequest(format!(
            "total_size {} exceeds maximum {}",
            request.total_size, server.max_file_size
        )));
    }

    let session_id = match &request.session_id {
        Some(raw) => SessionId::parse(raw)?,
        None => SessionId::generate(),
    };

    let session = ChunkSession::new(
        session_id,
        request.owner_id,
        request.file_name,
        request.content_type,
        request.parent_id,
        request.total_size,
        request.total_chunks,
    );

    let handle = state
        .sessions
        .create(session)
        .await
        .map_err(ApiError::Conflict)?;

    let progress = handle.lock().await.progress();
    info!(session_id = %progress.session_id, total_chunks = progress.total_chunks, "upload session opened");
    Ok((StatusCode::CREATED, Json(progress)))
}

/// Response to a chunk delivery. `file` is set only by the request that
/// completed the session and committed the payload.
#[derive(Debug, Serialize)]
pub struct ChunkResponse {
    pub progress: UploadProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deduplicated: Option<bool>,
}

/// POST /v1/uploads/{session_id}/chunks/{index}
pub async fn upload_chunk(
    State(state): State<AppState>,
    Path((session_id, index)): Path<(String, u32)>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ChunkResponse>)> {
    let session_id = SessionId::parse(&session_id)?;

    if body.len() as u64 > state.config.server.max_chunk_size {
        return Err(ApiError::BadRequest(format!(
            "chunk size {} exceeds maximum {}",
            body.len(),
            state.config.server.max_chunk_size
        )));
    }

    let handle = state
        .sessions
        .get(&session_id)
        .await
        .ok_or_else(|| ApiError::SessionNotFound(session_id.to_string()))?;

    // The session lock is held across the commit so a racing duplicate of
    // the final chunk waits here and then observes the committed state.
    let mut session = handle.lock().await;

    // A terminal session is gone as far as uploaders are concerned, even
    // while the sweeper retains it; resuming one is not a validation
    // failure.
    if session.state.is_terminal() {
        return Err(ApiError::SessionNotFound(session_id.to_string()));
    }

    match session.receive(index, body)? {
        ReceiveOutcome::Accepted | ReceiveOutcome::AlreadyClosed => Ok((
            StatusCode::OK,
            Json(ChunkResponse {
                progress: session.progress(),
                file: None,
                deduplicated: None,
            }),
        )),
        ReceiveOutcome::Complete(payload) => {
            let ingest_request = IngestRequest {
                owner_id: session.owner_id,
                file_name: session.file_name.clone(),
                content_type: session.content_type.clone(),
                parent_id: session.parent_id,
                declared_size: Some(session.total_size),
                visibility: None,
                description: None,
                tags: None,
                data: payload,
            };

            match state.ingest.ingest(ingest_request).await {
                Ok(outcome) => {
                    session.mark_committed();
                    info!(session_id = %session.id, file_id = %outcome.file.file_id, "upload session committed");
                    Ok((
                        StatusCode::CREATED,
                        Json(ChunkResponse {
                            progress: session.progress(),
                            file: Some(outcome.file),
                            deduplicated: Some(outcome.deduplicated),
                        }),
                    ))
                }
                Err(e) => {
                    // Chunks are intact; reopening lets the client retry the
                    // final chunk instead of restarting the whole upload.
                    session.reopen();
                    error!(session_id = %session.id, error = %e, "commit failed, session reopened");
                    Err(e)
                }
            }
        }
    }
}

/// GET /v1/uploads/{session_id}
pub async fn get_upload(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<UploadProgress>> {
    let session_id = SessionId::parse(&session_id)?;
    let handle = state
        .sessions
        .get(&session_id)
        .await
        .ok_or_else(|| ApiError::SessionNotFound(session_id.to_string()))?;

    let progress = handle.lock().await.progress();
    Ok(Json(progress))
}

/// DELETE /v1/uploads/{session_id}
///
/// Cancels a session. Idempotent: cancelling a terminal or unknown session
/// succeeds without effect.
pub async fn cancel_upload(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<StatusCode> {
    let session_id = SessionId::parse(&session_id)?;
    if let Some(handle) = state.sessions.get(&session_id).await {
        let mut session = handle.lock().await;
        session.cancel();
        info!(session_id = %session.id, "upload session cancelled");
    }
    Ok(StatusCode::NO_CONTENT)
}
