//! File and folder handlers.

use crate::error::{ApiError, ApiResult};
use crate::ingest::IngestRequest;
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Response;
use bytes::Bytes;
use depot_metadata::FileRow;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

/// Response for a committed upload.
#[derive(Debug, Serialize)]
pub struct CommitResponse {
    pub file: FileRow,
    pub deduplicated: bool,
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub owner_id: Uuid,
    pub file_name: String,
    pub content_type: Option<String>,
    pub parent_id: Option<Uuid>,
    /// Client-declared size, verified against the received body.
    pub size: Option<u64>,
    /// "private" (default) or "public".
    pub visibility: Option<String>,
    pub description: Option<String>,
    /// Comma-separated tag list, stored verbatim.
    pub tags: Option<String>,
}

/// POST /v1/files
///
/// Single-request upload: the whole payload arrives as the request body.
pub async fn upload_file(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<CommitResponse>)> {
    let outcome = state
        .ingest
        .ingest(IngestRequest {
            owner_id: params.owner_id,
            file_name: params.file_name,
            content_type: params.content_type,
            parent_id: params.parent_id,
            declared_size: params.size,
            visibility: params.visibility,
            description: params.description,
            tags: params.tags,
            data: body,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CommitResponse {
            file: outcome.file,
            deduplicated: outcome.deduplicated,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub owner_id: Uuid,
    /// Folder to list; absent means the owner's root.
    pub parent_id: Option<Uuid>,
}

/// GET /v1/files
pub async fn list_files(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<FileRow>>> {
    let rows = state
        .metadata
        .list_children(params.owner_id, params.parent_id)
        .await?;
    Ok(Json(rows))
}

/// GET /v1/files/{file_id}
pub async fn get_file(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
) -> ApiResult<Json<FileRow>> {
    let row = state
        .metadata
        .get_file(file_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("file {file_id} not found")))?;
    Ok(Json(row))
}

async fn downloadable_row(state: &AppState, file_id: Uuid) -> ApiResult<(FileRow, String)> {
    let row = state
        .metadata
        .get_file(file_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("file {file_id} not found")))?;

    if row.is_folder() {
        return Err(ApiError::BadRequest("folders have no content".into()));
    }
    if !row.is_active() {
        return Err(ApiError::NotFound(format!("file {file_id} is trashed")));
    }
    let key = row
        .object_key
        .clone()
        .ok_or_else(|| ApiError::Internal(format!("file {file_id} has no blob pointer")))?;
    Ok((row, key))
}

/// Parse a single-range `Range: bytes=start-end` header against a known
/// size. Returns the half-open `[start, end)` to fetch. Malformed or
/// multi-range headers are ignored (full body); a syntactically valid but
/// unsatisfiable range is an error the caller maps to 416.
fn parse_range(header: &str, size: u64) -> Option<Result<(u64, u64), ()>> {
    let spec = header.strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    if size == 0 {
        return Some(Err(()));
    }
    let (start_s, end_s) = spec.split_once('-')?;

    if start_s.is_empty() {
        // Suffix form: last N bytes.
        let n: u64 = end_s.parse().ok()?;
        if n == 0 {
            return Some(Err(()));
        }
        let start = size.saturating_sub(n);
        return Some(Ok((start, size)));
    }

    let start: u64 = start_s.parse().ok()?;
    if start >= size {
        return Some(Err(()));
    }
    let end = if end_s.is_empty() {
        size
    } else {
        let last: u64 = end_s.parse().ok()?;
        if last < start {
            return Some(Err(()));
        }
        (last + 1).min(size)
    };
    Some(Ok((start, end)))
}

/// GET /v1/files/{file_id}/content
///
/// Streams the blob. A single `Range` header is honored with a 206 partial
/// response.
pub async fn download_file(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let (row, key) = downloadable_row(&state, file_id).await?;
    let size = row.size_bytes as u64;

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_range(v, size));

    let disposition = format!("attachment; filename=\"{}\"", row.display_name);

    match range {
        Some(Err(())) => {
            let response = Response::builder()
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(header::CONTENT_RANGE, format!("bytes */{size}"))
                .body(Body::empty())
                .map_err(|e| ApiError::Internal(e.to_string()))?;
            Ok(response)
        }
        Some(Ok((start, end))) => {
            let data = state.storage.get_range(&key, start, end).await?;
            // Counted only once the bytes are in hand; a failed read or an
            // unsatisfiable range is not a download.
            if let Err(e) = state.metadata.increment_download_count(file_id).await {
                warn!(%file_id, error = %e, "failed to bump download counter");
            }
            let response = Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, row.content_type)
                .header(header::CONTENT_LENGTH, data.len())
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {start}-{}/{size}", end - 1),
                )
                .header(header::CONTENT_DISPOSITION, disposition)
                .body(Body::from(data))
                .map_err(|e| ApiError::Internal(e.to_string()))?;
            Ok(response)
        }
        None => {
            let stream = state.storage.get_stream(&key).await?;
            if let Err(e) = state.metadata.increment_download_count(file_id).await {
                warn!(%file_id, error = %e, "failed to bump download counter");
            }
            let response = Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, row.content_type)
                .header(header::CONTENT_LENGTH, row.size_bytes)
                .header(header::ACCEPT_RANGES, "bytes")
                .header(header::CONTENT_DISPOSITION, disposition)
                .body(Body::from_stream(stream))
                .map_err(|e| ApiError::Internal(e.to_string()))?;
            Ok(response)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PresignResponse {
    pub url: String,
    pub expires_in_secs: u64,
}

/// GET /v1/files/{file_id}/presign
///
/// Time-limited direct download URL. Counts as a preview since clients use
/// it to render content inline.
pub async fn presign_file(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
) -> ApiResult<Json<PresignResponse>> {
    let (_row, key) = downloadable_row(&state, file_id).await?;
    let ttl_secs = state.config.server.presign_ttl_secs;
    let url = state
        .storage
        .presign(
            &key,
            depot_storage::PresignMethod::Get,
            std::time::Duration::from_secs(ttl_secs),
        )
        .await?;

    if let Err(e) = state.metadata.increment_preview_count(file_id).await {
        warn!(%file_id, error = %e, "failed to bump preview counter");
    }

    Ok(Json(PresignResponse {
        url,
        expires_in_secs: ttl_secs,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    /// Skip the trash and remove the record (and unreferenced blob) for good.
    #[serde(default)]
    pub permanent: bool,
}

/// DELETE /v1/files/{file_id}
pub async fn delete_file(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
    Query(params): Query<DeleteParams>,
) -> ApiResult<StatusCode> {
    if params.permanent {
        state.ingest.hard_delete(file_id).await?;
    } else {
        state
            .metadata
            .trash_file(file_id, OffsetDateTime::now_utc())
            .await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/files/{file_id}/restore
pub async fn restore_file(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .metadata
        .restore_file(file_id, OffsetDateTime::now_utc())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub display_name: String,
}

/// POST /v1/files/{file_id}/rename
pub async fn rename_file(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
    Json(request): Json<RenameRequest>,
) -> ApiResult<Json<FileRow>> {
    if request.display_name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".into()));
    }
    state
        .metadata
        .rename_file(file_id, &request.display_name, OffsetDateTime::now_utc())
        .await?;
    let row = state
        .metadata
        .get_file(file_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("file {file_id} not found")))?;
    Ok(Json(row))
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    /// Destination folder; absent moves to the root.
    pub parent_id: Option<Uuid>,
}

/// POST /v1/files/{file_id}/move
pub async fn move_file(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
    Json(request): Json<MoveRequest>,
) -> ApiResult<Json<FileRow>> {
    if let Some(pid) = request.parent_id {
        if pid == file_id {
            return Err(ApiError::BadRequest(
                "cannot move a folder into itself".into(),
            ));
        }
        if !state.metadata.is_active_folder(pid).await? {
            return Err(ApiError::BadRequest(format!(
                "parent {pid} is not an active folder"
            )));
        }
    }

    state
        .metadata
        .move_file(file_id, request.parent_id, OffsetDateTime::now_utc())
        .await?;
    let row = state
        .metadata
        .get_file(file_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("file {file_id} not found")))?;
    Ok(Json(row))
}

#[derive(Debug, Deserialize)]
pub struct CopyRequest {
    pub display_name: Option<String>,
    pub parent_id: Option<Uuid>,
}

/// POST /v1/files/{file_id}/copy
pub async fn copy_file(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
    Json(request): Json<CopyRequest>,
) -> ApiResult<(StatusCode, Json<FileRow>)> {
    let copy = state
        .ingest
        .copy_file(file_id, request.display_name, request.parent_id)
        .await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub owner_id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
}

/// POST /v1/folders
pub async fn create_folder(
    State(state): State<AppState>,
    Json(request): Json<CreateFolderRequest>,
) -> ApiResult<(StatusCode, Json<FileRow>)> {
    let folder = state
        .ingest
        .create_folder(request.owner_id, &request.name, request.parent_id)
        .await?;
    Ok((StatusCode::CREATED, Json(folder)))
}

/// GET /v1/folders/{folder_id}/children
pub async fn list_folder_children(
    State(state): State<AppState>,
    Path(folder_id): Path<Uuid>,
) -> ApiResult<Json<Vec<FileRow>>> {
    let folder = state
        .metadata
        .get_file(folder_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("folder {folder_id} not found")))?;
    if !folder.is_folder() {
        return Err(ApiError::BadRequest(format!("{folder_id} is not a folder")));
    }

    let rows = state
        .metadata
        .list_children(folder.owner_id, Some(folder_id))
        .await?;
    Ok(Json(rows))
}
