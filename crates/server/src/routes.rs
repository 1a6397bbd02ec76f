//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Direct uploads carry whole files; chunk requests carry one chunk.
    // The body limit must admit the larger of the two.
    let body_limit = state
        .config
        .server
        .max_file_size
        .max(state.config.server.max_chunk_size) as usize;

    Router::new()
        // Health check (unauthenticated for load balancers/k8s probes)
        .route("/v1/health", get(handlers::health_check))
        // Files
        .route(
            "/v1/files",
            post(handlers::upload_file).get(handlers::list_files),
        )
        .route(
            "/v1/files/{file_id}",
            get(handlers::get_file).delete(handlers::delete_file),
        )
        .route("/v1/files/{file_id}/content", get(handlers::download_file))
        .route("/v1/files/{file_id}/presign", get(handlers::presign_file))
        .route("/v1/files/{file_id}/restore", post(handlers::restore_file))
        .route("/v1/files/{file_id}/rename", post(handlers::rename_file))
        .route("/v1/files/{file_id}/move", post(handlers::move_file))
        .route("/v1/files/{file_id}/copy", post(handlers::copy_file))
        // Folders
        .route("/v1/folders", post(handlers::create_folder))
        .route(
            "/v1/folders/{folder_id}/children",
            get(handlers::list_folder_children),
        )
        // Chunked upload control plane
        .route("/v1/uploads", post(handlers::create_upload))
        .route(
            "/v1/uploads/{session_id}",
            get(handlers::get_upload).delete(handlers::cancel_upload),
        )
        .route(
            "/v1/uploads/{session_id}/chunks/{index}",
            post(handlers::upload_chunk),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
