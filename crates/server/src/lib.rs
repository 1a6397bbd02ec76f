//! HTTP server and ingestion pipeline for Depot.

pub mod error;
pub mod handlers;
pub mod index;
pub mod ingest;
pub mod routes;
pub mod sessions;
pub mod state;
pub mod sweep;

pub use error::{ApiError, ApiResult};
pub use index::{LoggingIndex, SearchIndex};
pub use ingest::{IngestOutcome, IngestRequest, IngestionCoordinator};
pub use routes::create_router;
pub use sessions::{ChunkSession, InMemorySessionStore, SessionStore};
pub use state::AppState;
pub use sweep::spawn_session_sweeper;
