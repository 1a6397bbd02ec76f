//! Chunked upload sessions.
//!
//! Sessions buffer chunks in memory until every declared index has arrived.
//! The per-session mutex serializes chunk arrival, so exactly one `receive`
//! call observes the transition to `Complete` and obtains the assembled
//! payload. Unrelated sessions proceed in parallel.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use depot_core::upload::{SessionId, SessionState, UploadProgress};
use std::collections::HashMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// A single in-flight chunked upload.
pub struct ChunkSession {
    pub id: SessionId,
    pub owner_id: Uuid,
    pub file_name: String,
    pub content_type: Option<String>,
    pub parent_id: Option<Uuid>,
    pub total_size: u64,
    pub total_chunks: u32,
    pub state: SessionState,
    pub last_update: OffsetDateTime,
    chunks: Vec<Option<Bytes>>,
    received: u32,
    buffered: u64,
}

/// Result of delivering one chunk.
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// Chunk stored; more indices outstanding.
    Accepted,
    /// This chunk filled the last gap. The caller holds the assembled
    /// payload and is the only one that will ever see it for this session.
    Complete(Bytes),
    /// Chunk arrived after the session left `Open`; progress only.
    AlreadyClosed,
}

impl ChunkSession {
    pub fn new(
        id: SessionId,
        owner_id: Uuid,
        file_name: String,
        content_type: Option<String>,
        parent_id: Option<Uuid>,
        total_size: u64,
        total_chunks: u32,
    ) -> Self {
        Self {
            id,
            owner_id,
            file_name,
            content_type,
            parent_id,
            total_size,
            total_chunks,
            state: SessionState::Open,
            last_update: OffsetDateTime::now_utc(),
            chunks: vec![None; total_chunks as usize],
            received: 0,
            buffered: 0,
        }
    }

    /// Deliver a chunk.
    ///
    /// Chunks may arrive in any order. A duplicate index overwrites the
    /// previous bytes without advancing the received count, so retries are
    /// harmless. The call that stores the final missing index flips the
    /// session to `Complete` and returns the concatenated payload.
    pub fn receive(&mut self, index: u32, data: Bytes) -> depot_core::Result<ReceiveOutcome> {
        if self.state.is_terminal() {
            return Err(depot_core::Error::UploadSession(format!(
                "session {} is {:?} and no longer accepts chunks",
                self.id, self.state
            )));
        }
        if index >= self.total_chunks {
            return Err(depot_core::Error::ChunkIndexOutOfRange {
                index,
                total_chunks: self.total_chunks,
            });
        }
        if self.state == SessionState::Complete {
            // A duplicate of the final chunk racing the commit.
            return Ok(ReceiveOutcome::AlreadyClosed);
        }

        // Cap buffered bytes at the declared total so a lying client cannot
        // park gigabytes in memory only to fail the merge-time check. A
        // duplicate index replaces its previous bytes, so only the delta
        // counts.
        let slot = &mut self.chunks[index as usize];
        let replaced = slot.as_ref().map(|b| b.len() as u64).unwrap_or(0);
        let would_buffer = self.buffered - replaced + data.len() as u64;
        if would_buffer > self.total_size {
            return Err(depot_core::Error::SizeMismatch {
                declared: self.total_size,
                assembled: would_buffer,
            });
        }

        if slot.is_none() {
            self.received += 1;
        }
        *slot = Some(data);
        self.buffered = would_buffer;
        self.last_update = OffsetDateTime::now_utc();

        if self.received == self.total_chunks {
            self.state = SessionState::Complete;
            Ok(ReceiveOutcome::Complete(self.assemble()))
        } else {
            Ok(ReceiveOutcome::Accepted)
        }
    }

    fn assemble(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.total_size as usize);
        for chunk in self.chunks.iter().flatten() {
            buf.extend_from_slice(chunk);
        }
        buf.freeze()
    }

    /// Mark the session committed and drop the chunk buffers.
    pub fn mark_committed(&mut self) {
        self.state = SessionState::Committed;
        self.last_update = OffsetDateTime::now_utc();
        self.release_buffers();
    }

    /// Reopen after a failed commit so the client can retry the final chunk.
    pub fn reopen(&mut self) {
        if self.state == SessionState::Complete {
            self.state = SessionState::Open;
            self.last_update = OffsetDateTime::now_utc();
        }
    }

    /// Cancel the session. Idempotent; a no-op on terminal sessions.
    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            self.state = SessionState::Cancelled;
            self.last_update = OffsetDateTime::now_utc();
            self.release_buffers();
        }
    }

    /// Expire the session after idle timeout.
    pub fn expire(&mut self) {
        if !self.state.is_terminal() {
            self.state = SessionState::Expired;
            self.release_buffers();
        }
    }

    fn release_buffers(&mut self) {
        self.chunks = Vec::new();
        self.chunks.shrink_to_fit();
        self.buffered = 0;
    }

    /// Snapshot current progress.
    pub fn progress(&self) -> UploadProgress {
        UploadProgress {
            session_id: self.id.clone(),
            file_name: self.file_name.clone(),
            total_size: self.total_size,
            total_chunks: self.total_chunks,
            received_chunks: self.received,
            progress_percent: UploadProgress::percent(self.received, self.total_chunks),
            last_update: self.last_update,
            state: self.state,
        }
    }
}

/// Shared handle to a session.
pub type SessionHandle = Arc<Mutex<ChunkSession>>;

/// Store of in-flight upload sessions.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Register a new session. Fails if the id is already taken.
    async fn create(&self, session: ChunkSession) -> Result<SessionHandle, String>;

    /// Look up a session by id.
    async fn get(&self, id: &SessionId) -> Option<SessionHandle>;

    /// Drop a session entirely. Returns whether it existed.
    async fn remove(&self, id: &SessionId) -> bool;

    /// Expire sessions idle past `idle_timeout` and drop terminal sessions
    /// idle past the same bound. Returns the number of sessions expired.
    async fn sweep_idle(&self, idle_timeout: Duration) -> usize;

    /// Number of tracked sessions.
    async fn len(&self) -> usize;
}

/// In-memory session store.
///
/// The outer lock guards the map only; chunk delivery locks the individual
/// session, so uploads to different sessions never contend.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: ChunkSession) -> Result<SessionHandle, String> {
        let mut sessions = self.sessions.lock().await;
        let id = session.id.clone();
        if sessions.contains_key(&id) {
            return Err(format!("session {id} already exists"));
        }
        debug!(session_id = %id, file_name = %session.file_name, "session opened");
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(id, handle.clone());
        Ok(handle)
    }

    async fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.lock().await.get(id).cloned()
    }

    async fn remove(&self, id: &SessionId) -> bool {
        self.sessions.lock().await.remove(id).is_some()
    }

    async fn sweep_idle(&self, idle_timeout: Duration) -> usize {
        let handles: Vec<(SessionId, SessionHandle)> = {
            let sessions = self.sessions.lock().await;
            sessions
                .iter()
                .map(|(id, h)| (id.clone(), h.clone()))
                .collect()
        };

        let now = OffsetDateTime::now_utc();
        let mut expired = 0;
        let mut to_remove = Vec::new();

        for (id, handle) in handles {
            let mut session = handle.lock().await;
            let idle = now - session.last_update;
            if idle < idle_timeout {
                continue;
            }
            if session.state.is_terminal() {
                to_remove.push(id);
            } else if session.state != SessionState::Complete {
                // Complete sessions have a commit in flight; leave them alone.
                session.expire();
                info!(session_id = %session.id, "session expired after idle timeout");
                expired += 1;
            }
        }

        if !to_remove.is_empty() {
            let mut sessions = self.sessions.lock().await;
            for id in to_remove {
                sessions.remove(&id);
            }
        }

        expired
    }

    async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(total_size: u64, total_chunks: u32) -> ChunkSession {
        ChunkSession::new(
            SessionId::generate(),
            Uuid::new_v4(),
            "file.bin".to_string(),
            None,
            None,
            total_size,
            total_chunks,
        )
    }

    #[test]
    fn out_of_order_delivery_assembles_in_index_order() {
        let mut s = session(250, 3);
        assert!(matches!(
            s.receive(2, Bytes::from(vec![b'c'; 50])).unwrap(),
            ReceiveOutcome::Accepted
        ));
        assert!(matches!(
            s.receive(0, Bytes::from(vec![b'a'; 100])).unwrap(),
            ReceiveOutcome::Accepted
        ));
        let out = s.receive(1, Bytes::from(vec![b'b'; 100])).unwrap();
        let ReceiveOutcome::Complete(payload) = out else {
            panic!("expected completion");
        };

        assert_eq!(payload.len(), 250);
        assert!(payload[..100].iter().all(|&b| b == b'a'));
        assert!(payload[100..200].iter().all(|&b| b == b'b'));
        assert!(payload[200..].iter().all(|&b| b == b'c'));
        assert_eq!(s.state, SessionState::Complete);
    }

    #[test]
    fn duplicate_chunk_does_not_advance_progress() {
        let mut s = session(20, 2);
        s.receive(0, Bytes::from_static(b"0123456789")).unwrap();
        s.receive(0, Bytes::from_static(b"abcdefghij")).unwrap();
        assert_eq!(s.progress().received_chunks, 1);

        // Last write wins for the slot.
        let ReceiveOutcome::Complete(payload) =
            s.receive(1, Bytes::from_static(b"KLMNOPQRST")).unwrap()
        else {
            panic!("expected completion");
        };
        assert_eq!(&payload[..], b"abcdefghijKLMNOPQRST");
    }

    #[test]
    fn only_one_call_obtains_the_payload() {
        let mut s = session(4, 1);
        let first = s.receive(0, Bytes::from_static(b"data")).unwrap();
        assert!(matches!(first, ReceiveOutcome::Complete(_)));

        let second = s.receive(0, Bytes::from_static(b"data")).unwrap();
        assert!(matches!(second, ReceiveOutcome::AlreadyClosed));
    }

    #[test]
    fn buffered_bytes_capped_at_declared_total() {
        let mut s = session(10, 3);
        let err = s.receive(0, Bytes::from(vec![0; 100])).unwrap_err();
        assert!(matches!(
            err,
            depot_core::Error::SizeMismatch {
                declared: 10,
                assembled: 100
            }
        ));
        // The rejected chunk was not buffered.
        assert_eq!(s.progress().received_chunks, 0);
        assert_eq!(s.state, SessionState::Open);
    }

    #[test]
    fn duplicate_chunk_counts_only_its_delta() {
        let mut s = session(10, 2);
        s.receive(0, Bytes::from(vec![0; 6])).unwrap();
        // Replacing the 6-byte chunk with 8 bytes stays under the total.
        s.receive(0, Bytes::from(vec![0; 8])).unwrap();

        // 8 + 3 would overshoot; 8 + 2 lands exactly on the total.
        assert!(s.receive(1, Bytes::from(vec![0; 3])).is_err());
        let out = s.receive(1, Bytes::from(vec![0; 2])).unwrap();
        assert!(matches!(out, ReceiveOutcome::Complete(_)));
    }

    #[test]
    fn out_of_range_index_rejected() {
        let mut s = session(10, 2);
        let err = s.receive(2, Bytes::from_static(b"x")).unwrap_err();
        assert!(matches!(
            err,
            depot_core::Error::ChunkIndexOutOfRange {
                index: 2,
                total_chunks: 2
            }
        ));
    }

    #[test]
    fn terminal_sessions_reject_chunks() {
        let mut s = session(10, 2);
        s.cancel();
        assert!(s.receive(0, Bytes::from_static(b"x")).is_err());

        // Cancel again is a no-op.
        s.cancel();
        assert_eq!(s.state, SessionState::Cancelled);
    }

    #[test]
    fn reopen_after_failed_commit() {
        let mut s = session(4, 1);
        s.receive(0, Bytes::from_static(b"data")).unwrap();
        assert_eq!(s.state, SessionState::Complete);

        s.reopen();
        assert_eq!(s.state, SessionState::Open);
        // The chunk is still buffered; redelivering it completes again.
        let out = s.receive(0, Bytes::from_static(b"data")).unwrap();
        assert!(matches!(out, ReceiveOutcome::Complete(_)));
    }

    #[tokio::test]
    async fn store_rejects_duplicate_ids() {
        let store = InMemorySessionStore::new();
        let s = session(10, 1);
        let id = s.id.clone();
        store.create(s).await.unwrap();

        let mut dup = session(10, 1);
        dup.id = id.clone();
        assert!(store.create(dup).await.is_err());
        assert_eq!(store.len().await, 1);
        assert!(store.get(&id).await.is_some());
    }

    #[tokio::test]
    async fn sweep_expires_idle_open_sessions() {
        let store = InMemorySessionStore::new();
        let mut s = session(10, 2);
        s.last_update = OffsetDateTime::now_utc() - Duration::hours(2);
        let id = s.id.clone();
        store.create(s).await.unwrap();

        let expired = store.sweep_idle(Duration::minutes(30)).await;
        assert_eq!(expired, 1);

        let handle = store.get(&id).await.unwrap();
        assert_eq!(handle.lock().await.state, SessionState::Expired);

        // Second sweep drops the now-terminal idle session.
        store.sweep_idle(Duration::minutes(30)).await;
        assert!(store.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn sweep_leaves_fresh_sessions_alone() {
        let store = InMemorySessionStore::new();
        let s = session(10, 2);
        let id = s.id.clone();
        store.create(s).await.unwrap();

        assert_eq!(store.sweep_idle(Duration::minutes(30)).await, 0);
        let handle = store.get(&id).await.unwrap();
        assert_eq!(handle.lock().await.state, SessionState::Open);
    }
}
