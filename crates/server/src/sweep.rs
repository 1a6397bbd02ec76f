//! Idle session sweeper.

use crate::sessions::SessionStore;
use std::sync::Arc;
use time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Spawn the background task that reclaims idle upload sessions.
///
/// Runs forever on a fixed interval; the caller keeps the handle to tie the
/// sweeper's lifetime to the server's.
pub fn spawn_session_sweeper(
    sessions: Arc<dyn SessionStore>,
    idle_timeout: Duration,
    interval: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so a fresh server does
        // not sweep before anything can be idle.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let expired = sessions.sweep_idle(idle_timeout).await;
            if expired > 0 {
                info!(expired, "idle upload sessions reclaimed");
            } else {
                debug!("session sweep found nothing to reclaim");
            }
        }
    })
}
