use std::sync::Mutex;

use dashmap::DashMap;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;

use typerace_core::protocol::ServerEvent;

use crate::matches::LiveMatch;
use crate::queue::MatchQueue;
use crate::registry::SessionRegistry;

/// Shared services context, constructed once at boot and passed explicitly
/// to every handler.
pub struct AppState {
    pub db: SqlitePool,
    pub registry: SessionRegistry,
    pub queue: MatchQueue,
    pub matches: DashMap<String, LiveMatch>,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

impl AppState {
    pub fn new(db: SqlitePool) -> Self {
        AppState {
            db,
            registry: SessionRegistry::new(),
            queue: MatchQueue::new(),
            matches: DashMap::new(),
            cleanup: Mutex::new(None),
        }
    }

    pub fn set_cleanup_task(&self, handle: JoinHandle<()>) {
        *self.cleanup.lock().unwrap() = Some(handle);
    }

    /// Push the current queue size to everyone still waiting.
    pub fn broadcast_queue_status(&self) {
        let queue_size = self.queue.len();
        for user_id in self.queue.user_ids() {
            self.registry
                .emit_to_user(&user_id, &ServerEvent::QueueStatus { queue_size });
        }
    }

    /// Cancel the cleanup ticker and every armed match timer.
    pub fn shutdown(&self) {
        if let Some(handle) = self.cleanup.lock().unwrap().take() {
            handle.abort();
        }
        for mut entry in self.matches.iter_mut() {
            if let Some(timer) = entry.value_mut().take_timeout() {
                timer.abort();
            }
        }
    }
}
