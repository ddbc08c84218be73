use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-session mutual exclusion: the merge pass's load-then-retire cycle is
/// not safe against a concurrent header ingestion into the same session, so
/// every mutating ingestion call holds its session's guard for the duration.
/// Sessions never contend with each other.
#[derive(Clone, Default)]
pub struct SessionLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for a session, waiting if another ingestion for the
    /// same session is in flight. The guard releases on drop, covering every
    /// exit path including failure.
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap();
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
