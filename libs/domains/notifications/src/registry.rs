use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Live WebSocket sessions. Observational only, never used for routing.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    sessions: Arc<RwLock<HashSet<String>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(&self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        let count = {
            let mut sessions = self.write();
            sessions.insert(session_id.clone());
            sessions.len()
        };

        metrics::gauge!("notification_ws_sessions_active").set(count as f64);
        tracing::info!(session_id = %session_id, active = count, "Session connected");
    }

    pub fn on_disconnect(&self, session_id: &str) {
        let count = {
            let mut sessions = self.write();
            sessions.remove(session_id);
            sessions.len()
        };

        metrics::gauge!("notification_ws_sessions_active").set(count as f64);
        tracing::info!(session_id = %session_id, active = count, "Session disconnected");
    }

    /// Snapshot of the current session ids
    pub fn active_sessions(&self) -> HashSet<String> {
        self.read().clone()
    }

    pub fn count(&self) -> usize {
        self.read().len()
    }

    // A poisoned lock only means a panic mid-insert; the set itself is still valid.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashSet<String>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashSet<String>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }
}
