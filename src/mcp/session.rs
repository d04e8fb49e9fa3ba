//! MCP sessions
//!
//! A session is created on first contact and lives until evicted or the
//! process exits. Nothing is persisted.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

/// Header carrying the session id in both directions
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Longest session id accepted from a client
pub const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub initialized: bool,
    pub last_seen: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            initialized: false,
            last_seen: now,
        }
    }
}

/// Fresh opaque session id
pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Whether a client-supplied id can be echoed back in a header
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id.bytes().all(|b| b.is_ascii_graphic())
}

/// Session storage injected into the dispatcher and the HTTP layer
pub trait SessionStore: Send + Sync {
    fn get(&self, id: &str) -> Option<Session>;

    fn set(&self, session: Session);

    /// Remove a session; returns whether it existed
    fn evict(&self, id: &str) -> bool;

    /// Fetch or create the session and refresh `last_seen`
    fn touch(&self, id: &str) -> Session;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mark_initialized(&self, id: &str) {
        let mut session = self.touch(id);
        session.initialized = true;
        self.set(session);
    }

    fn is_initialized(&self, id: &str) -> bool {
        self.get(id).is_some_and(|s| s.initialized)
    }
}

/// DashMap-backed store
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, Session>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop sessions idle for longer than `max_idle`; returns how many went
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let Ok(max_idle) = chrono::Duration::from_std(max_idle) else {
            return 0;
        };
        let cutoff = Utc::now() - max_idle;
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.last_seen >= cutoff);
        before - self.sessions.len()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).map(|s| s.clone())
    }

    fn set(&self, session: Session) {
        self.sessions.insert(session.id.clone(), session);
    }

    fn evict(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    fn touch(&self, id: &str) -> Session {
        let mut entry = self
            .sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session = %id, "new session");
                Session::new(id)
            });
        entry.last_seen = Utc::now();
        entry.clone()
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_creates_once() {
        let store = InMemorySessionStore::new();
        let first = store.touch("abc");
        let second = store.touch("abc");
        assert_eq!(store.len(), 1);
        assert_eq!(first.created_at, second.created_at);
        assert!(second.last_seen >= first.last_seen);
        assert!(!second.initialized);
    }

    #[test]
    fn test_mark_initialized_and_evict() {
        let store = InMemorySessionStore::new();
        assert!(!store.is_initialized("s1"));
        store.mark_initialized("s1");
        assert!(store.is_initialized("s1"));
        assert!(store.evict("s1"));
        assert!(!store.evict("s1"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_prune_idle() {
        let store = InMemorySessionStore::new();
        let mut stale = Session::new("old");
        stale.last_seen = Utc::now() - chrono::Duration::hours(2);
        store.set(stale);
        store.touch("fresh");
        assert_eq!(store.prune_idle(Duration::from_secs(3600)), 1);
        assert!(store.get("fresh").is_some());
    }

    #[test]
    fn test_session_id_validation() {
        assert!(is_valid_session_id(&new_session_id()));
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id("has space"));
        assert!(!is_valid_session_id(&"x".repeat(MAX_SESSION_ID_LEN + 1)));
    }
}
