//! Host-process lookup table of live sessions.
//!
//! Not part of the session core's own contract — a session doesn't
//! know it is registered anywhere — but every realistic host (the
//! bundled daemon, a test harness) needs to find a session by the id a
//! transport handed it.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::id::SessionId;
use crate::session::Session;

/// Thread-safe `SessionId -> Session` table.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Session) {
        self.sessions.write().insert(session.id().clone(), session);
    }

    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    /// Removes and returns the session, if present. The caller is
    /// responsible for calling [`Session::free`] on it.
    pub fn remove(&self, id: &SessionId) -> Option<Session> {
        self.sessions.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
