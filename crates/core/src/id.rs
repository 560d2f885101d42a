//! Opaque, globally-unique session and viewer identifiers.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::RngExt;

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a new id: a monotonic counter salted with random bits and
/// rendered as lowercase hex, so ids never collide with protocol names
/// and carry no information about allocation order to a remote peer.
fn generate() -> String {
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let salt: u64 = rand::rng().random();
    format!("{seq:016x}{salt:016x}")
}

/// Identifies a [`Session`](crate::session::Session) for the lifetime of
/// the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(generate())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies a [`Viewer`](crate::viewer::Viewer) within its session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewerId(String);

impl ViewerId {
    pub fn new() -> Self {
        Self(generate())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ViewerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ViewerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn viewer_ids_are_unique() {
        let a = ViewerId::new();
        let b = ViewerId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn ids_render_as_hex() {
        let id = SessionId::new();
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id.as_str().len(), 32);
    }
}
