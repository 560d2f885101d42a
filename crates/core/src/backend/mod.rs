//! Protocol back-end contract and the static plugin registry that
//! resolves a protocol name to one.
//!
//! A dynamic `dlopen`/`dlsym` loader against a host-namespaced shared
//! library is one way to satisfy a `load(name) -> (init_fn, binding)`
//! contract; an in-process factory registry is simpler and just as
//! valid when the set of back-ends is known at build time.

pub mod echo;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::session::{Session, DEFAULT_LAG_THRESHOLD_MS};
use crate::viewer::{NoopViewerHandlers, ViewerHandlers};

/// A protocol back-end: the thing a [`Session`] hands its display
/// pipeline over to once a plugin is loaded.
///
/// `init` is called exactly once, synchronously, from
/// [`Session::load_plugin`](crate::session::Session::load_plugin). A
/// well-behaved implementation populates `session`'s args and installs
/// its [`SessionHandlers`](crate::session::SessionHandlers)/
/// [`ViewerHandlers`](crate::viewer::ViewerHandlers) before returning,
/// then drives the display from a worker thread it spawns itself.
pub trait Backend: Send + Sync {
    /// Initializes `session` for this protocol. Returning an error
    /// aborts the plugin load; the session is not left half-configured
    /// by a well-behaved implementation.
    fn init(&self, session: &Session) -> Result<()>;

    /// Per-protocol lag ceiling (see the lag-control state machine).
    /// Defaults to the reference 500ms.
    fn lag_threshold_ms(&self) -> i64 {
        DEFAULT_LAG_THRESHOLD_MS
    }

    /// The capability object a newly-constructed viewer of this
    /// protocol should be given before it joins a session. The viewer
    /// list carries no `join` handler of its own (see
    /// [`ViewerHandlers`]), so a daemon wires this in at construction
    /// time instead of the backend reaching back in after the fact.
    fn viewer_handlers(&self) -> Arc<dyn ViewerHandlers> {
        Arc::new(NoopViewerHandlers)
    }
}

type Factory = Box<dyn Fn() -> Arc<dyn Backend> + Send + Sync>;

/// Name-to-factory lookup table satisfying the plugin loader contract.
#[derive(Default)]
pub struct BackendRegistry {
    factories: HashMap<String, Factory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` against a factory producing a fresh backend
    /// instance per [`create`](Self::create) call (mirroring a dynamic
    /// loader handing back a fresh binding per `load`).
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Backend> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Resolves `name`, returning `None` if no back-end is registered
    /// under it (the caller maps this to `CoreError::NotFound`).
    pub fn create(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.factories.get(name).map(|factory| factory())
    }

    /// A registry pre-populated with the bundled reference back-end.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("echo", || Arc::new(echo::EchoBackend::default()));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_protocol_resolves_to_none() {
        let registry = BackendRegistry::new();
        assert!(registry.create("nonexistent").is_none());
    }

    #[test]
    fn builtins_registry_resolves_echo() {
        let registry = BackendRegistry::with_builtins();
        assert!(registry.create("echo").is_some());
    }
}
