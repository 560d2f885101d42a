//! Session-level capability interface.
//!
//! A back-end installs this once, at plugin-init time, to receive the
//! handshake and lifecycle events a session does not delegate to a
//! specific viewer.

use std::sync::Arc;

use crate::error::Result;
use crate::session::Session;
use crate::viewer::Viewer;

/// Event hooks a protocol back-end installs on a [`Session`] at init.
pub trait SessionHandlers: Send + Sync {
    /// Called under the viewer-set lock, before a viewer is spliced
    /// into the table. A non-`Ok` return rejects the join: the viewer
    /// is not added to the session and the error propagates to the
    /// caller of [`Session::add_viewer`].
    fn on_join(&self, _session: &Session, _viewer: &Arc<Viewer>, _args: &[String]) -> Result<()> {
        Ok(())
    }

    /// Fallback leave handler, used when the leaving viewer installed no
    /// [`ViewerHandlers::on_leave`](crate::viewer::ViewerHandlers::on_leave)
    /// of its own.
    fn on_leave(&self, _session: &Session, _viewer: &Arc<Viewer>) -> Result<()> {
        Ok(())
    }

    fn on_suspend(&self, _session: &Session, _viewer: &Arc<Viewer>) -> Result<()> {
        Ok(())
    }

    fn on_resume(&self, _session: &Session, _viewer: &Arc<Viewer>) -> Result<()> {
        Ok(())
    }

    /// Called once during [`Session::free`]. Its return value is logged,
    /// not propagated: `free` never fails because a back-end's cleanup
    /// hook failed.
    fn on_free(&self, _session: &Session) -> Result<()> {
        Ok(())
    }

    fn on_log(&self, _session: &Session, level: tracing::Level, message: &str) {
        match level {
            tracing::Level::ERROR => tracing::error!("{message}"),
            tracing::Level::WARN => tracing::warn!("{message}"),
            tracing::Level::INFO => tracing::info!("{message}"),
            tracing::Level::DEBUG => tracing::debug!("{message}"),
            tracing::Level::TRACE => tracing::trace!("{message}"),
        }
    }
}

/// The capability object a freshly-allocated session carries before a
/// plugin installs its own.
#[derive(Debug, Default)]
pub struct NoopSessionHandlers;

impl SessionHandlers for NoopSessionHandlers {}
