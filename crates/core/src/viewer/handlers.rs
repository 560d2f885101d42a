//! Capability interface installed on a [`Viewer`](super::Viewer).
//!
//! Roughly a dozen wire events a back-end may care about collapse into
//! a single trait with no-op default bodies: a back-end implements only
//! the handlers it needs, and the dispatcher invokes whichever is
//! installed without ever checking for "no handler" as a special case.

use crate::error::Result;
use crate::stream::StreamIndex;
use crate::viewer::Viewer;

/// Event hooks a protocol back-end installs on a [`Viewer`] at join time.
///
/// Every method defaults to doing nothing and returning `Ok(())`, which
/// is exactly the "absence of a handler is not an error" rule from the
/// dispatch contract: an uninstalled handler and a default handler are
/// indistinguishable to the dispatcher.
pub trait ViewerHandlers: Send + Sync {
    fn on_mouse(&self, _viewer: &Viewer, _x: i32, _y: i32, _mask: u32) -> Result<()> {
        Ok(())
    }

    fn on_key(&self, _viewer: &Viewer, _keysym: u32, _pressed: bool) -> Result<()> {
        Ok(())
    }

    fn on_size(&self, _viewer: &Viewer, _width: i32, _height: i32) -> Result<()> {
        Ok(())
    }

    fn on_clipboard(&self, _viewer: &Viewer, _stream: StreamIndex, _mimetype: &str) -> Result<()> {
        Ok(())
    }

    fn on_file(
        &self,
        _viewer: &Viewer,
        _stream: StreamIndex,
        _mimetype: &str,
        _name: &str,
    ) -> Result<()> {
        Ok(())
    }

    fn on_pipe(
        &self,
        _viewer: &Viewer,
        _stream: StreamIndex,
        _mimetype: &str,
        _name: &str,
    ) -> Result<()> {
        Ok(())
    }

    fn on_ack(
        &self,
        _viewer: &Viewer,
        _stream: StreamIndex,
        _message: &str,
        _status: i32,
    ) -> Result<()> {
        Ok(())
    }

    fn on_blob(&self, _viewer: &Viewer, _stream: StreamIndex, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    fn on_end(&self, _viewer: &Viewer, _stream: StreamIndex) -> Result<()> {
        Ok(())
    }

    fn on_sync(&self, _viewer: &Viewer, _timestamp: i64) -> Result<()> {
        Ok(())
    }

    /// Fired once per frame boundary for every running viewer, after lag
    /// bookkeeping. Never reached from the wire; driven internally by
    /// [`Session::end_frame`](crate::session::Session::end_frame).
    fn on_frame(&self, _viewer: &Viewer) -> Result<()> {
        Ok(())
    }

    fn on_leave(&self, _viewer: &Viewer) -> Result<()> {
        Ok(())
    }

    fn on_suspend(&self, _viewer: &Viewer) -> Result<()> {
        Ok(())
    }

    fn on_resume(&self, _viewer: &Viewer) -> Result<()> {
        Ok(())
    }
}

/// The capability object installed on a [`Viewer`] that has not been
/// given one by its back-end: every event is silently dropped.
#[derive(Debug, Default)]
pub struct NoopViewerHandlers;

impl ViewerHandlers for NoopViewerHandlers {}
