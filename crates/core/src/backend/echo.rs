//! Reference protocol back-end.
//!
//! Implements no real remote-desktop protocol; it exists to exercise
//! the session core end-to-end the way an RDP or VNC back-end would: an
//! owner handshake that starts a worker thread, a frame loop that calls
//! `end_frame`, and mouse/key input echoed back onto the broadcast
//! socket as a display update.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::Result;
use crate::session::{Session, SessionHandlers, SessionState};
use crate::viewer::{Viewer, ViewerHandlers};
use crate::wire;

/// Matches the reference lag ceiling used by a typical RDP/VNC
/// back-end.
pub const ECHO_LAG_THRESHOLD_MS: i64 = 500;

const FRAME_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Default)]
pub struct EchoBackend;

impl super::Backend for EchoBackend {
    fn init(&self, session: &Session) -> Result<()> {
        session.set_args(vec!["width".to_string(), "height".to_string()]);
        session.set_handlers(Arc::new(EchoSessionHandlers));
        Ok(())
    }

    fn lag_threshold_ms(&self) -> i64 {
        ECHO_LAG_THRESHOLD_MS
    }

    fn viewer_handlers(&self) -> Arc<dyn ViewerHandlers> {
        Arc::new(EchoViewerHandlers)
    }
}

struct EchoSessionHandlers;

impl SessionHandlers for EchoSessionHandlers {
    fn on_join(&self, session: &Session, viewer: &Arc<Viewer>, args: &[String]) -> Result<()> {
        if args.len() < 2 {
            return Err(crate::error::CoreError::Protocol(
                "echo: expected width,height handshake args".to_string(),
            ));
        }

        if viewer.is_owner() {
            let session = session.clone();
            thread::spawn(move || run_frame_loop(session));
        }

        Ok(())
    }
}

/// Owner-driven frame loop: ends a frame on a fixed cadence until the
/// session stops. Mirrors the RDP/VNC worker thread started from
/// `join_handler`, minus the actual display pipeline.
fn run_frame_loop(session: Session) {
    while session.state() == SessionState::Running {
        if let Err(error) = session.end_frame() {
            tracing::warn!(session_id = %session.id(), %error, "echo frame loop: end_frame failed");
            break;
        }
        thread::sleep(FRAME_INTERVAL);
    }
    tracing::debug!(session_id = %session.id(), "echo frame loop exited");
}

struct EchoViewerHandlers;

impl ViewerHandlers for EchoViewerHandlers {
    fn on_mouse(&self, viewer: &Viewer, x: i32, y: i32, mask: u32) -> Result<()> {
        let Some(session) = viewer.session() else {
            return Ok(());
        };
        let instruction = wire::encode(
            "mouse",
            &[&x.to_string(), &y.to_string(), &mask.to_string()],
        );
        let socket = session.broadcast_socket().clone();
        socket.instruction_begin();
        socket.write_all(instruction.as_bytes())?;
        socket.instruction_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;

    #[test]
    fn init_installs_expected_handshake_args() {
        let session = Session::alloc().unwrap();
        EchoBackend.init(&session).unwrap();
        assert_eq!(session.args(), vec!["width".to_string(), "height".to_string()]);
    }

    #[test]
    fn join_without_enough_args_is_rejected() {
        let session = Session::alloc().unwrap();
        EchoBackend.init(&session).unwrap();
        let socket: Arc<dyn crate::socket::Socket> = Arc::new(crate::socket::MemorySocket::new());
        let viewer = Viewer::alloc(std::sync::Weak::new(), socket, true);
        let err = session.add_viewer(viewer, &[]).unwrap_err();
        assert!(matches!(err, crate::error::CoreError::Protocol(_)));
    }
}
