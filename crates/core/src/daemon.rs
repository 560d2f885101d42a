//! Bare TCP listener hosting a single session.
//!
//! Sits outside the session core proper — the ambient harness a real
//! process needs to exercise the core over a socket. A non-blocking
//! listener polled for new connections, one thread per connection.

use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::backend::BackendRegistry;
use crate::error::Result;
use crate::id::SessionId;
use crate::registry::SessionRegistry;
use crate::session::Session;
use crate::socket::TcpSocket;
use crate::viewer::Viewer;
use crate::wire;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Hosts one [`Session`] over a plain TCP listener: the first
/// connection joins as the owner, every later one as a plain viewer.
///
/// Holds its session through a [`SessionRegistry`] rather than a bare
/// field, the way a host serving more than one session at a time would
/// need to, so looking a connection's session up by id is the same
/// lookup path regardless of how many sessions the host carries.
pub struct Daemon {
    listener: TcpListener,
    sessions: SessionRegistry,
    session_id: SessionId,
    running: Arc<AtomicBool>,
}

impl Daemon {
    /// Binds `addr`, allocates a session, and loads `protocol` onto it.
    pub fn bind(addr: &str, protocol: &str, registry: &BackendRegistry) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;

        let session = Session::alloc()?;
        session.load_plugin(protocol, registry)?;
        let session_id = session.id().clone();

        tracing::info!(addr, protocol, session_id = %session_id, "daemon bound");

        let sessions = SessionRegistry::new();
        sessions.insert(session);

        Ok(Self {
            listener,
            sessions,
            session_id,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Looks the bound session up in the registry by id.
    pub fn session(&self) -> Session {
        self.sessions
            .get(&self.session_id)
            .expect("daemon's own session was removed from its registry")
    }

    /// Handle used to stop the accept loop from another thread.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Runs the accept loop until [`stop_handle`](Self::stop_handle) is
    /// cleared. Blocks the calling thread.
    pub fn run(&self) {
        let mut owner_assigned = false;
        while self.running.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => {
                    let owner = !owner_assigned;
                    owner_assigned = true;

                    tracing::info!(%peer_addr, owner, "viewer connected");

                    let session = self.session();
                    let backend = session.plugin();
                    thread::spawn(move || {
                        handle_connection(stream, session, owner, backend);
                    });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    if self.running.load(Ordering::SeqCst) {
                        tracing::warn!(error = %e, "accept error");
                    }
                }
            }
        }
        tracing::debug!("daemon accept loop exited");
    }
}

fn handle_connection(
    stream: TcpStream,
    session: Session,
    owner: bool,
    backend: Option<Arc<dyn crate::backend::Backend>>,
) {
    let peer_addr = match stream.peer_addr() {
        Ok(addr) => addr,
        Err(_) => return,
    };

    let reader_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    };

    let socket: Arc<dyn crate::socket::Socket> = Arc::new(TcpSocket::new(stream));
    let viewer = Viewer::alloc(session.downgrade(), socket, owner);
    let viewer = match backend {
        Some(backend) => viewer.with_handlers(backend.viewer_handlers()),
        None => viewer,
    };

    // Minimal handshake ahead of add_viewer: announce the argument names
    // the loaded back-end expects, then read one `connect` instruction
    // back carrying their values in the same order.
    let expected = session.args();
    let announce = wire::encode("args", &expected.iter().map(String::as_str).collect::<Vec<_>>());
    if viewer.socket().write_all(announce.as_bytes()).is_err() {
        return;
    }

    let mut reader = BufReader::new(reader_stream);
    let handshake_args = match wire::read_instruction(&mut reader) {
        Ok(Some((opcode, argv))) if opcode == "connect" => argv,
        _ => {
            tracing::warn!(%peer_addr, "missing connect handshake");
            return;
        }
    };

    if let Err(error) = session.add_viewer(viewer.clone(), &handshake_args) {
        tracing::warn!(%peer_addr, %error, "join rejected");
        return;
    }
    while viewer.is_active() {
        match wire::read_instruction(&mut reader) {
            Ok(Some((opcode, argv))) => {
                if let Err(error) = viewer.handle_instruction(&opcode, &argv) {
                    tracing::debug!(%peer_addr, %error, opcode, "instruction rejected");
                }
            }
            Ok(None) => break,
            Err(error) => {
                tracing::debug!(%peer_addr, %error, "read error");
                break;
            }
        }
    }

    session.remove_viewer(&viewer);
    tracing::info!(%peer_addr, "viewer disconnected");
}
