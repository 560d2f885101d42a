//! Wire transport and instruction-atomic buffering.
//!
//! Every instruction must reach a peer as a single write, even though it
//! is built up from several `write_all` calls (opcode, each argument,
//! terminator). [`instruction_begin`](Socket::instruction_begin) switches
//! a socket into buffering mode; [`instruction_end`](Socket::instruction_end)
//! flushes the accumulated buffer as one underlying write and switches
//! back. Concurrent instructions on the same socket serialize on the
//! socket's internal lock rather than interleaving.

use std::io::Write;
use std::net::TcpStream;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::Result;
use crate::viewer::Viewer;

/// A destination a session or viewer can write instructions to.
pub trait Socket: Send + Sync {
    /// Writes raw bytes. Outside an instruction bracket this issues an
    /// underlying write immediately; inside one it appends to the
    /// pending buffer.
    fn write_all(&self, buf: &[u8]) -> Result<()>;

    /// Begins buffering writes for one instruction.
    fn instruction_begin(&self);

    /// Flushes the buffered instruction as a single underlying write.
    fn instruction_end(&self) -> Result<()>;

    /// Forces any buffered bytes out immediately, outside of an
    /// instruction bracket. Used on shutdown paths.
    fn flush(&self) -> Result<()>;
}

struct SocketState {
    stream: TcpStream,
    buffering: bool,
    buffer: Vec<u8>,
}

/// A [`Socket`] backed by a single TCP connection to one viewer.
pub struct TcpSocket {
    state: Mutex<SocketState>,
}

impl TcpSocket {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            state: Mutex::new(SocketState {
                stream,
                buffering: false,
                buffer: Vec::new(),
            }),
        }
    }
}

impl Socket for TcpSocket {
    fn write_all(&self, buf: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if state.buffering {
            state.buffer.extend_from_slice(buf);
            Ok(())
        } else {
            state.stream.write_all(buf)?;
            Ok(())
        }
    }

    fn instruction_begin(&self) {
        let mut state = self.state.lock();
        state.buffering = true;
    }

    fn instruction_end(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.buffering = false;
        if !state.buffer.is_empty() {
            let pending = std::mem::take(&mut state.buffer);
            state.stream.write_all(&pending)?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.buffer.is_empty() {
            let pending = std::mem::take(&mut state.buffer);
            state.stream.write_all(&pending)?;
        }
        state.stream.flush()?;
        Ok(())
    }
}

/// An in-memory [`Socket`] used in tests and by non-network backends.
#[derive(Default)]
pub struct MemorySocket {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    sent: Vec<u8>,
    buffering: bool,
    buffer: Vec<u8>,
}

impl MemorySocket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything written so far (including instruction framing).
    pub fn sent(&self) -> Vec<u8> {
        self.state.lock().sent.clone()
    }
}

impl Socket for MemorySocket {
    fn write_all(&self, buf: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if state.buffering {
            state.buffer.extend_from_slice(buf);
        } else {
            state.sent.extend_from_slice(buf);
        }
        Ok(())
    }

    fn instruction_begin(&self) {
        self.state.lock().buffering = true;
    }

    fn instruction_end(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.buffering = false;
        let pending = std::mem::take(&mut state.buffer);
        state.sent.extend_from_slice(&pending);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        let pending = std::mem::take(&mut state.buffer);
        state.sent.extend_from_slice(&pending);
        Ok(())
    }
}

/// Source of the session-scoped `BroadcastSocket`'s fan-out: anything
/// that can hand back the set of currently-running viewers. Hands back
/// the viewer itself, not just its socket, so a failed write can stop
/// that viewer alone without the broadcast socket needing to know
/// anything about session membership.
pub trait BroadcastTarget: Send + Sync {
    fn running_viewers(&self) -> Vec<Arc<Viewer>>;
}

/// A [`Socket`] that fans every write out to all running viewers of a
/// session. Holds only a non-owning [`Weak`] reference back to the
/// session so the session's `Arc` graph has no cycle: the session owns
/// this socket, and this socket never keeps the session alive.
pub struct BroadcastSocket<T: BroadcastTarget + ?Sized> {
    target: Weak<T>,
}

impl<T: BroadcastTarget + ?Sized> BroadcastSocket<T> {
    pub fn new(target: Weak<T>) -> Self {
        Self { target }
    }
}

impl<T: BroadcastTarget + ?Sized + 'static> Socket for BroadcastSocket<T> {
    fn write_all(&self, buf: &[u8]) -> Result<()> {
        let Some(target) = self.target.upgrade() else {
            return Ok(());
        };
        for viewer in target.running_viewers() {
            if let Err(error) = viewer.socket().write_all(buf) {
                tracing::debug!(viewer_id = %viewer.id(), %error, "broadcast write failed, stopping viewer");
                viewer.stop();
            }
        }
        Ok(())
    }

    fn instruction_begin(&self) {
        let Some(target) = self.target.upgrade() else {
            return;
        };
        for viewer in target.running_viewers() {
            viewer.socket().instruction_begin();
        }
    }

    fn instruction_end(&self) -> Result<()> {
        let Some(target) = self.target.upgrade() else {
            return Ok(());
        };
        for viewer in target.running_viewers() {
            if let Err(error) = viewer.socket().instruction_end() {
                tracing::debug!(viewer_id = %viewer.id(), %error, "broadcast flush failed, stopping viewer");
                viewer.stop();
            }
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let Some(target) = self.target.upgrade() else {
            return Ok(());
        };
        for viewer in target.running_viewers() {
            if let Err(error) = viewer.socket().flush() {
                tracing::debug!(viewer_id = %viewer.id(), %error, "broadcast flush failed, stopping viewer");
                viewer.stop();
            }
        }
        Ok(())
    }
}
