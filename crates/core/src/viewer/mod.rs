//! One connected observer of a [`Session`](crate::session::Session).

pub mod dispatch;
pub mod handlers;

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::Result;
use crate::id::ViewerId;
use crate::idpool::IdPool;
use crate::session::Inner as SessionInner;
use crate::socket::Socket;
use crate::stream::{StreamIndex, StreamTable};

pub use handlers::{NoopViewerHandlers, ViewerHandlers};

/// Lag-control state. See the module-level docs on
/// [`dispatch`](self::dispatch) for the transition rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerState {
    Running,
    Suspended,
}

/// Handshake-supplied display hints for a viewer.
#[derive(Debug, Clone, Default)]
pub struct ViewerInfo {
    pub optimal_width: u32,
    pub optimal_height: u32,
    pub optimal_resolution: u32,
    pub audio_mimetypes: Option<Vec<String>>,
    pub video_mimetypes: Option<Vec<String>>,
}

/// One physical observer of a session.
///
/// Holds a non-owning back-reference to its session: a `Viewer` never
/// keeps its session alive, matching the ownership rule that a session
/// exclusively owns its viewer set while a viewer's membership is
/// transient.
pub struct Viewer {
    session: Weak<SessionInner>,
    id: ViewerId,
    owner: bool,
    active: AtomicBool,
    state: Mutex<ViewerState>,
    socket: Arc<dyn Socket>,
    last_sent_timestamp: AtomicI64,
    last_received_timestamp: AtomicI64,
    info: ViewerInfo,
    stream_pool: IdPool,
    output_streams: Mutex<StreamTable>,
    input_streams: Mutex<StreamTable>,
    /// Capability object installed by the back-end at join time. `None`
    /// means the back-end installed nothing; session-level handlers
    /// (leave/suspend/resume) are used as the fallback in that case.
    handlers: Option<Arc<dyn ViewerHandlers>>,
    /// Slot index in the owning session's viewer table; used to remove
    /// this viewer in O(1) without a linear scan.
    slot: AtomicUsize,
}

/// Sentinel written into [`Viewer::slot`] before the viewer has joined
/// a session's table.
pub const UNASSIGNED_SLOT: usize = usize::MAX;

impl Viewer {
    /// Allocates a blank viewer with no assigned socket beyond the one
    /// given, default (no-op) handlers, and `owner` as supplied by the
    /// caller. The caller connects it to a session via
    /// [`Session::add_viewer`](crate::session::Session::add_viewer).
    pub fn alloc(session: Weak<SessionInner>, socket: Arc<dyn Socket>, owner: bool) -> Arc<Self> {
        Arc::new(Self {
            session,
            id: ViewerId::new(),
            owner,
            active: AtomicBool::new(true),
            state: Mutex::new(ViewerState::Running),
            socket,
            last_sent_timestamp: AtomicI64::new(0),
            last_received_timestamp: AtomicI64::new(0),
            info: ViewerInfo::default(),
            stream_pool: IdPool::new(),
            output_streams: Mutex::new(StreamTable::new()),
            input_streams: Mutex::new(StreamTable::new()),
            handlers: None,
            slot: AtomicUsize::new(UNASSIGNED_SLOT),
        })
    }

    pub fn with_handlers(mut self: Arc<Self>, handlers: Arc<dyn ViewerHandlers>) -> Arc<Self> {
        // Viewer is only reachable via Arc by this point, but handlers is
        // set before any other thread observes it (during construction by
        // the owning join path), so get_mut is always available here.
        Arc::get_mut(&mut self)
            .expect("viewer not yet shared")
            .handlers = Some(handlers);
        self
    }

    pub fn with_info(mut self: Arc<Self>, info: ViewerInfo) -> Arc<Self> {
        Arc::get_mut(&mut self)
            .expect("viewer not yet shared")
            .info = info;
        self
    }

    pub fn id(&self) -> &ViewerId {
        &self.id
    }

    pub fn is_owner(&self) -> bool {
        self.owner
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ViewerState {
        *self.state.lock()
    }

    pub fn info(&self) -> &ViewerInfo {
        &self.info
    }

    pub fn socket(&self) -> &Arc<dyn Socket> {
        &self.socket
    }

    /// The installed capability object, if the back-end installed one.
    pub fn raw_handlers(&self) -> Option<&Arc<dyn ViewerHandlers>> {
        self.handlers.as_ref()
    }

    /// The capability object to dispatch wire events through: the
    /// installed one, or a shared no-op if none was installed.
    pub fn handlers(&self) -> Arc<dyn ViewerHandlers> {
        self.handlers
            .clone()
            .unwrap_or_else(|| Arc::new(NoopViewerHandlers))
    }

    pub fn last_sent_timestamp(&self) -> i64 {
        self.last_sent_timestamp.load(Ordering::SeqCst)
    }

    pub fn last_received_timestamp(&self) -> i64 {
        self.last_received_timestamp.load(Ordering::SeqCst)
    }

    pub(crate) fn set_last_sent_timestamp(&self, value: i64) {
        self.last_sent_timestamp.store(value, Ordering::SeqCst);
    }

    pub(crate) fn set_last_received_timestamp(&self, value: i64) {
        self.last_received_timestamp.store(value, Ordering::SeqCst);
    }

    pub(crate) fn set_state(&self, state: ViewerState) {
        *self.state.lock() = state;
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot.load(Ordering::SeqCst)
    }

    pub(crate) fn set_slot(&self, slot: usize) {
        self.slot.store(slot, Ordering::SeqCst);
    }

    /// Resolves the owning session, if it is still live.
    pub fn session(&self) -> Option<crate::session::Session> {
        self.session.upgrade().map(crate::session::Session::from_inner)
    }

    /// Borrows a stream slot from the pool, marking it open for input.
    pub fn alloc_input_stream(&self) -> StreamIndex {
        let index = StreamIndex::new(self.stream_pool.next());
        self.input_streams.lock().open_input(index);
        index
    }

    /// Borrows a stream slot from the pool, marking it open for output.
    pub fn alloc_output_stream(&self) -> StreamIndex {
        let index = StreamIndex::new(self.stream_pool.next());
        self.output_streams.lock().open_output(index);
        index
    }

    /// Returns a stream slot to the pool. Idempotent: freeing a slot
    /// that is not open in either direction is a no-op.
    pub fn free_stream(&self, index: StreamIndex) {
        let closed_in = self.input_streams.lock().close_input(index);
        let closed_out = self.output_streams.lock().close_output(index);
        if closed_in || closed_out {
            self.stream_pool.free(index.raw());
        }
    }

    pub(crate) fn has_input_stream(&self, index: StreamIndex) -> bool {
        self.input_streams.lock().has_input(index)
    }

    pub(crate) fn has_output_stream(&self, index: StreamIndex) -> bool {
        self.output_streams.lock().has_output(index)
    }

    pub(crate) fn ensure_input_stream(&self, index: StreamIndex) {
        self.input_streams.lock().open_input(index);
    }

    /// Signals that this viewer must disconnect. Cooperative and
    /// idempotent: transports poll [`is_active`](Self::is_active).
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Viewer-scoped analogue of
    /// [`Session::abort`](crate::session::Session::abort): emits the
    /// error on this viewer's own socket rather than the broadcast
    /// socket, then stops the viewer.
    pub fn abort(&self, status: i32, msg: &str) -> Result<()> {
        tracing::warn!(viewer = %self.id, status, msg, "viewer aborted");
        self.socket.instruction_begin();
        self.socket
            .write_all(crate::wire::encode_error(status, "Aborted. See logs.").as_bytes())?;
        self.socket.instruction_end()?;
        self.stop();
        Ok(())
    }

    /// Routes an inbound `(opcode, argv)` pair to the dispatcher.
    pub fn handle_instruction(self: &Arc<Self>, opcode: &str, argv: &[String]) -> Result<()> {
        dispatch::dispatch(self, opcode, argv)
    }

    /// Delegates to the owning session's log handler, if any.
    pub fn log(&self, level: tracing::Level, message: &str) {
        match level {
            tracing::Level::ERROR => tracing::error!(viewer = %self.id, "{message}"),
            tracing::Level::WARN => tracing::warn!(viewer = %self.id, "{message}"),
            tracing::Level::INFO => tracing::info!(viewer = %self.id, "{message}"),
            tracing::Level::DEBUG => tracing::debug!(viewer = %self.id, "{message}"),
            tracing::Level::TRACE => tracing::trace!(viewer = %self.id, "{message}"),
        }
    }
}
