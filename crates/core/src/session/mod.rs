//! The session core: owns viewer membership, display index pools, the
//! broadcast fan-out socket, and the protocol-plugin binding.

pub mod handlers;

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::backend::Backend;
use crate::config::SessionConfig;
use crate::error::{CoreError, Result};
use crate::id::SessionId;
use crate::idpool::IdPool;
use crate::layer::LayerIndex;
use crate::socket::{BroadcastSocket, BroadcastTarget, Socket};
use crate::viewer::{Viewer, ViewerState};
use crate::wire;

pub use handlers::{NoopSessionHandlers, SessionHandlers};

/// Default lag ceiling, used until a back-end's [`Backend::lag_threshold_ms`]
/// overrides it during [`Session::load_plugin`].
pub const DEFAULT_LAG_THRESHOLD_MS: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Stopping,
}

/// O(1) insert/remove viewer container: a slab indexed by the slot
/// `IdPool` hands out, with each [`Viewer`] remembering its own slot so
/// removal never scans.
#[derive(Default)]
struct ViewerTable {
    slots: Vec<Option<Arc<Viewer>>>,
    slot_pool: IdPool,
}

impl ViewerTable {
    fn insert(&mut self, viewer: Arc<Viewer>) {
        let slot = self.slot_pool.next() as usize;
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }
        viewer.set_slot(slot);
        self.slots[slot] = Some(viewer);
    }

    fn remove(&mut self, viewer: &Arc<Viewer>) {
        let slot = viewer.slot();
        if slot != crate::viewer::UNASSIGNED_SLOT {
            if let Some(entry) = self.slots.get_mut(slot) {
                *entry = None;
            }
            self.slot_pool.free(slot as u32);
        }
    }

    fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn iter(&self) -> impl Iterator<Item = &Arc<Viewer>> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }
}

/// Opaque handle a plugin loader hands back alongside its init function;
/// released (dropped) when the session frees.
pub type PluginBinding = Arc<dyn Backend>;

/// The session's actual state, reached only through [`Session`]. Lives
/// behind `Arc::new_cyclic` so the broadcast socket can hold a
/// non-owning [`Weak`](std::sync::Weak) back-reference to it.
pub struct Inner {
    id: SessionId,
    state: Mutex<SessionState>,
    last_sent_timestamp: AtomicI64,
    lag_threshold_ms: AtomicI64,
    layer_pool: IdPool,
    buffer_pool: IdPool,
    viewers: Mutex<ViewerTable>,
    viewer_count: AtomicUsize,
    broadcast_socket: Arc<dyn Socket>,
    plugin_binding: Mutex<Option<PluginBinding>>,
    handlers: RwLock<Arc<dyn SessionHandlers>>,
    args: Mutex<Vec<String>>,
}

impl BroadcastTarget for Inner {
    fn running_viewers(&self) -> Vec<Arc<Viewer>> {
        self.viewers
            .lock()
            .iter()
            .filter(|v| v.state() == ViewerState::Running)
            .cloned()
            .collect()
    }
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Handle to a session. Cheap to clone; every clone shares the same
/// underlying [`Inner`].
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Creates an empty, `Running` session: allocates `id`, both index
    /// pools, and the broadcast socket. Pools and the socket are plain
    /// Rust values with no fallible sub-allocations, so this cannot
    /// itself fail with `OutOfMemory` today; the signature still
    /// returns `Result` so a future resource-limited allocator, or a
    /// caller wrapping this in its own budget check, can surface one
    /// without an API break.
    pub fn alloc() -> Result<Session> {
        Self::with_config(SessionConfig::default())
    }

    /// Creates an empty, `Running` session using `config`'s tunables
    /// instead of the defaults.
    pub fn with_config(config: SessionConfig) -> Result<Session> {
        let inner = Arc::new_cyclic(|weak: &std::sync::Weak<Inner>| Inner {
            id: SessionId::new(),
            state: Mutex::new(SessionState::Running),
            last_sent_timestamp: AtomicI64::new(now_millis()),
            lag_threshold_ms: AtomicI64::new(config.lag_threshold_ms),
            layer_pool: IdPool::new(),
            buffer_pool: IdPool::new(),
            viewers: Mutex::new(ViewerTable::default()),
            viewer_count: AtomicUsize::new(0),
            broadcast_socket: Arc::new(BroadcastSocket::new(weak.clone())),
            plugin_binding: Mutex::new(None),
            handlers: RwLock::new(Arc::new(NoopSessionHandlers)),
            args: Mutex::new(Vec::new()),
        });
        tracing::debug!(session_id = %inner.id, "session allocated");
        Ok(Session { inner })
    }

    /// Wraps an existing `Inner` (as resolved from a
    /// [`Viewer`]'s back-reference) in the public handle type.
    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    /// A non-owning reference suitable for [`Viewer::alloc`]'s
    /// back-reference parameter.
    pub fn downgrade(&self) -> std::sync::Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    pub fn id(&self) -> &SessionId {
        &self.inner.id
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    pub fn last_sent_timestamp(&self) -> i64 {
        self.inner.last_sent_timestamp.load(Ordering::SeqCst)
    }

    pub fn viewer_count(&self) -> usize {
        self.inner.viewer_count.load(Ordering::SeqCst)
    }

    pub fn broadcast_socket(&self) -> &Arc<dyn Socket> {
        &self.inner.broadcast_socket
    }

    pub fn args(&self) -> Vec<String> {
        self.inner.args.lock().clone()
    }

    pub fn set_args(&self, args: Vec<String>) {
        *self.inner.args.lock() = args;
    }

    pub fn set_lag_threshold_ms(&self, threshold: i64) {
        self.inner.lag_threshold_ms.store(threshold, Ordering::SeqCst);
    }

    pub fn lag_threshold_ms(&self) -> i64 {
        self.inner.lag_threshold_ms.load(Ordering::SeqCst)
    }

    pub fn set_handlers(&self, handlers: Arc<dyn SessionHandlers>) {
        *self.inner.handlers.write() = handlers;
    }

    fn handlers(&self) -> Arc<dyn SessionHandlers> {
        self.inner.handlers.read().clone()
    }

    /// Resolves `protocol_name` in `registry`, stores the returned
    /// back-end as the plugin binding, and calls its `init`.
    pub fn load_plugin(
        &self,
        protocol_name: &str,
        registry: &crate::backend::BackendRegistry,
    ) -> Result<()> {
        let backend = registry
            .create(protocol_name)
            .ok_or_else(|| CoreError::NotFound(protocol_name.to_string()))?;

        self.set_lag_threshold_ms(backend.lag_threshold_ms());
        let result = backend.init(self);
        *self.inner.plugin_binding.lock() = Some(backend);
        result
    }

    /// The currently-loaded back-end, if [`load_plugin`](Self::load_plugin)
    /// has succeeded.
    pub fn plugin(&self) -> Option<PluginBinding> {
        self.inner.plugin_binding.lock().clone()
    }

    pub fn alloc_layer(&self) -> LayerIndex {
        LayerIndex::from_layer_pool_index(self.inner.layer_pool.next())
    }

    pub fn alloc_buffer(&self) -> LayerIndex {
        LayerIndex::from_buffer_pool_index(self.inner.buffer_pool.next())
    }

    pub fn free_layer(&self, layer: LayerIndex) {
        debug_assert!(layer.is_layer() && layer.raw() != 0);
        self.inner.layer_pool.free(layer.layer_pool_index());
    }

    pub fn free_buffer(&self, buffer: LayerIndex) {
        debug_assert!(buffer.is_buffer());
        self.inner.buffer_pool.free(buffer.buffer_pool_index());
    }

    /// Invokes the join handler with `args` under the viewer-set lock;
    /// on success, splices `viewer` into the table and increments
    /// `viewer_count` before releasing it. On failure the viewer is not
    /// added and the error propagates.
    pub fn add_viewer(&self, viewer: Arc<Viewer>, args: &[String]) -> Result<()> {
        let mut table = self.inner.viewers.lock();
        self.handlers().on_join(self, &viewer, args)?;
        table.insert(viewer.clone());
        let count = table.len();
        drop(table);
        self.inner.viewer_count.store(count, Ordering::SeqCst);

        tracing::info!(
            session_id = %self.id(),
            viewer_id = %viewer.id(),
            owner = viewer.is_owner(),
            "viewer joined"
        );
        Ok(())
    }

    /// Removes `viewer` from the table, calling its leave handler under
    /// the same lock acquisition. Calling this more than once for the
    /// same viewer is a contract violation the table does not detect:
    /// the second call observes
    /// [`UNASSIGNED_SLOT`](crate::viewer::UNASSIGNED_SLOT) and is a no-op,
    /// but a third viewer that happened to be issued the freed slot could
    /// be evicted by a careless double-remove, so callers must not do it.
    pub fn remove_viewer(&self, viewer: &Arc<Viewer>) {
        let mut table = self.inner.viewers.lock();
        let handler_result = match viewer.raw_handlers() {
            Some(h) => h.on_leave(viewer),
            None => self.handlers().on_leave(self, viewer),
        };
        if let Err(error) = handler_result {
            tracing::debug!(viewer_id = %viewer.id(), %error, "leave handler failed");
        }

        table.remove(viewer);
        let count = table.len();
        drop(table);
        self.inner.viewer_count.store(count, Ordering::SeqCst);

        tracing::info!(session_id = %self.id(), viewer_id = %viewer.id(), "viewer left");
    }

    pub fn suspend_viewer(&self, viewer: &Arc<Viewer>) {
        self.inner.broadcast_socket.instruction_begin();
        viewer.set_state(ViewerState::Suspended);
        let _ = self.inner.broadcast_socket.instruction_end();

        let handler_result = match viewer.raw_handlers() {
            Some(h) => h.on_suspend(viewer),
            None => self.handlers().on_suspend(self, viewer),
        };
        if let Err(error) = handler_result {
            tracing::debug!(viewer_id = %viewer.id(), %error, "suspend handler failed");
        }
        tracing::debug!(viewer_id = %viewer.id(), "viewer suspended");
    }

    pub fn resume_viewer(&self, viewer: &Arc<Viewer>) {
        self.inner.broadcast_socket.instruction_begin();
        viewer.set_state(ViewerState::Running);
        let _ = self.inner.broadcast_socket.instruction_end();

        let handler_result = match viewer.raw_handlers() {
            Some(h) => h.on_resume(viewer),
            None => self.handlers().on_resume(self, viewer),
        };
        if let Err(error) = handler_result {
            tracing::debug!(viewer_id = %viewer.id(), %error, "resume handler failed");
        }
        tracing::debug!(viewer_id = %viewer.id(), "viewer resumed");
    }

    /// Visits every `Running` viewer in slot order. `f` must not call
    /// back into `add_viewer`/`remove_viewer`/`for_each_viewer` on this
    /// session: the viewer-set lock is held for the duration.
    pub fn for_each_viewer(&self, mut f: impl FnMut(&Arc<Viewer>)) {
        let table = self.inner.viewers.lock();
        for viewer in table.iter() {
            if viewer.state() == ViewerState::Running {
                f(viewer);
            }
        }
    }

    /// Snapshot of every `Running` viewer, taken under the lock and then
    /// released — used by callers (like `end_frame`) that need to call
    /// back into session operations per viewer, which `for_each_viewer`
    /// forbids while the lock is held.
    fn running_viewers_snapshot(&self) -> Vec<Arc<Viewer>> {
        self.inner
            .viewers
            .lock()
            .iter()
            .filter(|v| v.state() == ViewerState::Running)
            .cloned()
            .collect()
    }

    /// Marks the frame boundary: updates `last_sent_timestamp`, emits a
    /// `sync` instruction on the broadcast socket, then runs per-viewer
    /// lag bookkeeping (updating each running viewer's
    /// `last_sent_timestamp`, suspending it if lag has crossed the
    /// threshold, and firing its `frame` handler).
    pub fn end_frame(&self) -> Result<()> {
        let timestamp = now_millis();
        self.inner.last_sent_timestamp.store(timestamp, Ordering::SeqCst);

        self.inner.broadcast_socket.instruction_begin();
        self.inner
            .broadcast_socket
            .write_all(wire::encode_sync(timestamp).as_bytes())?;
        self.inner.broadcast_socket.instruction_end()?;

        let threshold = self.lag_threshold_ms();
        for viewer in self.running_viewers_snapshot() {
            viewer.set_last_sent_timestamp(timestamp);
            let lag = timestamp - viewer.last_received_timestamp();
            if viewer.state() == ViewerState::Running && lag >= threshold {
                self.suspend_viewer(&viewer);
            }

            let handlers = viewer.handlers();
            if let Err(error) = handlers.on_frame(&viewer) {
                tracing::debug!(viewer_id = %viewer.id(), %error, "frame handler failed");
            }
        }

        Ok(())
    }

    /// Cooperative shutdown. Monotone: once `Stopping`, `stop` again is
    /// a no-op.
    pub fn stop(&self) {
        *self.inner.state.lock() = SessionState::Stopping;
    }

    /// Logs `msg`, emits a terminal `error` instruction on the broadcast
    /// socket, flushes it, then stops. A no-op once the session is
    /// already `Stopping`.
    pub fn abort(&self, status: i32, msg: &str) -> Result<()> {
        if self.state() != SessionState::Running {
            return Ok(());
        }

        tracing::error!(session_id = %self.id(), status, msg, "session aborted");
        self.inner.broadcast_socket.instruction_begin();
        self.inner
            .broadcast_socket
            .write_all(wire::encode_error(status, "Aborted. See logs.").as_bytes())?;
        self.inner.broadcast_socket.instruction_end()?;
        self.inner.broadcast_socket.flush()?;
        self.stop();
        Ok(())
    }

    /// Drains every viewer by repeated [`remove_viewer`](Self::remove_viewer),
    /// runs the free handler (errors logged, not propagated), and
    /// releases the plugin binding.
    pub fn free(&self) {
        loop {
            let next = self.inner.viewers.lock().iter().next().cloned();
            match next {
                Some(viewer) => self.remove_viewer(&viewer),
                None => break,
            }
        }

        if let Err(error) = self.handlers().on_free(self) {
            tracing::debug!(session_id = %self.id(), %error, "free handler failed");
        }

        self.inner.plugin_binding.lock().take();
        tracing::debug!(session_id = %self.id(), "session freed");
    }

    pub fn log(&self, level: tracing::Level, message: &str) {
        self.handlers().on_log(self, level, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::MemorySocket;
    use std::sync::Weak;

    /// A viewer with a real back-reference into `session`, for tests
    /// that exercise `sync`-triggered resume (which resolves the
    /// session through the viewer), plus a handle to its memory socket
    /// so the test can inspect what was written to it.
    fn viewer_for(session: &Session, owner: bool) -> (Arc<Viewer>, Arc<MemorySocket>) {
        let memory = Arc::new(MemorySocket::new());
        let socket: Arc<dyn Socket> = memory.clone();
        let viewer = Viewer::alloc(Arc::downgrade(&session.inner), socket, owner);
        (viewer, memory)
    }

    // Most tests below construct viewers without a real back-reference,
    // since the lag-control and fan-out behavior under test does not
    // depend on the viewer being able to resolve its own session.
    fn bare_viewer(owner: bool) -> (Arc<Viewer>, Arc<MemorySocket>) {
        let memory = Arc::new(MemorySocket::new());
        let socket: Arc<dyn Socket> = memory.clone();
        let viewer = Viewer::alloc(Weak::new(), socket, owner);
        (viewer, memory)
    }

    #[test]
    fn with_config_overrides_default_lag_threshold() {
        let session = Session::with_config(SessionConfig::default().with_lag_threshold_ms(50))
            .unwrap();
        assert_eq!(session.lag_threshold_ms(), 50);
    }

    #[test]
    fn alloc_layer_skips_reserved_default() {
        let session = Session::alloc().unwrap();
        let l1 = session.alloc_layer();
        assert_eq!(l1.raw(), 1);
    }

    #[test]
    fn layer_pool_reuses_freed_index() {
        let session = Session::alloc().unwrap();
        let l1 = session.alloc_layer();
        let l2 = session.alloc_layer();
        let l3 = session.alloc_layer();
        assert_eq!((l1.raw(), l2.raw(), l3.raw()), (1, 2, 3));
        session.free_layer(l2);
        let l4 = session.alloc_layer();
        assert_eq!(l4.raw(), 2);
    }

    #[test]
    fn buffer_indices_are_negative_and_reusable() {
        let session = Session::alloc().unwrap();
        let b1 = session.alloc_buffer();
        let b2 = session.alloc_buffer();
        assert_eq!((b1.raw(), b2.raw()), (-1, -2));
        session.free_buffer(b1);
        let b3 = session.alloc_buffer();
        assert_eq!(b3.raw(), -1);
    }

    #[test]
    fn add_and_remove_viewer_keeps_count_consistent() {
        let session = Session::alloc().unwrap();
        let (v1, _) = bare_viewer(true);
        let (v2, _) = bare_viewer(false);
        session.add_viewer(v1.clone(), &[]).unwrap();
        session.add_viewer(v2.clone(), &[]).unwrap();
        assert_eq!(session.viewer_count(), 2);

        session.remove_viewer(&v2);
        assert_eq!(session.viewer_count(), 1);
    }

    #[test]
    fn broadcast_reaches_every_running_viewer() {
        let session = Session::alloc().unwrap();
        let (v1, s1) = bare_viewer(true);
        let (v2, s2) = bare_viewer(false);
        session.add_viewer(v1.clone(), &[]).unwrap();
        session.add_viewer(v2.clone(), &[]).unwrap();

        let socket = session.broadcast_socket().clone();
        socket.instruction_begin();
        socket.write_all(b"1.0;").unwrap();
        socket.instruction_end().unwrap();

        assert_eq!(s1.sent(), b"1.0;");
        assert_eq!(s2.sent(), b"1.0;");
    }

    /// A socket that always errors, standing in for a viewer whose
    /// connection has already died.
    #[derive(Default)]
    struct FailingSocket;

    impl Socket for FailingSocket {
        fn write_all(&self, _buf: &[u8]) -> Result<()> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into())
        }
        fn instruction_begin(&self) {}
        fn instruction_end(&self) -> Result<()> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into())
        }
        fn flush(&self) -> Result<()> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into())
        }
    }

    #[test]
    fn broadcast_write_failure_stops_only_that_viewer() {
        let session = Session::alloc().unwrap();
        let (good, s_good) = bare_viewer(true);
        let bad: Arc<Viewer> = Viewer::alloc(Weak::new(), Arc::new(FailingSocket), false);
        session.add_viewer(good.clone(), &[]).unwrap();
        session.add_viewer(bad.clone(), &[]).unwrap();

        let socket = session.broadcast_socket().clone();
        socket.instruction_begin();
        socket.write_all(b"1.0;").unwrap();
        socket.instruction_end().unwrap();

        assert_eq!(s_good.sent(), b"1.0;");
        assert!(!bad.is_active());
        assert!(good.is_active());
        assert_eq!(session.viewer_count(), 2, "a stopped viewer is still in the table until removed");
    }

    #[test]
    fn suspended_viewer_receives_no_broadcast_bytes() {
        let session = Session::alloc().unwrap();
        let (v, s) = bare_viewer(true);
        session.add_viewer(v.clone(), &[]).unwrap();
        session.suspend_viewer(&v);
        assert_eq!(v.state(), ViewerState::Suspended);

        let socket = session.broadcast_socket().clone();
        socket.instruction_begin();
        socket.write_all(b"1.0;").unwrap();
        socket.instruction_end().unwrap();
        assert!(s.sent().is_empty());

        session.resume_viewer(&v);
        assert_eq!(v.state(), ViewerState::Running);
    }

    #[test]
    fn end_frame_suspends_viewer_over_lag_threshold() {
        let session = Session::alloc().unwrap();
        session.set_lag_threshold_ms(500);
        let (v, _) = bare_viewer(true);
        session.add_viewer(v.clone(), &[]).unwrap();

        // Force end_frame's internal timestamp far enough ahead that
        // lag exceeds the threshold regardless of wall-clock timing.
        v.set_last_received_timestamp(now_millis() - 600);
        session.end_frame().unwrap();
        assert_eq!(v.state(), ViewerState::Suspended);
    }

    #[test]
    fn sync_with_matching_timestamp_resumes_suspended_viewer() {
        let session = Session::alloc().unwrap();
        session.set_lag_threshold_ms(500);
        let (v, _) = viewer_for(&session, true);
        session.add_viewer(v.clone(), &[]).unwrap();

        v.set_last_sent_timestamp(1000);
        session.suspend_viewer(&v);
        assert_eq!(v.state(), ViewerState::Suspended);

        crate::viewer::dispatch::dispatch(&v, "sync", &["900".to_string()]).unwrap();
        assert_eq!(v.state(), ViewerState::Suspended, "non-matching sync must not resume");

        crate::viewer::dispatch::dispatch(&v, "sync", &["1000".to_string()]).unwrap();
        assert_eq!(v.state(), ViewerState::Running);
    }

    #[test]
    fn stop_is_idempotent_and_monotone() {
        let session = Session::alloc().unwrap();
        session.stop();
        assert_eq!(session.state(), SessionState::Stopping);
        session.stop();
        assert_eq!(session.state(), SessionState::Stopping);
    }

    #[test]
    fn abort_is_a_noop_once_stopping() {
        let session = Session::alloc().unwrap();
        session.abort(500, "boom").unwrap();
        assert_eq!(session.state(), SessionState::Stopping);
        // Second abort must not emit another instruction or error.
        session.abort(500, "boom again").unwrap();
    }
}
