//! Error types for the session core.

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Allocation of a session, pool, or socket failed. The caller must
    /// unwind; no partial session is ever exposed.
    #[error("out of memory")]
    OutOfMemory,

    /// [`Session::load_plugin`](crate::session::Session::load_plugin) was
    /// given a protocol name not present in the [`BackendRegistry`](crate::backend::BackendRegistry).
    #[error("no backend registered for protocol: {0}")]
    NotFound(String),

    /// A dependency (plugin binding, registry entry) violated its own
    /// contract, e.g. a backend factory produced no usable instance.
    #[error("internal error: {0}")]
    Internal(String),

    /// A per-viewer or broadcast socket operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An inbound instruction was malformed (bad arity, unparsable
    /// argument, or an unregistered stream index).
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Convenience alias for `Result<T, CoreError>`.
pub type Result<T> = std::result::Result<T, CoreError>;
