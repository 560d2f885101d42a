//! # deskproxy — session core for a remote-desktop proxy
//!
//! The core that multiplexes one backing display connection (to an
//! RDP, VNC, or similar server) onto any number of connected viewers.
//! A viewer joins a logical [`Session`](session::Session), receives a
//! live stream of display-update instructions, and may inject input
//! events back toward the backing server. Sessions are shared: many
//! viewers observe the same display, and at most one of them (the
//! owner) drives the handshake that opens the backing connection.
//!
//! ## Scope
//!
//! This crate owns per-session state (display layer/buffer/stream index
//! pools, broadcast fan-out, connection identifiers, instruction-boundary
//! framing) and the membership and lag-control state machine governing
//! the set of viewers. Everything else — the protocol back-ends
//! themselves (screen-scraping, pixel decoding), the downstream wire
//! codec, TLS, and authentication — is an external collaborator; the
//! [`backend`] module specifies only the interface the core exposes to
//! them, plus a reference implementation for testing.
//!
//! ## Crate layout
//!
//! - [`session`] — [`Session`](session::Session), the top-level entity:
//!   viewer membership, pools, broadcast socket, plugin binding.
//! - [`viewer`] — [`Viewer`](viewer::Viewer), one connected observer,
//!   and the opcode [`dispatch`](viewer::dispatch) table.
//! - [`backend`] — [`Backend`](backend::Backend) trait and the
//!   [`BackendRegistry`](backend::BackendRegistry) plugin-loader
//!   replacement, plus the bundled [`echo`](backend::echo) reference.
//! - [`socket`] — [`Socket`](socket::Socket) contract, a TCP-backed
//!   implementation, and the [`BroadcastSocket`](socket::BroadcastSocket)
//!   fan-out sink.
//! - [`idpool`], [`id`], [`layer`], [`stream`] — the small allocators and
//!   handle types the session and viewer are built from.
//! - [`registry`], [`daemon`] — ambient host-process harness: a
//!   session-id lookup table and a bare TCP listener.
//! - [`config`] — [`SessionConfig`](config::SessionConfig), tunables
//!   independent of whatever back-end loads onto a session.
//! - [`error`] — [`CoreError`] enum and [`Result`] alias.

pub mod backend;
pub mod config;
pub mod daemon;
pub mod error;
pub mod id;
pub mod idpool;
pub mod layer;
pub mod registry;
pub mod session;
pub mod socket;
pub mod stream;
pub mod viewer;
pub mod wire;

pub use config::SessionConfig;
pub use error::{CoreError, Result};
pub use id::{SessionId, ViewerId};
pub use layer::LayerIndex;
pub use session::{Session, SessionState};
pub use stream::StreamIndex;
pub use viewer::{Viewer, ViewerState};
