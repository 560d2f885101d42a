//! Layer and buffer handles.
//!
//! The wire protocol has a single signed index namespace: non-negative
//! indices name visible layers, negative indices name off-screen buffers.
//! Layer 0 is the default, always-present root layer and is never
//! allocated or freed.

/// A signed layer/buffer index as it appears on the wire.
///
/// Positive values (and zero) are layers; negative values are buffers.
/// [`Session::alloc_layer`](crate::session::Session::alloc_layer) and
/// [`Session::alloc_buffer`](crate::session::Session::alloc_buffer) hand
/// out values from independent [`IdPool`](crate::idpool::IdPool)s and map
/// the pool's `0..` indices onto this signed space: layer = `index + 1`,
/// buffer = `-index - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerIndex(i32);

impl LayerIndex {
    /// The always-present root layer.
    pub const DEFAULT: LayerIndex = LayerIndex(0);

    pub fn raw(self) -> i32 {
        self.0
    }

    pub fn is_buffer(self) -> bool {
        self.0 < 0
    }

    pub fn is_layer(self) -> bool {
        self.0 >= 0
    }

    pub(crate) fn from_layer_pool_index(index: u32) -> Self {
        Self(index as i32 + 1)
    }

    pub(crate) fn from_buffer_pool_index(index: u32) -> Self {
        Self(-(index as i32) - 1)
    }

    /// Recovers the pool index this handle was minted from. Panics if
    /// called on the wrong kind of index; callers branch on
    /// [`is_buffer`](Self::is_buffer) first.
    pub(crate) fn layer_pool_index(self) -> u32 {
        debug_assert!(self.is_layer() && self.0 != 0);
        (self.0 - 1) as u32
    }

    pub(crate) fn buffer_pool_index(self) -> u32 {
        debug_assert!(self.is_buffer());
        (-self.0 - 1) as u32
    }
}

impl std::fmt::Display for LayerIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
