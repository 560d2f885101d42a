//! Per-viewer stream handles for the `blob`/`ack`/`end` transfer opcodes.

use std::collections::HashMap;

/// Identifies one direction of an in-flight data transfer between a
/// viewer and the session. Scoped to the viewer that opened it; the same
/// numeric value may be reused by different viewers simultaneously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamIndex(u32);

impl StreamIndex {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for StreamIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tracks which stream indices a viewer has open in each direction so
/// `blob`/`ack`/`end` can be rejected when they reference an index the
/// viewer never opened (or already closed).
#[derive(Debug, Default)]
pub struct StreamTable {
    /// Streams opened by the remote peer and accepted by a `file`/`pipe`
    /// handler, pending `blob`/`end`.
    input: HashMap<StreamIndex, ()>,
    /// Streams opened by this side via a handler's `Viewer::open_stream`,
    /// pending `ack`/`end` from the peer.
    output: HashMap<StreamIndex, ()>,
}

impl StreamTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_input(&mut self, index: StreamIndex) {
        self.input.insert(index, ());
    }

    pub fn open_output(&mut self, index: StreamIndex) {
        self.output.insert(index, ());
    }

    pub fn has_input(&self, index: StreamIndex) -> bool {
        self.input.contains_key(&index)
    }

    pub fn has_output(&self, index: StreamIndex) -> bool {
        self.output.contains_key(&index)
    }

    pub fn close_input(&mut self, index: StreamIndex) -> bool {
        self.input.remove(&index).is_some()
    }

    pub fn close_output(&mut self, index: StreamIndex) -> bool {
        self.output.remove(&index).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blob_on_unopened_stream() {
        let table = StreamTable::new();
        assert!(!table.has_input(StreamIndex::new(3)));
    }

    #[test]
    fn tracks_open_and_close_independently_per_direction() {
        let mut table = StreamTable::new();
        let idx = StreamIndex::new(1);
        table.open_input(idx);
        assert!(table.has_input(idx));
        assert!(!table.has_output(idx));

        assert!(table.close_input(idx));
        assert!(!table.has_input(idx));
        assert!(!table.close_input(idx));
    }
}
