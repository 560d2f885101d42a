//! Lowest-free integer allocator.
//!
//! Used both for the [`Session`](crate::session::Session) layer/buffer
//! index pools and, internally, as the slot allocator backing the
//! per-session viewer table.
//!
//! The smallest previously-freed integer is reused before the pool
//! grows past its high-water mark.

use std::collections::BinaryHeap;
use std::cmp::Reverse;

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct State {
    /// Free integers below `next_new`, smallest first.
    free: BinaryHeap<Reverse<u32>>,
    /// Smallest integer never yet allocated.
    next_new: u32,
}

/// Thread-safe lowest-free allocator over `u32`.
#[derive(Debug, Default)]
pub struct IdPool {
    state: Mutex<State>,
}

impl IdPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the smallest integer not currently outstanding.
    pub fn next(&self) -> u32 {
        let mut state = self.state.lock();
        if let Some(Reverse(id)) = state.free.pop() {
            return id;
        }
        let id = state.next_new;
        state.next_new += 1;
        id
    }

    /// Returns `id` to the pool so a future [`next`](Self::next) call may
    /// reissue it. Double-freeing the same id is a contract violation;
    /// this implementation does not detect it (the id is simply pushed
    /// back onto the free heap, which would make it reissuable twice).
    pub fn free(&self, id: u32) {
        self.state.lock().free.push(Reverse(id));
    }
}
