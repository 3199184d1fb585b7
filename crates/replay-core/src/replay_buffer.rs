//! The replay buffer pair: double-buffered chunk handoff between the feeder
//! (writer side) and the replay engine (reader side).
//!
//! Each slot is a [`std::sync::Mutex`]-guarded [`ReplayBufferSlot`]. The
//! round-robin protocol in [`BufferPair`] (reader/next-read/writer cursors)
//! ensures the feeder and the engine never address the same slot at the same
//! time in correct usage; the mutex exists as the safety net that makes that
//! property a compile-time guarantee rather than a convention, and keeps each
//! critical section to a single operation (`admit`, `append`, `take`) rather
//! than a guard held open across a whole chunk.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::ReplayError;
use crate::invariants::{debug_assert_cursor_bounded, debug_assert_elastic_matches_size};
use crate::tuple::ReplayTuple;

/// One chunk's worth of recorded tuples: a fixed region sized at init, plus an
/// elastic region allocated on demand when a chunk's `size` exceeds it.
pub struct ReplayBufferSlot {
    sn: i64,
    size: usize,
    cursor: usize,
    default_size: usize,
    fixed: Box<[ReplayTuple]>,
    elastic: Option<Box<[ReplayTuple]>>,
}

impl ReplayBufferSlot {
    fn new(default_size: usize) -> Self {
        Self {
            sn: 0,
            size: 0,
            cursor: 0,
            default_size,
            fixed: vec![ReplayTuple::default(); default_size].into_boxed_slice(),
            elastic: None,
        }
    }

    /// Binds a new chunk to this slot. Reallocates the elastic area only when
    /// `size` differs from the slot's previous `size` (INV-BUF-02). Fails
    /// with [`ReplayError::ElasticAllocationFailed`] rather than aborting the
    /// process if the elastic area cannot be allocated (§7).
    pub fn admit(&mut self, sn: i64, size: usize) -> Result<(), ReplayError> {
        if size != self.size {
            self.elastic = if size > self.default_size {
                let elastic_len = size - self.default_size;
                let mut buf: Vec<ReplayTuple> = Vec::new();
                buf.try_reserve_exact(elastic_len)
                    .map_err(|_| ReplayError::ElasticAllocationFailed { requested: elastic_len })?;
                buf.resize(elastic_len, ReplayTuple::default());
                Some(buf.into_boxed_slice())
            } else {
                None
            };
        }
        self.sn = sn;
        self.size = size;
        self.cursor = 0;
        debug_assert_elastic_matches_size!(self.elastic.is_some(), self.size, self.default_size);
        Ok(())
    }

    /// Writes `tuple` at the current cursor and advances it. Panics if the
    /// slot is already full; callers must check [`ReplayBufferSlot::is_full`]
    /// first (the feeder does, via `is_fetching`/chunk bookkeeping).
    pub fn append(&mut self, tuple: ReplayTuple) {
        let idx = self.cursor;
        if idx < self.default_size {
            self.fixed[idx] = tuple;
        } else {
            self.elastic.as_mut().expect("elastic area sized for this index")[idx - self.default_size] = tuple;
        }
        self.cursor += 1;
        debug_assert_cursor_bounded!(self.cursor, self.size);
    }

    #[inline]
    pub fn tuple_at(&self, cursor: usize) -> ReplayTuple {
        if cursor < self.default_size {
            self.fixed[cursor]
        } else {
            self.elastic.as_ref().expect("elastic area sized for this index")[cursor - self.default_size]
        }
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn sn(&self) -> i64 {
        self.sn
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.cursor >= self.size
    }

    pub fn reset_cursor_for_read(&mut self) {
        self.cursor = 0;
    }

    /// Advances the cursor by one after the engine dispatches `tuple_at(cursor)`.
    pub fn advance_cursor(&mut self) {
        self.cursor += 1;
        debug_assert_cursor_bounded!(self.cursor, self.size);
    }
}

/// Exactly two [`ReplayBufferSlot`]s, indexed by three round-robin cursors:
/// `writer_slot` (the feeder's target), `reader_slot` (the engine's current
/// slot), `next_read_slot` (the engine's next slot). See
/// [`crate::feeder::Feeder`] and [`crate::engine::ReplayEngine`] for the
/// operations that drive these cursors.
pub struct BufferPair {
    slots: [Mutex<ReplayBufferSlot>; 2],
    reader_slot: AtomicUsize,
    next_read_slot: AtomicUsize,
    writer_slot: AtomicUsize,
}

impl BufferPair {
    pub fn new(default_size: usize) -> Self {
        Self {
            slots: [
                Mutex::new(ReplayBufferSlot::new(default_size)),
                Mutex::new(ReplayBufferSlot::new(default_size)),
            ],
            reader_slot: AtomicUsize::new(0),
            next_read_slot: AtomicUsize::new(0),
            writer_slot: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn writer_slot_index(&self) -> usize {
        self.writer_slot.load(Ordering::Acquire)
    }

    #[inline]
    pub fn writer(&self) -> MutexGuard<'_, ReplayBufferSlot> {
        self.slots[self.writer_slot_index()].lock().expect("replay buffer slot poisoned")
    }

    /// Advances `writer_slot` to the other slot; called once a chunk completes.
    pub fn advance_writer(&self) {
        let cur = self.writer_slot.load(Ordering::Acquire);
        self.writer_slot.store(1 - cur, Ordering::Release);
    }

    #[inline]
    pub fn reader_slot_index(&self) -> usize {
        self.reader_slot.load(Ordering::Acquire)
    }

    #[inline]
    pub fn reader(&self) -> MutexGuard<'_, ReplayBufferSlot> {
        self.slots[self.reader_slot_index()].lock().expect("replay buffer slot poisoned")
    }

    /// `take()`: advances `reader_slot := next_read_slot`, flips
    /// `next_read_slot`, and returns the newly-current slot ready for reading.
    pub fn take(&self) -> MutexGuard<'_, ReplayBufferSlot> {
        let next = self.next_read_slot.load(Ordering::Acquire);
        self.reader_slot.store(next, Ordering::Release);
        self.next_read_slot.store(1 - next, Ordering::Release);
        let mut slot = self.slots[next].lock().expect("replay buffer slot poisoned");
        slot.reset_cursor_for_read();
        slot
    }
}
