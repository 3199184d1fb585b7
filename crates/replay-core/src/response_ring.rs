//! The response ring: a bounded circular buffer of platform-event waypoints
//! observed live while a replay is in flight, consulted by the engine's
//! waypoint-match loop (see [`crate::engine`]).
//!
//! There is one producer (the live platform-event source, reached via
//! [`ResponseRing::observe`]) and one consumer (the engine's match loop,
//! reached via [`ResponseRing::scan_once`] in a loop with backoff). Both
//! sides normally progress lock-free; the cursor mutex is only taken on the
//! narrow path where `read_cursor == write_cursor` — the one position where
//! the two sides could otherwise race on the same slot. The per-slot `valid`
//! flag is the publication point: the producer writes a slot's payload, then
//! sets `valid` with `Release`; the consumer only reads a slot's payload
//! after observing `valid == true` with `Acquire`. That pairing is what makes
//! the unguarded data access sound under Rust's memory model, in place of the
//! historical implementation's reliance on `volatile`-adjacent behavior.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::tuple::PlatformEvent;

pub const RESPONSE_RING_CAPACITY: usize = 100;

struct Slot {
    valid: AtomicBool,
    event: UnsafeCell<PlatformEvent>,
    deadline_us: UnsafeCell<i64>,
}

// SAFETY: `event`/`deadline_us` are only written by the producer before
// `valid` is set `Release`, and only read by the consumer after observing
// `valid == true` via `Acquire`; that happens-before edge is what makes
// concurrent access to the `UnsafeCell`s race-free.
unsafe impl Sync for Slot {}

impl Slot {
    fn empty() -> Self {
        Self {
            valid: AtomicBool::new(false),
            event: UnsafeCell::new(PlatformEvent::default()),
            deadline_us: UnsafeCell::new(0),
        }
    }
}

pub struct ResponseRing {
    slots: Box<[Slot]>,
    capacity: usize,
    write_cursor: AtomicUsize,
    read_cursor: AtomicUsize,
    cursor_lock: Mutex<()>,
    deadline_interval_us: i64,
}

impl ResponseRing {
    pub fn new(capacity: usize, deadline_interval_us: i64) -> Self {
        assert!(capacity > 1, "response ring capacity must be at least 2");
        Self {
            slots: (0..capacity).map(|_| Slot::empty()).collect(),
            capacity,
            write_cursor: AtomicUsize::new(0),
            read_cursor: AtomicUsize::new(0),
            cursor_lock: Mutex::new(()),
            deadline_interval_us,
        }
    }

    /// Producer path (§4.4.2): find a slot to overwrite — the first invalid
    /// or past-deadline slot starting at `write_cursor`, falling back to
    /// `write_cursor` itself if none is found within one full lap — write the
    /// observation into it with a fresh deadline, and advance `write_cursor`
    /// past it.
    pub fn observe(&self, event: PlatformEvent, now_us: i64) {
        let start = self.write_cursor.load(Ordering::Acquire);
        let mut target = start;
        for step in 0..self.capacity {
            let idx = (start + step) % self.capacity;
            let stale_or_invalid = !self.slots[idx].valid.load(Ordering::Acquire) || {
                // SAFETY: reading `deadline_us` here is a best-effort probe;
                // a concurrent producer write is impossible (single
                // producer) and a concurrent consumer clears `valid` before
                // this slot's payload could be re-read as stale.
                unsafe { *self.slots[idx].deadline_us.get() } <= now_us
            };
            if stale_or_invalid {
                target = idx;
                break;
            }
        }

        let locked_guard = if self.read_cursor.load(Ordering::Acquire) == self.write_cursor.load(Ordering::Acquire) {
            Some(self.cursor_lock.lock().expect("response ring cursor lock poisoned"))
        } else {
            None
        };
        // SAFETY: `target` is either an invalid slot (unread, so no consumer
        // holds a reference into it) or a slot whose deadline already
        // elapsed (the consumer will never again report it fresh); the
        // `Release` store of `valid` below publishes this write.
        unsafe {
            *self.slots[target].event.get() = event;
            *self.slots[target].deadline_us.get() = now_us + self.deadline_interval_us;
        }
        self.slots[target].valid.store(true, Ordering::Release);
        drop(locked_guard);
        self.write_cursor.store((target + 1) % self.capacity, Ordering::Release);
    }

    /// Consumer path (§4.4.1): one pass over up to `capacity` slots starting
    /// at `read_cursor`, advancing `read_cursor` by one per slot examined.
    /// Returns `true` and clears the matched slot's validity bit on a match;
    /// the caller (the engine's waypoint-match loop) is responsible for the
    /// backoff sleep between passes.
    pub fn scan_once(&self, target: &PlatformEvent) -> bool {
        for _ in 0..self.capacity {
            let read = self.read_cursor.load(Ordering::Relaxed);
            let write = self.write_cursor.load(Ordering::Acquire);
            let locked_guard = if read == write {
                Some(self.cursor_lock.lock().expect("response ring cursor lock poisoned"))
            } else {
                None
            };
            let slot = &self.slots[read];
            let matched = slot.valid.load(Ordering::Acquire) && {
                // SAFETY: `valid` observed true above with `Acquire`, pairing
                // with the producer's `Release` store in `observe`.
                unsafe { (*slot.event.get()).matches(target) }
            };
            if matched {
                slot.valid.store(false, Ordering::Release);
            }
            drop(locked_guard);
            self.read_cursor.store((read + 1) % self.capacity, Ordering::Relaxed);
            if matched {
                return true;
            }
        }
        false
    }

    #[cfg(test)]
    fn valid_count(&self) -> usize {
        self.slots.iter().filter(|s| s.valid.load(Ordering::Acquire)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evt(second_priv: i32) -> PlatformEvent {
        PlatformEvent {
            pe_type: 1,
            response_time_us: 0,
            priv_: 2,
            second_priv,
        }
    }

    #[test]
    fn observe_then_scan_matches_and_clears_validity() {
        let ring = ResponseRing::new(4, 60_000_000);
        ring.observe(evt(1), 0);
        assert_eq!(ring.valid_count(), 1);
        assert!(ring.scan_once(&evt(1)));
        assert_eq!(ring.valid_count(), 0);
    }

    #[test]
    fn scan_once_skips_non_matching_valid_slots() {
        let ring = ResponseRing::new(4, 60_000_000);
        ring.observe(evt(1), 0);
        ring.observe(evt(2), 0);
        assert!(ring.scan_once(&evt(2)));
        assert_eq!(ring.valid_count(), 1);
        assert!(ring.scan_once(&evt(1)));
        assert_eq!(ring.valid_count(), 0);
    }

    #[test]
    fn scan_once_returns_false_when_nothing_matches() {
        let ring = ResponseRing::new(4, 60_000_000);
        ring.observe(evt(1), 0);
        assert!(!ring.scan_once(&evt(99)));
        assert_eq!(ring.valid_count(), 1);
    }

    #[test]
    fn observe_overwrites_stale_slot_before_advancing_past_valid_ones() {
        let ring = ResponseRing::new(2, 1_000);
        ring.observe(evt(1), 0);
        // Second slot still free, so this does not touch slot 0.
        ring.observe(evt(2), 0);
        assert_eq!(ring.valid_count(), 2);
        // Both slots are now stale at now=5_000 (deadline was 0 + 1_000).
        ring.observe(evt(3), 5_000);
        assert_eq!(ring.valid_count(), 2);
        assert!(ring.scan_once(&evt(3)));
    }
}
