//! Monotonic clock and the short/long sleep split.
//!
//! Short sleeps (< 1ms) need hundreds-of-microseconds precision, so they block
//! directly on `nanosleep`, restarting across `EINTR` as long as the caller is
//! still alive. Long sleeps are delegated to a [`LongSleep`] implementation so
//! the hosting runtime's scheduler can yield however it natively does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Delegate for sleeps of 1ms or more. The host may run this on whatever
/// scheduler it likes (a green-thread yield, a condvar wait, a plain
/// `thread::sleep`); `replay-core` treats it as an opaque callback.
pub trait LongSleep: Send + Sync {
    fn long_sleep(&self, ms: i32);
}

/// A [`LongSleep`] that just blocks the calling OS thread. Useful for tests and
/// for hosts with no scheduler of their own to cooperate with.
#[derive(Debug, Default)]
pub struct ThreadLongSleep;

impl LongSleep for ThreadLongSleep {
    fn long_sleep(&self, ms: i32) {
        if ms > 0 {
            std::thread::sleep(Duration::from_millis(ms as u64));
        }
    }
}

/// Monotonic microsecond clock plus the short/long sleep dispatch.
pub struct Clock {
    origin: Instant,
    max_sleep_ms: i32,
    long_sleep: Box<dyn LongSleep>,
}

impl Clock {
    pub fn new(max_sleep_ms: i32, long_sleep: Box<dyn LongSleep>) -> Self {
        Self {
            origin: Instant::now(),
            max_sleep_ms,
            long_sleep,
        }
    }

    /// Microseconds since an unspecified epoch fixed at clock construction.
    /// Strictly non-decreasing.
    #[inline]
    pub fn now_micros(&self) -> i64 {
        self.origin.elapsed().as_micros() as i64
    }

    /// Sleep up to `ns` nanoseconds, tolerating `EINTR` by restarting with the
    /// remaining time. Returns early if `alive` transitions to false.
    pub fn short_sleep(&self, ns: u64, alive: &AtomicBool) {
        let mut req = libc::timespec {
            tv_sec: (ns / 1_000_000_000) as libc::time_t,
            tv_nsec: (ns % 1_000_000_000) as libc::c_long,
        };
        loop {
            if !alive.load(Ordering::Acquire) {
                return;
            }
            let mut rem = libc::timespec { tv_sec: 0, tv_nsec: 0 };
            // SAFETY: `req`/`rem` are valid stack-local timespecs; nanosleep only
            // reads `req` and, on EINTR, writes the remaining time into `rem`.
            let ret = unsafe { libc::nanosleep(&req, &mut rem) };
            if ret == 0 {
                return;
            }
            let errno = std::io::Error::last_os_error().raw_os_error();
            if errno != Some(libc::EINTR) {
                return;
            }
            req = rem;
        }
    }

    /// Delegate a sleep of `ms` milliseconds, capped at `max_sleep_ms` (when
    /// nonzero).
    pub fn long_sleep(&self, ms: i32) {
        let capped = if self.max_sleep_ms != 0 {
            ms.min(self.max_sleep_ms)
        } else {
            ms
        };
        self.long_sleep.long_sleep(capped);
    }

    /// Dispatches to `short_sleep` below 1ms, `long_sleep` at or above it.
    pub fn sleep_nanos(&self, ns: i64, alive: &AtomicBool) {
        if ns <= 0 {
            return;
        }
        const NS_PER_MS: i64 = 1_000_000;
        if ns < NS_PER_MS {
            self.short_sleep(ns as u64, alive);
        } else {
            self.long_sleep((ns / NS_PER_MS) as i32);
        }
    }
}
