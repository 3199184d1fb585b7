//! The replay engine: the consumer thread that drains admitted chunks from
//! the [`BufferPair`], dispatches each tuple (kernel write or platform-event
//! wait), and tracks the state machine that the [`crate::feeder::Feeder`]
//! drives from the other side.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use log::{debug, error, warn};

use crate::backoff::MatchBackoff;
use crate::callbacks::ReplayCallbacks;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::device::{device_path, is_event_device_name, DeviceFile, RawInputEvent};
use crate::error::ReplayError;
use crate::replay_buffer::BufferPair;
use crate::response_ring::ResponseRing;
use crate::state::{AtomicEngineState, EngineState};
use crate::tuple::{PlatformEvent, ReplayTuple};

/// Everything the feeder, the engine loop, and the progress/command surface
/// share across threads.
pub struct ReplayShared {
    pub(crate) state: AtomicEngineState,
    state_lock: Mutex<()>,
    state_changed: Condvar,
    pub(crate) buffer: BufferPair,
    pub(crate) response_ring: ResponseRing,
    pub(crate) required_sn: AtomicI64,
    pub(crate) final_sn: AtomicI64,
    pub(crate) alive: AtomicBool,
    skip_flag: Mutex<bool>,
    pub(crate) clock: Clock,
    pub(crate) callbacks: Arc<dyn ReplayCallbacks>,
    pub(crate) config: EngineConfig,
}

impl ReplayShared {
    fn new(config: EngineConfig, response_ring_capacity: usize, deadline_interval_us: i64, clock: Clock, callbacks: Arc<dyn ReplayCallbacks>) -> Self {
        Self {
            state: AtomicEngineState::new(EngineState::Idle),
            state_lock: Mutex::new(()),
            state_changed: Condvar::new(),
            buffer: BufferPair::new(config.default_replay_buffer_size),
            response_ring: ResponseRing::new(response_ring_capacity, deadline_interval_us),
            required_sn: AtomicI64::new(1),
            final_sn: AtomicI64::new(0),
            alive: AtomicBool::new(true),
            skip_flag: Mutex::new(false),
            clock,
            callbacks,
            config,
        }
    }

    pub(crate) fn set_state(&self, new_state: EngineState) {
        let _guard = self.state_lock.lock().expect("engine state lock poisoned");
        self.state.store(new_state);
        self.state_changed.notify_all();
    }

    /// Transitions `Idle -> ReadyForFirst` and seeds `required_sn := 1`
    /// (§4.4 init steps 3-4's precondition). Called by [`ReplayEngine::run`]
    /// before it waits for the first chunk; also usable directly by a
    /// feeder-side caller that wants to start admitting chunks before the
    /// consumer thread reaches that point in its own startup sequence.
    pub fn prepare_for_first_chunk(&self) {
        self.set_state(EngineState::ReadyForFirst);
        self.required_sn.store(1, Ordering::Release);
    }

    fn wait_until_first_chunk_admitted(&self) {
        let mut guard = self.state_lock.lock().expect("engine state lock poisoned");
        while matches!(
            self.state.load(),
            EngineState::ReadyForFirst | EngineState::InitialFetching | EngineState::InitialAndFinalFetching
        ) {
            guard = self.state_changed.wait(guard).expect("engine state condvar poisoned");
        }
        drop(guard);
    }

    /// Progress/command surface (§4.6): one-shot latch to abandon the
    /// in-progress waypoint wait.
    pub fn skip_wait(&self) {
        if !self.state.load().is_replaying() {
            return;
        }
        *self.skip_flag.lock().expect("skip flag lock poisoned") = true;
    }

    fn take_skip_flag(&self) -> bool {
        let mut flag = self.skip_flag.lock().expect("skip flag lock poisoned");
        std::mem::replace(&mut *flag, false)
    }

    /// Response-ring producer path (§4.4.2): ignored unless the engine is
    /// replaying and alive.
    pub fn on_platform_observation(&self, event: PlatformEvent) {
        if !self.alive.load(Ordering::Acquire) || !self.state.load().is_replaying() {
            return;
        }
        self.response_ring.observe(event, self.clock.now_micros());
    }

    /// Current engine state.
    pub fn state(&self) -> EngineState {
        self.state.load()
    }

    /// The chunk-handoff buffer pair, for callers driving or observing the
    /// consumer side directly (tests, or a hand-rolled consumer loop).
    pub fn buffer(&self) -> &BufferPair {
        &self.buffer
    }

    /// The live platform-event waypoint ring.
    pub fn response_ring(&self) -> &ResponseRing {
        &self.response_ring
    }

    /// The next chunk sequence number the feeder is expected to admit.
    pub fn required_sn(&self) -> i64 {
        self.required_sn.load(Ordering::Acquire)
    }

    /// The sequence number of the final chunk, once known (`0` until then).
    pub fn final_sn(&self) -> i64 {
        self.final_sn.load(Ordering::Acquire)
    }

    /// Whether the engine's worker threads should keep running.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

/// The outcome of a completed (or aborted) `run()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub last_sn: i64,
}

pub struct ReplayEngine {
    shared: Arc<ReplayShared>,
    device_dir: PathBuf,
    kernel_batch_size: usize,
}

impl ReplayEngine {
    /// Builds a fresh engine plus the shared handle used to construct a
    /// [`crate::feeder::Feeder`] and the progress/command surface.
    pub fn new(
        config: EngineConfig,
        response_ring_capacity: usize,
        deadline_interval_us: i64,
        clock: Clock,
        callbacks: Arc<dyn ReplayCallbacks>,
    ) -> (Self, Arc<ReplayShared>) {
        let device_dir = config.device_dir.clone();
        let kernel_batch_size = config.kernel_batch_size;
        let shared = Arc::new(ReplayShared::new(config, response_ring_capacity, deadline_interval_us, clock, callbacks));
        (
            Self {
                shared: shared.clone(),
                device_dir,
                kernel_batch_size,
            },
            shared,
        )
    }

    pub fn shared(&self) -> &Arc<ReplayShared> {
        &self.shared
    }

    /// Scans `device_dir` for `event<N>` devices, opening each read-write.
    /// A device that fails to open or fails its `EVIOCGVERSION` check is
    /// logged and skipped, not fatal (§4.4 step 1).
    fn open_devices(&self) -> Result<std::collections::HashMap<u8, DeviceFile>, ReplayError> {
        let entries = std::fs::read_dir(&self.device_dir).map_err(|source| ReplayError::DeviceDirUnavailable {
            path: self.device_dir.clone(),
            source,
        })?;
        let mut devices = std::collections::HashMap::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !is_event_device_name(&name) {
                continue;
            }
            let Some(index) = crate::device::parse_event_index(&name) else {
                continue;
            };
            match DeviceFile::open(&self.device_dir, index, self.kernel_batch_size) {
                Ok(device) => {
                    devices.insert(index, device);
                }
                Err(err) => warn!("skipping {}: {err}", device_path(&self.device_dir, index).display()),
            }
        }
        Ok(devices)
    }

    /// Runs the replay to completion. Blocks until the state machine reaches
    /// `AllFetched` and the final slot is drained, or until `alive` is
    /// cleared by another thread.
    pub fn run(&mut self) -> Result<ReplayOutcome, ReplayError> {
        let mut devices = self.open_devices()?;

        self.shared.prepare_for_first_chunk();
        debug!("replay engine ready, waiting for first chunk");

        self.shared.wait_until_first_chunk_admitted();

        let mut slot = self.shared.buffer.take();
        let mut batch: Vec<RawInputEvent> = Vec::with_capacity(self.kernel_batch_size);
        let mut force_flush = false;

        loop {
            if !self.shared.alive.load(Ordering::Acquire) {
                break;
            }
            if slot.cursor() >= slot.size() {
                let finished_sn = slot.sn();
                drop(slot);
                if self.shared.state.load() == EngineState::AllFetched && finished_sn == self.shared.final_sn.load(Ordering::Acquire) {
                    return Ok(ReplayOutcome { last_sn: finished_sn });
                }
                slot = self.shared.buffer.take();
                continue;
            }

            let cursor = slot.cursor();
            let tuple = slot.tuple_at(cursor);
            drop(slot);

            if !self.shared.alive.load(Ordering::Acquire) {
                break;
            }

            match tuple {
                ReplayTuple::Kernel { timestamp_us, event } => {
                    if timestamp_us != 0 {
                        force_flush = true;
                        self.shared.clock.sleep_nanos(timestamp_us * 1_000, &self.shared.alive);
                    }
                    let raw = RawInputEvent::from_kernel_event(event, 0, 0);
                    batch.push(raw);
                    if batch.len() >= self.kernel_batch_size || force_flush {
                        if let Some(device) = devices.get_mut(&event.device_index) {
                            let expected = batch.len() * std::mem::size_of::<RawInputEvent>();
                            if let Err(err) = flush_batch(device, &mut batch) {
                                error!("short write to device {}: {err}", event.device_index);
                                self.shutdown(&mut devices);
                                return Err(ReplayError::ShortWrite {
                                    device_index: event.device_index,
                                    wrote: 0,
                                    expected,
                                });
                            }
                        } else {
                            batch.clear();
                        }
                        force_flush = false;
                    }
                }
                ReplayTuple::Platform { timestamp_us, event } => {
                    self.shared.clock.sleep_nanos(timestamp_us * 1_000, &self.shared.alive);
                    self.waypoint_match(&event);
                }
            }

            let mut guard = self.shared.buffer.reader();
            guard.advance_cursor();
            slot = guard;
        }

        self.shutdown(&mut devices);
        Ok(ReplayOutcome {
            last_sn: self.shared.final_sn.load(Ordering::Acquire),
        })
    }

    fn shutdown(&self, devices: &mut std::collections::HashMap<u8, DeviceFile>) {
        for device in devices.values_mut() {
            let _ = device.flush();
        }
        devices.clear();
        self.shared.alive.store(false, Ordering::Release);
        self.shared.set_state(EngineState::Idle);
        debug!("replay engine shut down");
    }

    /// The waypoint-match loop (§4.4.1): `while not found and alive and not
    /// skipFlag`, scan, and on a miss back off and retry. A skip flag set
    /// before the wait begins (or before any given scan) must abandon the
    /// wait without running that scan (§8: "terminates immediately if
    /// `skipFlag` is set on entry"), so the flag is checked before each scan,
    /// not after it.
    fn waypoint_match(&self, target: &PlatformEvent) {
        let mut backoff = MatchBackoff::new();
        loop {
            if !self.shared.alive.load(Ordering::Acquire) {
                break;
            }
            if self.shared.take_skip_flag() {
                return;
            }
            if self.shared.response_ring.scan_once(target) {
                break;
            }
            self.shared.clock.long_sleep(backoff.step() as i32);
        }
        self.shared.take_skip_flag();
    }
}

fn flush_batch(device: &mut DeviceFile, batch: &mut Vec<RawInputEvent>) -> Result<(), std::io::Error> {
    for event in batch.drain(..) {
        device.queue(event, false)?;
    }
    device.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::NoopCallbacks;
    use crate::clock::ThreadLongSleep;
    use crate::tuple::PlatformEvent;

    fn test_engine() -> (ReplayEngine, Arc<ReplayShared>) {
        let clock = Clock::new(0, Box::new(ThreadLongSleep));
        let (engine, shared) = ReplayEngine::new(EngineConfig::new(2, 0), 4, 60_000_000, clock, Arc::new(NoopCallbacks));
        shared.set_state(EngineState::ReplayingAndFetching);
        (engine, shared)
    }

    #[test]
    fn waypoint_match_honors_a_skip_flag_set_before_the_wait_begins() {
        let (engine, shared) = test_engine();
        let target = PlatformEvent {
            pe_type: 1,
            response_time_us: 0,
            priv_: 2,
            second_priv: 3,
        };
        // A matching observation is already sitting in the ring...
        shared.response_ring.observe(target, 0);
        // ...but the caller abandoned the wait before it even started.
        shared.skip_wait();

        engine.waypoint_match(&target);

        // The pre-set skip flag must short-circuit before the first scan, so
        // the observation is still there, unconsumed.
        assert!(shared.response_ring.scan_once(&target));
    }

    #[test]
    fn waypoint_match_returns_once_a_matching_observation_is_scanned() {
        let (engine, shared) = test_engine();
        let target = PlatformEvent {
            pe_type: 4,
            response_time_us: 0,
            priv_: 5,
            second_priv: 6,
        };
        shared.response_ring.observe(target, 0);

        engine.waypoint_match(&target);

        // Consumed by the match loop itself.
        assert!(!shared.response_ring.scan_once(&target));
    }
}
