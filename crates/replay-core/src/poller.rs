//! The raw-input poller: a multi-device monitor over `/dev/input/event*`,
//! with inotify-driven hot-plug and a bounded producer ring (§4.5).

use std::collections::HashMap;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use inotify::{Inotify, WatchMask};
use log::{debug, warn};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::callbacks::{PolledInputEvent, ReplayCallbacks};
use crate::config::PollerConfig;
use crate::device::{device_path, is_event_device_name, parse_event_index};
use crate::error::PollerError;
use crate::raw_input_ring::RawInputRing;

/// A device opened read-only purely for polling raw `input_event` records off
/// the wire (unrelated to [`crate::device::DeviceFile`], which is opened
/// write-only for replay output).
struct PolledDevice {
    file: std::fs::File,
    index: u8,
}

impl AsRawFd for PolledDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

pub struct RawInputPoller {
    config: PollerConfig,
    ring: Arc<RawInputRing>,
    alive: Arc<AtomicBool>,
    callbacks: Arc<dyn ReplayCallbacks>,
}

impl RawInputPoller {
    pub fn new(config: PollerConfig, ring: Arc<RawInputRing>, alive: Arc<AtomicBool>, callbacks: Arc<dyn ReplayCallbacks>) -> Self {
        Self {
            config,
            ring,
            alive,
            callbacks,
        }
    }

    /// Runs the poll loop until `alive` is cleared. Intended to be the body
    /// of a dedicated worker thread.
    pub fn run(&self) -> Result<(), PollerError> {
        let mut inotify = Inotify::init().map_err(|source| PollerError::InotifyWatch {
            path: self.config.device_dir.clone(),
            source,
        })?;
        inotify
            .watches()
            .add(&self.config.device_dir, WatchMask::CREATE | WatchMask::DELETE)
            .map_err(|source| PollerError::InotifyWatch {
                path: self.config.device_dir.clone(),
                source,
            })?;

        let mut devices: HashMap<u8, PolledDevice> = HashMap::new();
        for entry in std::fs::read_dir(&self.config.device_dir).map_err(|source| PollerError::ScanDir {
            path: self.config.device_dir.clone(),
            source,
        })? {
            let Ok(entry) = entry else { continue };
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(index) = parse_event_index(&name) {
                self.open_and_insert(&mut devices, index);
            }
        }

        let zero_time = Instant::now();
        let mut buf = [0u8; 4096];

        while self.alive.load(Ordering::Acquire) {
            let mut poll_fds: Vec<PollFd> = Vec::with_capacity(devices.len() + 1);
            poll_fds.push(PollFd::new(inotify.as_raw_fd(), PollFlags::POLLIN));
            let mut indices: Vec<u8> = devices.keys().copied().collect();
            indices.sort_unstable();
            for index in &indices {
                poll_fds.push(PollFd::new(devices[index].as_raw_fd(), PollFlags::POLLIN));
            }

            let timeout = PollTimeout::from(self.config.poll_timeout_ms.clamp(0, i32::from(u16::MAX)) as u16);
            match poll(&mut poll_fds, timeout) {
                Ok(0) => continue,
                Ok(_) => {}
                Err(nix::errno::Errno::EINTR) => continue,
                Err(err) => {
                    warn!("poll() failed: {err}");
                    continue;
                }
            }

            if poll_fds[0]
                .revents()
                .is_some_and(|revents| revents.contains(PollFlags::POLLIN))
            {
                if let Ok(events) = inotify.read_events(&mut buf) {
                    for event in events {
                        let Some(name) = event.name.and_then(|n| n.to_str().map(str::to_owned)) else {
                            continue;
                        };
                        if !is_event_device_name(&name) {
                            continue;
                        }
                        let Some(index) = parse_event_index(&name) else { continue };
                        if event.mask.contains(inotify::EventMask::CREATE) {
                            self.open_and_insert(&mut devices, index);
                        } else if event.mask.contains(inotify::EventMask::DELETE) {
                            devices.remove(&index);
                            debug!("device {index} removed");
                        }
                    }
                }
            }

            for (slot, index) in indices.iter().enumerate() {
                let revents = poll_fds[slot + 1].revents();
                if !revents.is_some_and(|r| r.contains(PollFlags::POLLIN)) {
                    continue;
                }
                let Some(device) = devices.get_mut(index) else { continue };
                if let Some(raw) = read_one_event(device) {
                    let Some(elapsed) = elapsed_since_zero_time(Instant::now(), zero_time) else {
                        debug!("dropping event from device {index}: observed before zero time");
                        continue;
                    };
                    let polled = PolledInputEvent {
                        tv_sec: elapsed.as_secs() as i64,
                        tv_usec: elapsed.subsec_micros() as i64,
                        device_index: *index as i32,
                        type_: raw.type_ as i32,
                        code: raw.code as i32,
                        value: raw.value,
                    };
                    self.enqueue_spin(polled);
                }
            }
        }
        Ok(())
    }

    fn open_and_insert(&self, devices: &mut HashMap<u8, PolledDevice>, index: u8) {
        let path = device_path(&self.config.device_dir, index);
        match std::fs::OpenOptions::new().read(true).open(&path) {
            Ok(file) => {
                devices.insert(index, PolledDevice { file, index });
                debug!("polling {}", path.display());
            }
            Err(err) => warn!("could not open {} for polling: {err}", path.display()),
        }
    }

    /// Enqueue is a spin-wait on ring writability (§4.5): the producer has no
    /// other way to apply backpressure without blocking the poll loop.
    fn enqueue_spin(&self, event: PolledInputEvent) {
        let mut backoff = crate::backoff::Backoff::new();
        while !self.ring.try_push(event) {
            if !self.alive.load(Ordering::Acquire) {
                return;
            }
            backoff.snooze();
        }
    }

    /// Drains every currently-queued tuple to the callback target. Returns
    /// `true` iff at least one tuple was delivered.
    pub fn chunk(&self, _urgent: bool) -> bool {
        let mut delivered = false;
        self.ring.drain(|event| {
            self.callbacks.on_poll_complete(event);
            delivered = true;
        });
        delivered
    }
}

fn read_one_event(device: &mut PolledDevice) -> Option<crate::device::RawInputEvent> {
    use std::io::Read;
    let mut buf = [0u8; std::mem::size_of::<crate::device::RawInputEvent>()];
    match device.file.read_exact(&mut buf) {
        Ok(()) => {
            // SAFETY: `buf` is exactly `size_of::<RawInputEvent>()` bytes,
            // freshly read from the kernel's own wire format for this type.
            let raw: crate::device::RawInputEvent = unsafe { std::ptr::read(buf.as_ptr().cast()) };
            Some(raw)
        }
        Err(err) => {
            warn!("read failed on event{}: {err}", device.index);
            None
        }
    }
}

/// Time elapsed since `zero_time`, or `None` if `now` precedes it (§4.5 step
/// 2: "drop events whose `now < zeroTime`"). `zero_time` is captured once at
/// poller start; this guards against an event observed to have happened
/// before that point, however that could arise.
fn elapsed_since_zero_time(now: Instant, zero_time: Instant) -> Option<Duration> {
    now.checked_duration_since(zero_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration as StdDuration;

    #[test]
    fn events_before_zero_time_are_dropped() {
        let earlier = Instant::now();
        thread::sleep(StdDuration::from_millis(1));
        let zero_time = Instant::now();
        assert!(elapsed_since_zero_time(earlier, zero_time).is_none());
    }

    #[test]
    fn events_at_or_after_zero_time_are_kept() {
        let zero_time = Instant::now();
        thread::sleep(StdDuration::from_millis(1));
        let later = Instant::now();
        assert!(elapsed_since_zero_time(zero_time, zero_time).is_some());
        assert!(elapsed_since_zero_time(later, zero_time).is_some());
    }
}
