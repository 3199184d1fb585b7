//! Kernel `input_event` device I/O: opening `/dev/input/event<N>` character
//! devices, the `EVIOCGVERSION` sanity ioctl, and batched event writes.

use std::io::Write;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use crate::error::DeviceError;
use crate::tuple::KernelInputEvent;

/// Wire-compatible mirror of the kernel's `struct input_event`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawInputEvent {
    pub tv_sec: libc::time_t,
    pub tv_usec: libc::suseconds_t,
    pub type_: u16,
    pub code: u16,
    pub value: i32,
}

impl RawInputEvent {
    pub fn from_kernel_event(event: KernelInputEvent, tv_sec: libc::time_t, tv_usec: libc::suseconds_t) -> Self {
        Self {
            tv_sec,
            tv_usec,
            type_: event.type_,
            code: event.code,
            value: event.value,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        // SAFETY: `RawInputEvent` is `#[repr(C)]` and made only of plain
        // integer fields, so any bit pattern is a valid byte view.
        unsafe {
            std::slice::from_raw_parts(
                (self as *const Self).cast::<u8>(),
                std::mem::size_of::<Self>(),
            )
        }
    }
}

nix::ioctl_read!(eviocgversion, b'E', 0x01, libc::c_int);

/// An open `/dev/input/event<N>` character device, with a small write batch
/// in front of it.
pub struct DeviceFile {
    file: std::fs::File,
    index: u8,
    batch: Vec<RawInputEvent>,
    batch_size: usize,
}

impl DeviceFile {
    /// Opens `device_dir/event<index>` and checks it answers `EVIOCGVERSION`.
    pub fn open(device_dir: &Path, index: u8, batch_size: usize) -> Result<Self, DeviceError> {
        let path = device_path(device_dir, index);
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|source| DeviceError::Open {
                path: path.clone(),
                source,
            })?;
        let mut version: libc::c_int = 0;
        // SAFETY: `file`'s fd is valid for the duration of this call and
        // `version` is a valid `c_int` out-pointer.
        unsafe { eviocgversion(file.as_raw_fd(), &mut version) }.map_err(|source| DeviceError::VersionIoctl {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            file,
            index,
            batch: Vec::with_capacity(batch_size),
            batch_size,
        })
    }

    #[inline]
    pub fn index(&self) -> u8 {
        self.index
    }

    #[inline]
    pub fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Queues one event. Force-flushes the batch first if a nonzero
    /// timestamp was given (a waypoint boundary) or the batch is already
    /// full, matching the historical coalescing rule for kernel-event runs.
    pub fn queue(&mut self, event: RawInputEvent, force_flush: bool) -> Result<(), std::io::Error> {
        if force_flush || self.batch.len() >= self.batch_size {
            self.flush()?;
        }
        self.batch.push(event);
        if self.batch.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes every queued event out in a single `write` call, checking for
    /// short writes.
    pub fn flush(&mut self) -> Result<(), std::io::Error> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::with_capacity(self.batch.len() * std::mem::size_of::<RawInputEvent>());
        for event in &self.batch {
            buf.extend_from_slice(event.as_bytes());
        }
        self.file.write_all(&buf)?;
        self.batch.clear();
        Ok(())
    }
}

impl Drop for DeviceFile {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

pub fn device_path(device_dir: &Path, index: u8) -> PathBuf {
    device_dir.join(format!("event{index}"))
}

/// Matches a `/dev/input` entry name against the `event<N>` prefix this crate
/// cares about. The historical implementation's `strncmp` call compared
/// against `strlen("event") != 0` (always `5`, always true), so in practice
/// it matched on the fixed-length prefix regardless of the rest of the name;
/// this implements the evidently intended check instead: the name must start
/// with `event` and have at least one digit following it.
pub fn is_event_device_name(name: &str) -> bool {
    name.len() > "event".len() && name.starts_with("event") && name.as_bytes()[5].is_ascii_digit()
}

/// Parses the `<N>` suffix of an `event<N>` device name.
pub fn parse_event_index(name: &str) -> Option<u8> {
    if !is_event_device_name(name) {
        return None;
    }
    name["event".len()..].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_event_device_names() {
        assert!(is_event_device_name("event0"));
        assert!(is_event_device_name("event42"));
        assert!(!is_event_device_name("event"));
        assert!(!is_event_device_name("eventmouse"));
        assert!(!is_event_device_name("mouse0"));
    }

    #[test]
    fn parses_event_index() {
        assert_eq!(parse_event_index("event7"), Some(7));
        assert_eq!(parse_event_index("event"), None);
        assert_eq!(parse_event_index("eventxx"), None);
    }

    #[test]
    fn raw_input_event_byte_layout_is_field_order() {
        let event = RawInputEvent {
            tv_sec: 1,
            tv_usec: 2,
            type_: 3,
            code: 4,
            value: 5,
        };
        assert_eq!(event.as_bytes().len(), std::mem::size_of::<RawInputEvent>());
    }
}
