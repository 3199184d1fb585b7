use thiserror::Error;

/// Errors that can terminate a replay session.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The device directory itself could not be opened for scanning.
    #[error("cannot open device directory {path}: {source}")]
    DeviceDirUnavailable {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A device file accepted fewer bytes than the batch required.
    #[error("short write to device index {device_index}: wrote {wrote} of {expected} bytes")]
    ShortWrite {
        device_index: u8,
        wrote: usize,
        expected: usize,
    },
    /// The elastic tuple area for a chunk could not be allocated.
    #[error("failed to allocate elastic replay buffer area of {requested} tuples")]
    ElasticAllocationFailed { requested: usize },
}

/// Errors from [`crate::device::DeviceFile::open`].
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("cannot open device file {path}: {source}")]
    Open {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("EVIOCGVERSION ioctl failed for {path}: {source}")]
    VersionIoctl {
        path: std::path::PathBuf,
        #[source]
        source: nix::Error,
    },
}

/// Errors from [`crate::poller::RawInputPoller::run`] initialization.
#[derive(Debug, Error)]
pub enum PollerError {
    #[error("failed to watch {path} with inotify: {source}")]
    InotifyWatch {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to scan device directory {path}: {source}")]
    ScanDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}
