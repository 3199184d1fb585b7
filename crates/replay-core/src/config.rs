/// Configuration for the [`crate::engine::ReplayEngine`] and its replay-buffer
/// pair.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of fixed slots per replay buffer (`default_replay_buffer_size`).
    /// Chunks admitted with a larger count spill into an elastic area.
    pub default_replay_buffer_size: usize,
    /// Cap, in milliseconds, on any single delegated long sleep. `0` means
    /// uncapped.
    pub max_sleep_ms: i32,
    /// Directory scanned for `event<N>` character devices.
    pub device_dir: std::path::PathBuf,
    /// Number of kernel input events coalesced into one `write` call.
    pub kernel_batch_size: usize,
}

impl EngineConfig {
    /// Panics if `default_replay_buffer_size` is 0 or `kernel_batch_size` is 0.
    pub fn new(default_replay_buffer_size: usize, max_sleep_ms: i32) -> Self {
        assert!(default_replay_buffer_size > 0, "default_replay_buffer_size must be > 0");
        Self {
            default_replay_buffer_size,
            max_sleep_ms,
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_replay_buffer_size: 1,
            max_sleep_ms: 0,
            device_dir: std::path::PathBuf::from("/dev/input"),
            kernel_batch_size: 5,
        }
    }
}

/// Configuration for the [`crate::poller::RawInputPoller`].
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub device_dir: std::path::PathBuf,
    pub poll_timeout_ms: i32,
    pub ring_capacity: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            device_dir: std::path::PathBuf::from("/dev/input"),
            poll_timeout_ms: 1_000,
            ring_capacity: super::raw_input_ring::RAW_INPUT_RING_CAPACITY,
        }
    }
}

/// Response-ring sizing and TTL, rarely overridden outside tests.
#[derive(Debug, Clone, Copy)]
pub struct ResponseRingConfig {
    pub capacity: usize,
    pub deadline_interval_us: i64,
}

impl Default for ResponseRingConfig {
    fn default() -> Self {
        Self {
            capacity: super::response_ring::RESPONSE_RING_CAPACITY,
            deadline_interval_us: 60 * 1_000_000,
        }
    }
}
