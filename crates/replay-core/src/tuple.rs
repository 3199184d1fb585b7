//! Replay tuple types: the unit of data moved through the replay buffer pair
//! and matched against the response ring.

/// One kernel `input_event` destined for a `/dev/input/event<N>` device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KernelInputEvent {
    pub device_index: u8,
    pub type_: u16,
    pub code: u16,
    pub value: i32,
}

/// A waypoint: the engine sleeps, then blocks until a matching live observation
/// appears in the response ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlatformEvent {
    pub pe_type: i32,
    pub response_time_us: i32,
    pub priv_: i32,
    pub second_priv: i32,
}

impl PlatformEvent {
    /// Whether `self` and `other` refer to the same waypoint. `response_time_us`
    /// is informational only and is not part of identity.
    #[inline]
    pub fn matches(&self, other: &PlatformEvent) -> bool {
        self.pe_type == other.pe_type
            && self.priv_ == other.priv_
            && self.second_priv == other.second_priv
    }
}

/// One entry appended to a replay buffer: a delta-to-sleep timestamp (in
/// microseconds) plus a tagged payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayTuple {
    /// `timestamp == 0` means "coalesce with the following kernel events into a
    /// batch"; nonzero means "sleep this many microseconds, then force-flush the
    /// batch after writing this event into it".
    Kernel {
        timestamp_us: i64,
        event: KernelInputEvent,
    },
    /// Sleep `timestamp_us`, then block on a matching response-ring observation.
    Platform {
        timestamp_us: i64,
        event: PlatformEvent,
    },
}

impl ReplayTuple {
    #[inline]
    pub fn timestamp_us(&self) -> i64 {
        match self {
            ReplayTuple::Kernel { timestamp_us, .. } => *timestamp_us,
            ReplayTuple::Platform { timestamp_us, .. } => *timestamp_us,
        }
    }
}

impl Default for ReplayTuple {
    fn default() -> Self {
        ReplayTuple::Kernel {
            timestamp_us: 0,
            event: KernelInputEvent::default(),
        }
    }
}
