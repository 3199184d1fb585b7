//! The capability set injected into the engine and poller at construction
//! time, replacing the historical implementation's ambient JNI callback
//! globals with an explicit trait object.

/// Progress snapshot delivered by [`crate::progress::snapshot_progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayingFields {
    pub required_sn: i64,
    pub present_sn: i64,
    pub present_cursor: i32,
    pub present_size: i32,
}

/// One raw input tuple drained from the poller's ring by `chunk()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PolledInputEvent {
    pub tv_sec: i64,
    pub tv_usec: i64,
    pub device_index: i32,
    pub type_: i32,
    pub code: i32,
    pub value: i32,
}

/// Callbacks the replay engine and raw-input poller invoke on the external
/// collaborator. Implementors are shared across threads (engine consumer,
/// poller worker), so all methods take `&self`.
pub trait ReplayCallbacks: Send + Sync {
    /// A progress snapshot, emitted on request (see
    /// [`crate::progress::snapshot_progress`]).
    fn on_progress(&self, fields: ReplayingFields);

    /// One tuple drained from the raw-input poller's ring.
    fn on_poll_complete(&self, event: PolledInputEvent);
}

/// A [`ReplayCallbacks`] that drops everything. Useful for tests and for
/// embedding the engine where progress/poll delivery is not needed.
#[derive(Debug, Default)]
pub struct NoopCallbacks;

impl ReplayCallbacks for NoopCallbacks {
    fn on_progress(&self, _fields: ReplayingFields) {}
    fn on_poll_complete(&self, _event: PolledInputEvent) {}
}
