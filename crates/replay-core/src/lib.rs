//! Timed replay engine for recorded kernel input-event traces.
//!
//! Three subsystems cooperate: a double-buffered chunk pipeline
//! ([`replay_buffer`]) fed by an upstream [`feeder`], a [`response_ring`] of
//! live platform-event waypoints consulted by the [`engine`]'s consumer loop,
//! and a [`poller`] that watches `/dev/input/event*` for hot-plugged devices
//! and queues raw input events on a [`raw_input_ring`].

mod backoff;
mod callbacks;
mod clock;
mod config;
mod device;
mod engine;
mod error;
mod feeder;
mod invariants;
mod poller;
mod progress;
mod raw_input_ring;
mod replay_buffer;
mod response_ring;
mod state;
mod tuple;

pub use backoff::{Backoff, MatchBackoff};
pub use callbacks::{NoopCallbacks, PolledInputEvent, ReplayCallbacks, ReplayingFields};
pub use clock::{Clock, LongSleep, ThreadLongSleep};
pub use config::{EngineConfig, PollerConfig, ResponseRingConfig};
pub use device::{DeviceFile, RawInputEvent};
pub use engine::{ReplayEngine, ReplayOutcome, ReplayShared};
pub use error::{DeviceError, PollerError, ReplayError};
pub use feeder::Feeder;
pub use poller::RawInputPoller;
pub use progress::{skip_wait, snapshot_progress};
pub use raw_input_ring::{RawInputRing, RAW_INPUT_RING_CAPACITY};
pub use replay_buffer::{BufferPair, ReplayBufferSlot};
pub use response_ring::{ResponseRing, RESPONSE_RING_CAPACITY};
pub use state::{AtomicEngineState, EngineState};
pub use tuple::{KernelInputEvent, PlatformEvent, ReplayTuple};
