//! The progress/command surface (§4.6): query current sequence numbers and
//! cursors, and a latch to break out of an in-progress platform-event wait.

use std::sync::atomic::Ordering;

use crate::callbacks::ReplayingFields;
use crate::engine::ReplayShared;

/// Reads `(required_sn, present_sn, present_cursor, present_size)` and
/// delivers it via [`crate::callbacks::ReplayCallbacks::on_progress`]. The
/// last three fields are zero unless the engine is currently replaying.
pub fn snapshot_progress(shared: &ReplayShared) {
    let required_sn = shared.required_sn.load(Ordering::Acquire);
    let fields = if shared.state.load().is_replaying() {
        let slot = shared.buffer.reader();
        ReplayingFields {
            required_sn,
            present_sn: slot.sn(),
            present_cursor: slot.cursor() as i32,
            present_size: slot.size() as i32,
        }
    } else {
        ReplayingFields {
            required_sn,
            present_sn: 0,
            present_cursor: 0,
            present_size: 0,
        }
    };
    shared.callbacks.on_progress(fields);
}

/// Abandons the current waypoint wait, if any (no-op unless replaying).
pub fn skip_wait(shared: &ReplayShared) {
    shared.skip_wait();
}
