//! End-to-end tests against the public feeder/buffer/response-ring surface,
//! driving the same state transitions the replay engine's consumer loop
//! would, without requiring real `/dev/input` character devices.

use std::sync::{Arc, Mutex};

use replay_core::{
    skip_wait, snapshot_progress, Clock, EngineConfig, EngineState, Feeder, KernelInputEvent,
    NoopCallbacks, PlatformEvent, PolledInputEvent, ReplayCallbacks, ReplayEngine, ReplayTuple,
    ReplayingFields, ThreadLongSleep,
};

#[derive(Default)]
struct RecordingCallbacks {
    progress: Mutex<Vec<ReplayingFields>>,
}

impl ReplayCallbacks for RecordingCallbacks {
    fn on_progress(&self, fields: ReplayingFields) {
        self.progress.lock().unwrap().push(fields);
    }
    fn on_poll_complete(&self, _event: PolledInputEvent) {}
}

fn new_shared(callbacks: Arc<dyn ReplayCallbacks>) -> Arc<replay_core::ReplayShared> {
    let clock = Clock::new(0, Box::new(ThreadLongSleep));
    let (_, shared) = ReplayEngine::new(EngineConfig::new(4, 0), 8, 60_000_000, clock, callbacks);
    shared.prepare_for_first_chunk();
    shared
}

/// Drives the shared state into `ReplayingAndFetching` the same way the real
/// feeder/engine pair would: admit and fully consume-append one non-final,
/// single-tuple chunk.
fn advance_to_replaying(shared: &Arc<replay_core::ReplayShared>) {
    let mut feeder = Feeder::new(shared.clone());
    feeder.begin_chunk(true, 1, 1).unwrap();
    feeder.append_kernel(0, KernelInputEvent::default());
    assert_eq!(shared.state(), EngineState::ReplayingAndFetching);
}

/// Drains the reader slot exactly like the engine's main loop would, without
/// touching real devices: advances the cursor once per tuple and returns the
/// tuples in consumption order.
fn drain_reader_slot(shared: &replay_core::ReplayShared) -> Vec<ReplayTuple> {
    let mut out = Vec::new();
    let mut slot = shared.buffer().take();
    loop {
        if slot.cursor() >= slot.size() {
            break;
        }
        let tuple = slot.tuple_at(slot.cursor());
        out.push(tuple);
        slot.advance_cursor();
    }
    out
}

#[test]
fn single_chunk_all_kernel_replay_emits_tuples_in_order() {
    let shared = new_shared(Arc::new(NoopCallbacks));
    let mut feeder = Feeder::new(shared.clone());

    feeder.begin_chunk(false, 3, 1).unwrap();
    for value in 0..3 {
        feeder.append_kernel(
            if value == 0 { 500 } else { 0 },
            KernelInputEvent {
                device_index: 0,
                type_: 1,
                code: 2,
                value,
            },
        );
    }

    assert_eq!(shared.state(), EngineState::AllFetched);
    assert_eq!(shared.final_sn(), 1);

    let tuples = drain_reader_slot(&shared);
    assert_eq!(tuples.len(), 3);
    for (i, tuple) in tuples.iter().enumerate() {
        match tuple {
            ReplayTuple::Kernel { event, .. } => assert_eq!(event.value, i as i32),
            ReplayTuple::Platform { .. } => panic!("expected only kernel tuples"),
        }
    }
}

#[test]
fn chunk_boundary_state_sequence_across_two_chunks() {
    let shared = new_shared(Arc::new(NoopCallbacks));
    let mut feeder = Feeder::new(shared.clone());

    feeder.begin_chunk(true, 1, 1).unwrap();
    assert_eq!(shared.state(), EngineState::InitialFetching);
    feeder.append_kernel(0, KernelInputEvent::default());
    assert_eq!(shared.state(), EngineState::ReplayingAndFetching);
    assert_eq!(shared.required_sn(), 2);

    feeder.begin_chunk(false, 1, 2).unwrap();
    assert_eq!(shared.state(), EngineState::FinalFetching);
    feeder.append_kernel(0, KernelInputEvent::default());
    assert_eq!(shared.state(), EngineState::AllFetched);
    assert_eq!(shared.final_sn(), 2);

    // The first chunk's tuple is consumable before the second chunk's is.
    let first = drain_reader_slot(&shared);
    assert_eq!(first.len(), 1);
    let second = drain_reader_slot(&shared);
    assert_eq!(second.len(), 1);
}

#[test]
fn waypoint_match_is_satisfied_by_a_delayed_observation() {
    let shared = new_shared(Arc::new(NoopCallbacks));
    let waypoint = PlatformEvent {
        pe_type: 7,
        response_time_us: 0,
        priv_: 1,
        second_priv: 2,
    };

    // Not yet observed: a scan finds nothing.
    assert!(!shared.response_ring().scan_once(&waypoint));

    // The observation arrives later, once the engine is replaying.
    advance_to_replaying(&shared);
    shared.on_platform_observation(waypoint);

    assert!(shared.response_ring().scan_once(&waypoint));
    // Consumed: a second scan finds nothing left to match.
    assert!(!shared.response_ring().scan_once(&waypoint));
}

#[test]
fn platform_observations_outside_replay_are_ignored() {
    let shared = new_shared(Arc::new(NoopCallbacks));
    let waypoint = PlatformEvent {
        pe_type: 1,
        response_time_us: 0,
        priv_: 1,
        second_priv: 1,
    };
    // Still `ReadyForFirst`: not replaying yet.
    shared.on_platform_observation(waypoint);
    assert!(!shared.response_ring().scan_once(&waypoint));
}

#[test]
fn skip_wait_is_a_noop_outside_replaying_state() {
    let shared = new_shared(Arc::new(NoopCallbacks));
    skip_wait(&shared);
    advance_to_replaying(&shared);
    skip_wait(&shared);
}

#[test]
fn response_ring_recycles_stale_entries_after_the_deadline() {
    let clock = Clock::new(0, Box::new(ThreadLongSleep));
    let (_, shared) = ReplayEngine::new(EngineConfig::new(2, 0), 2, 1_000, clock, Arc::new(NoopCallbacks));
    shared.prepare_for_first_chunk();
    advance_to_replaying(&shared);

    let stale = PlatformEvent {
        pe_type: 1,
        response_time_us: 0,
        priv_: 1,
        second_priv: 1,
    };
    let fresh = PlatformEvent {
        pe_type: 2,
        response_time_us: 0,
        priv_: 2,
        second_priv: 2,
    };
    shared.response_ring().observe(stale, 0);
    // Far past the 1ms deadline; a later observation should recycle it
    // rather than wait for the consumer to catch up.
    shared.response_ring().observe(fresh, 10_000);
    assert!(shared.response_ring().scan_once(&fresh));
}

#[test]
fn progress_snapshot_reports_required_sn_and_cursor() {
    let callbacks = Arc::new(RecordingCallbacks::default());
    let shared = new_shared(callbacks.clone());
    let mut feeder = Feeder::new(shared.clone());

    feeder.begin_chunk(true, 2, 1).unwrap();
    feeder.append_kernel(0, KernelInputEvent::default());

    snapshot_progress(&shared);
    let captured = callbacks.progress.lock().unwrap();
    let last = *captured.last().unwrap();
    assert_eq!(last.present_sn, 1);
    assert_eq!(last.present_cursor, 1);
    assert_eq!(last.present_size, 2);
}
