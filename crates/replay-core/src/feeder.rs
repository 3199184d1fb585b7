//! The feeder: the external intake interface an upstream producer drives to
//! admit chunks into the writer-side replay buffer slot (§4.3).

use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::debug;

use crate::engine::ReplayShared;
use crate::error::ReplayError;
use crate::invariants::debug_assert_required_sn_monotonic;
use crate::state::EngineState;
use crate::tuple::ReplayTuple;

pub struct Feeder {
    shared: Arc<ReplayShared>,
}

impl Feeder {
    pub fn new(shared: Arc<ReplayShared>) -> Self {
        Self { shared }
    }

    /// Admits a new chunk into the writer slot. Silently ignored outside the
    /// states that can begin a chunk (late-arriving chunks under teardown).
    ///
    /// `count == 0` is a valid chunk (§4.2): `append` is never called for it,
    /// so the usual "complete on a full append" path never fires. Detect that
    /// here and run the completion logic immediately, otherwise the slot
    /// never advances and `required_sn` never increments for an empty chunk.
    ///
    /// Fails if the elastic tuple area cannot be allocated (§7); the caller
    /// is expected to abort the session on error, since the chunk was never
    /// admitted.
    pub fn begin_chunk(&mut self, has_next: bool, count: usize, sn: i64) -> Result<(), ReplayError> {
        let prior = self.shared.state.load();
        let next_state = match (prior, has_next) {
            (EngineState::ReadyForFirst, true) => EngineState::InitialFetching,
            (EngineState::ReadyForFirst, false) => EngineState::InitialAndFinalFetching,
            (EngineState::ReplayingAndFetching, true) => EngineState::ReplayingAndFetching,
            (EngineState::ReplayingAndFetching, false) => EngineState::FinalFetching,
            _ => {
                debug!("begin_chunk ignored in state {prior:?}");
                return Ok(());
            }
        };
        let completed = {
            let mut slot = self.shared.buffer.writer();
            slot.admit(sn, count)?;
            slot.is_full()
        };
        self.shared.set_state(next_state);
        if completed {
            self.complete_chunk(sn);
        }
        Ok(())
    }

    /// Writes one kernel-input tuple; ignored unless fetching and alive.
    pub fn append_kernel(&mut self, timestamp_us: i64, event: crate::tuple::KernelInputEvent) {
        self.append(ReplayTuple::Kernel { timestamp_us, event });
    }

    /// Writes one platform-event tuple; ignored unless fetching and alive.
    pub fn append_platform(&mut self, timestamp_us: i64, event: crate::tuple::PlatformEvent) {
        self.append(ReplayTuple::Platform { timestamp_us, event });
    }

    fn append(&mut self, tuple: ReplayTuple) {
        if !self.shared.alive.load(Ordering::Acquire) || !self.shared.state.load().is_fetching() {
            return;
        }
        let mut slot = self.shared.buffer.writer();
        let sn = slot.sn();
        slot.append(tuple);
        let completed = slot.is_full();
        drop(slot);
        if completed {
            self.complete_chunk(sn);
        }
    }

    fn complete_chunk(&mut self, sn: i64) {
        let prior = self.shared.state.load();
        match prior {
            EngineState::InitialAndFinalFetching | EngineState::FinalFetching => {
                self.shared.final_sn.store(sn, Ordering::Release);
                self.shared.set_state(EngineState::AllFetched);
            }
            EngineState::InitialFetching => {
                self.shared.set_state(EngineState::ReplayingAndFetching);
            }
            _ => {}
        }
        self.shared.buffer.advance_writer();
        if self.shared.state.load().is_fetching() {
            let prev = self.shared.required_sn.load(Ordering::Acquire);
            let next = prev + 1;
            debug_assert_required_sn_monotonic!(prev, next);
            self.shared.required_sn.store(next, Ordering::Release);
        }
    }
}
