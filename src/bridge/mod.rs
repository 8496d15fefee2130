/**
 * bridge/mod.rs
 *
 * Callback bridge: native signal and receive callbacks arrive on the event
 * loop worker and are handed, by token, to a per-agent context the caller
 * can block on.
 */

mod latch;
mod registry;
mod trampoline;

pub use latch::Latch;
pub use registry::{registry, Registry, Token};
pub use trampoline::{on_component_state_changed, on_data_received, on_gathering_done, on_new_candidate};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::CStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::WaitError;
use crate::native::types::{
    ComponentState, GCallback, GatheringDoneFunc, NewCandidateFunc, StateChangedFunc,
};

/// Event produced by a trampoline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    GatheringDone {
        stream_id: u32,
    },
    StateChanged {
        stream_id: u32,
        component_id: u32,
        state: u32,
    },
    NewCandidate {
        stream_id: u32,
        component_id: u32,
        foundation: String,
    },
    Data(ReceivedData),
}

/// Received payload, copied out of the native buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedData {
    pub stream_id: u32,
    pub component_id: u32,
    pub payload: Vec<u8>,
}

/// Candidate announced through `new-candidate`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCandidate {
    pub stream_id: u32,
    pub component_id: u32,
    pub foundation: String,
}

/// Signals the bridge knows how to receive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    CandidateGatheringDone,
    ComponentStateChanged,
    NewCandidate,
}

impl Signal {
    pub const ALL: [Signal; 3] = [
        Signal::CandidateGatheringDone,
        Signal::ComponentStateChanged,
        Signal::NewCandidate,
    ];

    pub fn name(self) -> &'static CStr {
        match self {
            Signal::CandidateGatheringDone => c"candidate-gathering-done",
            Signal::ComponentStateChanged => c"component-state-changed",
            Signal::NewCandidate => c"new-candidate",
        }
    }

    /// Trampoline for this signal, erased to `GCallback`
    pub fn handler(self) -> GCallback {
        // SAFETY: GObject calls the handler back with the signal's own
        // signature, which is the one each trampoline is declared with.
        unsafe {
            match self {
                Signal::CandidateGatheringDone => {
                    std::mem::transmute::<GatheringDoneFunc, GCallback>(on_gathering_done)
                }
                Signal::ComponentStateChanged => {
                    std::mem::transmute::<StateChangedFunc, GCallback>(on_component_state_changed)
                }
                Signal::NewCandidate => {
                    std::mem::transmute::<NewCandidateFunc, GCallback>(on_new_candidate)
                }
            }
        }
    }
}

/// Caller-visible context of one agent.
///
/// Fed only through `dispatch`; everything else is for waiting callers.
pub struct AgentEvents {
    label: String,
    gathering_done: Latch,
    ready: Latch,
    states: Mutex<HashMap<(u32, u32), ComponentState>>,
    data_tx: Sender<ReceivedData>,
    data_rx: Receiver<ReceivedData>,
    candidates_tx: Sender<NewCandidate>,
    candidates_rx: Receiver<NewCandidate>,
    delivered: AtomicU64,
}

impl AgentEvents {
    pub fn new(label: impl Into<String>) -> Self {
        let (data_tx, data_rx) = channel::unbounded();
        let (candidates_tx, candidates_rx) = channel::unbounded();
        Self {
            label: label.into(),
            gathering_done: Latch::new(),
            ready: Latch::new(),
            states: Mutex::new(HashMap::new()),
            data_tx,
            data_rx,
            candidates_tx,
            candidates_rx,
            delivered: AtomicU64::new(0),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Apply one event. Runs on the delivering thread, so it only sets
    /// latches and enqueues.
    pub fn dispatch(&self, event: BridgeEvent) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        match event {
            BridgeEvent::GatheringDone { stream_id } => {
                debug!(agent = %self.label, stream_id, "candidate-gathering-done");
                self.gathering_done.fire();
            }
            BridgeEvent::StateChanged {
                stream_id,
                component_id,
                state,
            } => match ComponentState::from_raw(state) {
                Some(state) => {
                    debug!(agent = %self.label, stream_id, component_id, %state, "component state changed");
                    self.states.lock().insert((stream_id, component_id), state);
                    if state == ComponentState::Ready && self.ready.fire() {
                        info!(agent = %self.label, stream_id, component_id, "component ready");
                    }
                }
                None => debug!(agent = %self.label, stream_id, component_id, state, "unknown component state"),
            },
            BridgeEvent::NewCandidate {
                stream_id,
                component_id,
                foundation,
            } => {
                debug!(agent = %self.label, stream_id, component_id, %foundation, "new candidate");
                let _ = self.candidates_tx.send(NewCandidate {
                    stream_id,
                    component_id,
                    foundation,
                });
            }
            BridgeEvent::Data(data) => {
                debug!(
                    agent = %self.label,
                    stream_id = data.stream_id,
                    component_id = data.component_id,
                    len = data.payload.len(),
                    "data received"
                );
                let _ = self.data_tx.send(data);
            }
        }
    }

    pub fn wait_gathering_done(&self, timeout: Duration) -> Result<(), WaitError> {
        self.gathering_done.wait(timeout)
    }

    pub fn is_gathering_done(&self) -> bool {
        self.gathering_done.is_fired()
    }

    /// Wait for any component to report `READY`
    pub fn wait_ready(&self, timeout: Duration) -> Result<(), WaitError> {
        self.ready.wait(timeout)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.is_fired()
    }

    pub fn last_state(&self, stream_id: u32, component_id: u32) -> Option<ComponentState> {
        self.states.lock().get(&(stream_id, component_id)).copied()
    }

    pub fn recv_data(&self, timeout: Duration) -> Result<ReceivedData, WaitError> {
        match self.data_rx.recv_timeout(timeout) {
            Ok(data) => Ok(data),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                Err(WaitError::Timeout(timeout))
            }
        }
    }

    pub fn try_recv_data(&self) -> Option<ReceivedData> {
        self.data_rx.try_recv().ok()
    }

    pub fn recv_new_candidate(&self, timeout: Duration) -> Result<NewCandidate, WaitError> {
        self.candidates_rx
            .recv_timeout(timeout)
            .map_err(|_| WaitError::Timeout(timeout))
    }

    pub fn drain_new_candidates(&self) -> Vec<NewCandidate> {
        self.candidates_rx.try_iter().collect()
    }

    /// Number of events dispatched so far
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}
