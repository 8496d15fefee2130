/**
 * bridge/trampoline.rs
 *
 * Native-callable entry points. Each copies what it needs out of native
 * memory, then hands an event to the registry; nothing else runs here.
 */

use std::ffi::CStr;
use std::os::raw::{c_char, c_uint};
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, trace};

use super::registry::{registry, Token};
use super::{BridgeEvent, ReceivedData};
use crate::native::types::{GPointer, NiceAgent};

fn deliver<F>(user_data: GPointer, make_event: F)
where
    F: FnOnce() -> BridgeEvent,
{
    let token = Token::from_user_data(user_data);
    match panic::catch_unwind(AssertUnwindSafe(|| registry().dispatch(token, make_event()))) {
        Ok(true) => {}
        Ok(false) => trace!(%token, "callback for unregistered token dropped"),
        Err(_) => error!(%token, "panic while dispatching native callback"),
    }
}

/// `candidate-gathering-done`
pub unsafe extern "C" fn on_gathering_done(_agent: *mut NiceAgent, stream_id: c_uint, user_data: GPointer) {
    deliver(user_data, || BridgeEvent::GatheringDone { stream_id });
}

/// `component-state-changed`
pub unsafe extern "C" fn on_component_state_changed(
    _agent: *mut NiceAgent,
    stream_id: c_uint,
    component_id: c_uint,
    state: c_uint,
    user_data: GPointer,
) {
    deliver(user_data, || BridgeEvent::StateChanged {
        stream_id,
        component_id,
        state,
    });
}

/// `new-candidate`
pub unsafe extern "C" fn on_new_candidate(
    _agent: *mut NiceAgent,
    stream_id: c_uint,
    component_id: c_uint,
    foundation: *const c_char,
    user_data: GPointer,
) {
    let foundation = if foundation.is_null() {
        String::new()
    } else {
        CStr::from_ptr(foundation).to_string_lossy().into_owned()
    };
    deliver(user_data, move || BridgeEvent::NewCandidate {
        stream_id,
        component_id,
        foundation,
    });
}

/// `NiceAgentRecvFunc`. The buffer is only valid during this call.
pub unsafe extern "C" fn on_data_received(
    _agent: *mut NiceAgent,
    stream_id: c_uint,
    component_id: c_uint,
    len: c_uint,
    buf: *const c_char,
    user_data: GPointer,
) {
    let payload = if buf.is_null() || len == 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(buf as *const u8, len as usize).to_vec()
    };
    deliver(user_data, move || {
        BridgeEvent::Data(ReceivedData {
            stream_id,
            component_id,
            payload,
        })
    });
}
