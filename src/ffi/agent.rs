/**
 * ffi/agent.rs
 *
 * FFI bindings for event loops and agents.
 *
 * An agent created on a loop must be freed before that loop.
 */

use super::*;
use libc::{c_char, c_int, c_uint, size_t};
use std::ffi::CStr;
use std::time::Duration;

use crate::agent::{Agent, AgentConfig};
use crate::event_loop::EventLoop;
use crate::native::types::{Compatibility, ComponentState};

fn loop_ref<'a>(handle: *const EventLoopHandle) -> Option<&'a EventLoop> {
    unsafe { (handle as *const EventLoop).as_ref() }
}

fn agent_ref<'a>(handle: *const AgentHandle) -> Option<&'a Agent> {
    let agent = unsafe { (handle as *const Agent).as_ref() };
    if agent.is_none() {
        set_last_error("Null agent handle");
    }
    agent
}

fn options_to_config(options: &AgentOptions) -> Result<AgentConfig, String> {
    let compatibility = Compatibility::from_raw(options.compatibility)
        .ok_or_else(|| format!("Invalid compatibility mode: {}", options.compatibility))?;
    let stun_server = match c_str_to_rust(options.stun_host) {
        Some(host) if !host.is_empty() => Some((host, options.stun_port)),
        _ => None,
    };
    Ok(AgentConfig {
        compatibility,
        controlling: options.controlling != 0,
        stun_server,
        disable_extra_features: options.disable_extra_features != 0,
    })
}

/// Create an event loop (not yet running)
#[no_mangle]
pub extern "C" fn nice_bridge_loop_new() -> *mut EventLoopHandle {
    Box::into_raw(Box::new(EventLoop::new())) as *mut EventLoopHandle
}

/// Start the loop worker. Returns 1 if a worker was spawned.
#[no_mangle]
pub extern "C" fn nice_bridge_loop_start(handle: *mut EventLoopHandle) -> c_int {
    loop_ref(handle).map_or(0, |l| l.start() as c_int)
}

#[no_mangle]
pub extern "C" fn nice_bridge_loop_stop(handle: *mut EventLoopHandle) {
    if let Some(l) = loop_ref(handle) {
        l.stop();
    }
}

/// Stop, join and release the loop
#[no_mangle]
pub extern "C" fn nice_bridge_loop_free(handle: *mut EventLoopHandle) {
    if !handle.is_null() {
        unsafe {
            let _ = Box::from_raw(handle as *mut EventLoop);
        }
    }
}

/// Create an agent. `loop_handle` and `options` may be null.
#[no_mangle]
pub extern "C" fn nice_bridge_agent_new(
    loop_handle: *const EventLoopHandle,
    options: *const AgentOptions,
) -> *mut AgentHandle {
    let config = match unsafe { options.as_ref() } {
        Some(options) => match options_to_config(options) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e);
                return std::ptr::null_mut();
            }
        },
        None => AgentConfig::default(),
    };

    let agent = Agent::new(loop_ref(loop_handle), config.compatibility);
    agent.configure(&config);
    Box::into_raw(Box::new(agent)) as *mut AgentHandle
}

/// Tear down and release the agent
#[no_mangle]
pub extern "C" fn nice_bridge_agent_free(handle: *mut AgentHandle) {
    if !handle.is_null() {
        unsafe {
            let _ = Box::from_raw(handle as *mut Agent);
        }
    }
}

#[no_mangle]
pub extern "C" fn nice_bridge_agent_is_functional(handle: *const AgentHandle) -> c_int {
    agent_ref(handle).map_or(0, |a| a.is_functional() as c_int)
}

#[no_mangle]
pub extern "C" fn nice_bridge_agent_set_controlling(handle: *const AgentHandle, controlling: c_int) {
    if let Some(agent) = agent_ref(handle) {
        agent.set_controlling_mode(controlling != 0);
    }
}

#[no_mangle]
pub extern "C" fn nice_bridge_agent_set_stun_server(handle: *const AgentHandle, host: *const c_char, port: u16) {
    let agent = match agent_ref(handle) {
        Some(agent) => agent,
        None => return,
    };
    match c_str_to_rust(host) {
        Some(host) => agent.set_stun_server(&host, port),
        None => set_last_error("Invalid STUN host"),
    }
}

/// Returns the stream id, 0 on failure
#[no_mangle]
pub extern "C" fn nice_bridge_agent_add_stream(handle: *const AgentHandle, n_components: c_uint) -> c_uint {
    agent_ref(handle).map_or(0, |a| a.add_stream(n_components))
}

/// Returns 1 when every signal connected
#[no_mangle]
pub extern "C" fn nice_bridge_agent_connect_signals(handle: *const AgentHandle) -> c_int {
    agent_ref(handle).map_or(0, |a| a.connect_signals() as c_int)
}

#[no_mangle]
pub extern "C" fn nice_bridge_agent_attach_receiver(
    handle: *const AgentHandle,
    stream_id: c_uint,
    component_id: c_uint,
) -> c_int {
    agent_ref(handle).map_or(0, |a| a.attach_receiver(stream_id, component_id) as c_int)
}

#[no_mangle]
pub extern "C" fn nice_bridge_agent_gather_candidates(handle: *const AgentHandle, stream_id: c_uint) -> c_int {
    agent_ref(handle).map_or(0, |a| a.gather_candidates(stream_id) as c_int)
}

/// Local description; free with `nice_bridge_free_string`. Null when empty.
#[no_mangle]
pub extern "C" fn nice_bridge_agent_local_description(handle: *const AgentHandle) -> *mut c_char {
    match agent_ref(handle).map(Agent::generate_local_description) {
        Some(description) if !description.is_empty() => into_c_string(&description),
        _ => std::ptr::null_mut(),
    }
}

/// Returns 0 on success, negative on error
#[no_mangle]
pub extern "C" fn nice_bridge_agent_parse_remote_description(
    handle: *const AgentHandle,
    description: *const c_char,
) -> c_int {
    let agent = match agent_ref(handle) {
        Some(agent) => agent,
        None => return -1,
    };
    match c_str_to_rust(description) {
        Some(description) => agent.parse_remote_description(&description),
        None => {
            set_last_error("Invalid remote description");
            -1
        }
    }
}

/// Returns bytes sent, negative on error
#[no_mangle]
pub extern "C" fn nice_bridge_agent_send(
    handle: *const AgentHandle,
    stream_id: c_uint,
    component_id: c_uint,
    data: *const u8,
    len: size_t,
) -> c_int {
    let agent = match agent_ref(handle) {
        Some(agent) => agent,
        None => return -1,
    };
    if data.is_null() && len != 0 {
        set_last_error("Null data pointer");
        return -1;
    }
    let payload = if len == 0 {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(data, len) }
    };
    agent.send(stream_id, component_id, payload)
}

/// Returns 0 once gathering finished, -1 on timeout
#[no_mangle]
pub extern "C" fn nice_bridge_agent_wait_gathering_done(handle: *const AgentHandle, timeout_ms: u32) -> c_int {
    let agent = match agent_ref(handle) {
        Some(agent) => agent,
        None => return -1,
    };
    match agent.events().wait_gathering_done(Duration::from_millis(timeout_ms as u64)) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Returns 0 once a component is ready, -1 on timeout
#[no_mangle]
pub extern "C" fn nice_bridge_agent_wait_ready(handle: *const AgentHandle, timeout_ms: u32) -> c_int {
    let agent = match agent_ref(handle) {
        Some(agent) => agent,
        None => return -1,
    };
    match agent.events().wait_ready(Duration::from_millis(timeout_ms as u64)) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Next received payload, or an empty buffer on timeout.
/// Free with `nice_bridge_free_buffer`.
#[no_mangle]
pub extern "C" fn nice_bridge_agent_recv(handle: *const AgentHandle, timeout_ms: u32) -> ByteBuffer {
    match agent_ref(handle).map(|a| a.events().recv_data(Duration::from_millis(timeout_ms as u64))) {
        Some(Ok(data)) => ByteBuffer::from_vec(data.payload),
        _ => ByteBuffer::empty(),
    }
}

/// `NiceComponentState` value
#[no_mangle]
pub extern "C" fn nice_bridge_agent_component_state(
    handle: *const AgentHandle,
    stream_id: c_uint,
    component_id: c_uint,
) -> c_uint {
    agent_ref(handle)
        .map_or(ComponentState::Disconnected, |a| a.component_state(stream_id, component_id))
        .as_raw()
}

/// Candidates as a JSON array; free with `nice_bridge_free_string`
#[no_mangle]
pub extern "C" fn nice_bridge_agent_candidates_json(
    handle: *const AgentHandle,
    stream_id: c_uint,
    component_id: c_uint,
    remote: c_int,
) -> *mut c_char {
    let agent = match agent_ref(handle) {
        Some(agent) => agent,
        None => return std::ptr::null_mut(),
    };
    let candidates = if remote != 0 {
        agent.remote_candidates(stream_id, component_id)
    } else {
        agent.local_candidates(stream_id, component_id)
    };
    match serde_json::to_string(&candidates) {
        Ok(json) => into_c_string(&json),
        Err(e) => {
            set_last_error(&format!("Candidate serialization failed: {}", e));
            std::ptr::null_mut()
        }
    }
}

/// Name of a component state (static, do not free)
#[no_mangle]
pub extern "C" fn nice_bridge_component_state_name(state: c_uint) -> *const c_char {
    let name: &'static CStr = ComponentState::from_raw(state).map_or(c"UNKNOWN", ComponentState::as_c_str);
    name.as_ptr()
}
