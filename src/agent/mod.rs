/**
 * agent/mod.rs
 *
 * Handle over one native `NiceAgent`
 */

mod candidate;
mod stream;

pub use candidate::{snapshot_list, CandidateSnapshot};
pub use stream::Stream;

use parking_lot::Mutex;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_uint, c_ulong};
use std::ptr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bridge::{self, registry, AgentEvents, Signal, Token};
use crate::event_loop::EventLoop;
use crate::native::types::{
    AgentGetCandidatesFn, Compatibility, ComponentState, GMainContext, NiceAgent, PropertyValue,
};
use crate::native::{self, Symbols};

/// Returned by `parse_remote_description` when nothing reached native code
pub const PARSE_UNSUPPORTED: i32 = -1;

/// Returned by `send` when nothing reached native code
pub const SEND_UNSUPPORTED: i32 = -1;

/// Agent settings applied through the typed property setters
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    pub compatibility: Compatibility,
    pub controlling: bool,
    pub stun_server: Option<(String, u16)>,
    pub disable_extra_features: bool,
}

/// Parse `host:port`; the port is the part after the last colon
pub fn parse_stun_server(value: &str) -> Option<(String, u16)> {
    let (host, port) = value.trim().rsplit_once(':')?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port.parse().ok()?))
}

/// Undo steps, run last-in first-out on close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    Unref,
    Unregister,
    Disconnect(Signal, c_ulong),
    DetachReceiver(u32, u32),
}

/// One native ICE agent.
///
/// Commands may be issued from any thread; the binding adds no locking of
/// its own around native calls and relies on libnice's agent lock.
/// Callbacks arrive on the loop worker and surface through `events()`.
///
/// Teardown (explicit `close` or drop) disconnects signals and receivers,
/// deregisters the callback token, then unreferences the native agent.
pub struct Agent {
    symbols: Arc<Symbols>,
    handle: *mut NiceAgent,
    context: *mut GMainContext,
    token: Token,
    events: Arc<AgentEvents>,
    teardown: Mutex<Vec<Teardown>>,
    closed: bool,
}

// SAFETY: the native agent serialises access internally; the handle
// pointer itself is never mutated after construction.
unsafe impl Send for Agent {}
unsafe impl Sync for Agent {}

impl Agent {
    /// Agent on the process-wide symbol table
    pub fn new(event_loop: Option<&EventLoop>, compatibility: Compatibility) -> Self {
        Self::with_symbols(native::global(), event_loop, compatibility)
    }

    /// Create an agent bound to `event_loop`'s context, or to the library
    /// default when `None` (less safe with several agents in one process).
    pub fn with_symbols(
        symbols: Arc<Symbols>,
        event_loop: Option<&EventLoop>,
        compatibility: Compatibility,
    ) -> Self {
        let context = event_loop.map_or(ptr::null_mut(), |l| l.context_ptr());

        let handle = match symbols.nice_agent_new {
            Some(agent_new) => unsafe { agent_new(context, compatibility.as_raw() as c_int) },
            None => {
                warn!("nice_agent_new unavailable; agent is non-functional");
                ptr::null_mut()
            }
        };

        let (token, events) =
            registry().register_with(|token| Arc::new(AgentEvents::new(format!("agent{}", token))));

        let mut teardown = Vec::new();
        if !handle.is_null() {
            teardown.push(Teardown::Unref);
        }
        teardown.push(Teardown::Unregister);

        info!(%token, %compatibility, functional = !handle.is_null(), "agent created");

        Self {
            symbols,
            handle,
            context,
            token,
            events,
            teardown: Mutex::new(teardown),
            closed: false,
        }
    }

    pub fn is_functional(&self) -> bool {
        !self.closed && !self.handle.is_null()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn as_ptr(&self) -> *mut NiceAgent {
        self.handle
    }

    pub fn token(&self) -> Token {
        self.token
    }

    /// Caller side of the callback bridge for this agent
    pub fn events(&self) -> &Arc<AgentEvents> {
        &self.events
    }

    fn live_handle(&self) -> Option<*mut NiceAgent> {
        if self.is_functional() {
            Some(self.handle)
        } else {
            None
        }
    }

    fn set_property(&self, name: &CStr, value: PropertyValue<'_>) -> bool {
        let handle = match self.live_handle() {
            Some(handle) => handle,
            None => return false,
        };
        let set = unsafe { self.symbols.set_property(handle.cast(), name, value) };
        if !set {
            debug!(property = ?name, "property setter unavailable");
        }
        set
    }

    pub fn set_controlling_mode(&self, controlling: bool) {
        if self.set_property(c"controlling-mode", PropertyValue::Int(controlling as c_int)) {
            debug!(agent = %self.token, controlling, "property set: controlling-mode");
        }
    }

    pub fn set_stun_server(&self, host: &str, port: u16) {
        let host_c = match CString::new(host) {
            Ok(host_c) => host_c,
            Err(_) => {
                warn!(agent = %self.token, "STUN host contains NUL; ignored");
                return;
            }
        };
        if self.set_property(c"stun-server", PropertyValue::Str(&host_c))
            && self.set_property(c"stun-server-port", PropertyValue::UInt(port as c_uint))
        {
            debug!(agent = %self.token, host, port, "property set: stun-server");
        }
    }

    /// Turn off ICE-TCP and UPnP for faster gathering
    pub fn disable_extra_features(&self) {
        let tcp = self.set_property(c"ice-tcp", PropertyValue::Int(0));
        let upnp = self.set_property(c"upnp", PropertyValue::Int(0));
        if tcp && upnp {
            debug!(agent = %self.token, "ICE-TCP and UPnP disabled");
        }
    }

    pub fn configure(&self, config: &AgentConfig) {
        self.set_controlling_mode(config.controlling);
        if config.disable_extra_features {
            self.disable_extra_features();
        }
        if let Some((host, port)) = &config.stun_server {
            self.set_stun_server(host, *port);
        }
    }

    /// New stream id, or 0 on failure
    pub fn add_stream(&self, n_components: u32) -> u32 {
        match (self.live_handle(), self.symbols.nice_agent_add_stream) {
            (Some(handle), Some(add_stream)) => {
                let stream_id = unsafe { add_stream(handle, n_components) };
                debug!(agent = %self.token, stream_id, n_components, "stream added");
                stream_id
            }
            _ => 0,
        }
    }

    pub fn stream(&self, stream_id: u32) -> Stream<'_> {
        Stream::new(self, stream_id)
    }

    /// Start asynchronous gathering; completion arrives as
    /// `candidate-gathering-done`. Attach receivers and connect signals
    /// first or early events are lost.
    pub fn gather_candidates(&self, stream_id: u32) -> bool {
        match (self.live_handle(), self.symbols.nice_agent_gather_candidates) {
            (Some(handle), Some(gather)) => unsafe { gather(handle, stream_id) != 0 },
            _ => false,
        }
    }

    /// Connect one signal to its trampoline. Returns the handler id.
    pub fn connect_signal(&self, signal: Signal) -> Option<c_ulong> {
        let (handle, connect) = match (self.live_handle(), self.symbols.g_signal_connect_data) {
            (Some(handle), Some(connect)) => (handle, connect),
            _ => return None,
        };

        let handler_id = unsafe {
            connect(
                handle.cast(),
                signal.name().as_ptr(),
                Some(signal.handler()),
                self.token.as_user_data(),
                None,
                0,
            )
        };

        if handler_id == 0 {
            warn!(agent = %self.token, signal = ?signal.name(), "signal connect failed");
            return None;
        }
        self.teardown.lock().push(Teardown::Disconnect(signal, handler_id));
        debug!(agent = %self.token, signal = ?signal.name(), handler_id, "signal connected");
        Some(handler_id)
    }

    /// Connect every bridged signal; true when all of them connected
    pub fn connect_signals(&self) -> bool {
        Signal::ALL
            .iter()
            .map(|signal| self.connect_signal(*signal).is_some())
            .fold(true, |all, ok| all && ok)
    }

    /// Route a component's incoming data into `events()`.
    ///
    /// Calling again replaces the previous receiver.
    pub fn attach_receiver(&self, stream_id: u32, component_id: u32) -> bool {
        let (handle, attach) = match (self.live_handle(), self.symbols.nice_agent_attach_recv) {
            (Some(handle), Some(attach)) => (handle, attach),
            _ => return false,
        };

        let attached = unsafe {
            attach(
                handle,
                stream_id,
                component_id,
                self.context,
                Some(bridge::on_data_received),
                self.token.as_user_data(),
            ) != 0
        };

        if attached {
            let mut teardown = self.teardown.lock();
            let step = Teardown::DetachReceiver(stream_id, component_id);
            if !teardown.contains(&step) {
                teardown.push(step);
            }
        }
        attached
    }

    /// Local description text; empty when unsupported
    pub fn generate_local_description(&self) -> String {
        let (handle, generate) = match (self.live_handle(), self.symbols.nice_agent_generate_local_sdp) {
            (Some(handle), Some(generate)) => (handle, generate),
            _ => return String::new(),
        };

        let raw = unsafe { generate(handle) };
        if raw.is_null() {
            return String::new();
        }

        let description = unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned();
        match self.symbols.g_free {
            Some(free) => unsafe { free(raw.cast()) },
            None => warn!(agent = %self.token, "g_free unavailable; leaking local description"),
        }
        description
    }

    /// Hand the peer's description to the agent. 0 on success, negative on
    /// native error, `PARSE_UNSUPPORTED` when nothing was attempted.
    pub fn parse_remote_description(&self, description: &str) -> i32 {
        let (handle, parse) = match (self.live_handle(), self.symbols.nice_agent_parse_remote_sdp) {
            (Some(handle), Some(parse)) => (handle, parse),
            _ => return PARSE_UNSUPPORTED,
        };

        let text = match CString::new(description) {
            Ok(text) => text,
            Err(_) => {
                warn!(agent = %self.token, "remote description contains NUL");
                return PARSE_UNSUPPORTED;
            }
        };
        let result = unsafe { parse(handle, text.as_ptr()) };
        debug!(agent = %self.token, result, "remote description parsed");
        result
    }

    /// Bytes sent, or negative on error. The payload is passed to native
    /// code in place.
    pub fn send(&self, stream_id: u32, component_id: u32, data: &[u8]) -> i32 {
        let (handle, send) = match (self.live_handle(), self.symbols.nice_agent_send) {
            (Some(handle), Some(send)) => (handle, send),
            _ => return SEND_UNSUPPORTED,
        };
        let len = match c_uint::try_from(data.len()) {
            Ok(len) => len,
            Err(_) => return SEND_UNSUPPORTED,
        };
        unsafe { send(handle, stream_id, component_id, len, data.as_ptr() as *const c_char) }
    }

    /// Native component state; `Disconnected` when unavailable
    pub fn component_state(&self, stream_id: u32, component_id: u32) -> ComponentState {
        match (self.live_handle(), self.symbols.nice_agent_get_component_state) {
            (Some(handle), Some(get_state)) => {
                let raw = unsafe { get_state(handle, stream_id, component_id) };
                ComponentState::from_raw(raw).unwrap_or_else(|| {
                    debug!(agent = %self.token, raw, "unknown component state");
                    ComponentState::Disconnected
                })
            }
            _ => ComponentState::Disconnected,
        }
    }

    pub fn local_candidates(&self, stream_id: u32, component_id: u32) -> Vec<CandidateSnapshot> {
        self.candidates(self.symbols.nice_agent_get_local_candidates, stream_id, component_id)
    }

    pub fn remote_candidates(&self, stream_id: u32, component_id: u32) -> Vec<CandidateSnapshot> {
        self.candidates(self.symbols.nice_agent_get_remote_candidates, stream_id, component_id)
    }

    fn candidates(
        &self,
        fetch: Option<AgentGetCandidatesFn>,
        stream_id: u32,
        component_id: u32,
    ) -> Vec<CandidateSnapshot> {
        let (handle, fetch) = match (self.live_handle(), fetch) {
            (Some(handle), Some(fetch)) => (handle, fetch),
            _ => return Vec::new(),
        };

        let list = unsafe { fetch(handle, stream_id, component_id) };
        if list.is_null() {
            return Vec::new();
        }

        let snapshots = unsafe { snapshot_list(list, &self.symbols) };

        // The nodes are ours; the candidates stay with the agent
        match self.symbols.g_slist_free {
            Some(free) => unsafe { free(list) },
            None => warn!(agent = %self.token, "g_slist_free unavailable; leaking candidate list"),
        }
        snapshots
    }

    /// Release the agent. A second call does nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let steps = std::mem::take(self.teardown.get_mut());
        for step in steps.into_iter().rev() {
            self.run_teardown(step);
        }
        info!(agent = %self.token, "agent closed");
    }

    fn run_teardown(&self, step: Teardown) {
        match step {
            Teardown::Disconnect(signal, handler_id) => {
                if let Some(disconnect) = self.symbols.g_signal_handler_disconnect {
                    unsafe { disconnect(self.handle.cast(), handler_id) };
                    debug!(agent = %self.token, signal = ?signal.name(), handler_id, "signal disconnected");
                }
            }
            Teardown::DetachReceiver(stream_id, component_id) => {
                if let Some(attach) = self.symbols.nice_agent_attach_recv {
                    unsafe {
                        attach(self.handle, stream_id, component_id, self.context, None, ptr::null_mut());
                    }
                }
            }
            Teardown::Unregister => {
                registry().unregister(self.token);
            }
            Teardown::Unref => {
                if let Some(unref) = self.symbols.g_object_unref {
                    unsafe { unref(self.handle.cast()) };
                }
            }
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.close();
    }
}
