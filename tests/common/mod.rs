#![allow(dead_code, unused_doc_comments)]

/**
 * tests/common/mod.rs
 *
 * In-process stand-in for libnice and the GLib pieces the bindings call.
 *
 * Agents, contexts and loops are leaked on purpose so callbacks racing a
 * teardown never touch freed memory. Signals fire from helper threads, like
 * a real agent firing from its context thread.
 */

use parking_lot::{Condvar, Mutex};
use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_uint, c_ulong};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use nice_bridge::native::layout::{GSList, NiceAddress, NiceCandidate, FOUNDATION_LEN, NICE_ADDRESS_SIZE};
use nice_bridge::native::types::{
    GBoolean, GCallback, GClosureNotify, GMainContext, GMainLoop, GPointer, GatheringDoneFunc,
    NewCandidateFunc, NiceAgent, PropertyValue, RecvFunc, StateChangedFunc,
};
use nice_bridge::Symbols;

/// Delay between `gather_candidates` and the first emitted signal
pub const GATHER_DELAY: Duration = Duration::from_millis(20);

/// Delay between connectivity state steps
pub const STEP_DELAY: Duration = Duration::from_millis(10);

/// Candidates produced per component: host, server-reflexive, peer-reflexive
pub const CANDIDATES_PER_COMPONENT: usize = 3;

// ---------------------------------------------------------------- main loop

pub struct MockContext {
    pub unrefs: AtomicU32,
    pub pushes: AtomicU32,
    pub pops: AtomicU32,
    loops: Mutex<Vec<&'static MockLoop>>,
}

#[derive(Default)]
struct LoopFlags {
    running: bool,
    quit: bool,
}

pub struct MockLoop {
    flags: Mutex<LoopFlags>,
    cond: Condvar,
    /// While set, quit requests are ignored
    pub stubborn: AtomicBool,
    pub runs: AtomicU32,
    pub quits: AtomicU32,
    pub unrefs: AtomicU32,
}

impl MockLoop {
    pub fn is_running(&self) -> bool {
        self.flags.lock().running
    }

    /// Let a stubborn loop go
    pub fn release(&self) {
        self.stubborn.store(false, Ordering::SeqCst);
        self.flags.lock().quit = true;
        self.cond.notify_all();
    }
}

pub fn context(ptr: *mut GMainContext) -> &'static MockContext {
    assert!(!ptr.is_null(), "null context");
    unsafe { &*(ptr as *const MockContext) }
}

/// First loop created on `ctx`
pub fn loop_of(ptr: *mut GMainContext) -> &'static MockLoop {
    context(ptr).loops.lock()[0]
}

unsafe extern "C" fn mock_context_new() -> *mut GMainContext {
    let ctx: &'static MockContext = Box::leak(Box::new(MockContext {
        unrefs: AtomicU32::new(0),
        pushes: AtomicU32::new(0),
        pops: AtomicU32::new(0),
        loops: Mutex::new(Vec::new()),
    }));
    ctx as *const MockContext as *mut GMainContext
}

unsafe extern "C" fn mock_context_unref(ctx: *mut GMainContext) {
    context(ctx).unrefs.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn mock_push_thread_default(ctx: *mut GMainContext) {
    context(ctx).pushes.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn mock_pop_thread_default(ctx: *mut GMainContext) {
    context(ctx).pops.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn mock_loop_new(ctx: *mut GMainContext, _is_running: GBoolean) -> *mut GMainLoop {
    let main_loop: &'static MockLoop = Box::leak(Box::new(MockLoop {
        flags: Mutex::new(LoopFlags::default()),
        cond: Condvar::new(),
        stubborn: AtomicBool::new(false),
        runs: AtomicU32::new(0),
        quits: AtomicU32::new(0),
        unrefs: AtomicU32::new(0),
    }));
    context(ctx).loops.lock().push(main_loop);
    main_loop as *const MockLoop as *mut GMainLoop
}

fn main_loop(ptr: *mut GMainLoop) -> &'static MockLoop {
    unsafe { &*(ptr as *const MockLoop) }
}

// A quit issued before run starts is lost, as with GLib
unsafe extern "C" fn mock_loop_run(ptr: *mut GMainLoop) {
    let l = main_loop(ptr);
    l.runs.fetch_add(1, Ordering::SeqCst);
    let mut flags = l.flags.lock();
    flags.running = true;
    flags.quit = false;
    while !flags.quit {
        l.cond.wait(&mut flags);
    }
    flags.running = false;
}

unsafe extern "C" fn mock_loop_quit(ptr: *mut GMainLoop) {
    let l = main_loop(ptr);
    l.quits.fetch_add(1, Ordering::SeqCst);
    if l.stubborn.load(Ordering::SeqCst) {
        return;
    }
    l.flags.lock().quit = true;
    l.cond.notify_all();
}

unsafe extern "C" fn mock_loop_unref(ptr: *mut GMainLoop) {
    main_loop(ptr).unrefs.fetch_add(1, Ordering::SeqCst);
}

// ---------------------------------------------------------------- agents

#[derive(Clone, Copy)]
struct Handler {
    id: c_ulong,
    signal: &'static str,
    callback: GCallback,
    data: usize,
}

#[derive(Clone, Copy)]
struct Receiver {
    func: RecvFunc,
    data: usize,
}

struct Candidate(Box<NiceCandidate>);

// SAFETY: candidate records are plain data; the string pointers are null
unsafe impl Send for Candidate {}

pub struct MockAgent {
    pub id: u64,
    pub context: usize,
    pub compatibility: c_int,
    next_stream: AtomicU32,
    next_handler: AtomicU64,
    streams: Mutex<HashMap<u32, u32>>,
    handlers: Mutex<Vec<Handler>>,
    receivers: Mutex<HashMap<(u32, u32), Receiver>>,
    local: Mutex<Vec<Candidate>>,
    remote: Mutex<Vec<Candidate>>,
    states: Mutex<HashMap<(u32, u32), u32>>,
    peer: Mutex<Option<u64>>,
    pub unrefs: AtomicU32,
    pub disconnects: AtomicU32,
    pub detaches: AtomicU32,
    pub calls_after_release: AtomicU32,
    pub sent: Mutex<Vec<Vec<u8>>>,
    pub properties: Mutex<Vec<(String, Property)>>,
}

/// A property value as the agent set it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    Int(i32),
    UInt(u32),
    Str(String),
}

fn agents() -> &'static Mutex<HashMap<u64, &'static MockAgent>> {
    static AGENTS: OnceLock<Mutex<HashMap<u64, &'static MockAgent>>> = OnceLock::new();
    AGENTS.get_or_init(|| Mutex::new(HashMap::new()))
}

pub fn agent(ptr: *mut NiceAgent) -> &'static MockAgent {
    assert!(!ptr.is_null(), "null agent");
    unsafe { &*(ptr as *const MockAgent) }
}

fn find_agent(id: u64) -> Option<&'static MockAgent> {
    agents().lock().get(&id).copied()
}

impl MockAgent {
    fn ptr(&'static self) -> *mut NiceAgent {
        self as *const MockAgent as *mut NiceAgent
    }

    fn touch(&self) {
        if self.unrefs.load(Ordering::SeqCst) > 0 {
            self.calls_after_release.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn receiver_count(&self) -> usize {
        self.receivers.lock().len()
    }

    pub fn peer(&self) -> Option<u64> {
        *self.peer.lock()
    }

    fn handlers_for(&self, signal: &str) -> Vec<Handler> {
        self.handlers
            .lock()
            .iter()
            .filter(|h| h.signal == signal)
            .copied()
            .collect()
    }

    pub fn emit_gathering_done(&'static self, stream_id: u32) {
        for h in self.handlers_for("candidate-gathering-done") {
            let f: GatheringDoneFunc = unsafe { std::mem::transmute(h.callback) };
            unsafe { f(self.ptr(), stream_id, h.data as GPointer) };
        }
    }

    pub fn emit_state(&'static self, stream_id: u32, component_id: u32, state: u32) {
        self.states.lock().insert((stream_id, component_id), state);
        for h in self.handlers_for("component-state-changed") {
            let f: StateChangedFunc = unsafe { std::mem::transmute(h.callback) };
            unsafe { f(self.ptr(), stream_id, component_id, state, h.data as GPointer) };
        }
    }

    pub fn emit_new_candidate(&'static self, stream_id: u32, component_id: u32, foundation: &CStr) {
        for h in self.handlers_for("new-candidate") {
            let f: NewCandidateFunc = unsafe { std::mem::transmute(h.callback) };
            unsafe { f(self.ptr(), stream_id, component_id, foundation.as_ptr(), h.data as GPointer) };
        }
    }

    /// Invoke the attached receiver as an incoming packet would
    pub fn deliver(&'static self, stream_id: u32, component_id: u32, payload: &[u8]) -> bool {
        let receiver = self.receivers.lock().get(&(stream_id, component_id)).copied();
        match receiver {
            Some(r) => {
                unsafe {
                    (r.func)(
                        self.ptr(),
                        stream_id,
                        component_id,
                        payload.len() as c_uint,
                        payload.as_ptr() as *const c_char,
                        r.data as GPointer,
                    )
                };
                true
            }
            None => false,
        }
    }

    fn components(&self) -> Vec<(u32, u32)> {
        let mut pairs: Vec<(u32, u32)> = self
            .streams
            .lock()
            .iter()
            .flat_map(|(&stream, &n)| (1..=n).map(move |component| (stream, component)))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    /// Walk every component through connecting, connected, ready
    fn connect(&'static self) {
        thread::spawn(move || {
            for state in [2, 3, 4] {
                thread::sleep(STEP_DELAY);
                for (stream, component) in self.components() {
                    self.emit_state(stream, component, state);
                }
            }
        });
    }
}

pub fn encode_address(ip: [u8; 4], port: u16) -> NiceAddress {
    let mut opaque = [0u8; NICE_ADDRESS_SIZE];
    opaque[..4].copy_from_slice(&ip);
    opaque[4..6].copy_from_slice(&port.to_le_bytes());
    NiceAddress { opaque }
}

pub fn make_candidate(kind: u32, stream_id: u32, component_id: u32, foundation: &str, ip: [u8; 4], port: u16) -> NiceCandidate {
    let mut f = [0 as c_char; FOUNDATION_LEN];
    for (dst, src) in f.iter_mut().zip(foundation.bytes().take(FOUNDATION_LEN - 1)) {
        *dst = src as c_char;
    }
    NiceCandidate {
        kind,
        transport: 0,
        addr: encode_address(ip, port),
        base_addr: encode_address(ip, port),
        priority: 2_130_706_431 - kind * 1000 - component_id,
        stream_id,
        component_id,
        foundation: f,
        _foundation_pad: [0; 3],
        username: std::ptr::null_mut(),
        password: std::ptr::null_mut(),
        turn_addr: encode_address([0; 4], 0),
        turn_transport: 0,
        _reserved: [0; 4],
    }
}

unsafe extern "C" fn mock_agent_new(ctx: *mut GMainContext, compat: c_int) -> *mut NiceAgent {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);
    let a: &'static MockAgent = Box::leak(Box::new(MockAgent {
        id,
        context: ctx as usize,
        compatibility: compat,
        next_stream: AtomicU32::new(1),
        next_handler: AtomicU64::new(1),
        streams: Mutex::new(HashMap::new()),
        handlers: Mutex::new(Vec::new()),
        receivers: Mutex::new(HashMap::new()),
        local: Mutex::new(Vec::new()),
        remote: Mutex::new(Vec::new()),
        states: Mutex::new(HashMap::new()),
        peer: Mutex::new(None),
        unrefs: AtomicU32::new(0),
        disconnects: AtomicU32::new(0),
        detaches: AtomicU32::new(0),
        calls_after_release: AtomicU32::new(0),
        sent: Mutex::new(Vec::new()),
        properties: Mutex::new(Vec::new()),
    }));
    agents().lock().insert(id, a);
    a.ptr()
}

unsafe extern "C" fn mock_add_stream(ptr: *mut NiceAgent, n_components: c_uint) -> c_uint {
    let a = agent(ptr);
    a.touch();
    if n_components == 0 {
        return 0;
    }
    let id = a.next_stream.fetch_add(1, Ordering::SeqCst);
    a.streams.lock().insert(id, n_components);
    id
}

unsafe extern "C" fn mock_gather(ptr: *mut NiceAgent, stream_id: c_uint) -> GBoolean {
    let a = agent(ptr);
    a.touch();
    let n_components = match a.streams.lock().get(&stream_id) {
        Some(&n) => n,
        None => return 0,
    };

    thread::spawn(move || {
        thread::sleep(GATHER_DELAY);
        for component in 1..=n_components {
            a.emit_state(stream_id, component, 1);
            for kind in 0..CANDIDATES_PER_COMPONENT as u32 {
                let foundation = format!("{}", kind + 1);
                let port = 40000 + (a.id as u16 % 1000) * 10 + kind as u16;
                let candidate = make_candidate(kind, stream_id, component, &foundation, [10, 0, 0, kind as u8 + 1], port);
                a.local.lock().push(Candidate(Box::new(candidate)));
                if let Ok(foundation) = CString::new(foundation) {
                    a.emit_new_candidate(stream_id, component, &foundation);
                }
            }
        }
        a.emit_gathering_done(stream_id);
    });
    1
}

unsafe extern "C" fn mock_generate_local_sdp(ptr: *mut NiceAgent) -> *mut c_char {
    let a = agent(ptr);
    a.touch();
    let mut sdp = format!("mock-agent:{}\n", a.id);
    for c in a.local.lock().iter() {
        sdp.push_str(&format!("a=candidate:{} {} UDP {}\n", c.0.kind + 1, c.0.component_id, c.0.priority));
    }
    match CString::new(sdp) {
        Ok(s) => s.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn mock_parse_remote_sdp(ptr: *mut NiceAgent, sdp: *const c_char) -> c_int {
    let a = agent(ptr);
    a.touch();
    if sdp.is_null() {
        return -1;
    }
    let text = CStr::from_ptr(sdp).to_string_lossy().into_owned();
    let peer_id = match text
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("mock-agent:"))
        .and_then(|id| id.trim().parse::<u64>().ok())
    {
        Some(id) => id,
        None => return -1,
    };
    let peer = match find_agent(peer_id) {
        Some(peer) => peer,
        None => return -1,
    };

    let copied: Vec<Candidate> = peer
        .local
        .lock()
        .iter()
        .map(|c| {
            let mut foundation = String::new();
            for &b in c.0.foundation.iter().take_while(|&&b| b != 0) {
                foundation.push(b as u8 as char);
            }
            let addr = c.0.addr.opaque;
            let port = u16::from_le_bytes([addr[4], addr[5]]);
            Candidate(Box::new(make_candidate(
                c.0.kind,
                c.0.stream_id,
                c.0.component_id,
                &foundation,
                [addr[0], addr[1], addr[2], addr[3]],
                port,
            )))
        })
        .collect();
    let added = copied.len() as c_int;
    a.remote.lock().extend(copied);
    *a.peer.lock() = Some(peer_id);

    // Connectivity starts once both sides know each other
    if peer.peer() == Some(a.id) {
        a.connect();
        peer.connect();
    }
    added
}

unsafe extern "C" fn mock_send(ptr: *mut NiceAgent, stream_id: c_uint, component_id: c_uint, len: c_uint, buf: *const c_char) -> c_int {
    let a = agent(ptr);
    a.touch();
    if a.states.lock().get(&(stream_id, component_id)) != Some(&4) {
        return -1;
    }
    let payload = std::slice::from_raw_parts(buf as *const u8, len as usize).to_vec();
    a.sent.lock().push(payload.clone());
    if let Some(peer) = a.peer().and_then(find_agent) {
        peer.deliver(stream_id, component_id, &payload);
    }
    len as c_int
}

unsafe extern "C" fn mock_attach_recv(
    ptr: *mut NiceAgent,
    stream_id: c_uint,
    component_id: c_uint,
    _ctx: *mut GMainContext,
    func: Option<RecvFunc>,
    data: GPointer,
) -> GBoolean {
    let a = agent(ptr);
    a.touch();
    if !a.streams.lock().contains_key(&stream_id) {
        return 0;
    }
    let mut receivers = a.receivers.lock();
    match func {
        Some(func) => {
            receivers.insert((stream_id, component_id), Receiver { func, data: data as usize });
        }
        None => {
            receivers.remove(&(stream_id, component_id));
            a.detaches.fetch_add(1, Ordering::SeqCst);
        }
    }
    1
}

unsafe extern "C" fn mock_component_state(ptr: *mut NiceAgent, stream_id: c_uint, component_id: c_uint) -> c_uint {
    let a = agent(ptr);
    a.touch();
    a.states.lock().get(&(stream_id, component_id)).copied().unwrap_or(0)
}

thread_local! {
    static LIST_NODES_LIVE: Cell<usize> = const { Cell::new(0) };
    static LIST_FREES: Cell<usize> = const { Cell::new(0) };
    static STRING_FREES: Cell<usize> = const { Cell::new(0) };
}

/// (nodes still allocated, `g_slist_free` calls) on this thread
pub fn list_stats() -> (usize, usize) {
    (LIST_NODES_LIVE.with(Cell::get), LIST_FREES.with(Cell::get))
}

/// `g_free` calls on this thread
pub fn string_frees() -> usize {
    STRING_FREES.with(Cell::get)
}

/// Build a native list over `items`, head first
pub fn build_list(items: &[*mut NiceCandidate]) -> *mut GSList {
    let mut head: *mut GSList = std::ptr::null_mut();
    for &item in items.iter().rev() {
        head = Box::into_raw(Box::new(GSList { data: item as GPointer, next: head }));
        LIST_NODES_LIVE.with(|n| n.set(n.get() + 1));
    }
    head
}

fn candidate_list(list: &Mutex<Vec<Candidate>>, stream_id: u32, component_id: u32) -> *mut GSList {
    let mut guard = list.lock();
    let items: Vec<*mut NiceCandidate> = guard
        .iter_mut()
        .filter(|c| c.0.stream_id == stream_id && c.0.component_id == component_id)
        .map(|c| &mut *c.0 as *mut NiceCandidate)
        .collect();
    build_list(&items)
}

unsafe extern "C" fn mock_local_candidates(ptr: *mut NiceAgent, stream_id: c_uint, component_id: c_uint) -> *mut GSList {
    let a = agent(ptr);
    a.touch();
    candidate_list(&a.local, stream_id, component_id)
}

unsafe extern "C" fn mock_remote_candidates(ptr: *mut NiceAgent, stream_id: c_uint, component_id: c_uint) -> *mut GSList {
    let a = agent(ptr);
    a.touch();
    candidate_list(&a.remote, stream_id, component_id)
}

unsafe extern "C" fn mock_slist_free(list: *mut GSList) {
    LIST_FREES.with(|n| n.set(n.get() + 1));
    let mut node = list;
    while !node.is_null() {
        let boxed = Box::from_raw(node);
        node = boxed.next;
        LIST_NODES_LIVE.with(|n| n.set(n.get() - 1));
    }
}

unsafe extern "C" fn mock_free(mem: GPointer) {
    STRING_FREES.with(|n| n.set(n.get() + 1));
    if !mem.is_null() {
        drop(CString::from_raw(mem as *mut c_char));
    }
}

unsafe extern "C" fn mock_address_to_string(addr: *const NiceAddress, dst: *mut c_char) {
    let bytes = (*addr).opaque;
    let text = format!("{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3]);
    for (i, b) in text.bytes().enumerate() {
        *dst.add(i) = b as c_char;
    }
    *dst.add(text.len()) = 0;
}

unsafe extern "C" fn mock_address_get_port(addr: *const NiceAddress) -> c_uint {
    let bytes = (*addr).opaque;
    u16::from_le_bytes([bytes[4], bytes[5]]) as c_uint
}

const SIGNALS: [&str; 3] = ["candidate-gathering-done", "component-state-changed", "new-candidate"];

unsafe extern "C" fn mock_signal_connect(
    instance: GPointer,
    name: *const c_char,
    callback: Option<GCallback>,
    data: GPointer,
    _notify: Option<GClosureNotify>,
    _flags: c_int,
) -> c_ulong {
    let a = agent(instance as *mut NiceAgent);
    a.touch();
    let name = CStr::from_ptr(name).to_string_lossy();
    let (signal, callback) = match (SIGNALS.iter().find(|s| **s == name), callback) {
        (Some(signal), Some(callback)) => (*signal, callback),
        _ => return 0,
    };
    let id = a.next_handler.fetch_add(1, Ordering::SeqCst) as c_ulong;
    a.handlers.lock().push(Handler {
        id,
        signal,
        callback,
        data: data as usize,
    });
    id
}

unsafe extern "C" fn mock_signal_disconnect(instance: GPointer, handler_id: c_ulong) {
    let a = agent(instance as *mut NiceAgent);
    a.touch();
    a.handlers.lock().retain(|h| h.id != handler_id);
    a.disconnects.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn mock_object_unref(object: GPointer) {
    agent(object as *mut NiceAgent).unrefs.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn mock_networking_init() {}

fn mock_set_property(object: GPointer, name: &CStr, value: PropertyValue<'_>) {
    let a = agent(object as *mut NiceAgent);
    a.touch();
    let value = match value {
        PropertyValue::Int(v) => Property::Int(v),
        PropertyValue::UInt(v) => Property::UInt(v),
        PropertyValue::Str(v) => Property::Str(v.to_string_lossy().into_owned()),
    };
    a.properties.lock().push((name.to_string_lossy().into_owned(), value));
}

/// A symbol table backed entirely by the mocks above
pub fn symbols() -> Symbols {
    let mut s = Symbols::absent();
    s.nice_agent_new = Some(mock_agent_new);
    s.nice_agent_add_stream = Some(mock_add_stream);
    s.nice_agent_gather_candidates = Some(mock_gather);
    s.nice_agent_generate_local_sdp = Some(mock_generate_local_sdp);
    s.nice_agent_parse_remote_sdp = Some(mock_parse_remote_sdp);
    s.nice_agent_send = Some(mock_send);
    s.nice_agent_attach_recv = Some(mock_attach_recv);
    s.nice_agent_get_component_state = Some(mock_component_state);
    s.nice_agent_get_local_candidates = Some(mock_local_candidates);
    s.nice_agent_get_remote_candidates = Some(mock_remote_candidates);
    s.nice_address_to_string = Some(mock_address_to_string);
    s.nice_address_get_port = Some(mock_address_get_port);
    s.g_signal_connect_data = Some(mock_signal_connect);
    s.g_signal_handler_disconnect = Some(mock_signal_disconnect);
    s.g_object_unref = Some(mock_object_unref);
    s.g_slist_free = Some(mock_slist_free);
    s.g_free = Some(mock_free);
    s.g_main_context_new = Some(mock_context_new);
    s.g_main_context_unref = Some(mock_context_unref);
    s.g_main_context_push_thread_default = Some(mock_push_thread_default);
    s.g_main_context_pop_thread_default = Some(mock_pop_thread_default);
    s.g_main_loop_new = Some(mock_loop_new);
    s.g_main_loop_run = Some(mock_loop_run);
    s.g_main_loop_quit = Some(mock_loop_quit);
    s.g_main_loop_unref = Some(mock_loop_unref);
    s.g_networking_init = Some(mock_networking_init);
    s.property_setter = Some(mock_set_property);
    s
}

pub fn shared() -> Arc<Symbols> {
    Arc::new(symbols())
}
