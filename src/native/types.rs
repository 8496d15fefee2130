/**
 * native/types.rs
 *
 * Opaque native handles, callback signatures and the libnice enums
 */

use serde::Serialize;
use std::ffi::CStr;
use std::fmt;
use std::os::raw::{c_char, c_int, c_uint, c_ulong, c_void};

use super::layout::{GSList, NiceAddress};

pub type GPointer = *mut c_void;
pub type GBoolean = c_int;

/// Opaque `NiceAgent` (a GObject)
#[repr(C)]
pub struct NiceAgent {
    _private: [u8; 0],
}

/// Opaque `GMainContext`
#[repr(C)]
pub struct GMainContext {
    _private: [u8; 0],
}

/// Opaque `GMainLoop`
#[repr(C)]
pub struct GMainLoop {
    _private: [u8; 0],
}

/// Untyped `GCallback` as accepted by `g_signal_connect_data`
pub type GCallback = unsafe extern "C" fn();

/// `GClosureNotify`
pub type GClosureNotify = unsafe extern "C" fn(data: GPointer, closure: GPointer);

/// `NiceAgentRecvFunc`
pub type RecvFunc = unsafe extern "C" fn(
    agent: *mut NiceAgent,
    stream_id: c_uint,
    component_id: c_uint,
    len: c_uint,
    buf: *const c_char,
    user_data: GPointer,
);

/// `candidate-gathering-done` handler
pub type GatheringDoneFunc =
    unsafe extern "C" fn(agent: *mut NiceAgent, stream_id: c_uint, user_data: GPointer);

/// `component-state-changed` handler
pub type StateChangedFunc = unsafe extern "C" fn(
    agent: *mut NiceAgent,
    stream_id: c_uint,
    component_id: c_uint,
    state: c_uint,
    user_data: GPointer,
);

/// `new-candidate` handler
pub type NewCandidateFunc = unsafe extern "C" fn(
    agent: *mut NiceAgent,
    stream_id: c_uint,
    component_id: c_uint,
    foundation: *const c_char,
    user_data: GPointer,
);

// Function pointer signatures of every consumed symbol

pub type AgentNewFn = unsafe extern "C" fn(ctx: *mut GMainContext, compat: c_int) -> *mut NiceAgent;
pub type AgentAddStreamFn = unsafe extern "C" fn(agent: *mut NiceAgent, n_components: c_uint) -> c_uint;
pub type AgentGatherCandidatesFn = unsafe extern "C" fn(agent: *mut NiceAgent, stream_id: c_uint) -> GBoolean;
pub type AgentGenerateLocalSdpFn = unsafe extern "C" fn(agent: *mut NiceAgent) -> *mut c_char;
pub type AgentParseRemoteSdpFn = unsafe extern "C" fn(agent: *mut NiceAgent, sdp: *const c_char) -> c_int;
pub type AgentSendFn = unsafe extern "C" fn(
    agent: *mut NiceAgent,
    stream_id: c_uint,
    component_id: c_uint,
    len: c_uint,
    buf: *const c_char,
) -> c_int;
pub type AgentAttachRecvFn = unsafe extern "C" fn(
    agent: *mut NiceAgent,
    stream_id: c_uint,
    component_id: c_uint,
    ctx: *mut GMainContext,
    func: Option<RecvFunc>,
    data: GPointer,
) -> GBoolean;
pub type AgentGetComponentStateFn =
    unsafe extern "C" fn(agent: *mut NiceAgent, stream_id: c_uint, component_id: c_uint) -> c_uint;
pub type AgentGetCandidatesFn =
    unsafe extern "C" fn(agent: *mut NiceAgent, stream_id: c_uint, component_id: c_uint) -> *mut GSList;
pub type AddressToStringFn = unsafe extern "C" fn(addr: *const NiceAddress, dst: *mut c_char);
pub type AddressGetPortFn = unsafe extern "C" fn(addr: *const NiceAddress) -> c_uint;

/// `g_object_set` is variadic; callers go through `Symbols::set_property`
pub type ObjectSetFn = unsafe extern "C" fn(object: GPointer, first_property_name: *const c_char, ...);

/// One typed property value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyValue<'a> {
    Int(c_int),
    UInt(c_uint),
    Str(&'a CStr),
}

/// Non-variadic property setter, used in place of `g_object_set` when installed
pub type PropertySetFn = fn(object: GPointer, name: &CStr, value: PropertyValue<'_>);
pub type SignalConnectDataFn = unsafe extern "C" fn(
    instance: GPointer,
    detailed_signal: *const c_char,
    handler: Option<GCallback>,
    data: GPointer,
    destroy_data: Option<GClosureNotify>,
    connect_flags: c_int,
) -> c_ulong;
pub type SignalHandlerDisconnectFn = unsafe extern "C" fn(instance: GPointer, handler_id: c_ulong);
pub type ObjectUnrefFn = unsafe extern "C" fn(object: GPointer);
pub type SListFreeFn = unsafe extern "C" fn(list: *mut GSList);
pub type FreeFn = unsafe extern "C" fn(mem: GPointer);

pub type MainContextNewFn = unsafe extern "C" fn() -> *mut GMainContext;
pub type MainContextUnrefFn = unsafe extern "C" fn(ctx: *mut GMainContext);
pub type MainContextThreadDefaultFn = unsafe extern "C" fn(ctx: *mut GMainContext);
pub type MainLoopNewFn = unsafe extern "C" fn(ctx: *mut GMainContext, is_running: GBoolean) -> *mut GMainLoop;
pub type MainLoopFn = unsafe extern "C" fn(main_loop: *mut GMainLoop);
pub type NetworkingInitFn = unsafe extern "C" fn();

/// Defines a closed native enum with bit-exact discriminants
macro_rules! native_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident = $value:literal => $label:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        #[repr(u32)]
        pub enum $name {
            $($variant = $value),+
        }

        impl $name {
            pub fn from_raw(raw: u32) -> Option<Self> {
                match raw {
                    $($value => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub fn as_raw(self) -> u32 {
                self as u32
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }

            /// Same label, NUL-terminated for C callers
            pub fn as_c_str(self) -> &'static CStr {
                let bytes: &'static [u8] = match self {
                    $(Self::$variant => concat!($label, "\0").as_bytes()),+
                };
                // SAFETY: labels are literals without interior NULs
                unsafe { CStr::from_bytes_with_nul_unchecked(bytes) }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

native_enum! {
    /// `NiceCandidateType`
    pub enum CandidateType {
        Host = 0 => "host",
        ServerReflexive = 1 => "srflx",
        PeerReflexive = 2 => "prflx",
        Relayed = 3 => "relay",
    }
}

native_enum! {
    /// `NiceCandidateTransport`
    pub enum CandidateTransport {
        Udp = 0 => "UDP",
        TcpPassive = 1 => "TCP-PASSIVE",
        TcpActive = 2 => "TCP-ACTIVE",
        TcpSo = 3 => "TCP-SO",
    }
}

native_enum! {
    /// `NiceComponentState`
    pub enum ComponentState {
        Disconnected = 0 => "DISCONNECTED",
        Gathering = 1 => "GATHERING",
        Connecting = 2 => "CONNECTING",
        Connected = 3 => "CONNECTED",
        Ready = 4 => "READY",
        Failed = 5 => "FAILED",
    }
}

native_enum! {
    /// `NiceCompatibility`
    pub enum Compatibility {
        Rfc5245 = 0 => "RFC5245",
        Draft19 = 1 => "DRAFT19",
        Google = 2 => "GOOGLE",
        Msn = 3 => "MSN",
    }
}

impl Default for Compatibility {
    fn default() -> Self {
        Compatibility::Rfc5245
    }
}

impl std::str::FromStr for Compatibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rfc5245" | "0" => Ok(Compatibility::Rfc5245),
            "draft19" | "1" => Ok(Compatibility::Draft19),
            "google" | "2" => Ok(Compatibility::Google),
            "msn" | "3" => Ok(Compatibility::Msn),
            other => Err(format!("unknown compatibility mode: {}", other)),
        }
    }
}
