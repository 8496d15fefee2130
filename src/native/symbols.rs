/**
 * native/symbols.rs
 *
 * Symbol table: one optional typed function pointer per consumed native symbol
 */

use libloading::Library;
use std::ffi::CStr;
use std::fmt;
use std::os::raw::c_char;
use std::ptr;

use super::types::*;

macro_rules! symbol_table {
    ($($name:ident : $ty:ty),+ $(,)?) => {
        /// Resolved native entry points.
        ///
        /// Every entry is individually optional. Call sites treat `None` as
        /// "operation unsupported" and fall back to a neutral value.
        pub struct Symbols {
            $(pub $name: Option<$ty>,)+
            /// Takes precedence over `g_object_set` when set
            pub property_setter: Option<PropertySetFn>,
            libraries: Vec<Library>,
            source: Option<String>,
            tried: Vec<String>,
        }

        impl Symbols {
            /// Every symbol name the table knows about
            pub const NAMES: &'static [&'static str] = &[$(stringify!($name)),+];

            /// A table with nothing resolved
            pub fn absent() -> Self {
                Self {
                    $($name: None,)+
                    property_setter: None,
                    libraries: Vec::new(),
                    source: None,
                    tried: Vec::new(),
                }
            }

            /// Resolve every symbol against the given libraries, first hit wins.
            ///
            /// The libraries are kept inside the table so the pointers stay valid.
            pub fn resolve(libraries: Vec<Library>) -> Self {
                Self {
                    $($name: lookup::<$ty>(&libraries, stringify!($name)),)+
                    property_setter: None,
                    libraries,
                    source: None,
                    tried: Vec::new(),
                }
            }

            pub fn is_resolved(&self, name: &str) -> bool {
                match name {
                    $(stringify!($name) => self.$name.is_some(),)+
                    _ => false,
                }
            }
        }
    };
}

symbol_table! {
    nice_agent_new: AgentNewFn,
    nice_agent_add_stream: AgentAddStreamFn,
    nice_agent_gather_candidates: AgentGatherCandidatesFn,
    nice_agent_generate_local_sdp: AgentGenerateLocalSdpFn,
    nice_agent_parse_remote_sdp: AgentParseRemoteSdpFn,
    nice_agent_send: AgentSendFn,
    nice_agent_attach_recv: AgentAttachRecvFn,
    nice_agent_get_component_state: AgentGetComponentStateFn,
    nice_agent_get_local_candidates: AgentGetCandidatesFn,
    nice_agent_get_remote_candidates: AgentGetCandidatesFn,
    nice_address_to_string: AddressToStringFn,
    nice_address_get_port: AddressGetPortFn,
    g_object_set: ObjectSetFn,
    g_signal_connect_data: SignalConnectDataFn,
    g_signal_handler_disconnect: SignalHandlerDisconnectFn,
    g_object_unref: ObjectUnrefFn,
    g_slist_free: SListFreeFn,
    g_free: FreeFn,
    g_main_context_new: MainContextNewFn,
    g_main_context_unref: MainContextUnrefFn,
    g_main_context_push_thread_default: MainContextThreadDefaultFn,
    g_main_context_pop_thread_default: MainContextThreadDefaultFn,
    g_main_loop_new: MainLoopNewFn,
    g_main_loop_run: MainLoopFn,
    g_main_loop_quit: MainLoopFn,
    g_main_loop_unref: MainLoopFn,
    g_networking_init: NetworkingInitFn,
}

/// Symbols without which an agent on its own loop cannot work
pub const CORE_SYMBOLS: &[&str] = &[
    "nice_agent_new",
    "nice_agent_add_stream",
    "nice_agent_gather_candidates",
    "nice_agent_generate_local_sdp",
    "nice_agent_parse_remote_sdp",
    "nice_agent_send",
    "nice_agent_attach_recv",
    "g_signal_connect_data",
    "g_object_unref",
    "g_main_context_new",
    "g_main_loop_new",
    "g_main_loop_run",
    "g_main_loop_quit",
];

fn lookup<T: Copy>(libraries: &[Library], name: &str) -> Option<T> {
    let mut symbol = Vec::with_capacity(name.len() + 1);
    symbol.extend_from_slice(name.as_bytes());
    symbol.push(0);

    libraries.iter().find_map(|library| {
        // SAFETY: the table types mirror the C prototypes of these symbols
        unsafe { library.get::<T>(&symbol).ok().map(|found| *found) }
    })
}

impl Symbols {
    /// Core symbols that did not resolve
    pub fn missing_core(&self) -> Vec<&'static str> {
        CORE_SYMBOLS
            .iter()
            .copied()
            .filter(|name| !self.is_resolved(name))
            .collect()
    }

    pub fn resolved_count(&self) -> usize {
        Self::NAMES.iter().filter(|name| self.is_resolved(name)).count()
    }

    pub fn library_count(&self) -> usize {
        self.libraries.len()
    }

    /// Record where the primary library came from and what was tried
    pub fn with_origin(mut self, source: Option<String>, tried: Vec<String>) -> Self {
        self.source = source;
        self.tried = tried;
        self
    }

    /// Search step that produced the primary library, if one loaded
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn tried(&self) -> &[String] {
        &self.tried
    }

    /// Set one property on a GObject. Returns false when no setter exists.
    ///
    /// The variadic call always carries the NULL terminator.
    ///
    /// # Safety
    /// `object` must be a live GObject that has a property `name` of the
    /// value's type.
    pub unsafe fn set_property(&self, object: GPointer, name: &CStr, value: PropertyValue<'_>) -> bool {
        if let Some(setter) = self.property_setter {
            setter(object, name, value);
            return true;
        }
        let set = match self.g_object_set {
            Some(set) => set,
            None => return false,
        };
        let end = ptr::null::<c_char>();
        match value {
            PropertyValue::Int(v) => set(object, name.as_ptr(), v, end),
            PropertyValue::UInt(v) => set(object, name.as_ptr(), v, end),
            PropertyValue::Str(v) => set(object, name.as_ptr(), v.as_ptr(), end),
        }
        true
    }

    /// One-time networking stack initialisation, if the runtime exports it
    pub fn init_networking(&self) -> bool {
        match self.g_networking_init {
            Some(init) => {
                unsafe { init() };
                true
            }
            None => false,
        }
    }
}

impl Default for Symbols {
    fn default() -> Self {
        Self::absent()
    }
}

impl fmt::Debug for Symbols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let missing: Vec<_> = Self::NAMES
            .iter()
            .filter(|name| !self.is_resolved(name))
            .collect();
        f.debug_struct("Symbols")
            .field("source", &self.source)
            .field("libraries", &self.libraries.len())
            .field("resolved", &self.resolved_count())
            .field("missing", &missing)
            .finish()
    }
}
