/**
 * bridge/registry.rs
 *
 * Token registry joining native callback invocations to per-agent contexts.
 *
 * Tokens are minted here, never reused, and travel through native code as
 * the integer value of the user-data pointer. Nothing ever dereferences
 * them, so a late callback can only miss the lookup.
 */

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use super::{AgentEvents, BridgeEvent};
use crate::native::types::GPointer;

/// Per-agent callback token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u64);

impl Token {
    pub fn as_user_data(self) -> GPointer {
        self.0 as usize as GPointer
    }

    pub fn from_user_data(data: GPointer) -> Self {
        Token(data as usize as u64)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct Registry {
    next: AtomicU64,
    entries: RwLock<HashMap<Token, Arc<AgentEvents>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, events: Arc<AgentEvents>) -> Token {
        self.register_with(|_| events).0
    }

    /// Mint a token and register the context built for it
    pub fn register_with<F>(&self, build: F) -> (Token, Arc<AgentEvents>)
    where
        F: FnOnce(Token) -> Arc<AgentEvents>,
    {
        let token = Token(self.next.fetch_add(1, Ordering::Relaxed));
        let events = build(token);
        self.entries.write().insert(token, Arc::clone(&events));
        (token, events)
    }

    /// Remove a token. Once this returns no dispatch for it is in flight
    /// and none will be observed later.
    pub fn unregister(&self, token: Token) -> bool {
        self.entries.write().remove(&token).is_some()
    }

    pub fn is_registered(&self, token: Token) -> bool {
        self.entries.read().contains_key(&token)
    }

    /// Hand an event to the context behind `token`.
    ///
    /// The read lock is held across the hand-off so `unregister` waits for
    /// deliveries already under way.
    pub fn dispatch(&self, token: Token, event: BridgeEvent) -> bool {
        let entries = self.entries.read();
        match entries.get(&token) {
            Some(events) => {
                events.dispatch(event);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide registry used by the trampolines
pub fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::new)
}
