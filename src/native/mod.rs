/**
 * native/mod.rs
 *
 * Native side of the bindings:
 * - memory-layout mirror of libnice records
 * - runtime library search
 * - symbol table shared by every handle
 */

pub mod layout;
pub mod loader;
pub mod symbols;
pub mod types;

pub use layout::{CandidateView, GSList, NiceAddress, NiceCandidate};
pub use symbols::{Symbols, CORE_SYMBOLS};
pub use types::{CandidateTransport, CandidateType, Compatibility, ComponentState};

use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};

use crate::config::BridgeConfig;
use crate::error::{Error, Result};

static GLOBAL: OnceLock<Arc<Symbols>> = OnceLock::new();

/// Load the native library and resolve the symbol table.
///
/// With `require_native` unset this never fails: missing pieces resolve to
/// absent entries. With it set, a missing library or core symbol is an error.
pub fn load(config: &BridgeConfig) -> Result<Symbols> {
    let loaded = loader::load_libraries(config);
    let source = loaded.primary.as_ref().map(|step| step.describe());
    let symbols = Symbols::resolve(loaded.libraries).with_origin(source, loaded.tried);

    if config.require_native {
        require(&symbols)?;
    } else {
        let missing = symbols.missing_core();
        if !missing.is_empty() {
            warn!(missing = ?missing, "running with missing native symbols");
        }
    }

    if symbols.init_networking() {
        info!("GLib networking initialized");
    }

    Ok(symbols)
}

/// Fail unless the primary library loaded and every core symbol resolved
pub fn require(symbols: &Symbols) -> Result<()> {
    if symbols.source().is_none() {
        return Err(Error::LibraryNotFound {
            tried: symbols.tried().to_vec(),
        });
    }
    let missing = symbols.missing_core();
    if !missing.is_empty() {
        return Err(Error::MissingSymbols(missing));
    }
    Ok(())
}

/// Initialise the process-wide table from `config`.
///
/// The first successful call wins; later calls return the existing table.
/// With `require_native` set, an existing degraded table is still an error.
pub fn init(config: &BridgeConfig) -> Result<Arc<Symbols>> {
    if let Some(existing) = GLOBAL.get() {
        if config.require_native {
            require(existing)?;
        }
        return Ok(existing.clone());
    }
    let symbols = Arc::new(load(config)?);
    Ok(GLOBAL.get_or_init(|| symbols).clone())
}

/// Process-wide table, loaded from the environment on first use
pub fn global() -> Arc<Symbols> {
    GLOBAL
        .get_or_init(|| match load(&BridgeConfig::from_env()) {
            Ok(symbols) => Arc::new(symbols),
            Err(e) => {
                error!("native load failed, continuing without native bindings: {}", e);
                Arc::new(Symbols::absent())
            }
        })
        .clone()
}
