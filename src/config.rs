/**
 * config.rs
 *
 * Runtime configuration read from the environment
 */

use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_LIBRARY_PATH: &str = "NICE_LIBRARY_PATH";
pub const ENV_NATIVES_DIR: &str = "NICE_NATIVES_DIR";
pub const ENV_REQUIRE_NATIVE: &str = "NICE_REQUIRE_NATIVE";
pub const ENV_LOOP_JOIN_TIMEOUT_MS: &str = "NICE_LOOP_JOIN_TIMEOUT_MS";

const DEFAULT_LOOP_JOIN_TIMEOUT: Duration = Duration::from_millis(2000);

/// Binding configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Explicit native library path, tried before anything else
    pub library_path: Option<PathBuf>,

    /// Root of bundled natives (`<root>/<os>-<arch>/<file>`)
    pub natives_dir: Option<PathBuf>,

    /// Fail at load time when core symbols are missing
    pub require_native: bool,

    /// Bound on waiting for an event-loop worker to exit
    pub loop_join_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            natives_dir: None,
            require_native: false,
            loop_join_timeout: DEFAULT_LOOP_JOIN_TIMEOUT,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unparsable values fall back to defaults
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let require_native = non_empty(ENV_REQUIRE_NATIVE)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let loop_join_timeout = non_empty(ENV_LOOP_JOIN_TIMEOUT_MS)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_LOOP_JOIN_TIMEOUT);

        Self {
            library_path: non_empty(ENV_LIBRARY_PATH).map(PathBuf::from),
            natives_dir: non_empty(ENV_NATIVES_DIR).map(PathBuf::from),
            require_native,
            loop_join_timeout,
        }
    }

    /// Bundled natives root: configured, or `natives/` beside the executable
    pub fn natives_root(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.natives_dir {
            return Some(dir.clone());
        }
        env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("natives")))
    }
}
