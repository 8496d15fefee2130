/**
 * native/loader.rs
 *
 * Locates and opens the native ICE library and its GLib runtime.
 *
 * Search order, first successful load wins:
 * 1. explicit override path
 * 2. bundled binary for this OS/arch, copied to a private temp directory
 * 3. conventional system library names
 */

use anyhow::{Context, Result};
use libloading::Library;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;

/// One place the loader will try
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStep {
    Override(PathBuf),
    Bundled(PathBuf),
    System(&'static str),
}

impl SearchStep {
    pub fn describe(&self) -> String {
        match self {
            SearchStep::Override(path) => format!("override {}", path.display()),
            SearchStep::Bundled(path) => format!("bundled {}", path.display()),
            SearchStep::System(name) => format!("system {}", name),
        }
    }
}

/// Result of a load attempt
pub struct LoadedLibraries {
    pub libraries: Vec<Library>,
    pub primary: Option<SearchStep>,
    pub tried: Vec<String>,
}

/// `<os>-<arch>` directory name of bundled natives
pub fn platform_dir() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}

/// File names a bundled build may use on this platform
pub fn bundled_file_names() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &["libnice-10.dll"]
    } else if cfg!(target_os = "macos") {
        &["libnice.10.dylib", "libnice.dylib"]
    } else {
        &["libnice.so.10", "libnice.so.10.15.0", "libnice.so"]
    }
}

/// Conventional names handed to the system loader
pub fn system_library_names() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &["libnice-10.dll", "nice-10.dll", "libnice.dll"]
    } else if cfg!(target_os = "macos") {
        &["libnice.10.dylib", "libnice.dylib"]
    } else {
        &["libnice.so.10", "libnice.so"]
    }
}

/// GLib runtime libraries consulted for symbols libnice does not re-export
pub fn companion_library_names() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &["libgobject-2.0-0.dll", "libglib-2.0-0.dll", "libgio-2.0-0.dll"]
    } else if cfg!(target_os = "macos") {
        &["libgobject-2.0.0.dylib", "libglib-2.0.0.dylib", "libgio-2.0.0.dylib"]
    } else {
        &["libgobject-2.0.so.0", "libglib-2.0.so.0", "libgio-2.0.so.0"]
    }
}

/// Ordered list of places to look for the primary library
pub fn search_plan(config: &BridgeConfig) -> Vec<SearchStep> {
    let mut plan = Vec::new();

    if let Some(path) = &config.library_path {
        plan.push(SearchStep::Override(path.clone()));
    }

    if let Some(root) = config.natives_root() {
        let dir = root.join(platform_dir());
        plan.extend(
            bundled_file_names()
                .iter()
                .map(|name| dir.join(name))
                .filter(|path| path.is_file())
                .map(SearchStep::Bundled),
        );
    }

    plan.extend(system_library_names().iter().copied().map(SearchStep::System));
    plan
}

/// Copy a bundled binary into a fresh private directory
pub fn extract_bundled(source: &Path) -> Result<PathBuf> {
    let file_name = source
        .file_name()
        .context("Bundled library path has no file name")?;

    let dir = tempfile::Builder::new()
        .prefix("nice-bridge-natives-")
        .tempdir()
        .context("Failed to create temp directory for bundled library")?
        .keep();

    let target = dir.join(file_name);
    fs::copy(source, &target)
        .with_context(|| format!("Failed to copy {} to {}", source.display(), target.display()))?;

    debug!(from = %source.display(), to = %target.display(), "extracted bundled library");
    Ok(target)
}

fn open_step(step: &SearchStep) -> Result<Library> {
    let library = match step {
        SearchStep::Override(path) => unsafe { Library::new(path) }
            .with_context(|| format!("Failed to open {}", path.display()))?,
        SearchStep::Bundled(path) => {
            let extracted = extract_bundled(path)?;
            unsafe { Library::new(&extracted) }
                .with_context(|| format!("Failed to open {}", extracted.display()))?
        }
        SearchStep::System(name) => {
            unsafe { Library::new(name) }.with_context(|| format!("Failed to open {}", name))?
        }
    };
    Ok(library)
}

/// Walk the search plan and open the primary library plus any companions.
///
/// Never fails: an empty `libraries` list means nothing could be opened.
pub fn load_libraries(config: &BridgeConfig) -> LoadedLibraries {
    let mut tried = Vec::new();
    let mut libraries = Vec::new();
    let mut primary = None;

    for step in search_plan(config) {
        tried.push(step.describe());
        match open_step(&step) {
            Ok(library) => {
                info!(source = %step.describe(), "native ICE library loaded");
                libraries.push(library);
                primary = Some(step);
                break;
            }
            Err(e) => debug!("{:#}", e),
        }
    }

    if primary.is_none() {
        warn!(
            tried = %tried.join(", "),
            "libnice not found; native bindings will not be functional"
        );
    }

    for name in companion_library_names() {
        match unsafe { Library::new(name) } {
            Ok(library) => {
                debug!(library = name, "companion runtime library loaded");
                libraries.push(library);
            }
            Err(e) => debug!(library = name, "companion runtime library unavailable: {}", e),
        }
    }

    LoadedLibraries {
        libraries,
        primary,
        tried,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_comes_first_and_system_names_last() {
        let config = BridgeConfig {
            library_path: Some(PathBuf::from("/nowhere/libnice.so")),
            natives_dir: Some(PathBuf::from("/nowhere/natives")),
            ..BridgeConfig::default()
        };
        let plan = search_plan(&config);

        assert_eq!(plan[0], SearchStep::Override(PathBuf::from("/nowhere/libnice.so")));
        let system: Vec<_> = plan[1..].to_vec();
        assert_eq!(
            system,
            system_library_names()
                .iter()
                .copied()
                .map(SearchStep::System)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn bundled_files_are_planned_only_when_present() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join(platform_dir());
        fs::create_dir_all(&dir).unwrap();
        let name = bundled_file_names()[0];
        fs::write(dir.join(name), b"not really a library").unwrap();

        let config = BridgeConfig {
            natives_dir: Some(root.path().to_path_buf()),
            ..BridgeConfig::default()
        };
        let plan = search_plan(&config);

        assert_eq!(plan[0], SearchStep::Bundled(dir.join(name)));
        assert_eq!(
            plan.iter().filter(|s| matches!(s, SearchStep::Bundled(_))).count(),
            1
        );
    }

    #[test]
    fn extraction_copies_into_private_directory() {
        let root = tempfile::tempdir().unwrap();
        let source = root.path().join("libnice.so.10");
        fs::write(&source, b"payload").unwrap();

        let extracted = extract_bundled(&source).unwrap();
        assert_ne!(extracted, source);
        assert_eq!(extracted.file_name(), source.file_name());
        assert_eq!(fs::read(&extracted).unwrap(), b"payload");

        fs::remove_dir_all(extracted.parent().unwrap()).unwrap();
    }

    #[test]
    fn unloadable_override_falls_through_without_failing() {
        let root = tempfile::tempdir().unwrap();
        let bogus = root.path().join("libnice.so");
        fs::write(&bogus, b"garbage").unwrap();

        let config = BridgeConfig {
            library_path: Some(bogus.clone()),
            natives_dir: Some(root.path().join("empty")),
            ..BridgeConfig::default()
        };
        let loaded = load_libraries(&config);

        assert_eq!(loaded.tried[0], SearchStep::Override(bogus).describe());
        assert_ne!(
            loaded.primary,
            Some(SearchStep::Override(root.path().join("libnice.so")))
        );
    }
}
