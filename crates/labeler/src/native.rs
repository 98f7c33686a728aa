//! Location of the engine's native runtime dependencies.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Environment variable naming the native dependency directory.
pub const ENV_NATIVE_DIR: &str = "LABELER_NATIVE_DIR";

#[cfg(target_os = "windows")]
const SEARCH_PATH_VAR: &str = "PATH";
#[cfg(target_os = "macos")]
const SEARCH_PATH_VAR: &str = "DYLD_LIBRARY_PATH";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const SEARCH_PATH_VAR: &str = "LD_LIBRARY_PATH";

#[cfg(target_os = "windows")]
const WELL_KNOWN_DIRS: &[&str] = &[
    r"C:\Program Files\Microsoft Information Protection\bin\x64",
    r"C:\Program Files (x86)\Microsoft Information Protection\bin\x64",
];
#[cfg(not(target_os = "windows"))]
const WELL_KNOWN_DIRS: &[&str] = &[
    "/opt/microsoft/mip/lib",
    "/usr/local/lib/mip",
    "/usr/lib/mip",
];

/// Where to look for native dependencies and which search path to extend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSearch {
    /// Variable checked first.
    pub override_var: String,
    /// Directories checked in order after the override.
    pub candidates: Vec<PathBuf>,
    /// Library search path variable that gets the found directory prepended.
    pub search_path_var: String,
}

impl Default for NativeSearch {
    fn default() -> Self {
        Self {
            override_var: ENV_NATIVE_DIR.to_string(),
            candidates: WELL_KNOWN_DIRS.iter().map(PathBuf::from).collect(),
            search_path_var: SEARCH_PATH_VAR.to_string(),
        }
    }
}

impl NativeSearch {
    /// First existing directory: the override, then the candidates.
    #[must_use]
    pub fn resolve(&self) -> Option<PathBuf> {
        if let Some(dir) = env::var_os(&self.override_var).filter(|v| !v.is_empty()) {
            let dir = PathBuf::from(dir);
            if dir.is_dir() {
                return Some(dir);
            }
            warn!(
                var = %self.override_var,
                dir = %dir.display(),
                "Native dependency override does not exist, falling back"
            );
        }

        self.candidates.iter().find(|dir| dir.is_dir()).cloned()
    }

    /// Resolve and prepend the directory to the library search path.
    ///
    /// Returns the directory used, or `None` when nothing was found.
    ///
    /// # Errors
    /// Returns error if the directory cannot be joined into the search path.
    pub fn apply(&self) -> Result<Option<PathBuf>, env::JoinPathsError> {
        let Some(dir) = self.resolve() else {
            debug!("No native dependency directory found");
            return Ok(None);
        };

        if prepend_search_path(&self.search_path_var, &dir)? {
            info!(dir = %dir.display(), var = %self.search_path_var, "Added native dependency directory to search path");
        } else {
            debug!(dir = %dir.display(), "Native dependency directory already on search path");
        }
        Ok(Some(dir))
    }
}

/// Prepend `dir` to the path list in `var` unless already present.
///
/// Returns whether the variable changed.
///
/// # Errors
/// Returns error if `dir` contains the platform path separator.
pub fn prepend_search_path(var: &str, dir: &Path) -> Result<bool, env::JoinPathsError> {
    let current: Vec<PathBuf> = env::var_os(var)
        .map(|v| env::split_paths(&v).collect())
        .unwrap_or_default();

    if current.iter().any(|p| p == dir) {
        return Ok(false);
    }

    let joined: OsString =
        env::join_paths(std::iter::once(dir.to_path_buf()).chain(current))?;
    env::set_var(var, joined);
    Ok(true)
}
