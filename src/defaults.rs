//! Default values for registry configuration.
//!
//! This module provides centralized default values used when a
//! `RegistryConfig` does not set them explicitly.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the root path.
pub const ROOT_PATH_ENV: &str = "ADDON_REPOS_ROOT_PATH";

/// Environment variable setting the mirror host name.
pub const HOST_NAME_ENV: &str = "ADDON_REPOS_HOST_NAME";

/// Environment variable overriding the fetch timeout, in whole seconds.
pub const TIMEOUT_SECS_ENV: &str = "ADDON_REPOS_TIMEOUT_SECS";

/// Default fetch timeout applied to every sync.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default mode for created directories, before the process umask applies.
pub const DEFAULT_DIR_MODE: u32 = 0o777;

/// Directory under the root holding per-repository scratch trees.
pub const SCRATCH_DIR: &str = "load";

/// Directory under `SCRATCH_DIR` where a replaced committed tree waits for
/// deletion. The leading dot keeps it apart from every valid namespace.
pub const RETIRED_DIR: &str = ".retired";

/// Returns the default root under which committed and scratch trees live.
///
/// Committed trees go to `{root}/{namespace}/{name}` and scratch trees to
/// `{root}/load/{namespace}/{name}`.
pub fn default_root_path() -> PathBuf {
    PathBuf::from("/data")
}
