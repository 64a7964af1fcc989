//! # Registry Configuration
//!
//! `RegistryConfig` holds the registry-wide defaults that every `Repo` copies
//! when it is created: the filesystem root, the optional mirror host, the
//! fetch timeout and the directory creation mode.
//!
//! A repository captures these values once. Changing the registry defaults
//! later only affects repositories added after the change.
//!
//! ## Sources
//!
//! - **Code**: `RegistryConfig::default()` plus the `with_*` builders.
//! - **YAML**: `RegistryConfig::parse`, with every key optional:
//!
//! ```yaml
//! rootPath: /var/lib/addons
//! hostName: source-controller.flux-system
//! timeoutSecs: 30
//! dirMode: 493  # 0o755
//! ```
//!
//! - **Environment**: `RegistryConfig::from_env`, which overlays
//!   `ADDON_REPOS_ROOT_PATH`, `ADDON_REPOS_HOST_NAME` and
//!   `ADDON_REPOS_TIMEOUT_SECS` on the defaults.
//!
//! ## Layout
//!
//! ```text
//! {root}/{namespace}/{name}                committed tree
//! {root}/load/{namespace}/{name}           scratch tree
//! {root}/load/.retired/{namespace}/{name}  previous tree during a commit
//! ```
//!
//! Committed trees and the scratch area share the root, so a namespace
//! called `load` would place its committed trees on top of other
//! repositories' scratch directories. `Registry::add` refuses that
//! namespace, along with names that are not a single plain path segment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};

/// Registry-wide defaults captured by each repository at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryConfig {
    /// Root directory holding committed trees and the `load/` scratch area.
    pub root_path: PathBuf,
    /// Mirror host. When set, artifacts are fetched from
    /// `http://{host_name}/gitrepository/{namespace}/{name}/latest.tar.gz`.
    #[serde(deserialize_with = "non_empty_host")]
    pub host_name: Option<String>,
    /// Deadline applied to the fetch phase of each sync.
    #[serde(rename = "timeoutSecs", with = "duration_secs")]
    pub timeout: Duration,
    /// Mode used when creating directories (subject to the umask).
    pub dir_mode: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            root_path: defaults::default_root_path(),
            host_name: None,
            timeout: defaults::DEFAULT_TIMEOUT,
            dir_mode: defaults::DEFAULT_DIR_MODE,
        }
    }
}

impl RegistryConfig {
    /// Parse a configuration from YAML. Missing keys keep their defaults.
    pub fn parse(yaml_content: &str) -> Result<Self> {
        if yaml_content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: RegistryConfig = serde_yaml::from_str(yaml_content)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from the defaults and the `ADDON_REPOS_*`
    /// environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(root) = env_value(defaults::ROOT_PATH_ENV) {
            config.root_path = PathBuf::from(root);
        }
        if let Some(host) = env_value(defaults::HOST_NAME_ENV) {
            config.host_name = Some(host);
        }
        if let Some(secs) = env_value(defaults::TIMEOUT_SECS_ENV) {
            let secs: u64 = secs.trim().parse().map_err(|_| Error::ConfigParse {
                message: format!(
                    "{} must be a whole number of seconds, got '{}'",
                    defaults::TIMEOUT_SECS_ENV,
                    secs
                ),
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_root_path(mut self, root_path: impl Into<PathBuf>) -> Self {
        self.root_path = root_path.into();
        self
    }

    /// Set the mirror host. An empty string clears it.
    pub fn with_host_name(mut self, host_name: impl Into<String>) -> Self {
        self.host_name = normalize_host(host_name.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_dir_mode(mut self, dir_mode: u32) -> Self {
        self.dir_mode = dir_mode;
        self
    }

    /// Committed tree location for `key`.
    pub fn data_path(&self, key: &str) -> PathBuf {
        self.root_path.join(key)
    }

    /// Scratch tree location for `key`.
    pub fn load_path(&self, key: &str) -> PathBuf {
        self.root_path.join(defaults::SCRATCH_DIR).join(key)
    }

    /// Where the previous committed tree of `key` is parked while it is
    /// replaced.
    pub fn retired_path(&self, key: &str) -> PathBuf {
        self.root_path
            .join(defaults::SCRATCH_DIR)
            .join(defaults::RETIRED_DIR)
            .join(key)
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn validate(&self) -> Result<()> {
        if self.root_path.as_os_str().is_empty() {
            return Err(Error::ConfigParse {
                message: "rootPath must not be empty".to_string(),
            });
        }
        if self.timeout.is_zero() {
            return Err(Error::ConfigParse {
                message: "timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

pub(crate) fn normalize_host(host_name: String) -> Option<String> {
    let trimmed = host_name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn non_empty_host<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.and_then(normalize_host))
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
