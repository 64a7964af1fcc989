//! Registry of tracked repositories.
//!
//! The `Registry` maps `namespace/name` keys to shared `Repo` handles and
//! holds the defaults (root path, mirror host, timeout, transport) that new
//! repositories copy when they are first added.
//!
//! None of the registry operations perform I/O.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::config::{normalize_host, RegistryConfig};
use crate::defaults;
use crate::descriptor::RepoDescriptor;
use crate::fetch::{ArtifactFetcher, HttpArtifactFetcher};
use crate::repository::Repo;

struct Defaults {
    config: RegistryConfig,
    fetcher: Arc<dyn ArtifactFetcher>,
}

/// Concurrency-safe map of tracked repositories.
pub struct Registry {
    repos: RwLock<HashMap<String, Arc<Repo>>>,
    defaults: RwLock<Defaults>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config())
            .field("repos", &self.len())
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Create a registry fetching over HTTP.
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_fetcher(config, Arc::new(HttpArtifactFetcher::new()))
    }

    /// Create a registry whose repositories use `fetcher`.
    pub fn with_fetcher(config: RegistryConfig, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self {
            repos: RwLock::new(HashMap::new()),
            defaults: RwLock::new(Defaults { config, fetcher }),
        }
    }

    fn read_repos(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Repo>>> {
        self.repos.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_repos(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Repo>>> {
        self.repos.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_defaults(&self) -> RwLockWriteGuard<'_, Defaults> {
        self.defaults.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Key under which `descriptor` is tracked: `namespace/name`.
    pub fn path_key(descriptor: &RepoDescriptor) -> String {
        descriptor.key()
    }

    /// Return the repository for `descriptor`, creating it on first use.
    ///
    /// An existing entry is returned as-is: its descriptor and configuration
    /// are not replaced.
    ///
    /// # Panics
    ///
    /// The key doubles as a directory path, so this panics unless the
    /// namespace and name are each a single plain path segment: non-empty,
    /// free of `/`, `\` and NUL, and not starting with `.`. The namespace
    /// `load` is also refused because it would overlap the scratch area.
    pub fn add(&self, descriptor: &RepoDescriptor) -> Arc<Repo> {
        assert!(
            is_plain_segment(&descriptor.namespace) && is_plain_segment(&descriptor.name),
            "repository descriptor needs a plain namespace and name, got '{}'",
            descriptor.key()
        );
        assert!(
            descriptor.namespace != defaults::SCRATCH_DIR,
            "namespace '{}' is reserved for scratch trees",
            defaults::SCRATCH_DIR
        );
        let key = Self::path_key(descriptor);

        if let Some(repo) = self.read_repos().get(&key) {
            return Arc::clone(repo);
        }

        let (config, fetcher) = {
            let defaults = self.defaults.read().unwrap_or_else(PoisonError::into_inner);
            (defaults.config.clone(), Arc::clone(&defaults.fetcher))
        };
        let mut repos = self.write_repos();
        let repo = repos
            .entry(key)
            .or_insert_with(|| Arc::new(Repo::new(descriptor.clone(), &config, fetcher)));
        Arc::clone(repo)
    }

    /// Look up a repository by key.
    pub fn get(&self, key: &str) -> Option<Arc<Repo>> {
        self.read_repos().get(key).cloned()
    }

    /// Forget a repository. Its directories stay on disk.
    pub fn delete(&self, key: &str) -> Option<Arc<Repo>> {
        self.write_repos().remove(key)
    }

    /// Point-in-time copy of all tracked repositories.
    pub fn list(&self) -> HashMap<String, Arc<Repo>> {
        self.read_repos().clone()
    }

    pub fn len(&self) -> usize {
        self.read_repos().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_repos().is_empty()
    }

    /// Snapshot of the defaults new repositories will copy.
    pub fn config(&self) -> RegistryConfig {
        self.defaults
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .config
            .clone()
    }

    // The setters below only affect repositories added afterwards.

    pub fn set_root_path(&self, root_path: impl Into<PathBuf>) {
        self.write_defaults().config.root_path = root_path.into();
    }

    /// Set the mirror host. An empty string clears it.
    pub fn set_host_name(&self, host_name: impl Into<String>) {
        self.write_defaults().config.host_name = normalize_host(host_name.into());
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.write_defaults().config.timeout = timeout;
    }

    pub fn set_dir_mode(&self, dir_mode: u32) {
        self.write_defaults().config.dir_mode = dir_mode;
    }

    pub fn set_http_client(&self, client: reqwest::blocking::Client) {
        self.set_fetcher(Arc::new(HttpArtifactFetcher::with_client(client)));
    }

    pub fn set_fetcher(&self, fetcher: Arc<dyn ArtifactFetcher>) {
        self.write_defaults().fetcher = fetcher;
    }
}

/// `.` and `..` are covered by the leading-dot rule, which also keeps
/// namespaces clear of `defaults::RETIRED_DIR`.
fn is_plain_segment(part: &str) -> bool {
    !part.is_empty()
        && !part.starts_with('.')
        && !part.contains(|c: char| matches!(c, '/' | '\\' | '\0'))
}
