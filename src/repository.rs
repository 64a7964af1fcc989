//! # Repository Synchronization
//!
//! A `Repo` owns one tracked repository's on-disk state and the protocol that
//! replaces it:
//!
//! - **`data_path`** (`{root}/{namespace}/{name}`) holds the committed tree.
//!   It is either absent or a complete snapshot from a successful sync.
//! - **`load_path`** (`{root}/load/{namespace}/{name}`) is scratch space. It
//!   is reset before every attempt and may be left half-written after a
//!   failure.
//! - **`retired_path`** (`{root}/load/.retired/{namespace}/{name}`) receives
//!   the previous committed tree during a commit and is deleted afterwards.
//!
//! ## Locking
//!
//! Two independent locks guard a repository:
//!
//! - The **sync lock** is held for a whole sync attempt (fetch, unpack and
//!   commit), so at most one sync per repository is in flight. Syncs of
//!   different repositories never contend.
//! - The **data lock** guards the descriptor and the committed tree. It is
//!   taken exclusively only for the commit renames and for `link_data`, so
//!   readers are never blocked for the duration of a network fetch.
//!
//! ## Sync
//!
//! 1. Take the sync lock and derive a deadline from the configured timeout.
//! 2. Fail with `ArtifactMissing` if the descriptor has no artifact.
//! 3. Reset the scratch directory to empty.
//! 4. Fetch the artifact (from the mirror host if one is set) and unpack it
//!    into scratch.
//! 5. Under the data lock, rename the committed tree to `retired_path`,
//!    rename scratch onto `data_path`, then record the descriptor.
//! 6. Delete the retired tree. A failure here is logged and the leftover is
//!    cleared by the next commit.
//!
//! Every step is a whole-tree rename or happens outside `data_path`, so a
//! failure at any point leaves the committed tree either the previous
//! snapshot or the new one.

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::{normalize_host, RegistryConfig};
use crate::context::SyncContext;
use crate::descriptor::RepoDescriptor;
use crate::error::{Error, Result};
use crate::fetch::{ArtifactFetcher, HttpArtifactFetcher};
use crate::filesystem;

/// Mirror URL for a repository when a host name is configured.
pub fn mirror_url(host_name: &str, namespace: &str, name: &str) -> String {
    format!(
        "http://{}/gitrepository/{}/{}/latest.tar.gz",
        host_name, namespace, name
    )
}

/// Resolve the URL a sync should download from.
///
/// A configured mirror host always wins over the descriptor's own URL.
pub fn resolve_fetch_url(descriptor: &RepoDescriptor, host_name: Option<&str>) -> Result<String> {
    let artifact = descriptor
        .artifact
        .as_ref()
        .ok_or_else(|| Error::ArtifactMissing {
            key: descriptor.key(),
        })?;
    Ok(match host_name {
        Some(host) => mirror_url(host, &descriptor.namespace, &descriptor.name),
        None => artifact.url.clone(),
    })
}

struct RepoState {
    descriptor: RepoDescriptor,
    host_name: Option<String>,
    fetcher: Arc<dyn ArtifactFetcher>,
}

/// One tracked repository and its committed snapshot.
pub struct Repo {
    key: String,
    data_path: PathBuf,
    load_path: PathBuf,
    retired_path: PathBuf,
    timeout: Duration,
    dir_mode: u32,
    state: RwLock<RepoState>,
    sync_lock: Mutex<()>,
}

impl std::fmt::Debug for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repo")
            .field("key", &self.key)
            .field("data_path", &self.data_path)
            .field("load_path", &self.load_path)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Repo {
    /// Create a repository from `descriptor`, copying the defaults in
    /// `config`. Later changes to the registry do not reach this instance.
    pub fn new(
        descriptor: RepoDescriptor,
        config: &RegistryConfig,
        fetcher: Arc<dyn ArtifactFetcher>,
    ) -> Self {
        let key = descriptor.key();
        Self {
            data_path: config.data_path(&key),
            load_path: config.load_path(&key),
            retired_path: config.retired_path(&key),
            timeout: config.timeout,
            dir_mode: config.dir_mode,
            key,
            state: RwLock::new(RepoState {
                descriptor,
                host_name: config.host_name.clone(),
                fetcher,
            }),
            sync_lock: Mutex::new(()),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, RepoState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, RepoState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// `namespace/name`, also the registry key.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn source_name(&self) -> String {
        self.read_state().descriptor.name.clone()
    }

    pub fn source_namespace(&self) -> String {
        self.read_state().descriptor.namespace.clone()
    }

    /// Snapshot of the latest known descriptor.
    pub fn descriptor(&self) -> RepoDescriptor {
        self.read_state().descriptor.clone()
    }

    pub fn revision(&self) -> Option<String> {
        self.read_state().descriptor.revision().map(str::to_string)
    }

    /// Committed tree location.
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Scratch tree location.
    pub fn load_path(&self) -> &Path {
        &self.load_path
    }

    /// Where the previous committed tree waits for deletion during a commit.
    pub fn retired_path(&self) -> &Path {
        &self.retired_path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn host_name(&self) -> Option<String> {
        self.read_state().host_name.clone()
    }

    /// Override the mirror host for this repository only. An empty string
    /// clears it.
    pub fn set_host_name(&self, host_name: impl Into<String>) {
        self.write_state().host_name = normalize_host(host_name.into());
    }

    /// Fetch through `client` from now on.
    pub fn set_http_client(&self, client: reqwest::blocking::Client) {
        self.set_fetcher(Arc::new(HttpArtifactFetcher::with_client(client)));
    }

    pub fn set_fetcher(&self, fetcher: Arc<dyn ArtifactFetcher>) {
        self.write_state().fetcher = fetcher;
    }

    /// Replace the descriptor without syncing. The key must not change.
    pub fn set_descriptor(&self, descriptor: RepoDescriptor) -> Result<()> {
        self.check_key(&descriptor)?;
        self.write_state().descriptor = descriptor;
        Ok(())
    }

    /// URL the next sync of the current descriptor would download from.
    pub fn fetch_url(&self) -> Result<String> {
        let state = self.read_state();
        resolve_fetch_url(&state.descriptor, state.host_name.as_deref())
    }

    /// Run `reader` against the committed tree while holding the data lock
    /// for reading, so it never straddles a commit.
    pub fn with_data<T>(&self, reader: impl FnOnce(&Path) -> T) -> T {
        let _state = self.read_state();
        reader(&self.data_path)
    }

    /// Sync the current descriptor's artifact into the committed tree.
    pub fn sync(&self, ctx: &SyncContext) -> Result<()> {
        let descriptor = self.descriptor();
        self.sync_descriptor(descriptor, ctx)
    }

    /// Sync `descriptor`'s artifact and record it as the current descriptor
    /// once committed.
    pub fn sync_descriptor(&self, descriptor: RepoDescriptor, ctx: &SyncContext) -> Result<()> {
        self.check_key(&descriptor)?;
        let _sync = self.sync_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let ctx = ctx.with_timeout(self.timeout);

        let result = self.fetch_and_commit(descriptor, &ctx);
        if let Err(e) = &result {
            warn!("sync of {} failed: {}", self.key, e);
        }
        result
    }

    fn fetch_and_commit(&self, descriptor: RepoDescriptor, ctx: &SyncContext) -> Result<()> {
        let (host_name, fetcher) = {
            let state = self.read_state();
            (state.host_name.clone(), Arc::clone(&state.fetcher))
        };

        // Validated before the scratch reset so a descriptor without an
        // artifact leaves the filesystem untouched.
        let url = resolve_fetch_url(&descriptor, host_name.as_deref())?;

        info!(
            "New revision detected: namespace={}, name={}, revision={}",
            descriptor.namespace,
            descriptor.name,
            descriptor.revision().unwrap_or_default()
        );

        filesystem::reset_dir(&self.load_path, self.dir_mode)?;

        debug!("fetching {} from {}", self.key, url);
        let bytes = fetcher.fetch_bytes(&url, ctx)?;
        debug!("artifact for {} is {} bytes", self.key, bytes.len());
        fetcher.unpack(&bytes, &self.load_path)?;

        self.commit(descriptor)
    }

    fn commit(&self, descriptor: RepoDescriptor) -> Result<()> {
        let retired = {
            let mut state = self.write_state();
            if let Some(parent) = self.data_path.parent() {
                filesystem::create_dir_all(parent, self.dir_mode)?;
            }
            let retired = self.retire_committed_tree()?;
            if let Err(e) = filesystem::rename(&self.load_path, &self.data_path) {
                if retired {
                    self.restore_committed_tree();
                }
                return Err(e);
            }
            state.descriptor = descriptor;
            retired
        };
        debug!("committed {} at {}", self.key, self.data_path.display());

        // Still under the sync lock, so no other commit touches retired_path.
        if retired {
            if let Err(e) = filesystem::remove_if_exists(&self.retired_path) {
                warn!("failed to remove previous tree of {}: {}", self.key, e);
            }
        }
        Ok(())
    }

    /// Move the committed tree, if any, to `retired_path`.
    fn retire_committed_tree(&self) -> Result<bool> {
        filesystem::remove_if_exists(&self.retired_path)?;
        if !filesystem::path_exists(&self.data_path)? {
            return Ok(false);
        }
        if let Some(parent) = self.retired_path.parent() {
            filesystem::create_dir_all(parent, self.dir_mode)?;
        }
        filesystem::rename(&self.data_path, &self.retired_path)?;
        Ok(true)
    }

    fn restore_committed_tree(&self) {
        if let Err(e) = filesystem::rename(&self.retired_path, &self.data_path) {
            warn!(
                "failed to restore previous tree of {} from {}: {}",
                self.key,
                self.retired_path.display(),
                e
            );
        }
    }

    /// Expose `{data_path}/{source_sub_path}` at `layer_path` as a symlink.
    ///
    /// Anything already at `layer_path` is replaced. Fails without touching
    /// the filesystem when the target is missing or not a directory.
    pub fn link_data(
        &self,
        layer_path: impl AsRef<Path>,
        source_sub_path: impl AsRef<Path>,
    ) -> Result<()> {
        let layer_path = layer_path.as_ref();
        let _state = self.write_state();

        let target = self.data_path.join(relative_sub_path(source_sub_path.as_ref())?);
        filesystem::ensure_existing_dir(&target)?;

        if let Some(parent) = layer_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            filesystem::create_dir_all(parent, self.dir_mode)?;
        }
        filesystem::replace_with_symlink(&target, layer_path)?;
        debug!("linked {} -> {}", layer_path.display(), target.display());
        Ok(())
    }

    fn check_key(&self, descriptor: &RepoDescriptor) -> Result<()> {
        let key = descriptor.key();
        if key != self.key {
            return Err(Error::Validation {
                path: self.data_path.clone(),
                message: format!("descriptor {} does not belong to repository {}", key, self.key),
            });
        }
        Ok(())
    }
}

// Leading separators are dropped so the target stays under data_path;
// parent components are refused.
fn relative_sub_path(sub_path: &Path) -> Result<PathBuf> {
    let mut relative = PathBuf::new();
    for component in sub_path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                return Err(Error::Validation {
                    path: sub_path.to_path_buf(),
                    message: "source path must not leave the data directory".to_string(),
                })
            }
        }
    }
    Ok(relative)
}
