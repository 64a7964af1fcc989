//! Shared test utilities for integration tests.
//!
//! This module provides an in-memory `tar.gz` builder, a scriptable
//! `ArtifactFetcher`, tree snapshots and logging setup.
//!
//! ## Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use addon_repos::context::SyncContext;
use addon_repos::error::{Error, Result};
use addon_repos::fetch::ArtifactFetcher;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use super::{init_logging, snapshot, tar_gz, ScriptedFetcher};
    #[allow(unused_imports)]
    pub use addon_repos::config::RegistryConfig;
    #[allow(unused_imports)]
    pub use addon_repos::context::SyncContext;
    #[allow(unused_imports)]
    pub use addon_repos::descriptor::RepoDescriptor;
    #[allow(unused_imports)]
    pub use addon_repos::error::Error;
    #[allow(unused_imports)]
    pub use addon_repos::registry::Registry;
    #[allow(unused_imports)]
    pub use std::sync::Arc;
    #[allow(unused_imports)]
    pub use tempfile::TempDir;
}

/// Route `log` output through the test harness.
#[allow(dead_code)]
pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

/// Build a gzip-compressed tar archive from `(path, content)` pairs.
#[allow(dead_code)]
pub fn tar_gz(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, path, content.as_bytes())
            .expect("append tar entry");
    }
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip")
}

/// Relative path -> content for every file under `dir`. Empty when `dir`
/// does not exist.
#[allow(dead_code)]
pub fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    if !dir.exists() {
        return files;
    }
    for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.expect("walk tree");
        if entry.file_type().is_file() {
            let relative = entry
                .path()
                .strip_prefix(dir)
                .expect("entry under root")
                .to_string_lossy()
                .replace('\\', "/");
            files.insert(relative, std::fs::read(entry.path()).expect("read file"));
        }
    }
    files
}

#[derive(Default)]
struct Counters {
    in_flight: usize,
    max_in_flight: usize,
    arrived: usize,
}

/// Scriptable `ArtifactFetcher` serving in-memory archives by URL.
///
/// A fetch/unpack "phase" starts when `fetch_bytes` is entered and ends when
/// `unpack` returns (or the fetch fails), which is what `max_in_flight`
/// measures.
#[derive(Default)]
#[allow(dead_code)]
pub struct ScriptedFetcher {
    artifacts: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, String>>,
    urls: Mutex<Vec<String>>,
    fetch_delay: Duration,
    entry_delay: Duration,
    block_until_done: bool,
    rendezvous: usize,
    counters: Mutex<Counters>,
    arrived: Condvar,
}

#[allow(dead_code)]
impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `files` as a tar.gz at `url`.
    pub fn with_artifact(self, url: &str, files: &[(&str, &str)]) -> Self {
        self.serve(url, files);
        self
    }

    /// Serve raw bytes at `url`.
    pub fn with_bytes(self, url: &str, bytes: Vec<u8>) -> Self {
        self.artifacts
            .lock()
            .unwrap()
            .insert(url.to_string(), bytes);
        self
    }

    /// Fail fetches of `url` with a `Fetch` error.
    pub fn with_failure(self, url: &str, message: &str) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(url.to_string(), message.to_string());
        self
    }

    /// Sleep this long inside every fetch.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Sleep this long after extracting each archive entry.
    pub fn with_entry_delay(mut self, delay: Duration) -> Self {
        self.entry_delay = delay;
        self
    }

    /// Never return from a fetch until the context is cancelled or expires.
    pub fn blocking_until_done(mut self) -> Self {
        self.block_until_done = true;
        self
    }

    /// Wait inside each fetch until `count` fetches are in flight at once
    /// (or five seconds pass).
    pub fn with_rendezvous(mut self, count: usize) -> Self {
        self.rendezvous = count;
        self
    }

    /// Replace or add the archive at `url`.
    pub fn serve(&self, url: &str, files: &[(&str, &str)]) {
        self.artifacts
            .lock()
            .unwrap()
            .insert(url.to_string(), tar_gz(files));
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.counters.lock().unwrap().max_in_flight
    }

    fn enter(&self) {
        let mut counters = self.counters.lock().unwrap();
        counters.in_flight += 1;
        counters.max_in_flight = counters.max_in_flight.max(counters.in_flight);
        counters.arrived += 1;
        self.arrived.notify_all();

        if self.rendezvous > 0 {
            let deadline = Instant::now() + Duration::from_secs(5);
            while counters.arrived < self.rendezvous {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    break;
                }
                counters = self.arrived.wait_timeout(counters, left).unwrap().0;
            }
        }
    }

    fn leave(&self) {
        self.counters.lock().unwrap().in_flight -= 1;
    }

    fn fetch(&self, url: &str, ctx: &SyncContext) -> Result<Vec<u8>> {
        if self.block_until_done {
            let give_up = Instant::now() + Duration::from_secs(10);
            while Instant::now() < give_up {
                ctx.check(url)?;
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        std::thread::sleep(self.fetch_delay);
        ctx.check(url)?;

        if let Some(message) = self.failures.lock().unwrap().get(url) {
            return Err(Error::Fetch {
                url: url.to_string(),
                message: message.clone(),
            });
        }
        self.artifacts
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Fetch {
                url: url.to_string(),
                message: "unexpected status 404 Not Found".to_string(),
            })
    }
}

impl ArtifactFetcher for ScriptedFetcher {
    fn fetch_bytes(&self, url: &str, ctx: &SyncContext) -> Result<Vec<u8>> {
        self.urls.lock().unwrap().push(url.to_string());
        self.enter();
        let result = self.fetch(url, ctx);
        if result.is_err() {
            self.leave();
        }
        result
    }

    fn unpack(&self, bytes: &[u8], destination: &Path) -> Result<()> {
        let unpack_error = |e: std::io::Error| Error::Unpack {
            path: destination.to_path_buf(),
            message: e.to_string(),
        };
        let result = (|| -> Result<()> {
            let mut archive = tar::Archive::new(GzDecoder::new(bytes));
            for entry in archive.entries().map_err(unpack_error)? {
                let mut entry = entry.map_err(unpack_error)?;
                entry.unpack_in(destination).map_err(unpack_error)?;
                std::thread::sleep(self.entry_delay);
            }
            Ok(())
        })();
        self.leave();
        result
    }
}
