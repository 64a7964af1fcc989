//! # Artifact Fetching
//!
//! This module defines the seam between the sync protocol and the transport
//! that actually retrieves and unpacks artifacts.
//!
//! - **`ArtifactFetcher`**: fetch raw bytes for a URL within a
//!   `SyncContext`, and unpack bytes into a destination directory. Both are
//!   fallible, retry-free primitives.
//!
//! - **`HttpArtifactFetcher`**: the default implementation. It issues a
//!   blocking HTTP GET with `reqwest` on a worker thread while the caller
//!   watches the `SyncContext`, so cancellation returns promptly even when
//!   the server stalls. Archives are extracted with `flate2` and `tar`.
//!
//! Tests substitute their own `ArtifactFetcher` to simulate slow, failing or
//! corrupt transfers without touching the network.

use std::io::Read;
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use flate2::read::GzDecoder;
use log::debug;

use crate::context::SyncContext;
use crate::error::{Error, Result};

const READ_CHUNK: usize = 64 * 1024;

/// Largest buffer reserved up front from an advertised body length.
const MAX_PREALLOCATION: u64 = 16 * READ_CHUNK as u64;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Trait for artifact transport - allows mocking in tests
pub trait ArtifactFetcher: Send + Sync {
    /// Download the artifact at `url`, honouring the context's deadline and
    /// cancellation.
    fn fetch_bytes(&self, url: &str, ctx: &SyncContext) -> Result<Vec<u8>>;

    /// Extract `bytes` into `destination`, which already exists and is empty.
    fn unpack(&self, bytes: &[u8], destination: &Path) -> Result<()>;
}

/// Fetches artifacts over HTTP and unpacks them as `.tar.gz`.
#[derive(Debug, Clone)]
pub struct HttpArtifactFetcher {
    client: reqwest::blocking::Client,
}

impl Default for HttpArtifactFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpArtifactFetcher {
    /// Creates a fetcher with a default client.
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("addon-repos/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self { client }
    }

    /// Creates a fetcher around a caller-configured client.
    #[must_use]
    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl ArtifactFetcher for HttpArtifactFetcher {
    fn fetch_bytes(&self, url: &str, ctx: &SyncContext) -> Result<Vec<u8>> {
        let parsed = url::Url::parse(url)?;
        ctx.check(url)?;

        // The transfer runs on a worker so a cancelled context is noticed
        // while the request is blocked on the network. An abandoned worker
        // stops at its next chunk or when the request timeout fires.
        let (tx, rx) = mpsc::channel();
        let client = self.client.clone();
        let worker_ctx = ctx.clone();
        let worker_url = url.to_string();
        thread::Builder::new()
            .name("artifact-fetch".to_string())
            .spawn(move || {
                let result = download(&client, parsed, &worker_url, &worker_ctx);
                let _ = tx.send(result);
            })
            .map_err(|e| Error::Fetch {
                url: url.to_string(),
                message: format!("failed to start transfer: {}", e),
            })?;

        loop {
            match rx.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(result) => {
                    let bytes = result?;
                    debug!("fetched {} bytes from {}", bytes.len(), url);
                    return Ok(bytes);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => ctx.check(url)?,
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(Error::Fetch {
                        url: url.to_string(),
                        message: "transfer ended without a result".to_string(),
                    });
                }
            }
        }
    }

    fn unpack(&self, bytes: &[u8], destination: &Path) -> Result<()> {
        unpack_tar_gz(bytes, destination)
    }
}

fn download(
    client: &reqwest::blocking::Client,
    parsed: url::Url,
    url: &str,
    ctx: &SyncContext,
) -> Result<Vec<u8>> {
    let mut request = client.get(parsed);
    if let Some(remaining) = ctx.remaining() {
        request = request.timeout(remaining);
    }

    let mut response = request.send().map_err(|e| fetch_error(url, ctx, e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Fetch {
            url: url.to_string(),
            message: format!("unexpected status {}", status),
        });
    }

    // Content-Length is only a hint from the server.
    let capacity = response
        .content_length()
        .map_or(0, |len| len.min(MAX_PREALLOCATION));
    let mut bytes = Vec::with_capacity(capacity as usize);
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        ctx.check(url)?;
        let read = match response.read(&mut chunk) {
            Ok(read) => read,
            Err(e) => {
                // Report the context condition rather than the transport symptom.
                ctx.check(url)?;
                return Err(Error::Fetch {
                    url: url.to_string(),
                    message: format!("failed to read body: {}", e),
                });
            }
        };
        if read == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..read]);
    }
    Ok(bytes)
}

/// Extract a gzip-compressed tar archive into `destination`.
///
/// Entries that would land outside `destination` are rejected by `tar`.
pub fn unpack_tar_gz(bytes: &[u8], destination: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    archive.set_preserve_permissions(true);
    archive.unpack(destination).map_err(|e| Error::Unpack {
        path: destination.to_path_buf(),
        message: e.to_string(),
    })
}

fn fetch_error(url: &str, ctx: &SyncContext, error: reqwest::Error) -> Error {
    if error.is_timeout() {
        return Error::DeadlineExceeded {
            context: url.to_string(),
        };
    }
    if let Err(context_error) = ctx.check(url) {
        return context_error;
    }
    Error::Fetch {
        url: url.to_string(),
        message: error.to_string(),
    }
}
