//! # Addon Repositories Library
//!
//! This library maintains a local, consistent on-disk mirror of repository
//! artifacts used to assemble addon trees. Each tracked repository is
//! identified by a `namespace/name` pair and periodically publishes a new
//! tarball snapshot at a known URL.
//!
//! ## Quick Example
//!
//! ```no_run
//! use addon_repos::config::RegistryConfig;
//! use addon_repos::context::SyncContext;
//! use addon_repos::descriptor::RepoDescriptor;
//! use addon_repos::registry::Registry;
//!
//! let registry = Registry::new(RegistryConfig::default().with_root_path("/var/lib/addons"));
//!
//! let descriptor = RepoDescriptor::new("gotk-system", "addons-config").with_artifact(
//!     "http://source-controller/gitrepository/gotk-system/addons-config/latest.tar.gz",
//!     "master/7c1a",
//! );
//!
//! let repo = registry.add(&descriptor);
//! repo.sync(&SyncContext::background())?;
//! repo.link_data("/var/lib/layers/bootstrap/addons", "addons/bootstrap")?;
//! # Ok::<(), addon_repos::error::Error>(())
//! ```
//!
//! ## Core Concepts
//!
//! - **Registry (`registry`)**: get-or-create, lookup, delete and snapshot
//!   listing of repositories, plus the defaults new repositories copy.
//! - **Repository (`repository`)**: the per-repository sync protocol. A new
//!   artifact is fetched and unpacked into a scratch directory, then moved
//!   onto the committed directory with a single rename under a lock, so
//!   readers see either the old tree or the new one.
//! - **Layering (`Repo::link_data`)**: exposes a directory of the committed
//!   tree at an arbitrary path through a symlink.
//! - **Fetching (`fetch`)**: the `ArtifactFetcher` seam and its HTTP +
//!   `tar.gz` implementation.
//! - **Context (`context`)**: deadlines and cancellation for fetches.
//!
//! ## Filesystem Layout
//!
//! - `{root}/{namespace}/{name}`: committed snapshot
//! - `{root}/load/{namespace}/{name}`: scratch area used during a sync

pub mod config;
pub mod context;
pub mod defaults;
pub mod descriptor;
pub mod error;
pub mod fetch;
pub mod filesystem;
pub mod registry;
pub mod repository;

#[cfg(test)]
mod key_proptest;
