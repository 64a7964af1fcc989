//! # Directory Primitives
//!
//! Thin wrappers over `std::fs` used by the sync and layering operations.
//! Every failure is reported as `Error::Filesystem` naming the operation and
//! the path involved.
//!
//! None of these functions take locks. Callers serialize access through the
//! repository's data and sync locks.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{Error, Result};

/// Create `path` and any missing parents with `mode` (before umask).
pub fn create_dir_all(path: &Path, mode: u32) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder
        .create(path)
        .map_err(|e| Error::filesystem("make directory", path, e))
}

/// Remove whatever is at `path`: a directory tree, a file or a symlink.
///
/// Symlinks are removed themselves, never followed. Returns `Ok(false)` when
/// nothing was there.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(Error::filesystem("stat", path, e)),
    };

    let removed = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        remove_link_or_file(path)
    };
    match removed {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::filesystem("remove", path, e)),
    }
}

/// Whether anything, including a dangling symlink, is at `path`.
pub fn path_exists(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::filesystem("stat", path, e)),
    }
}

/// Bring `path` to an existing, empty directory regardless of what was
/// there before.
pub fn reset_dir(path: &Path, mode: u32) -> Result<()> {
    remove_if_exists(path)?;
    create_dir_all(path, mode)
}

/// Succeed only if `path` exists and resolves to a directory.
pub fn ensure_existing_dir(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(Error::Validation {
            path: path.to_path_buf(),
            message: "addons data path is not a directory".to_string(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::Validation {
            path: path.to_path_buf(),
            message: "target directory does not exist".to_string(),
        }),
        Err(e) => Err(Error::filesystem("stat", path, e)),
    }
}

/// Move `from` onto `to` with a single rename. `to` must not exist.
pub fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|e| Error::filesystem("rename", from, e))
}

/// Point `link` at `target`, replacing anything already at `link`.
pub fn replace_with_symlink(target: &Path, link: &Path) -> Result<()> {
    remove_if_exists(link)?;
    symlink_dir(target, link).map_err(|e| Error::filesystem("create link", link, e))
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(windows)]
fn remove_link_or_file(path: &Path) -> io::Result<()> {
    // Directory symlinks on Windows need remove_dir.
    fs::remove_file(path).or_else(|_| fs::remove_dir(path))
}

#[cfg(not(windows))]
fn remove_link_or_file(path: &Path) -> io::Result<()> {
    fs::remove_file(path)
}
