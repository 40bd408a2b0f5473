//! File-based locking to prevent concurrent reconciliation.
//!
//! Uses flock-style advisory locking so that only one process at a time
//! reads and rewrites a given firewall.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// A guard that holds an exclusive lock for one firewall.
/// The lock is automatically released when the guard is dropped.
#[derive(Debug)]
pub struct LockGuard {
    _file: File,
    path: PathBuf,
}

/// Lock file path for a firewall. Anything outside `[A-Za-z0-9_-]` in the
/// id becomes `_`.
pub fn lock_path(dir: &Path, firewall_id: &str) -> PathBuf {
    let sanitized: String = firewall_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    dir.join(format!("firewall-allowlister-{}.lock", sanitized))
}

impl LockGuard {
    /// Attempt to acquire the lock for `firewall_id` without blocking.
    /// Returns an error if another process holds it.
    ///
    /// Uses OpenOptions with create+read+write to avoid TOCTOU race
    /// between file creation and lock acquisition.
    pub fn acquire(dir: &Path, firewall_id: &str) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create lock directory: {:?}", dir))?;

        let path = lock_path(dir, firewall_id);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {:?}", path))?;

        // Set restrictive permissions (owner read/write only)
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
            .context("Failed to set lock file permissions")?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "Another reconciliation of firewall {} is already running.\n\
                 If you believe this is an error, remove the lock file: {:?}",
                firewall_id,
                path
            )
        })?;

        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// Lock is automatically released when file is closed (on drop)
