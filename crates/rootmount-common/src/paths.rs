//! Standard filesystem paths for rootmount.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Default destination directory the target system is mounted under.
pub static ROOTMOUNT_DESTDIR: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("ROOTMOUNT_DESTDIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/mnt"))
});

/// Default directory for runtime state (staging mount, persisted ledger).
pub static ROOTMOUNT_STATE_DIR: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("ROOTMOUNT_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/run/rootmount"))
});

/// Standard paths used by rootmount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootmountPaths {
    /// Where the target system is assembled (default: /mnt).
    pub destdir: PathBuf,
    /// Runtime state directory (default: /run/rootmount).
    pub state_dir: PathBuf,
}

impl RootmountPaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths with a custom destination and state directory.
    #[must_use]
    pub fn with_dirs(destdir: impl Into<PathBuf>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            destdir: destdir.into(),
            state_dir: state_dir.into(),
        }
    }

    /// Private mount point used to inspect candidate partitions.
    #[must_use]
    pub fn staging(&self) -> PathBuf {
        self.state_dir.join("staging")
    }

    /// Persisted activation ledger.
    #[must_use]
    pub fn ledger_file(&self) -> PathBuf {
        self.state_dir.join("ledger.json")
    }
}

impl Default for RootmountPaths {
    fn default() -> Self {
        Self {
            destdir: ROOTMOUNT_DESTDIR.clone(),
            state_dir: ROOTMOUNT_STATE_DIR.clone(),
        }
    }
}

/// Join an absolute mount point (`/boot`) onto an arbitrary root directory.
#[must_use]
pub fn under_root(root: &Path, mountpoint: &str) -> PathBuf {
    let relative = mountpoint.trim_start_matches('/');
    if relative.is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}
