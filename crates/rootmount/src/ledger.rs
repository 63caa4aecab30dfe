//! Activation ledger.
//!
//! Every successful mount, swap enable and crypt attach is appended here in
//! the order it happened. Rollback walks the ledger backwards.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rootmount_common::paths::under_root;
use rootmount_common::{RootmountError, RootmountResult};
use serde::{Deserialize, Serialize};

use crate::operator::Operator;
use crate::system::{SystemOps, crypt_name};

/// What was activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationKind {
    /// A filesystem mounted below the destination root.
    Mount,
    /// Swap space enabled.
    Swap,
    /// An encrypted container attached.
    Crypt,
}

impl std::fmt::Display for ActivationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mount => write!(f, "mount"),
            Self::Swap => write!(f, "swap"),
            Self::Crypt => write!(f, "crypt"),
        }
    }
}

/// One activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    /// Kind of activation.
    pub kind: ActivationKind,
    /// Activated device (for crypt: the backing device).
    pub device: String,
    /// Mount point inside the target, for mounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<String>,
    /// When it happened.
    pub activated_at: DateTime<Utc>,
}

impl ActivationRecord {
    /// A mount of `device` at `mountpoint`.
    pub fn mount(device: impl Into<String>, mountpoint: impl Into<String>) -> Self {
        Self::new(ActivationKind::Mount, device, Some(mountpoint.into()))
    }

    /// Swap enabled on `device`.
    pub fn swap(device: impl Into<String>) -> Self {
        Self::new(ActivationKind::Swap, device, None)
    }

    /// An encrypted container on `device`.
    pub fn crypt(device: impl Into<String>) -> Self {
        Self::new(ActivationKind::Crypt, device, None)
    }

    fn new(kind: ActivationKind, device: impl Into<String>, mountpoint: Option<String>) -> Self {
        Self {
            kind,
            device: device.into(),
            mountpoint,
            activated_at: Utc::now(),
        }
    }
}

fn same_mountpoint(left: &str, right: &str) -> bool {
    left.trim_end_matches('/') == right.trim_end_matches('/')
}

/// Ordered record of activations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    records: Vec<ActivationRecord>,
}

impl Ledger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn push(&mut self, record: ActivationRecord) {
        tracing::debug!(
            kind = %record.kind,
            device = %record.device,
            mountpoint = ?record.mountpoint,
            "Recorded activation"
        );
        self.records.push(record);
    }

    /// Records in activation order.
    #[must_use]
    pub fn records(&self) -> &[ActivationRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Forget all records without undoing them.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Whether something is mounted at `mountpoint`.
    #[must_use]
    pub fn is_mounted(&self, mountpoint: &str) -> bool {
        self.records.iter().any(|r| {
            r.kind == ActivationKind::Mount
                && r.mountpoint
                    .as_deref()
                    .is_some_and(|mp| same_mountpoint(mp, mountpoint))
        })
    }

    /// Drop the most recent mount record at `mountpoint`.
    pub fn remove_last_mount(&mut self, mountpoint: &str) -> Option<ActivationRecord> {
        let index = self.records.iter().rposition(|r| {
            r.kind == ActivationKind::Mount
                && r.mountpoint
                    .as_deref()
                    .is_some_and(|mp| same_mountpoint(mp, mountpoint))
        })?;
        Some(self.records.remove(index))
    }

    /// Undo every activation, newest first, then clear the ledger.
    ///
    /// Mounts are unmounted below `root`. Failures are reported to the
    /// operator and do not stop the rollback.
    pub fn unwind(&mut self, system: &dyn SystemOps, root: &Path, operator: &mut dyn Operator) {
        tracing::info!(records = self.records.len(), "Rolling back activations");

        for record in self.records.iter().rev() {
            let result = match record.kind {
                ActivationKind::Mount => {
                    let mountpoint = record.mountpoint.as_deref().unwrap_or("/");
                    system.unmount(&under_root(root, mountpoint))
                }
                ActivationKind::Swap => system.swap_off(&record.device),
                ActivationKind::Crypt => system.detach_crypt(&crypt_name(&record.device)),
            };

            match result {
                Ok(()) => tracing::debug!(kind = %record.kind, device = %record.device, "Deactivated"),
                Err(e) => {
                    tracing::error!(kind = %record.kind, device = %record.device, error = %e, "Deactivation failed");
                    operator.report_error(&format!(
                        "Cannot unmount partition {}: {e}",
                        record.device
                    ));
                }
            }
        }

        self.records.clear();
    }
}

/// A ledger persisted between processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Destination root the mounts live under.
    pub destdir: PathBuf,
    /// The activations.
    pub ledger: Ledger,
}

/// Persists the ledger as JSON.
#[derive(Debug)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    /// Create a store writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the ledger file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save a snapshot.
    pub fn save(&self, snapshot: &LedgerSnapshot) -> RootmountResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&self.path, json)?;

        tracing::debug!(
            records = snapshot.ledger.len(),
            path = %self.path.display(),
            "Saved ledger"
        );
        Ok(())
    }

    /// Load the saved snapshot, if any.
    pub fn load(&self) -> RootmountResult<Option<LedgerSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let json = std::fs::read_to_string(&self.path)?;
        let snapshot: LedgerSnapshot = serde_json::from_str(&json).map_err(|e| {
            RootmountError::Serialization(format!("{}: {e}", self.path.display()))
        })?;

        tracing::debug!(
            records = snapshot.ledger.len(),
            path = %self.path.display(),
            "Loaded ledger"
        );
        Ok(Some(snapshot))
    }

    /// Remove the saved snapshot.
    pub fn delete(&self) -> RootmountResult<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            tracing::debug!(path = %self.path.display(), "Deleted ledger");
        }
        Ok(())
    }
}
