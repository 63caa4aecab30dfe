//! Target map written back after a successful bring-up.

use std::collections::BTreeMap;

use rootmount_common::MountBy;
use serde::{Deserialize, Serialize};

use crate::ledger::{ActivationKind, ActivationRecord, Ledger};

/// Mount point assigned to an activated device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEntry {
    /// Mount point, or `swap`.
    pub mountpoint: String,
    /// How the device should be identified.
    pub mount_by: MountBy,
}

/// Activated devices keyed by device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetMap {
    entries: BTreeMap<String, TargetEntry>,
}

impl TargetMap {
    /// Build the map from mount and swap records of a ledger.
    #[must_use]
    pub fn from_ledger(ledger: &Ledger) -> Self {
        let entries = ledger
            .records()
            .iter()
            .filter_map(|record| {
                let mountpoint = match record.kind {
                    ActivationKind::Mount => record.mountpoint.clone()?,
                    ActivationKind::Swap => "swap".to_string(),
                    ActivationKind::Crypt => return None,
                };
                Some((record.device.clone(), Self::entry(record, mountpoint)))
            })
            .collect();
        Self { entries }
    }

    fn entry(record: &ActivationRecord, mountpoint: String) -> TargetEntry {
        TargetEntry {
            mountpoint,
            mount_by: MountBy::for_device(&record.device),
        }
    }

    /// Entry for `device`.
    #[must_use]
    pub fn get(&self, device: &str) -> Option<&TargetEntry> {
        self.entries.get(device)
    }

    /// All entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TargetEntry)> {
        self.entries.iter()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of a successful bring-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountOutcome {
    /// Device mounted as the target root.
    pub root_device: String,
    /// Activated devices and their mount points.
    pub target_map: TargetMap,
    /// Number of activations.
    pub activations: usize,
}
