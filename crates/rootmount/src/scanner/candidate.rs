//! Scan results.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::inventory::{FsKind, PartitionInfo};

/// Verdict on one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootCandidate {
    /// Whether the partition holds an upgradable root filesystem.
    pub valid: bool,
    /// Product name of the installed system.
    pub name: String,
    /// Architecture of the installed system.
    pub arch: String,
    /// Whether the architecture is compatible with the running system.
    pub arch_valid: bool,
    /// Filesystem label.
    pub label: Option<String>,
    /// Detected filesystem.
    pub fs: FsKind,
    /// Filesystem type name from the inventory.
    pub fstype: Option<String>,
    /// Why the partition was rejected.
    pub mismatch: Option<String>,
}

impl RootCandidate {
    pub(crate) fn new(partition: &PartitionInfo) -> Self {
        Self {
            valid: false,
            name: String::new(),
            arch: String::new(),
            arch_valid: false,
            label: partition.label.clone(),
            fs: partition.detected_fs,
            fstype: partition.fstype.clone(),
            mismatch: None,
        }
    }

    /// Name shown for the candidate, with fallbacks for unnamed systems.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self.name.as_str() {
            "" | "Unknown" if self.fs.is_possible_root() => "Unknown Linux System",
            "" | "Unknown" => "Non-Linux System",
            name => name,
        }
    }
}

/// Scan results keyed by partition device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CandidateSet {
    candidates: BTreeMap<String, RootCandidate>,
}

impl CandidateSet {
    pub(crate) fn insert(&mut self, device: String, candidate: RootCandidate) {
        self.candidates.insert(device, candidate);
    }

    /// Candidate for `device`.
    #[must_use]
    pub fn get(&self, device: &str) -> Option<&RootCandidate> {
        self.candidates.get(device)
    }

    /// All candidates in device order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &RootCandidate)> {
        self.candidates.iter()
    }

    /// Number of scanned partitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether nothing was scanned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Number of valid candidates.
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.candidates.values().filter(|c| c.valid).count()
    }

    /// First valid candidate in device order.
    #[must_use]
    pub fn first_valid(&self) -> Option<&str> {
        self.candidates
            .iter()
            .find(|(_, c)| c.valid)
            .map(|(device, _)| device.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_fallbacks() {
        let mut linux = RootCandidate::new(&PartitionInfo::new("/dev/sda2", FsKind::Ext4));
        assert_eq!(linux.display_name(), "Unknown Linux System");
        linux.name = "openSUSE Leap 15.6".to_string();
        assert_eq!(linux.display_name(), "openSUSE Leap 15.6");

        let other = RootCandidate::new(&PartitionInfo::new("/dev/sda1", FsKind::Ntfs));
        assert_eq!(other.display_name(), "Non-Linux System");
    }

    #[test]
    fn first_valid_in_device_order() {
        let mut set = CandidateSet::default();
        let mut valid = RootCandidate::new(&PartitionInfo::new("/dev/sdb2", FsKind::Xfs));
        valid.valid = true;
        set.insert("/dev/sdb2".to_string(), valid.clone());
        set.insert(
            "/dev/sda2".to_string(),
            RootCandidate::new(&PartitionInfo::new("/dev/sda2", FsKind::Ext4)),
        );
        set.insert("/dev/sdc2".to_string(), valid);

        assert_eq!(set.valid_count(), 2);
        assert_eq!(set.first_valid(), Some("/dev/sdb2"));
    }
}
