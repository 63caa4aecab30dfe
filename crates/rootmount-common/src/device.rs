//! Kernel device-name helpers.
//!
//! Kernel-enumerated names (`/dev/sda3`, `/dev/nvme0n1p2`) are ordinal and may
//! change between boots; the upgrade flow needs to recognise them, split them
//! into disk and partition number, and rebuild them against another disk.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Partitions on disks whose name ends in a letter (`/dev/sda3`).
static LETTER_DISK_PARTITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(/dev/(?:sd|hd|vd|xvd|dasd)[a-z]+)([0-9]+)$").expect("valid regex")
});

/// Partitions on disks whose name ends in a digit (`/dev/nvme0n1p2`).
static DIGIT_DISK_PARTITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(/dev/(?:nvme[0-9]+n[0-9]+|mmcblk[0-9]+))p([0-9]+)$").expect("valid regex")
});

/// Whole real disks.
static REAL_DISK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/dev/(?:(?:sd|hd|vd|xvd|dasd)[a-z]+|nvme[0-9]+n[0-9]+|mmcblk[0-9]+)$")
        .expect("valid regex")
});

/// Hard-disk names that are known to be renumbered across boots.
static UNSTABLE_HARDDISK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/dev/(?:sd|hd|dasd)[a-z]+[0-9]+$").expect("valid regex"));

/// A kernel partition name split into its disk and partition number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskPartition {
    /// The disk device (`/dev/sda`).
    pub disk: String,
    /// The partition number (`3`).
    pub number: u32,
}

/// Split a kernel partition name into disk and number.
#[must_use]
pub fn split_partition(device: &str) -> Option<DiskPartition> {
    let caps = LETTER_DISK_PARTITION
        .captures(device)
        .or_else(|| DIGIT_DISK_PARTITION.captures(device))?;
    Some(DiskPartition {
        disk: caps[1].to_string(),
        number: caps[2].parse().ok()?,
    })
}

/// Build the name of partition `number` on `disk`.
#[must_use]
pub fn partition_device(disk: &str, number: u32) -> String {
    if disk.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{disk}p{number}")
    } else {
        format!("{disk}{number}")
    }
}

/// Whether the name was assigned by the kernel (disk or partition).
#[must_use]
pub fn is_kernel_device_name(device: &str) -> bool {
    REAL_DISK.is_match(device) || split_partition(device).is_some()
}

/// Whether the device is, or lives on, a physical disk rather than a
/// RAID, LVM, device-mapper or persistent-link name.
#[must_use]
pub fn is_real_disk(device: &str) -> bool {
    match split_partition(device) {
        Some(part) => REAL_DISK.is_match(&part.disk),
        None => REAL_DISK.is_match(device),
    }
}

/// Whether an fstab spec names a hard-disk partition by kernel ordinal.
#[must_use]
pub fn is_unstable_harddisk_name(spec: &str) -> bool {
    UNSTABLE_HARDDISK.is_match(spec)
}

/// Persistence strategy for a mount's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountBy {
    /// Stable `/dev/disk/by-id` link.
    Id,
    /// Plain device node.
    Device,
    /// Anything else (labels, UUIDs, pseudo filesystems).
    Label,
}

impl MountBy {
    /// Pick the mount-by method from the shape of a device path.
    #[must_use]
    pub fn for_device(device: &str) -> Self {
        if device.contains("/dev/disk/by-id") {
            Self::Id
        } else if device.contains("/dev/") {
            Self::Device
        } else {
            Self::Label
        }
    }
}

impl std::fmt::Display for MountBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id => write!(f, "id"),
            Self::Device => write!(f, "device"),
            Self::Label => write!(f, "label"),
        }
    }
}
