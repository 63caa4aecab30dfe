//! Disk inventory records.
//!
//! The inventory is owned by an external storage subsystem; rootmount only
//! reads it. Two providers are bundled: a JSON document and `lsblk` output.

mod lsblk;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rootmount_common::RootmountResult;
use rootmount_common::device::{is_kernel_device_name, is_real_disk};
use serde::{Deserialize, Serialize};

pub use lsblk::{LsblkInventory, parse_lsblk};

/// Filesystem detected on a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsKind {
    /// ext2.
    Ext2,
    /// ext3.
    Ext3,
    /// ext4.
    Ext4,
    /// btrfs.
    Btrfs,
    /// ReiserFS.
    #[serde(alias = "reiser")]
    Reiserfs,
    /// XFS.
    Xfs,
    /// JFS.
    Jfs,
    /// FAT.
    Vfat,
    /// NTFS.
    Ntfs,
    /// Swap space.
    Swap,
    /// Nothing recognised.
    #[default]
    #[serde(other)]
    Unknown,
}

impl FsKind {
    /// Map a filesystem name (as printed by `blkid`/`lsblk`) to a kind.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "ext2" => Self::Ext2,
            "ext3" => Self::Ext3,
            "ext4" => Self::Ext4,
            "btrfs" => Self::Btrfs,
            "reiserfs" | "reiser" => Self::Reiserfs,
            "xfs" => Self::Xfs,
            "jfs" => Self::Jfs,
            "vfat" => Self::Vfat,
            "ntfs" => Self::Ntfs,
            "swap" => Self::Swap,
            _ => Self::Unknown,
        }
    }

    /// Name passed to `mount -t`, if any.
    #[must_use]
    pub const fn mount_type(self) -> Option<&'static str> {
        match self {
            Self::Ext2 => Some("ext2"),
            Self::Ext3 => Some("ext3"),
            Self::Ext4 => Some("ext4"),
            Self::Btrfs => Some("btrfs"),
            Self::Reiserfs => Some("reiserfs"),
            Self::Xfs => Some("xfs"),
            Self::Jfs => Some("jfs"),
            Self::Vfat => Some("vfat"),
            Self::Ntfs => Some("ntfs"),
            Self::Swap | Self::Unknown => None,
        }
    }

    /// Whether a Linux root filesystem can live on this kind.
    #[must_use]
    pub const fn is_possible_root(self) -> bool {
        matches!(
            self,
            Self::Ext2
                | Self::Ext3
                | Self::Ext4
                | Self::Btrfs
                | Self::Reiserfs
                | Self::Xfs
                | Self::Jfs
        )
    }
}

impl std::fmt::Display for FsKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Swap => write!(f, "swap"),
            Self::Unknown => write!(f, "unknown"),
            other => write!(f, "{}", other.mount_type().unwrap_or("unknown")),
        }
    }
}

/// Partition table entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionType {
    /// Primary partition (or any GPT partition).
    #[default]
    Primary,
    /// Logical partition inside an extended one.
    Logical,
    /// Extended container partition.
    Extended,
}

/// One partition as reported by the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInfo {
    /// Device node (`/dev/sda2`).
    pub device: String,
    /// Partition table id (`0x83` = 131).
    #[serde(default)]
    pub fsid: u32,
    /// Detected filesystem.
    #[serde(default)]
    pub detected_fs: FsKind,
    /// Partition type.
    #[serde(default, rename = "type")]
    pub partition_type: PartitionType,
    /// Filesystem label.
    #[serde(default)]
    pub label: Option<String>,
    /// Human readable filesystem type name.
    #[serde(default)]
    pub fstype: Option<String>,
    /// Size in KiB.
    #[serde(default)]
    pub size_k: Option<u64>,
    /// Filesystem UUID.
    #[serde(default)]
    pub uuid: Option<String>,
    /// `/dev/disk/by-id` names, without the directory.
    #[serde(default)]
    pub udev_ids: Vec<String>,
    /// `/dev/disk/by-path` name, without the directory.
    #[serde(default)]
    pub udev_path: Option<String>,
}

impl PartitionInfo {
    /// Create a partition record with only the essentials set.
    pub fn new(device: impl Into<String>, detected_fs: FsKind) -> Self {
        Self {
            device: device.into(),
            fsid: 0x83,
            detected_fs,
            partition_type: PartitionType::Primary,
            label: None,
            fstype: None,
            size_k: None,
            uuid: None,
            udev_ids: Vec::new(),
            udev_path: None,
        }
    }

    /// Set the partition type.
    #[must_use]
    pub const fn with_type(mut self, partition_type: PartitionType) -> Self {
        self.partition_type = partition_type;
        self
    }

    /// Set the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the filesystem UUID.
    #[must_use]
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Set the size in KiB.
    #[must_use]
    pub const fn with_size_k(mut self, size_k: u64) -> Self {
        self.size_k = Some(size_k);
        self
    }

    /// Whether this partition can never hold a root filesystem or `/var`.
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        self.detected_fs == FsKind::Swap || self.partition_type == PartitionType::Extended
    }

    /// Whether an fstab device spec refers to this partition.
    #[must_use]
    pub fn matches_spec(&self, spec: &str) -> bool {
        if spec == self.device {
            return true;
        }
        if let Some(uuid) = spec
            .strip_prefix("UUID=")
            .or_else(|| spec.strip_prefix("/dev/disk/by-uuid/"))
        {
            return self.uuid.as_deref() == Some(unquote(uuid));
        }
        if let Some(label) = spec
            .strip_prefix("LABEL=")
            .or_else(|| spec.strip_prefix("/dev/disk/by-label/"))
        {
            return self.label.as_deref() == Some(unquote(label));
        }
        if let Some(id) = spec.strip_prefix("/dev/disk/by-id/") {
            return self.udev_ids.iter().any(|known| known == id);
        }
        if let Some(path) = spec.strip_prefix("/dev/disk/by-path/") {
            return self.udev_path.as_deref() == Some(path);
        }
        false
    }

    /// One-line description used when the operator picks a partition.
    #[must_use]
    pub fn describe(&self) -> String {
        let size = self
            .size_k
            .map_or_else(|| "unknown".to_string(), format_size_k);
        format!(
            "File system: {}, Type: {}, Label: {}, Size: {}, udev IDs: {}, udev path: {}",
            self.detected_fs,
            self.fstype.as_deref().unwrap_or("Unknown"),
            self.label.as_deref().unwrap_or("None"),
            size,
            self.udev_ids.join(", "),
            self.udev_path.as_deref().unwrap_or("Unknown"),
        )
    }
}

/// fstab tags and the udev link directory each resolves through.
const TAG_LINKS: [(&str, &str); 4] = [
    ("UUID=", "by-uuid"),
    ("LABEL=", "by-label"),
    ("PARTUUID=", "by-partuuid"),
    ("PARTLABEL=", "by-partlabel"),
];

fn unquote(value: &str) -> &str {
    value.trim_matches('"')
}

#[allow(clippy::cast_precision_loss)]
fn format_size_k(size_k: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    let mut size = size_k as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{size_k} {}", UNITS[0])
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

/// A disk and its partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    /// Partitions in table order.
    #[serde(default)]
    pub partitions: Vec<PartitionInfo>,
}

/// All disks known to the storage subsystem, keyed by disk device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory {
    disks: BTreeMap<String, Disk>,
}

impl Inventory {
    /// Create an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a disk with its partitions.
    #[must_use]
    pub fn with_disk(mut self, disk: impl Into<String>, partitions: Vec<PartitionInfo>) -> Self {
        self.disks.insert(disk.into(), Disk { partitions });
        self
    }

    /// Parse the JSON form (`{"/dev/sda": {"partitions": [...]}}`).
    pub fn from_json(text: &str) -> RootmountResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Disks keyed by device.
    #[must_use]
    pub const fn disks(&self) -> &BTreeMap<String, Disk> {
        &self.disks
    }

    /// Every partition on every disk.
    pub fn partitions(&self) -> impl Iterator<Item = &PartitionInfo> {
        self.disks.values().flat_map(|disk| disk.partitions.iter())
    }

    /// Look up a partition by device.
    #[must_use]
    pub fn partition(&self, device: &str) -> Option<&PartitionInfo> {
        self.partitions().find(|p| p.device == device)
    }

    /// Device node an fstab spec refers to.
    ///
    /// Tags and udev links resolve through the inventory. Tags it does not
    /// know fall back to their `/dev/disk/by-*` link; other specs are kept.
    #[must_use]
    pub fn device_node(&self, spec: &str) -> String {
        if self.partition(spec).is_some() {
            return spec.to_string();
        }
        if let Some(partition) = self
            .partitions()
            .find(|p| !p.device.is_empty() && p.matches_spec(spec))
        {
            return partition.device.clone();
        }

        TAG_LINKS
            .iter()
            .find_map(|(tag, dir)| {
                spec.strip_prefix(tag)
                    .map(|value| format!("/dev/disk/{dir}/{}", unquote(value)))
            })
            .unwrap_or_else(|| spec.to_string())
    }

    /// Disks with kernel-enumerated names that are physical disks.
    #[must_use]
    pub fn real_disks(&self) -> Vec<&str> {
        self.disks
            .keys()
            .map(String::as_str)
            .filter(|disk| is_kernel_device_name(disk) && is_real_disk(disk))
            .collect()
    }
}

/// Source of the disk inventory.
pub trait InventoryProvider {
    /// Read the current inventory.
    fn load(&self) -> RootmountResult<Inventory>;
}

/// Inventory stored as a JSON document.
#[derive(Debug, Clone)]
pub struct JsonInventory {
    path: PathBuf,
}

impl JsonInventory {
    /// Read the inventory from `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl InventoryProvider for JsonInventory {
    fn load(&self) -> RootmountResult<Inventory> {
        let text = std::fs::read_to_string(&self.path)?;
        let inventory = Inventory::from_json(&text)?;
        tracing::debug!(
            path = %self.path.display(),
            disks = inventory.disks.len(),
            "Loaded inventory"
        );
        Ok(inventory)
    }
}
