//! Inventory read from `lsblk --json`.

use std::process::Command;

use rootmount_common::{RootmountError, RootmountResult};
use serde::Deserialize;

use super::{Disk, FsKind, Inventory, InventoryProvider, PartitionInfo, PartitionType};

/// MBR partition ids of extended partitions.
const EXTENDED_IDS: &[u32] = &[0x05, 0x0f, 0x85];

/// Columns requested from lsblk.
const COLUMNS: &str = "NAME,PATH,TYPE,FSTYPE,LABEL,UUID,SIZE,PARTTYPE";

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    fstype: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    size: Option<Size>,
    #[serde(default)]
    parttype: Option<String>,
    #[serde(default)]
    children: Vec<LsblkDevice>,
}

/// Older lsblk releases print numbers as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Size {
    Bytes(u64),
    Text(String),
}

impl Size {
    fn kib(&self) -> Option<u64> {
        match self {
            Self::Bytes(bytes) => Some(bytes / 1024),
            Self::Text(text) => text.trim().parse::<u64>().ok().map(|b| b / 1024),
        }
    }
}

impl LsblkDevice {
    fn device(&self) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| format!("/dev/{}", self.name))
    }

    fn partition(&self) -> PartitionInfo {
        let fsid = self
            .parttype
            .as_deref()
            .and_then(|id| u32::from_str_radix(id.trim_start_matches("0x"), 16).ok())
            .unwrap_or(0);
        let partition_type = if EXTENDED_IDS.contains(&fsid) {
            PartitionType::Extended
        } else {
            PartitionType::Primary
        };

        PartitionInfo {
            device: self.device(),
            fsid,
            detected_fs: self
                .fstype
                .as_deref()
                .map_or(FsKind::Unknown, FsKind::from_name),
            partition_type,
            label: self.label.clone(),
            fstype: self.fstype.clone(),
            size_k: self.size.as_ref().and_then(Size::kib),
            uuid: self.uuid.clone(),
            udev_ids: Vec::new(),
            udev_path: None,
        }
    }
}

/// Build an inventory from `lsblk --json` output.
pub fn parse_lsblk(json: &str) -> RootmountResult<Inventory> {
    let output: LsblkOutput = serde_json::from_str(json)?;
    let mut inventory = Inventory::new();

    for device in output.blockdevices.iter().filter(|d| d.kind == "disk") {
        let partitions = device
            .children
            .iter()
            .filter(|child| child.kind == "part")
            .map(LsblkDevice::partition)
            .collect();
        inventory
            .disks
            .insert(device.device(), Disk { partitions });
    }

    Ok(inventory)
}

/// Inventory probed with `lsblk`.
#[derive(Debug, Clone, Default)]
pub struct LsblkInventory;

impl InventoryProvider for LsblkInventory {
    fn load(&self) -> RootmountResult<Inventory> {
        tracing::debug!(columns = COLUMNS, "Probing block devices with lsblk");

        let output = Command::new("lsblk")
            .args(["--json", "--bytes", "--output", COLUMNS])
            .output()
            .map_err(|e| RootmountError::Command {
                command: "lsblk".to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(RootmountError::Command {
                command: "lsblk".to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_lsblk(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
       "blockdevices": [
          {"name": "sda", "path": "/dev/sda", "type": "disk", "fstype": null,
           "label": null, "uuid": null, "size": 500107862016, "parttype": null,
           "children": [
              {"name": "sda1", "path": "/dev/sda1", "type": "part", "fstype": "swap",
               "label": null, "uuid": "aaaa", "size": 2147483648, "parttype": "0x82"},
              {"name": "sda2", "path": "/dev/sda2", "type": "part", "fstype": "ext4",
               "label": "root", "uuid": "bbbb", "size": 53687091200, "parttype": "0x83"},
              {"name": "sda4", "path": "/dev/sda4", "type": "part", "fstype": null,
               "label": null, "uuid": null, "size": 1024, "parttype": "0x5"}
           ]},
          {"name": "sr0", "type": "rom", "size": "1073741312"},
          {"name": "nvme0n1", "type": "disk", "size": "1024209543168",
           "children": [
              {"name": "nvme0n1p1", "type": "part", "fstype": "vfat",
               "parttype": "c12a7328-f81f-11d2-ba4b-00a0c93ec93b", "size": "536870912"}
           ]}
       ]
    }"#;

    #[test]
    fn parse_disks_and_partitions() {
        let inventory = parse_lsblk(SAMPLE).unwrap();
        assert_eq!(inventory.disks().len(), 2);

        let root = inventory.partition("/dev/sda2").unwrap();
        assert_eq!(root.detected_fs, FsKind::Ext4);
        assert_eq!(root.fsid, 0x83);
        assert_eq!(root.size_k, Some(52_428_800));
        assert_eq!(root.label.as_deref(), Some("root"));

        let extended = inventory.partition("/dev/sda4").unwrap();
        assert_eq!(extended.partition_type, PartitionType::Extended);
    }

    #[test]
    fn paths_fall_back_to_names() {
        let inventory = parse_lsblk(SAMPLE).unwrap();
        let esp = inventory.partition("/dev/nvme0n1p1").unwrap();
        assert_eq!(esp.detected_fs, FsKind::Vfat);
        assert_eq!(esp.fsid, 0);
        assert_eq!(esp.size_k, Some(524_288));
    }
}
