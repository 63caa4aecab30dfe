//! Locating a separate `/var`.
//!
//! When `/var` is named by kernel ordinal it may have moved together with the
//! root disk. Its partition number is kept and the disk recomputed from where
//! the root partition lives now.

use rootmount_common::device::{
    is_kernel_device_name, is_real_disk, partition_device, split_partition,
};
use rootmount_common::{RootmountError, RootmountResult};

use crate::activate::MountContext;
use crate::inventory::Inventory;
use crate::operator::{Operator, VarChoice};
use crate::session::Session;
use crate::tab::{FstabEntry, find_mountpoint};

/// Where to mount `/var` from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarPlan {
    /// `/var` is on the root filesystem.
    NotSeparate,
    /// Mount the device as written.
    Direct(String),
    /// Mount the recomputed device.
    Relocated(String),
    /// Ask the operator.
    Manual,
}

fn is_real_disk_name(spec: &str) -> bool {
    is_kernel_device_name(spec) && is_real_disk(spec)
}

/// Decide where `/var` lives, given the device the root is mounted from now.
#[must_use]
pub fn plan_var(fstab: &[FstabEntry], root_device: &str, inventory: &Inventory) -> VarPlan {
    let Some(var) = find_mountpoint(fstab, "/var") else {
        return VarPlan::NotSeparate;
    };
    let direct = || VarPlan::Direct(var.spec.clone());

    if !is_real_disk_name(&var.spec) {
        return direct();
    }
    let Some(root) = fstab.iter().find(|e| e.is_root()) else {
        return direct();
    };
    if !is_real_disk_name(&root.spec) {
        return direct();
    }
    let (Some(var_part), Some(root_part)) = (split_partition(&var.spec), split_partition(&root.spec))
    else {
        return direct();
    };
    let Some(current) = split_partition(root_device) else {
        return direct();
    };

    if var_part.disk == root_part.disk {
        return VarPlan::Relocated(partition_device(&current.disk, var_part.number));
    }

    let disks = inventory.real_disks();
    if disks.len() != 2 {
        tracing::warn!(disks = disks.len(), "Cannot relocate /var automatically");
        return VarPlan::Manual;
    }
    match disks.iter().find(|disk| **disk != current.disk) {
        Some(other) if disks.contains(&current.disk.as_str()) => {
            VarPlan::Relocated(partition_device(other, var_part.number))
        }
        _ => VarPlan::Manual,
    }
}

/// Partitions offered for manual `/var` selection.
fn var_choices(inventory: &Inventory) -> Vec<VarChoice> {
    let mut choices: Vec<VarChoice> = inventory
        .partitions()
        .filter(|p| !p.is_ignored() && !p.device.is_empty())
        .map(|p| VarChoice {
            device: p.device.clone(),
            description: p.describe(),
        })
        .collect();
    choices.sort_by(|a, b| a.device.cmp(&b.device));
    choices
}

/// Mount `/var` according to `plan`. Returns whether something was mounted.
pub(crate) fn mount_var(
    ctx: &MountContext<'_>,
    session: &mut Session,
    operator: &mut dyn Operator,
    plan: &VarPlan,
    allow_manual: bool,
) -> RootmountResult<bool> {
    let device = match plan {
        VarPlan::NotSeparate => return Ok(false),
        VarPlan::Direct(device) | VarPlan::Relocated(device) => device,
        VarPlan::Manual if allow_manual => {
            return mount_var_manually(ctx, session, operator).map(|()| true);
        }
        VarPlan::Manual => {
            return Err(RootmountError::config(
                "Unable to mount /var partition with this disk configuration",
            ));
        }
    };

    tracing::info!(device = %device, plan = ?plan, "Mounting /var");
    ctx.fsck_and_mount(session, operator, "/var", device, None)
        .map_err(|e| RootmountError::activation(device, format!("unable to mount /var: {e}")))?;
    Ok(true)
}

fn mount_var_manually(
    ctx: &MountContext<'_>,
    session: &mut Session,
    operator: &mut dyn Operator,
) -> RootmountResult<()> {
    let choices = var_choices(ctx.inventory);

    loop {
        let Some(device) = operator.choose_var_device(&choices) else {
            return Err(RootmountError::Cancelled {
                operation: "selection of the /var partition".to_string(),
            });
        };

        match ctx.fsck_and_mount(session, operator, "/var", &device, None) {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::error!(device = %device, error = %e, "Cannot mount /var");
                operator.report_error(&format!("Cannot mount {device} as /var: {e}"));
            }
        }
    }
}
