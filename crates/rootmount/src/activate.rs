//! Check-then-mount of a single partition.

use std::path::Path;

use rootmount_common::{RootmountError, RootmountResult};
use rootmount_common::paths::under_root;

use crate::inventory::{FsKind, Inventory};
use crate::ledger::ActivationRecord;
use crate::operator::Operator;
use crate::session::Session;
use crate::system::SystemOps;
use crate::translate::DeviceResolver;

/// Filesystem kind that gets a read-only check before mounting.
const CHECKED_FS: &str = "jfs";

/// Collaborators for activating partitions below one root directory.
pub(crate) struct MountContext<'a> {
    pub system: &'a dyn SystemOps,
    pub inventory: &'a Inventory,
    pub resolver: &'a dyn DeviceResolver,
    pub root: &'a Path,
}

impl MountContext<'_> {
    /// Filesystem kind to mount `device` with: the given kind, else the
    /// inventory's detection, else a probe.
    pub fn resolve_fstype(&self, device: &str, given: Option<&str>) -> Option<String> {
        if let Some(fstype) = given {
            return Some(fstype.to_string());
        }
        self.inventory
            .partition(device)
            .and_then(|p| p.detected_fs.mount_type())
            .map(ToString::to_string)
            .or_else(|| self.system.detect_fs(device))
    }

    /// Load the driver for `fstype` unless it is built in.
    pub fn load_driver_for(&self, session: &Session, fstype: &str) {
        if session.config.is_non_modular(fstype) {
            return;
        }
        if let Err(e) = self.system.load_driver(fstype) {
            tracing::warn!(fstype, error = %e, "Cannot load file system driver");
        }
    }

    /// Read-only consistency check for jfs, at most once per device.
    ///
    /// Returns `false` when the check failed and the operator chose to skip.
    pub fn consistency_check(
        &self,
        session: &mut Session,
        operator: &mut dyn Operator,
        device: &str,
        fstype: &str,
    ) -> bool {
        if fstype != CHECKED_FS || session.checked.contains(device) {
            return true;
        }

        tracing::info!(device, fstype, "Checking file system");
        let (passed, details) = match self.system.check_readonly(device, fstype) {
            Ok(report) => (report.success, report.details()),
            Err(e) => (false, e.to_string()),
        };

        let keep = passed || operator.continue_after_check_failure(device, &details);
        if keep {
            session.checked.insert(device.to_string());
        } else {
            tracing::warn!(device, "Skipping partition after failed file system check");
        }
        keep
    }

    /// Repair ext2 filesystems before mounting them read-write.
    pub fn repair_if_needed(&self, device: &str) {
        let is_ext2 = self
            .inventory
            .partition(device)
            .is_some_and(|p| p.detected_fs == FsKind::Ext2);
        if !is_ext2 {
            return;
        }

        match self.system.repair(device) {
            Ok(report) if report.success => tracing::info!(device, "Repaired ext2 file system"),
            Ok(report) => tracing::warn!(device, details = %report.details(), "e2fsck reported problems"),
            Err(e) => tracing::warn!(device, error = %e, "Cannot run e2fsck"),
        }
    }

    /// Check and mount `spec` at `mountpoint` below the root, recording the
    /// device node in the ledger.
    ///
    /// `UUID=`/`LABEL=` tags are resolved first; `mount(2)` only takes nodes.
    pub fn fsck_and_mount(
        &self,
        session: &mut Session,
        operator: &mut dyn Operator,
        mountpoint: &str,
        spec: &str,
        fstype: Option<&str>,
    ) -> RootmountResult<()> {
        let device = self.inventory.device_node(spec);
        let device = device.as_str();
        if device != spec {
            tracing::debug!(spec, device, "Resolved device spec");
        }

        let fstype = self.resolve_fstype(device, fstype);
        if let Some(fstype) = fstype.as_deref() {
            self.load_driver_for(session, fstype);
            if !self.consistency_check(session, operator, device, fstype) {
                return Err(RootmountError::activation(
                    device,
                    "file system check failed",
                ));
            }
        }
        self.repair_if_needed(device);

        let target = under_root(self.root, mountpoint);
        tracing::info!(device, mountpoint, fstype = ?fstype, "Mounting partition");
        self.system.mount(device, &target, fstype.as_deref(), false)?;

        session.ledger.push(ActivationRecord::mount(device, mountpoint));
        Ok(())
    }
}
