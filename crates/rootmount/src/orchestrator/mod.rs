//! Bringing up the target system.
//!
//! The selected root partition is mounted at the destination directory,
//! followed by everything its fstab and cryptotab activate. Each activation
//! lands in the session ledger; any fatal failure unwinds the ledger and
//! leaves nothing mounted.

mod boot;
mod crypt;
mod state;

use std::path::{Path, PathBuf};

use rootmount_common::device::{is_kernel_device_name, is_real_disk, is_unstable_harddisk_name};
use rootmount_common::{RootmountError, RootmountResult};

use crate::activate::MountContext;
use crate::inventory::Inventory;
use crate::ledger::ActivationRecord;
use crate::operator::{ConsistencyWarning, MountDisposition, MountTarget, Operator};
use crate::session::Session;
use crate::system::SystemOps;
use crate::tab::FstabEntry;
use crate::tables::load_tables;
use crate::target::{MountOutcome, TargetMap};
use crate::translate::DeviceResolver;
use crate::var::{mount_var, plan_var};

pub use crypt::{Unlock, UnlockAttempts, UnlockStep};
pub use state::MountState;

/// Mounts the selected system and everything it needs.
pub struct Orchestrator<'a> {
    system: &'a dyn SystemOps,
    resolver: &'a dyn DeviceResolver,
    inventory: &'a Inventory,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator.
    pub fn new(
        system: &'a dyn SystemOps,
        resolver: &'a dyn DeviceResolver,
        inventory: &'a Inventory,
    ) -> Self {
        Self {
            system,
            resolver,
            inventory,
        }
    }

    fn transition(session: &mut Session, next: MountState) {
        if !session.state.can_transition_to(next) {
            tracing::warn!(from = %session.state, to = %next, "Unexpected state transition");
        }
        tracing::info!(from = %session.state, to = %next, "Mount state changed");
        session.state = next;
    }

    fn context<'c>(&'c self, root: &'c Path) -> MountContext<'c> {
        MountContext {
            system: self.system,
            inventory: self.inventory,
            resolver: self.resolver,
            root,
        }
    }

    /// Mount the selected root partition and its secondary activations.
    ///
    /// Calling this again after a successful run returns the earlier result.
    pub fn mount(
        &self,
        session: &mut Session,
        operator: &mut dyn Operator,
    ) -> RootmountResult<MountOutcome> {
        if session.attempted {
            if let Some(outcome) = &session.outcome {
                tracing::info!(root = %outcome.root_device, "Target already mounted");
                return Ok(outcome.clone());
            }
        }

        let device = session
            .selected
            .clone()
            .ok_or_else(|| RootmountError::RootNotFound {
                device: "no root partition selected".to_string(),
            })?;
        session.attempted = true;

        let destdir: PathBuf = session.config.paths.destdir.clone();
        let ctx = self.context(&destdir);

        Self::transition(session, MountState::RootMounting);
        if let Err(e) = ctx.fsck_and_mount(session, operator, "/", &device, None) {
            tracing::error!(device = %device, error = %e, "Cannot mount root partition");
            operator.report_error(&e.to_string());
            session.attempted = false;
            Self::transition(session, MountState::Idle);
            return Err(e);
        }
        Self::transition(session, MountState::RootMounted);

        match self.bring_up(&ctx, session, operator, &device) {
            Ok(()) => {
                Self::transition(session, MountState::Settled);
                session.target_map = TargetMap::from_ledger(&session.ledger);
                let outcome = MountOutcome {
                    root_device: device,
                    target_map: session.target_map.clone(),
                    activations: session.ledger.len(),
                };
                session.outcome = Some(outcome.clone());
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(device = %device, error = %e, "Bring-up failed");
                operator.report_error(&e.to_string());
                Self::transition(session, MountState::RollingBack);
                session.ledger.unwind(self.system, &destdir, operator);
                session.target_map = TargetMap::default();
                session.outcome = None;
                session.attempted = false;
                Self::transition(session, MountState::Idle);
                Err(e)
            }
        }
    }

    /// Undo every activation of the session.
    pub fn release(&self, session: &mut Session, operator: &mut dyn Operator, keep_target: bool) {
        let destdir = session.config.paths.destdir.clone();
        if session.state != MountState::Idle {
            Self::transition(session, MountState::RollingBack);
        }
        session.ledger.unwind(self.system, &destdir, operator);
        if !keep_target {
            session.target_map = TargetMap::default();
        }
        session.outcome = None;
        session.attempted = false;
        if session.state != MountState::Idle {
            Self::transition(session, MountState::Idle);
        }
    }

    fn bring_up(
        &self,
        ctx: &MountContext<'_>,
        session: &mut Session,
        operator: &mut dyn Operator,
        root_device: &str,
    ) -> RootmountResult<()> {
        let tables = load_tables(ctx, session, operator, root_device)?;

        if let Some(entry) = tables
            .fstab
            .iter()
            .find(|e| is_unstable_harddisk_name(e.original_spec()))
        {
            operator.warn(&ConsistencyWarning::KernelDeviceNames {
                root_device: entry.original_spec().to_string(),
            });
        }

        if tables.fstab.is_empty() {
            return Err(RootmountError::config("No fstab found."));
        }

        check_root_device(&tables.fstab, root_device)?;

        let plan = plan_var(&tables.fstab, root_device, ctx.inventory);
        mount_var(ctx, session, operator, &plan, true)?;

        Self::transition(session, MountState::SecondaryMounting);
        let mut fstab = tables.fstab;
        crypt::unlock_cryptotab(ctx, session, operator, &tables.cryptotab, &mut fstab);
        Self::mount_fstab(ctx, session, operator, &fstab)
    }

    fn mount_fstab(
        ctx: &MountContext<'_>,
        session: &mut Session,
        operator: &mut dyn Operator,
        fstab: &[FstabEntry],
    ) -> RootmountResult<()> {
        if let Err(e) = ctx.fsck_and_mount(session, operator, "/sys", "sysfs", Some("sysfs")) {
            tracing::warn!(error = %e, "Cannot mount sysfs");
        }

        for entry in fstab {
            if entry.is_swap() {
                Self::enable_swap(ctx, session, &entry.spec);
                continue;
            }

            let skip = if !session.config.is_allowed_fs(&entry.vfstype) {
                Some("file system kind not mounted")
            } else if entry.is_root() {
                Some("root is already mounted")
            } else if entry.has_option("noauto") {
                Some("noauto")
            } else if entry.is_mounted_at("/var") && session.ledger.is_mounted("/var") {
                Some("/var is already mounted")
            } else {
                None
            };
            if let Some(reason) = skip {
                tracing::debug!(spec = %entry.spec, mountpoint = %entry.file, reason, "Skipping fstab entry");
                continue;
            }

            Self::mount_entry(ctx, session, operator, entry)?;
        }
        Ok(())
    }

    fn mount_entry(
        ctx: &MountContext<'_>,
        session: &mut Session,
        operator: &mut dyn Operator,
        entry: &FstabEntry,
    ) -> RootmountResult<()> {
        let mut target = MountTarget {
            mountpoint: entry.file.clone(),
            device: entry.spec.clone(),
            fstype: entry.vfstype.clone(),
        };

        loop {
            let fstype = (target.fstype == "proc").then_some("proc");
            let result =
                ctx.fsck_and_mount(session, operator, &target.mountpoint, &target.device, fstype);

            let error = match result {
                Ok(()) => {
                    if target.mountpoint.trim_end_matches('/') == "/boot" {
                        boot::check_boot_size(ctx, session, operator, &target.device)?;
                    }
                    return Ok(());
                }
                Err(e) => e,
            };

            match operator.mount_failed(&target, &error.to_string()) {
                MountDisposition::Cancel => return Err(error),
                MountDisposition::ForceContinue => {
                    tracing::warn!(
                        device = %target.device,
                        mountpoint = %target.mountpoint,
                        "Continuing without partition"
                    );
                    return Ok(());
                }
                MountDisposition::EditAndRetry => {
                    if let Some(edited) = operator.edit_mount(&target) {
                        tracing::info!(
                            device = %edited.device,
                            mountpoint = %edited.mountpoint,
                            fstype = %edited.fstype,
                            "Retrying with edited mount"
                        );
                        target = edited;
                    }
                }
            }
        }
    }

    fn enable_swap(ctx: &MountContext<'_>, session: &mut Session, spec: &str) {
        let device = ctx.inventory.device_node(spec);
        let device = device.as_str();
        tracing::info!(device, "Enabling swap");
        match ctx.system.swap_on(device) {
            Ok(()) => session.ledger.push(ActivationRecord::swap(device)),
            Err(e) => tracing::warn!(device, error = %e, "Cannot enable swap"),
        }
    }
}

/// The fstab must have exactly one root row; if it names the root by kernel
/// ordinal, the translated name must be the mounted root device.
fn check_root_device(fstab: &[FstabEntry], root_device: &str) -> RootmountResult<()> {
    let roots: Vec<&FstabEntry> = fstab.iter().filter(|e| e.is_root()).collect();
    let [root] = roots.as_slice() else {
        return Err(RootmountError::config(format!(
            "expected exactly one / entry in fstab, found {}",
            roots.len()
        )));
    };

    let spec = root.original_spec();
    if is_kernel_device_name(spec) && is_real_disk(spec) && root.spec != root_device {
        return Err(RootmountError::config(format!(
            "fstab mounts {} as /, but {root_device} was selected",
            root.spec
        )));
    }
    Ok(())
}
