//! Root partition discovery.
//!
//! Every partition that can hold a Linux root filesystem is mounted read-only
//! at a private staging directory and inspected: its fstab must name it as
//! `/`, its binaries must fit the running architecture and it must not be a
//! half-finished installation.

mod candidate;

use std::path::Path;

use rootmount_common::paths::under_root;
use rootmount_common::{RootmountError, RootmountResult};

use crate::activate::MountContext;
use crate::inventory::{Inventory, PartitionInfo};
use crate::operator::{ConsistencyWarning, Operator};
use crate::session::Session;
use crate::system::SystemOps;
use crate::tab::FSTAB;
use crate::tables::load_tables;
use crate::translate::DeviceResolver;

pub use candidate::{CandidateSet, RootCandidate};

/// Release file naming the installed product.
const OS_RELEASE: &str = "etc/os-release";

/// A partition mounted at the staging directory, unmounted on drop.
struct StagingMount<'a> {
    system: &'a dyn SystemOps,
    path: &'a Path,
}

impl<'a> StagingMount<'a> {
    fn mount(
        system: &'a dyn SystemOps,
        device: &str,
        path: &'a Path,
        fstype: Option<&str>,
    ) -> RootmountResult<Self> {
        std::fs::create_dir_all(path)?;
        system.mount(device, path, fstype, true)?;
        Ok(Self { system, path })
    }
}

impl Drop for StagingMount<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.system.unmount(self.path) {
            tracing::error!(path = %self.path.display(), error = %e, "Cannot unmount staging directory");
        }
    }
}

/// Probes partitions for installed systems.
pub struct Scanner<'a> {
    system: &'a dyn SystemOps,
    resolver: &'a dyn DeviceResolver,
}

impl<'a> Scanner<'a> {
    /// Create a scanner.
    pub fn new(system: &'a dyn SystemOps, resolver: &'a dyn DeviceResolver) -> Self {
        Self { system, resolver }
    }

    /// Scan all partitions once per session.
    pub fn scan<'s>(
        &self,
        session: &'s mut Session,
        inventory: &Inventory,
        operator: &mut dyn Operator,
    ) -> RootmountResult<&'s CandidateSet> {
        self.scan_with_progress(session, inventory, operator, |_, _| {})
    }

    /// Scan all partitions once per session, reporting `(done, total)` after each.
    pub fn scan_with_progress<'s>(
        &self,
        session: &'s mut Session,
        inventory: &Inventory,
        operator: &mut dyn Operator,
        mut progress: impl FnMut(usize, usize),
    ) -> RootmountResult<&'s CandidateSet> {
        if session.candidates.is_none() {
            let candidates = self.probe(session, inventory, operator, &mut progress)?;
            tracing::info!(
                scanned = candidates.len(),
                valid = candidates.valid_count(),
                "Root partition scan finished"
            );
            session.candidates = Some(candidates);
        } else {
            tracing::debug!("Partitions already scanned");
        }
        Ok(session.candidates.get_or_insert_with(CandidateSet::default))
    }

    fn probe(
        &self,
        session: &mut Session,
        inventory: &Inventory,
        operator: &mut dyn Operator,
        progress: &mut dyn FnMut(usize, usize),
    ) -> RootmountResult<CandidateSet> {
        for driver in &session.config.preload_drivers {
            if let Err(e) = self.system.load_driver(driver) {
                tracing::debug!(driver = %driver, error = %e, "Driver not loaded");
            }
        }

        let staging = session.config.paths.staging();
        if staging.exists() && !staging.is_dir() {
            return Err(RootmountError::config(format!(
                "staging path {} is not a directory",
                staging.display()
            )));
        }

        let running_arch = self.system.probe_arch(&session.config.reference_executable);
        tracing::debug!(arch = %running_arch, "Running system architecture");

        let partitions: Vec<&PartitionInfo> =
            inventory.partitions().filter(|p| !p.is_ignored()).collect();
        let total = partitions.len();
        let mut candidates = CandidateSet::default();

        for (index, partition) in partitions.into_iter().enumerate() {
            let candidate =
                self.check_partition(session, inventory, operator, partition, &staging, &running_arch);
            tracing::info!(
                device = %partition.device,
                valid = candidate.valid,
                name = %candidate.name,
                mismatch = ?candidate.mismatch,
                "Checked partition"
            );
            candidates.insert(partition.device.clone(), candidate);
            progress(index + 1, total);
        }

        Ok(candidates)
    }

    fn check_partition(
        &self,
        session: &mut Session,
        inventory: &Inventory,
        operator: &mut dyn Operator,
        partition: &PartitionInfo,
        staging: &Path,
        running_arch: &str,
    ) -> RootCandidate {
        let mut candidate = RootCandidate::new(partition);
        let device = partition.device.as_str();

        let Some(fstype) = partition.detected_fs.mount_type().filter(|_| partition.detected_fs.is_possible_root())
        else {
            candidate.mismatch = Some(format!("{} cannot hold a root file system", partition.detected_fs));
            return candidate;
        };

        let ctx = MountContext {
            system: self.system,
            inventory,
            resolver: self.resolver,
            root: staging,
        };

        if !ctx.consistency_check(session, operator, device, fstype) {
            candidate.mismatch = Some("file system check failed".to_string());
            return candidate;
        }
        ctx.load_driver_for(session, fstype);

        let _mounted = match StagingMount::mount(self.system, device, staging, Some(fstype)) {
            Ok(mounted) => mounted,
            Err(e) => {
                tracing::debug!(device, error = %e, "Cannot mount partition for inspection");
                candidate.mismatch = Some(format!("cannot mount: {e}"));
                return candidate;
            }
        };

        if let Err(reason) =
            self.evaluate(&ctx, session, operator, partition, running_arch, &mut candidate)
        {
            let error = RootmountError::Validation {
                device: device.to_string(),
                reason: reason.clone(),
            };
            tracing::debug!(error = %error, "Partition rejected");
            candidate.mismatch = Some(reason);
        }
        candidate
    }

    fn evaluate(
        &self,
        ctx: &MountContext<'_>,
        session: &mut Session,
        operator: &mut dyn Operator,
        partition: &PartitionInfo,
        running_arch: &str,
        candidate: &mut RootCandidate,
    ) -> Result<(), String> {
        let device = partition.device.as_str();
        let fstab_size = std::fs::metadata(ctx.root.join(FSTAB)).map_or(0, |m| m.len());
        if fstab_size == 0 {
            return Err("no /etc/fstab".to_string());
        }

        candidate.name = os_release_name(ctx.root);

        let executable = under_root(ctx.root, &session.config.reference_executable.to_string_lossy());
        candidate.arch = self.system.probe_arch(&executable);
        candidate.arch_valid = candidate.arch == running_arch
            || session.config.archs_equivalent(&candidate.arch, running_arch);
        if candidate.arch_valid && candidate.arch != running_arch {
            operator.warn(&ConsistencyWarning::ArchitectureEquivalent {
                device: device.to_string(),
                target: candidate.arch.clone(),
                running: running_arch.to_string(),
            });
        }

        let tables = load_tables(ctx, session, operator, device).map_err(|e| e.to_string())?;
        let roots: Vec<_> = tables.fstab.iter().filter(|e| e.is_root()).collect();
        let [root] = roots.as_slice() else {
            return Err(format!(
                "expected exactly one / entry in fstab, found {}",
                roots.len()
            ));
        };

        if !partition.matches_spec(&root.spec) && !partition.matches_spec(root.original_spec()) {
            return Err(format!("fstab mounts {} as /, not {device}", root.spec));
        }
        if !candidate.arch_valid {
            return Err(format!(
                "architecture {} does not match running system ({running_arch})",
                candidate.arch
            ));
        }
        if ctx.root.join(&session.config.incomplete_marker).exists() {
            return Err("installation was not finished".to_string());
        }

        candidate.valid = true;
        Ok(())
    }
}

/// Product name from `etc/os-release` below `root`.
fn os_release_name(root: &Path) -> String {
    let Ok(text) = std::fs::read_to_string(root.join(OS_RELEASE)) else {
        return "Unknown".to_string();
    };

    let value = |key: &str| {
        text.lines()
            .filter_map(|line| line.split_once('='))
            .find(|(k, _)| k.trim() == key)
            .map(|(_, v)| v.trim().trim_matches('"').trim_matches('\'').to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(pretty) = value("PRETTY_NAME") {
        return pretty;
    }
    match (value("NAME"), value("VERSION")) {
        (Some(name), Some(version)) => format!("{name} {version}"),
        (Some(name), None) => name,
        _ => "Unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn root_with_release(content: &str) -> tempfile::TempDir {
        let root = tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("etc")).unwrap();
        std::fs::write(root.path().join(OS_RELEASE), content).unwrap();
        root
    }

    #[test]
    fn pretty_name_wins() {
        let root = root_with_release("NAME=\"openSUSE Leap\"\nVERSION=\"15.6\"\nPRETTY_NAME=\"openSUSE Leap 15.6\"\n");
        assert_eq!(os_release_name(root.path()), "openSUSE Leap 15.6");
    }

    #[test]
    fn name_and_version() {
        let root = root_with_release("NAME=Debian\nVERSION='12 (bookworm)'\n");
        assert_eq!(os_release_name(root.path()), "Debian 12 (bookworm)");
    }

    #[test]
    fn missing_release_file() {
        let root = tempdir().unwrap();
        assert_eq!(os_release_name(root.path()), "Unknown");
    }
}
