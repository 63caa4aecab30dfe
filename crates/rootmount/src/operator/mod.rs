//! Operator decisions.
//!
//! Interactive branches of the mount flow are resolved through an
//! [`Operator`]. The state machine only sees the symbolic outcome.

mod batch;
mod interactive;

use std::fmt;

pub use self::batch::BatchOperator;
pub use self::interactive::ConsoleOperator;

/// Reaction to a failed secondary mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountDisposition {
    /// Abort the whole bring-up and roll back.
    Cancel,
    /// Skip this row and carry on.
    ForceContinue,
    /// Change mount point, device or kind and try again.
    EditAndRetry,
}

/// A row about to be mounted, as shown to and edited by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountTarget {
    /// Mount point inside the target system.
    pub mountpoint: String,
    /// Device to mount.
    pub device: String,
    /// Filesystem kind from the table.
    pub fstype: String,
}

/// An undersized `/boot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootAdvisory {
    /// The `/boot` device as written in the target's fstab.
    pub device: String,
    /// Actual size.
    pub size_kib: u64,
    /// Recommended minimum.
    pub minimum_kib: u64,
}

impl BootAdvisory {
    /// Actual size in MiB.
    #[must_use]
    pub const fn size_mib(&self) -> u64 {
        self.size_kib / 1024
    }

    /// Recommended minimum in MiB.
    #[must_use]
    pub const fn minimum_mib(&self) -> u64 {
        self.minimum_kib / 1024
    }
}

impl fmt::Display for BootAdvisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Your /boot partition ({}) is too small ({} MiB). \
             We recommend a size of no less than {} MiB. \
             The update may fail or the system may not boot.",
            self.device,
            self.size_mib(),
            self.minimum_mib()
        )
    }
}

/// Non-fatal anomalies the operator should know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyWarning {
    /// The target's fstab names hard disks by kernel ordinal.
    KernelDeviceNames {
        /// Root spec from the target's fstab.
        root_device: String,
    },
    /// Target and running architectures differ but are declared compatible.
    ArchitectureEquivalent {
        /// Candidate partition.
        device: String,
        /// Architecture of the target.
        target: String,
        /// Architecture of the running system.
        running: String,
    },
}

impl fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KernelDeviceNames { root_device } => write!(
                f,
                "The fstab of the system to update names hard disks by kernel device \
                 name (for example {root_device}). These names may change between boots. \
                 Switch to persistent names (UUID, label or by-id) after the update."
            ),
            Self::ArchitectureEquivalent {
                device,
                target,
                running,
            } => write!(
                f,
                "System on {device} is {target}, running system is {running}; \
                 treating them as compatible."
            ),
        }
    }
}

/// A partition the operator may pick for `/var`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarChoice {
    /// Device node.
    pub device: String,
    /// Filesystem, label, size and udev names.
    pub description: String,
}

/// Resolves the decision points of scanning and mounting.
pub trait Operator {
    /// A read-only filesystem check failed; `true` continues with the partition.
    fn continue_after_check_failure(&mut self, device: &str, details: &str) -> bool;

    /// A secondary mount failed.
    fn mount_failed(&mut self, target: &MountTarget, error: &str) -> MountDisposition;

    /// Edit a mount before retrying; `None` keeps it unchanged.
    fn edit_mount(&mut self, target: &MountTarget) -> Option<MountTarget>;

    /// `/boot` is below the recommended size; `true` continues anyway.
    fn confirm_small_boot(&mut self, advisory: &BootAdvisory) -> bool;

    /// Show a non-fatal warning.
    fn warn(&mut self, warning: &ConsistencyWarning);

    /// Passphrase for an encrypted volume; `None` or empty skips it.
    fn passphrase(&mut self, device: &str, mountpoint: &str) -> Option<String>;

    /// The passphrase was rejected; `true` asks again.
    fn retry_passphrase(&mut self, device: &str, error: &str) -> bool;

    /// Pick the `/var` partition; `None` cancels.
    fn choose_var_device(&mut self, choices: &[VarChoice]) -> Option<String>;

    /// Show an error that does not need an answer.
    fn report_error(&mut self, message: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_advisory_in_mib() {
        let advisory = BootAdvisory {
            device: "/dev/sda3".to_string(),
            size_kib: 50_000,
            minimum_kib: 204_800,
        };
        assert_eq!(advisory.size_mib(), 48);
        assert_eq!(advisory.minimum_mib(), 200);
        assert!(advisory.to_string().contains("no less than 200 MiB"));
    }

    #[test]
    fn warning_messages() {
        let warning = ConsistencyWarning::KernelDeviceNames {
            root_device: "/dev/sda2".to_string(),
        };
        assert!(warning.to_string().contains("/dev/sda2"));
    }
}
