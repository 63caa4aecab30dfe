//! Non-interactive decisions.

use super::{BootAdvisory, ConsistencyWarning, MountDisposition, MountTarget, Operator, VarChoice};

/// Operator for unattended runs.
///
/// Every question gets the conservative answer: failed mounts cancel, failed
/// checks skip the partition, an undersized `/boot` is refused and nothing that
/// needs a human (passphrases, `/var` selection) is supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOperator;

impl Operator for BatchOperator {
    fn continue_after_check_failure(&mut self, device: &str, details: &str) -> bool {
        tracing::warn!(device, details, "Filesystem check failed, skipping partition");
        false
    }

    fn mount_failed(&mut self, target: &MountTarget, error: &str) -> MountDisposition {
        tracing::error!(
            device = %target.device,
            mountpoint = %target.mountpoint,
            error,
            "Mount failed"
        );
        MountDisposition::Cancel
    }

    fn edit_mount(&mut self, _target: &MountTarget) -> Option<MountTarget> {
        None
    }

    fn confirm_small_boot(&mut self, advisory: &BootAdvisory) -> bool {
        tracing::warn!(
            device = %advisory.device,
            size_kib = advisory.size_kib,
            minimum_kib = advisory.minimum_kib,
            "/boot is undersized"
        );
        false
    }

    fn warn(&mut self, warning: &ConsistencyWarning) {
        tracing::warn!("{warning}");
    }

    fn passphrase(&mut self, device: &str, _mountpoint: &str) -> Option<String> {
        tracing::warn!(device, "No passphrase in batch mode, skipping encrypted volume");
        None
    }

    fn retry_passphrase(&mut self, _device: &str, _error: &str) -> bool {
        false
    }

    fn choose_var_device(&mut self, choices: &[VarChoice]) -> Option<String> {
        tracing::warn!(candidates = choices.len(), "Cannot choose /var partition in batch mode");
        None
    }

    fn report_error(&mut self, message: &str) {
        tracing::error!("{message}");
    }
}
