//! `/boot` size advisory.

use rootmount_common::paths::under_root;
use rootmount_common::{RootmountError, RootmountResult};

use crate::activate::MountContext;
use crate::operator::{BootAdvisory, Operator};
use crate::session::Session;

/// Check the freshly mounted `/boot` against the recommended minimum.
///
/// An unknown size passes. An undersized `/boot` needs the operator's consent.
pub(crate) fn check_boot_size(
    ctx: &MountContext<'_>,
    session: &Session,
    operator: &mut dyn Operator,
    device: &str,
) -> RootmountResult<()> {
    let minimum_kib = session.config.boot_min_kib();
    let size_kib = match ctx.system.filesystem_size_kib(&under_root(ctx.root, "/boot")) {
        Some(size) if size > 0 => size,
        _ => {
            tracing::warn!(device, "Unknown /boot size, not checking it");
            return Ok(());
        }
    };

    tracing::info!(device, size_kib, minimum_kib, "Checking /boot size");
    if size_kib >= minimum_kib {
        return Ok(());
    }

    let advisory = BootAdvisory {
        device: session.backward.original(device).unwrap_or(device).to_string(),
        size_kib,
        minimum_kib,
    };
    if operator.confirm_small_boot(&advisory) {
        tracing::warn!(device, "Continuing with undersized /boot");
        Ok(())
    } else {
        Err(RootmountError::Cancelled {
            operation: format!("/boot on {device} is smaller than {} MiB", advisory.minimum_mib()),
        })
    }
}
