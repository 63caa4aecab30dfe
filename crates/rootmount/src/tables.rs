//! Loading and translating the mount tables of a mounted root.

use rootmount_common::RootmountResult;
use rootmount_common::paths::under_root;

use crate::activate::MountContext;
use crate::operator::Operator;
use crate::session::Session;
use crate::tab::{CryptotabEntry, FstabEntry, read_cryptotab, read_fstab};
use crate::translate::{Translator, log_hardware_database};
use crate::var::{mount_var, plan_var};

/// Translated tables of a target system.
#[derive(Debug, Clone, Default)]
pub(crate) struct TargetTables {
    pub fstab: Vec<FstabEntry>,
    pub cryptotab: Vec<CryptotabEntry>,
}

/// Read fstab and cryptotab below `ctx.root` and translate their device names.
///
/// A separate `/var` is mounted for the duration of the translation, since
/// the naming database lives there, and released again afterwards.
pub(crate) fn load_tables(
    ctx: &MountContext<'_>,
    session: &mut Session,
    operator: &mut dyn Operator,
    root_device: &str,
) -> RootmountResult<TargetTables> {
    session.backward.clear();

    let fstab = read_fstab(ctx.root)?;
    let cryptotab = read_cryptotab(ctx.root)?;

    let plan = plan_var(&fstab, root_device, ctx.inventory);
    let var_mounted = match mount_var(ctx, session, operator, &plan, false) {
        Ok(mounted) => mounted,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot mount /var before translating device names");
            false
        }
    };

    log_hardware_database(ctx.root);
    let translator = Translator::new(ctx.resolver);
    let fstab = translator.translate(fstab, &mut session.backward);
    let cryptotab = translator.translate(cryptotab, &mut session.backward);

    if var_mounted {
        if let Err(e) = ctx.system.unmount(&under_root(ctx.root, "/var")) {
            tracing::warn!(error = %e, "Cannot unmount /var after translation");
        }
        session.ledger.remove_last_mount("/var");
    }

    tracing::info!(
        fstab = fstab.len(),
        cryptotab = cryptotab.len(),
        root = %ctx.root.display(),
        "Loaded mount tables"
    );
    Ok(TargetTables { fstab, cryptotab })
}
