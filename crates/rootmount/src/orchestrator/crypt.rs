//! Unlocking cryptotab volumes.

use rootmount_common::RootmountError;

use crate::activate::MountContext;
use crate::ledger::ActivationRecord;
use crate::operator::Operator;
use crate::session::Session;
use crate::system::{CryptAttach, SystemOps, crypt_name};
use crate::tab::{CryptotabEntry, FstabEntry};

/// One passphrase attempt.
#[derive(Debug)]
pub enum UnlockStep {
    /// The volume is attached at this device.
    Attached(String),
    /// The passphrase was rejected.
    Rejected(RootmountError),
    /// The operator gave up.
    Cancelled,
}

/// Final result of unlocking a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unlock {
    /// The volume is attached at this device.
    Attached(String),
    /// Nothing was attached.
    Cancelled,
}

/// Bounded passphrase loop; every step needs an answer from the operator.
pub struct UnlockAttempts<'a, 'o> {
    system: &'a dyn SystemOps,
    operator: &'a mut (dyn Operator + 'o),
    request: &'a CryptAttach<'a>,
    mountpoint: &'a str,
    remaining: u32,
    finished: bool,
}

impl<'a, 'o> UnlockAttempts<'a, 'o> {
    /// Allow up to `attempts` passphrases for `request`.
    pub fn new(
        system: &'a dyn SystemOps,
        operator: &'a mut (dyn Operator + 'o),
        request: &'a CryptAttach<'a>,
        mountpoint: &'a str,
        attempts: u32,
    ) -> Self {
        Self {
            system,
            operator,
            request,
            mountpoint,
            remaining: attempts,
            finished: false,
        }
    }

    /// Drive the loop to its end.
    pub fn outcome(mut self) -> Unlock {
        let source = self.request.source;
        self.by_ref()
            .find_map(|step| match step {
                UnlockStep::Attached(device) => Some(Unlock::Attached(device)),
                UnlockStep::Cancelled => Some(Unlock::Cancelled),
                UnlockStep::Rejected(e) => {
                    tracing::warn!(device = source, error = %e, "Passphrase rejected");
                    None
                }
            })
            .unwrap_or(Unlock::Cancelled)
    }
}

impl Iterator for UnlockAttempts<'_, '_> {
    type Item = UnlockStep;

    fn next(&mut self) -> Option<UnlockStep> {
        if self.finished || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let passphrase = self
            .operator
            .passphrase(self.request.source, self.mountpoint)
            .filter(|p| !p.is_empty());
        let Some(passphrase) = passphrase else {
            self.finished = true;
            return Some(UnlockStep::Cancelled);
        };

        match self.system.attach_crypt(self.request, &passphrase) {
            Ok(device) => {
                self.finished = true;
                Some(UnlockStep::Attached(device))
            }
            Err(e) => {
                if self.remaining == 0
                    || !self.operator.retry_passphrase(self.request.source, &e.to_string())
                {
                    self.finished = true;
                }
                Some(UnlockStep::Rejected(e))
            }
        }
    }
}

/// Attach every automatic cryptotab volume and prepend an fstab row for it.
pub(crate) fn unlock_cryptotab(
    ctx: &MountContext<'_>,
    session: &mut Session,
    operator: &mut dyn Operator,
    cryptotab: &[CryptotabEntry],
    fstab: &mut Vec<FstabEntry>,
) {
    for entry in cryptotab {
        if !entry.is_auto() {
            tracing::debug!(file = %entry.file, "Skipping noauto cryptotab entry");
            continue;
        }

        let name = crypt_name(&entry.file);
        let request = CryptAttach {
            loop_device: &entry.loop_device,
            source: &entry.file,
            name: &name,
            cipher: &session.config.crypt_cipher,
        };
        let attempts = UnlockAttempts::new(
            ctx.system,
            &mut *operator,
            &request,
            &entry.mount,
            session.config.passphrase_attempts,
        );

        match attempts.outcome() {
            Unlock::Attached(device) => {
                tracing::info!(file = %entry.file, device = %device, "Attached encrypted volume");
                let mut row = FstabEntry::new(device, &entry.mount, &entry.vfstype, &entry.opt2);
                row.freq = Some(0);
                row.passno = Some(0);
                fstab.insert(0, row);
                session.ledger.push(ActivationRecord::crypt(&entry.file));
            }
            Unlock::Cancelled => {
                tracing::info!(file = %entry.file, "Encrypted volume not attached");
            }
        }
    }
}
