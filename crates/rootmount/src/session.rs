//! Per-process state shared by the scanner and the orchestrator.

use std::collections::BTreeSet;

use crate::config::Config;
use crate::ledger::Ledger;
use crate::orchestrator::MountState;
use crate::scanner::CandidateSet;
use crate::target::{MountOutcome, TargetMap};
use crate::translate::BackwardMap;

/// State of one rootmount run.
///
/// Passed by reference through scanning and mounting; nothing lives in
/// globals.
#[derive(Debug, Default)]
pub struct Session {
    pub(crate) config: Config,
    pub(crate) ledger: Ledger,
    pub(crate) backward: BackwardMap,
    pub(crate) checked: BTreeSet<String>,
    pub(crate) target_map: TargetMap,
    pub(crate) candidates: Option<CandidateSet>,
    pub(crate) selected: Option<String>,
    pub(crate) state: MountState,
    pub(crate) attempted: bool,
    pub(crate) outcome: Option<MountOutcome>,
}

impl Session {
    /// Create a session.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Resume with activations recorded by an earlier process.
    #[must_use]
    pub fn with_ledger(mut self, ledger: Ledger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Activations so far.
    #[must_use]
    pub const fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Translations of the last table load.
    #[must_use]
    pub const fn backward(&self) -> &BackwardMap {
        &self.backward
    }

    /// Target map of the last successful bring-up.
    #[must_use]
    pub const fn target_map(&self) -> &TargetMap {
        &self.target_map
    }

    /// Scan results, once scanned.
    #[must_use]
    pub const fn candidates(&self) -> Option<&CandidateSet> {
        self.candidates.as_ref()
    }

    /// Selected root partition.
    #[must_use]
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Select the root partition to mount.
    pub fn select(&mut self, device: impl Into<String>) {
        let device = device.into();
        tracing::info!(device = %device, "Selected root partition");
        self.selected = Some(device);
    }

    /// Select the first valid candidate. Returns whether one was found.
    pub fn select_first_valid(&mut self) -> bool {
        let first = self
            .candidates
            .as_ref()
            .and_then(|c| c.first_valid().map(ToString::to_string));
        match first {
            Some(device) => {
                self.select(device);
                true
            }
            None => false,
        }
    }

    /// Current orchestrator state.
    #[must_use]
    pub const fn state(&self) -> MountState {
        self.state
    }

    /// Whether a bring-up was already attempted in this session.
    #[must_use]
    pub const fn attempted(&self) -> bool {
        self.attempted
    }

    /// Result of the last successful bring-up.
    #[must_use]
    pub const fn outcome(&self) -> Option<&MountOutcome> {
        self.outcome.as_ref()
    }
}
