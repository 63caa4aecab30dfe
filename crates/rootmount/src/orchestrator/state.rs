//! Orchestrator states.

use serde::{Deserialize, Serialize};

/// Progress of bringing up the target system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MountState {
    /// Nothing mounted.
    #[default]
    Idle,
    /// The root partition is being mounted.
    RootMounting,
    /// Root is mounted and its tables are being read.
    RootMounted,
    /// Encrypted volumes, fstab rows and swap are being activated.
    SecondaryMounting,
    /// Everything is mounted.
    Settled,
    /// Activations are being undone.
    RollingBack,
}

impl MountState {
    /// Returns true if the transition to `next` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::RootMounting)
                | (Self::RootMounting, Self::RootMounted | Self::Idle)
                | (Self::RootMounted, Self::SecondaryMounting)
                | (Self::SecondaryMounting, Self::Settled)
                | (Self::Settled, Self::Idle)
                | (Self::RollingBack, Self::Idle)
        ) || matches!(
            (self, next),
            (Self::RootMounted | Self::SecondaryMounting | Self::Settled, Self::RollingBack)
        )
    }

    /// Returns true if something may be mounted in this state.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl std::fmt::Display for MountState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::RootMounting => write!(f, "root-mounting"),
            Self::RootMounted => write!(f, "root-mounted"),
            Self::SecondaryMounting => write!(f, "secondary-mounting"),
            Self::Settled => write!(f, "settled"),
            Self::RollingBack => write!(f, "rolling-back"),
        }
    }
}
