//! Runtime configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rootmount_common::{RootmountPaths, RootmountResult};
use serde::{Deserialize, Serialize};

/// System-wide configuration file, read when no explicit file is given.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/rootmount.toml";

/// Runtime configuration options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Paths for runtime data.
    pub paths: RootmountPaths,
    /// Filesystem kinds mounted from the target's fstab.
    pub allowed_fs: Vec<String>,
    /// Kinds that are built into the kernel; no driver is loaded for them.
    pub non_modular_fs: Vec<String>,
    /// Drivers loaded before probing partitions.
    pub preload_drivers: Vec<String>,
    /// Groups of architectures that can upgrade each other.
    pub arch_equivalence: Vec<Vec<String>>,
    /// Executable whose architecture identifies a system.
    pub reference_executable: PathBuf,
    /// File, relative to a root, whose presence marks an unfinished installation.
    pub incomplete_marker: PathBuf,
    /// Minimum recommended `/boot` size in KiB.
    pub boot_min_kib: u64,
    /// Per-architecture overrides for [`Config::boot_min_kib`].
    pub boot_min_kib_by_arch: BTreeMap<String, u64>,
    /// CPU architecture family of the running system.
    pub arch: String,
    /// Passphrase attempts per encrypted volume.
    pub passphrase_attempts: u32,
    /// Command printing the architecture of an executable.
    pub arch_probe: String,
    /// Cipher for legacy cryptotab volumes.
    pub crypt_cipher: String,
    /// Disk renames applied when translating device names (`/dev/hda` -> `/dev/sda`).
    pub device_renames: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: RootmountPaths::new(),
            allowed_fs: strings(&[
                "ext", "ext2", "ext3", "ext4", "btrfs", "minix", "reiserfs", "jfs", "xfs",
                "xiafs", "hpfs", "vfat", "auto", "proc",
            ]),
            non_modular_fs: strings(&["proc", "sysfs"]),
            preload_drivers: strings(&[
                "reiserfs",
                "jfs",
                "xfs",
                "ext3",
                "ext4",
                "btrfs",
                "raid0",
                "raid1",
                "raid5",
                "raid6",
                "raid10",
                "multipath",
                "dm-mod",
                "dm-snapshot",
            ]),
            arch_equivalence: vec![strings(&["ppc", "ppc64"])],
            reference_executable: PathBuf::from("/bin/bash"),
            incomplete_marker: PathBuf::from("var/lib/installer/runme_at_boot"),
            boot_min_kib: 65_536,
            boot_min_kib_by_arch: BTreeMap::from([("ia64".to_string(), 204_800)]),
            arch: std::env::consts::ARCH.to_string(),
            passphrase_attempts: 3,
            arch_probe: "elf-arch".to_string(),
            crypt_cipher: "twofish-cbc-plain".to_string(),
            device_renames: BTreeMap::new(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

impl Config {
    /// Load configuration from `path`, or from [`DEFAULT_CONFIG_FILE`] when it
    /// exists, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> RootmountResult<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let system = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !system.exists() {
                    tracing::debug!("No configuration file, using defaults");
                    return Ok(Self::default());
                }
                system
            }
        };

        let text = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&text)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Set the destination directory.
    #[must_use]
    pub fn with_destdir(mut self, destdir: impl Into<PathBuf>) -> Self {
        self.paths.destdir = destdir.into();
        self
    }

    /// Set the state directory.
    #[must_use]
    pub fn with_state_dir(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.paths.state_dir = state_dir.into();
        self
    }

    /// Set the CPU architecture family.
    #[must_use]
    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    /// Add a disk rename.
    #[must_use]
    pub fn with_device_rename(mut self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.device_renames.insert(old.into(), new.into());
        self
    }

    /// Minimum recommended `/boot` size for the configured architecture.
    #[must_use]
    pub fn boot_min_kib(&self) -> u64 {
        self.boot_min_kib_by_arch
            .get(&self.arch)
            .copied()
            .unwrap_or(self.boot_min_kib)
    }

    /// Whether two different architectures are declared compatible.
    #[must_use]
    pub fn archs_equivalent(&self, left: &str, right: &str) -> bool {
        self.arch_equivalence.iter().any(|group| {
            group.iter().any(|a| a == left) && group.iter().any(|a| a == right)
        })
    }

    /// Whether an fstab kind is mounted from the target's fstab.
    #[must_use]
    pub fn is_allowed_fs(&self, vfstype: &str) -> bool {
        self.allowed_fs.iter().any(|fs| fs == vfstype)
    }

    /// Whether a filesystem kind is built into the kernel.
    #[must_use]
    pub fn is_non_modular(&self, fstype: &str) -> bool {
        self.non_modular_fs.iter().any(|fs| fs == fstype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.is_allowed_fs("ext4"));
        assert!(!config.is_allowed_fs("nfs"));
        assert!(config.is_non_modular("sysfs"));
        assert_eq!(config.passphrase_attempts, 3);
    }

    #[test]
    fn boot_size_by_arch() {
        let config = Config::default().with_arch("x86_64");
        assert_eq!(config.boot_min_kib(), 65_536);
        let config = config.with_arch("ia64");
        assert_eq!(config.boot_min_kib(), 204_800);
    }

    #[test]
    fn arch_equivalence() {
        let config = Config::default();
        assert!(config.archs_equivalent("ppc", "ppc64"));
        assert!(config.archs_equivalent("ppc64", "ppc"));
        assert!(!config.archs_equivalent("ppc", "x86_64"));
    }

    #[test]
    fn parse_toml() {
        let config: Config = toml::from_str(
            r#"
            arch = "ia64"
            passphrase_attempts = 5

            [paths]
            destdir = "/target"

            [device_renames]
            "/dev/hda" = "/dev/sda"
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.destdir, PathBuf::from("/target"));
        assert_eq!(config.passphrase_attempts, 5);
        assert_eq!(config.device_renames["/dev/hda"], "/dev/sda");
        // Untouched keys keep their defaults.
        assert!(config.is_allowed_fs("xfs"));
    }

    #[test]
    fn builder_pattern() {
        let config = Config::default()
            .with_destdir("/custom/target")
            .with_state_dir("/custom/state")
            .with_device_rename("/dev/hda", "/dev/sda");

        assert_eq!(config.paths.destdir, PathBuf::from("/custom/target"));
        assert_eq!(config.paths.staging(), PathBuf::from("/custom/state/staging"));
        assert_eq!(config.device_renames.len(), 1);
    }
}
