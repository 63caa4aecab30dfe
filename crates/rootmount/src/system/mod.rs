//! Host side effects.
//!
//! Everything that touches the running system (mounts, swap, device-mapper,
//! kernel modules, filesystem checks) goes through [`SystemOps`] so the
//! scanner and orchestrator can be driven against a fake in tests.

mod host;

use std::path::Path;

use rootmount_common::RootmountResult;

pub use host::HostSystem;

/// Result of a filesystem check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Whether the check passed.
    pub success: bool,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CheckReport {
    /// A passing report without output.
    #[must_use]
    pub fn passed() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// Output of the check, for showing to the operator.
    #[must_use]
    pub fn details(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", "") => String::new(),
            (out, "") => out.to_string(),
            ("", err) => err.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }
}

/// A request to attach an encrypted container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptAttach<'a> {
    /// Loop device recorded in the table.
    pub loop_device: &'a str,
    /// Backing device or file.
    pub source: &'a str,
    /// Device-mapper name to create.
    pub name: &'a str,
    /// Cipher specification.
    pub cipher: &'a str,
}

/// Device-mapper name for an encrypted container backed by `device`.
#[must_use]
pub fn crypt_name(device: &str) -> String {
    let base = device.rsplit('/').next().unwrap_or(device);
    format!("cr_{base}")
}

/// Side-effecting operations on the running system.
pub trait SystemOps {
    /// Load a kernel driver.
    fn load_driver(&self, name: &str) -> RootmountResult<()>;

    /// Read-only consistency check of `device`.
    fn check_readonly(&self, device: &str, fstype: &str) -> RootmountResult<CheckReport>;

    /// Read-write repair of an ext2 filesystem.
    fn repair(&self, device: &str) -> RootmountResult<CheckReport>;

    /// Probe the filesystem on `device`.
    fn detect_fs(&self, device: &str) -> Option<String>;

    /// Mount `device` at `target`.
    fn mount(
        &self,
        device: &str,
        target: &Path,
        fstype: Option<&str>,
        readonly: bool,
    ) -> RootmountResult<()>;

    /// Unmount `target`.
    fn unmount(&self, target: &Path) -> RootmountResult<()>;

    /// Enable swap on `device`.
    fn swap_on(&self, device: &str) -> RootmountResult<()>;

    /// Disable swap on `device`.
    fn swap_off(&self, device: &str) -> RootmountResult<()>;

    /// Attach an encrypted container, returning the decrypted device node.
    fn attach_crypt(&self, request: &CryptAttach<'_>, passphrase: &str) -> RootmountResult<String>;

    /// Remove a device-mapper mapping.
    fn detach_crypt(&self, name: &str) -> RootmountResult<()>;

    /// Architecture of an executable, `unknown` when it cannot be determined.
    fn probe_arch(&self, executable: &Path) -> String;

    /// Size of the filesystem mounted at `path` in KiB.
    fn filesystem_size_kib(&self, path: &Path) -> Option<u64>;
}
