//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use rootmount::config::Config;
use rootmount::operator::{
    BootAdvisory, ConsistencyWarning, MountDisposition, MountTarget, Operator, VarChoice,
};
use rootmount::system::{CheckReport, CryptAttach, SystemOps};
use rootmount_common::{RootmountError, RootmountResult};
use tempfile::TempDir;

/// Architecture reported for the running system.
pub const RUNNING_ARCH: &str = "x86_64";

/// A temporary destination and state directory.
pub struct Fixture {
    pub dir: TempDir,
    pub config: Config,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = Config::default()
            .with_destdir(dir.path().join("target"))
            .with_state_dir(dir.path().join("state"))
            .with_arch(RUNNING_ARCH);
        Self { dir, config }
    }

    pub fn destdir(&self) -> PathBuf {
        self.config.paths.destdir.clone()
    }

    /// Write a partition image: a directory tree copied into every mount of it.
    pub fn image(&self, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let root = self.dir.path().join("images").join(name);
        std::fs::create_dir_all(&root).unwrap();
        for (path, content) in files {
            let file = root.join(path);
            std::fs::create_dir_all(file.parent().unwrap()).unwrap();
            std::fs::write(file, content).unwrap();
        }
        root
    }

    /// Image of an installed system with the given fstab.
    pub fn root_image(&self, name: &str, arch: &str, fstab: &str) -> PathBuf {
        self.image(
            name,
            &[
                ("etc/fstab", fstab),
                ("etc/os-release", "PRETTY_NAME=\"Test Linux 1.0\"\n"),
                ("bin/bash", arch),
            ],
        )
    }
}

fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &dest)?;
        } else {
            std::fs::copy(entry.path(), dest)?;
        }
    }
    Ok(())
}

/// In-memory system: mounts copy image directories into place.
#[derive(Default)]
pub struct FakeSystem {
    images: BTreeMap<String, PathBuf>,
    failing: BTreeSet<String>,
    check_failures: BTreeSet<String>,
    sizes: BTreeMap<String, u64>,
    passphrase: Option<String>,
    mounted: RefCell<BTreeMap<PathBuf, String>>,
    calls: RefCell<Vec<String>>,
}

impl FakeSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, device: &str, image: PathBuf) -> Self {
        self.images.insert(device.to_string(), image);
        self
    }

    pub fn failing(mut self, device: &str) -> Self {
        self.failing.insert(device.to_string());
        self
    }

    pub fn check_fails(mut self, device: &str) -> Self {
        self.check_failures.insert(device.to_string());
        self
    }

    pub fn with_size(mut self, device: &str, size_kib: u64) -> Self {
        self.sizes.insert(device.to_string(), size_kib);
        self
    }

    pub fn with_passphrase(mut self, passphrase: &str) -> Self {
        self.passphrase = Some(passphrase.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn mounted(&self) -> BTreeMap<PathBuf, String> {
        self.mounted.borrow().clone()
    }

    fn log(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl SystemOps for FakeSystem {
    fn load_driver(&self, name: &str) -> RootmountResult<()> {
        self.log(format!("modprobe {name}"));
        Ok(())
    }

    fn check_readonly(&self, device: &str, fstype: &str) -> RootmountResult<CheckReport> {
        self.log(format!("fsck {device} {fstype}"));
        if self.check_failures.contains(device) {
            return Ok(CheckReport {
                success: false,
                stdout: String::new(),
                stderr: "superblock is corrupt".to_string(),
            });
        }
        Ok(CheckReport::passed())
    }

    fn repair(&self, device: &str) -> RootmountResult<CheckReport> {
        self.log(format!("e2fsck {device}"));
        Ok(CheckReport::passed())
    }

    fn detect_fs(&self, _device: &str) -> Option<String> {
        None
    }

    fn mount(
        &self,
        device: &str,
        target: &Path,
        _fstype: Option<&str>,
        readonly: bool,
    ) -> RootmountResult<()> {
        let mode = if readonly { "ro" } else { "rw" };
        self.log(format!("mount {device} {} {mode}", target.display()));
        if self.failing.contains(device) {
            return Err(RootmountError::Command {
                command: "mount".to_string(),
                message: format!("{device}: wrong fs type, bad option, bad superblock"),
            });
        }
        // mount(2) takes device nodes, never UUID= or LABEL= tags
        if device.contains('=') {
            return Err(RootmountError::activation(device, "No such file or directory"));
        }

        std::fs::create_dir_all(target)?;
        if let Some(image) = self.images.get(device) {
            copy_tree(image, target)?;
        }
        self.mounted
            .borrow_mut()
            .insert(target.to_path_buf(), device.to_string());
        Ok(())
    }

    fn unmount(&self, target: &Path) -> RootmountResult<()> {
        self.log(format!("umount {}", target.display()));
        if self.mounted.borrow_mut().remove(target).is_none() {
            return Err(RootmountError::Command {
                command: "umount".to_string(),
                message: format!("{}: not mounted", target.display()),
            });
        }
        std::fs::remove_dir_all(target)?;
        std::fs::create_dir_all(target)?;
        Ok(())
    }

    fn swap_on(&self, device: &str) -> RootmountResult<()> {
        self.log(format!("swapon {device}"));
        Ok(())
    }

    fn swap_off(&self, device: &str) -> RootmountResult<()> {
        self.log(format!("swapoff {device}"));
        Ok(())
    }

    fn attach_crypt(&self, request: &CryptAttach<'_>, passphrase: &str) -> RootmountResult<String> {
        self.log(format!("attach {} {}", request.source, request.name));
        if self.passphrase.as_deref() == Some(passphrase) {
            Ok(format!("/dev/mapper/{}", request.name))
        } else {
            Err(RootmountError::Command {
                command: "cryptsetup".to_string(),
                message: "No key available with this passphrase.".to_string(),
            })
        }
    }

    fn detach_crypt(&self, name: &str) -> RootmountResult<()> {
        self.log(format!("detach {name}"));
        Ok(())
    }

    fn probe_arch(&self, executable: &Path) -> String {
        if executable == Path::new("/bin/bash") {
            return RUNNING_ARCH.to_string();
        }
        std::fs::read_to_string(executable)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }

    fn filesystem_size_kib(&self, path: &Path) -> Option<u64> {
        let mounted = self.mounted.borrow();
        let device = mounted.get(path)?;
        self.sizes.get(device).copied()
    }
}

/// Operator answering from queues and recording everything it is shown.
#[derive(Default)]
pub struct ScriptedOperator {
    pub continue_after_check: bool,
    pub dispositions: VecDeque<MountDisposition>,
    pub edits: VecDeque<MountTarget>,
    pub accept_small_boot: bool,
    pub passphrases: VecDeque<String>,
    pub retry_passphrase: bool,
    pub var_devices: VecDeque<String>,

    pub check_failures: Vec<String>,
    pub mount_failures: Vec<MountTarget>,
    pub advisories: Vec<BootAdvisory>,
    pub warnings: Vec<ConsistencyWarning>,
    pub var_offers: Vec<Vec<VarChoice>>,
    pub errors: Vec<String>,
}

impl Operator for ScriptedOperator {
    fn continue_after_check_failure(&mut self, device: &str, _details: &str) -> bool {
        self.check_failures.push(device.to_string());
        self.continue_after_check
    }

    fn mount_failed(&mut self, target: &MountTarget, _error: &str) -> MountDisposition {
        self.mount_failures.push(target.clone());
        self.dispositions
            .pop_front()
            .unwrap_or(MountDisposition::Cancel)
    }

    fn edit_mount(&mut self, _target: &MountTarget) -> Option<MountTarget> {
        self.edits.pop_front()
    }

    fn confirm_small_boot(&mut self, advisory: &BootAdvisory) -> bool {
        self.advisories.push(advisory.clone());
        self.accept_small_boot
    }

    fn warn(&mut self, warning: &ConsistencyWarning) {
        self.warnings.push(warning.clone());
    }

    fn passphrase(&mut self, _device: &str, _mountpoint: &str) -> Option<String> {
        self.passphrases.pop_front()
    }

    fn retry_passphrase(&mut self, _device: &str, _error: &str) -> bool {
        self.retry_passphrase
    }

    fn choose_var_device(&mut self, choices: &[VarChoice]) -> Option<String> {
        self.var_offers.push(choices.to_vec());
        self.var_devices.pop_front()
    }

    fn report_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
}
