//! [`SystemOps`] for the real host.

use std::ffi::CString;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use rootmount_common::{RootmountError, RootmountResult};

use super::{CheckReport, CryptAttach, SystemOps};

/// Captured output of an external command.
#[derive(Debug)]
struct Output {
    stdout: String,
    stderr: String,
    status: i32,
}

impl Output {
    const fn success(&self) -> bool {
        self.status == 0
    }

    fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exit code {}", self.status)
        } else {
            format!("{stderr} (exit code {})", self.status)
        }
    }

    fn into_report(self) -> CheckReport {
        CheckReport {
            success: self.success(),
            stdout: self.stdout,
            stderr: self.stderr,
        }
    }
}

/// The running Linux system.
#[derive(Debug, Clone)]
pub struct HostSystem {
    arch_probe: String,
}

impl HostSystem {
    /// Create a host system using `arch_probe` to identify executables.
    pub fn new(arch_probe: impl Into<String>) -> Self {
        Self {
            arch_probe: arch_probe.into(),
        }
    }

    fn run(program: &str, args: &[&str], input: Option<&[u8]>) -> RootmountResult<Output> {
        tracing::debug!(program, ?args, "Running command");

        let mut command = Command::new(program);
        command.args(args);
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        if input.is_some() {
            command.stdin(Stdio::piped());
        }

        let mut child = command.spawn().map_err(|e| RootmountError::Command {
            command: program.to_string(),
            message: e.to_string(),
        })?;

        let written = match (input, child.stdin.take()) {
            (Some(payload), Some(mut stdin)) => {
                stdin.write_all(payload).and_then(|()| stdin.flush())
            }
            _ => Ok(()),
        };
        // stdin is closed here, so the child sees EOF before we wait on it
        let output = child.wait_with_output()?;
        if let Err(e) = written {
            tracing::debug!(program, error = %e, "Cannot write command input");
            return Err(RootmountError::Command {
                command: program.to_string(),
                message: format!("cannot write input: {e}"),
            });
        }
        let status = output.status.code().unwrap_or(-1);
        tracing::debug!(program, status, "Command finished");

        Ok(Output {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status,
        })
    }

    fn run_checked(program: &str, args: &[&str], device: &str) -> RootmountResult<()> {
        let output = Self::run(program, args, None)?;
        if output.success() {
            Ok(())
        } else {
            Err(RootmountError::activation(device, output.diagnostic()))
        }
    }
}

impl SystemOps for HostSystem {
    fn load_driver(&self, name: &str) -> RootmountResult<()> {
        let output = Self::run("modprobe", &[name], None)?;
        if output.success() {
            Ok(())
        } else {
            Err(RootmountError::Command {
                command: format!("modprobe {name}"),
                message: output.diagnostic(),
            })
        }
    }

    fn check_readonly(&self, device: &str, fstype: &str) -> RootmountResult<CheckReport> {
        let program = format!("fsck.{fstype}");
        Ok(Self::run(&program, &["-n", device], None)?.into_report())
    }

    fn repair(&self, device: &str) -> RootmountResult<CheckReport> {
        Ok(Self::run("e2fsck", &["-y", device], None)?.into_report())
    }

    fn detect_fs(&self, device: &str) -> Option<String> {
        let output = Self::run("blkid", &["-o", "value", "-s", "TYPE", device], None).ok()?;
        let fstype = output.stdout.trim();
        (output.success() && !fstype.is_empty()).then(|| fstype.to_string())
    }

    fn mount(
        &self,
        device: &str,
        target: &Path,
        fstype: Option<&str>,
        readonly: bool,
    ) -> RootmountResult<()> {
        use rustix::mount::{MountFlags, mount};

        let fstype = match fstype {
            Some(fstype) => fstype.to_string(),
            None => self.detect_fs(device).ok_or_else(|| {
                RootmountError::activation(device, "unable to determine filesystem type")
            })?,
        };

        tracing::debug!(
            device,
            target = %target.display(),
            fstype = %fstype,
            readonly,
            "Mounting filesystem"
        );

        let mut flags = MountFlags::empty();
        if readonly {
            flags |= MountFlags::RDONLY;
        }

        let fstype_c = CString::new(fstype)
            .map_err(|e| RootmountError::activation(device, e.to_string()))?;

        std::fs::create_dir_all(target)?;
        mount(device, target, fstype_c.as_c_str(), flags, None)
            .map_err(|e| RootmountError::activation(device, e.to_string()))?;

        Ok(())
    }

    fn unmount(&self, target: &Path) -> RootmountResult<()> {
        use rustix::mount::{UnmountFlags, unmount};

        tracing::debug!(target = %target.display(), "Unmounting filesystem");
        unmount(target, UnmountFlags::empty()).map_err(|e| RootmountError::Io(e.into()))?;
        Ok(())
    }

    fn swap_on(&self, device: &str) -> RootmountResult<()> {
        Self::run_checked("swapon", &[device], device)
    }

    fn swap_off(&self, device: &str) -> RootmountResult<()> {
        Self::run_checked("swapoff", &[device], device)
    }

    fn attach_crypt(&self, request: &CryptAttach<'_>, passphrase: &str) -> RootmountResult<String> {
        tracing::debug!(
            loop_device = request.loop_device,
            source = request.source,
            name = request.name,
            "Attaching encrypted volume"
        );

        let args = [
            "open",
            "--type",
            "plain",
            "--cipher",
            request.cipher,
            "--key-file",
            "-",
            request.source,
            request.name,
        ];
        let output = Self::run("cryptsetup", &args, Some(passphrase.as_bytes()))?;
        if !output.success() {
            return Err(RootmountError::activation(request.source, output.diagnostic()));
        }

        Ok(format!("/dev/mapper/{}", request.name))
    }

    fn detach_crypt(&self, name: &str) -> RootmountResult<()> {
        let output = Self::run("cryptsetup", &["remove", name], None)?;
        if output.success() {
            return Ok(());
        }
        let diagnostic = output.diagnostic();
        if diagnostic.to_ascii_lowercase().contains("not active") {
            return Ok(());
        }
        Err(RootmountError::Command {
            command: format!("cryptsetup remove {name}"),
            message: diagnostic,
        })
    }

    fn probe_arch(&self, executable: &Path) -> String {
        let path = executable.to_string_lossy();
        match Self::run(&self.arch_probe, &[path.as_ref()], None) {
            Ok(output) if output.success() && !output.stdout.trim().is_empty() => {
                output.stdout.trim().to_string()
            }
            Ok(output) => {
                tracing::warn!(executable = %path, error = %output.diagnostic(), "Architecture probe failed");
                "unknown".to_string()
            }
            Err(e) => {
                tracing::warn!(executable = %path, error = %e, "Architecture probe failed");
                "unknown".to_string()
            }
        }
    }

    fn filesystem_size_kib(&self, path: &Path) -> Option<u64> {
        match rustix::fs::statvfs(path) {
            Ok(stat) => Some(stat.f_blocks.saturating_mul(stat.f_frsize) / 1024),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot read filesystem size");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_captures_output() {
        let output = HostSystem::run("sh", &["-c", "echo out; echo err >&2; exit 3"], None).unwrap();
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.status, 3);
        assert_eq!(output.diagnostic(), "err (exit code 3)");
    }

    #[test]
    fn run_feeds_stdin() {
        let output = HostSystem::run("cat", &[], Some(b"secret")).unwrap();
        assert_eq!(output.stdout, "secret");
        assert!(output.success());
    }

    #[test]
    fn closed_stdin_is_reported_after_exit() {
        let payload = vec![b'x'; 1 << 20];
        let err = HostSystem::run("true", &[], Some(&payload)).unwrap_err();
        assert!(matches!(err, RootmountError::Command { ref message, .. } if message.contains("cannot write input")));
    }

    #[test]
    fn missing_program_is_command_error() {
        let err = HostSystem::run("definitely-not-a-rootmount-tool", &[], None).unwrap_err();
        assert!(matches!(err, RootmountError::Command { .. }));
    }

    #[test]
    fn unknown_arch_on_probe_failure() {
        let host = HostSystem::new("false");
        assert_eq!(host.probe_arch(Path::new("/bin/sh")), "unknown");
    }

    #[test]
    fn statvfs_size() {
        let dir = tempfile::tempdir().unwrap();
        let host = HostSystem::new("elf-arch");
        assert!(host.filesystem_size_kib(dir.path()).unwrap() > 0);
    }
}
