//! `/etc/fstab` records.

use serde::{Deserialize, Serialize};

use super::{records, unescape};

/// One fstab row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FstabEntry {
    /// Device spec (`/dev/sda2`, `UUID=...`).
    pub spec: String,
    /// Mount point, or `swap`.
    pub file: String,
    /// Filesystem kind.
    pub vfstype: String,
    /// Comma separated mount options.
    pub mntops: String,
    /// Dump frequency.
    pub freq: Option<u32>,
    /// fsck pass number.
    pub passno: Option<u32>,
    /// Anything after the numeric columns.
    pub rest: Option<String>,
    /// Device spec before translation.
    pub spec_old: Option<String>,
}

impl FstabEntry {
    /// Create an entry from its four mandatory columns.
    pub fn new(
        spec: impl Into<String>,
        file: impl Into<String>,
        vfstype: impl Into<String>,
        mntops: impl Into<String>,
    ) -> Self {
        Self {
            spec: spec.into(),
            file: file.into(),
            vfstype: vfstype.into(),
            mntops: mntops.into(),
            freq: None,
            passno: None,
            rest: None,
            spec_old: None,
        }
    }

    /// Whether this row mounts the root filesystem.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.file == "/"
    }

    /// Whether this row activates swap space.
    #[must_use]
    pub fn is_swap(&self) -> bool {
        self.vfstype == "swap" && self.file == "swap"
    }

    /// Whether the option list contains `option`.
    #[must_use]
    pub fn has_option(&self, option: &str) -> bool {
        self.mntops.split(',').any(|o| o == option)
    }

    /// Whether this row is mounted at `mountpoint`, ignoring a trailing slash.
    #[must_use]
    pub fn is_mounted_at(&self, mountpoint: &str) -> bool {
        let wanted = mountpoint.trim_end_matches('/');
        self.file == wanted || self.file.trim_end_matches('/') == wanted
    }

    /// Spec as it was written in the table.
    #[must_use]
    pub fn original_spec(&self) -> &str {
        self.spec_old.as_deref().unwrap_or(&self.spec)
    }
}

/// Find the device mounted at `mountpoint`.
#[must_use]
pub fn find_mountpoint<'a>(entries: &'a [FstabEntry], mountpoint: &str) -> Option<&'a FstabEntry> {
    entries.iter().find(|entry| entry.is_mounted_at(mountpoint))
}

/// Parse fstab text. Rows with fewer than four columns are skipped.
#[must_use]
pub fn parse_fstab(text: &str) -> Vec<FstabEntry> {
    let mut entries = Vec::new();

    for (line_no, line) in records(text) {
        let mut fields = line.split_whitespace();
        let (Some(spec), Some(file), Some(vfstype), Some(mntops)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            tracing::warn!(line = line_no, content = line, "Skipping malformed fstab line");
            continue;
        };

        let mut entry = FstabEntry::new(unescape(spec), unescape(file), vfstype, mntops);
        let mut rest: Vec<&str> = fields.collect();

        if let Some(freq) = rest.first().and_then(|f| f.parse().ok()) {
            entry.freq = Some(freq);
            rest.remove(0);
            if let Some(passno) = rest.first().and_then(|p| p.parse().ok()) {
                entry.passno = Some(passno);
                rest.remove(0);
            }
        }
        if !rest.is_empty() {
            entry.rest = Some(rest.join(" "));
        }

        entries.push(entry);
    }

    entries
}
