//! Legacy `/etc/cryptotab` records.

use serde::{Deserialize, Serialize};

use super::{records, unescape};

/// One cryptotab row: an encrypted container attached through a loop device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptotabEntry {
    /// Loop device (`/dev/loop0`).
    #[serde(rename = "loop")]
    pub loop_device: String,
    /// Backing device or file.
    pub file: String,
    /// Mount point of the decrypted filesystem.
    pub mount: String,
    /// Filesystem kind inside the container.
    pub vfstype: String,
    /// Cipher column.
    pub opt1: String,
    /// Mount options.
    pub opt2: String,
    /// Trailing text.
    pub rest: Option<String>,
    /// Backing device before translation.
    pub file_old: Option<String>,
}

impl CryptotabEntry {
    /// Whether the volume is attached at boot.
    #[must_use]
    pub fn is_auto(&self) -> bool {
        !self.opt2.split(',').any(|o| o == "noauto")
    }
}

/// Parse cryptotab text. Rows with fewer than six columns are skipped.
#[must_use]
pub fn parse_cryptotab(text: &str) -> Vec<CryptotabEntry> {
    let mut entries = Vec::new();

    for (line_no, line) in records(text) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            tracing::warn!(line = line_no, content = line, "Skipping malformed cryptotab line");
            continue;
        }

        entries.push(CryptotabEntry {
            loop_device: fields[0].to_string(),
            file: unescape(fields[1]),
            mount: unescape(fields[2]),
            vfstype: fields[3].to_string(),
            opt1: fields[4].to_string(),
            opt2: fields[5].to_string(),
            rest: (fields.len() > 6).then(|| fields[6..].join(" ")),
            file_old: None,
        });
    }

    entries
}
