//! Mount tables of a target system.
//!
//! Both tables are line oriented with tab/space separated columns and `#`
//! comments. A missing table reads as empty.

mod cryptotab;
mod fstab;

use std::path::Path;

use rootmount_common::RootmountResult;

pub use cryptotab::{CryptotabEntry, parse_cryptotab};
pub use fstab::{FstabEntry, find_mountpoint, parse_fstab};

/// Location of fstab relative to a root.
pub const FSTAB: &str = "etc/fstab";

/// Location of cryptotab relative to a root.
pub const CRYPTOTAB: &str = "etc/cryptotab";

/// Read `etc/fstab` below `root`.
pub fn read_fstab(root: &Path) -> RootmountResult<Vec<FstabEntry>> {
    let path = root.join(FSTAB);
    if !path.exists() {
        tracing::error!(path = %path.display(), "No fstab, not using it");
        return Ok(Vec::new());
    }
    Ok(parse_fstab(&read_table(&path)?))
}

/// Read `etc/cryptotab` below `root`.
pub fn read_cryptotab(root: &Path) -> RootmountResult<Vec<CryptotabEntry>> {
    let path = root.join(CRYPTOTAB);
    if !path.exists() {
        tracing::info!(path = %path.display(), "No cryptotab, not using it");
        return Ok(Vec::new());
    }
    Ok(parse_cryptotab(&read_table(&path)?))
}

/// Read a table, replacing bytes that are not UTF-8.
fn read_table(path: &Path) -> RootmountResult<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Split a table into non-comment lines with their line numbers.
fn records(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// Decode the octal escapes (`\040`) used for blanks inside table fields.
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut output = Vec::with_capacity(bytes.len());
    let mut pos = 0;

    while pos < bytes.len() {
        let escape = bytes
            .get(pos + 1..pos + 4)
            .filter(|_| bytes[pos] == b'\\')
            .filter(|digits| digits.iter().all(|d| (b'0'..=b'7').contains(d)));
        match escape {
            Some(digits) => {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                output.push(u8::try_from(value).unwrap_or(b'?'));
                pos += 4;
            }
            None => {
                output.push(bytes[pos]);
                pos += 1;
            }
        }
    }
    String::from_utf8_lossy(&output).into_owned()
}
