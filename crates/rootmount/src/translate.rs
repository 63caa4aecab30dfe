//! Device-name translation.
//!
//! Device names recorded by the installed system may no longer be valid in
//! the running environment (`/dev/hda5` became `/dev/sda5`). Entries are
//! rewritten to the current names, the originals are kept next to them and a
//! backward map remembers new -> old for later reconciliation.

use std::collections::BTreeMap;
use std::path::Path;

use crate::tab::{CryptotabEntry, FstabEntry};

/// Hardware description files below a root, used by the naming database.
const HARDWARE_DB: &str = "var/lib/hardware";

/// Below this many hardware files translation results are unreliable.
const MIN_HARDWARE_FILES: usize = 3;

/// Resolves recorded device names to currently valid ones.
pub trait DeviceResolver {
    /// Translate each name; the result has the same length and order.
    fn resolve(&self, names: &[String]) -> Vec<String>;
}

/// Resolver that leaves every name untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl DeviceResolver for Passthrough {
    fn resolve(&self, names: &[String]) -> Vec<String> {
        names.to_vec()
    }
}

/// Resolver renaming whole disks (`/dev/hda` -> `/dev/sda`) and their partitions.
#[derive(Debug, Clone, Default)]
pub struct RenameTable {
    renames: BTreeMap<String, String>,
}

impl RenameTable {
    /// Create a resolver from `old disk -> new disk` pairs.
    #[must_use]
    pub const fn new(renames: BTreeMap<String, String>) -> Self {
        Self { renames }
    }

    fn rename(&self, name: &str) -> Option<String> {
        self.renames.iter().find_map(|(old, new)| {
            let suffix = name.strip_prefix(old.as_str())?;
            let number = suffix.strip_prefix('p').unwrap_or(suffix);
            let whole_disk = suffix.is_empty();
            let partition = !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit());
            (whole_disk || partition).then(|| format!("{new}{suffix}"))
        })
    }
}

impl DeviceResolver for RenameTable {
    fn resolve(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .map(|name| self.rename(name).unwrap_or_else(|| name.clone()))
            .collect()
    }
}

/// New -> old device names collected during one mount attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackwardMap {
    names: BTreeMap<String, String>,
}

impl BackwardMap {
    /// Record that `new` was translated from `old`.
    pub fn insert(&mut self, new: impl Into<String>, old: impl Into<String>) {
        self.names.insert(new.into(), old.into());
    }

    /// Original name of a translated device.
    #[must_use]
    pub fn original(&self, new: &str) -> Option<&str> {
        self.names.get(new).map(String::as_str)
    }

    /// Forget all translations.
    pub fn clear(&mut self) {
        self.names.clear();
    }

    /// Number of recorded translations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether nothing was translated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A table row carrying a translatable device field.
pub trait DeviceField {
    /// Current value of the device field.
    fn device(&self) -> &str;

    /// Store the translated value and keep the original.
    fn set_device(&mut self, translated: String, original: String);

    /// Mount options to rewrite, if the row has any.
    fn mount_options(&mut self) -> Option<&mut String> {
        None
    }
}

impl DeviceField for FstabEntry {
    fn device(&self) -> &str {
        &self.spec
    }

    fn set_device(&mut self, translated: String, original: String) {
        self.spec = translated;
        self.spec_old = Some(original);
    }

    fn mount_options(&mut self) -> Option<&mut String> {
        Some(&mut self.mntops)
    }
}

impl DeviceField for CryptotabEntry {
    fn device(&self) -> &str {
        &self.file
    }

    fn set_device(&mut self, translated: String, original: String) {
        self.file = translated;
        self.file_old = Some(original);
    }
}

/// Replace the `hotplug` option with `nofail`, leaving every other token alone.
#[must_use]
pub fn rewrite_mount_options(options: &str) -> String {
    if !options.split(',').any(|o| o == "hotplug") {
        return options.to_string();
    }
    options
        .split(',')
        .map(|o| if o == "hotplug" { "nofail" } else { o })
        .collect::<Vec<_>>()
        .join(",")
}

/// Rewrites table rows through a [`DeviceResolver`].
pub struct Translator<'a> {
    resolver: &'a dyn DeviceResolver,
}

impl<'a> Translator<'a> {
    /// Create a translator.
    pub fn new(resolver: &'a dyn DeviceResolver) -> Self {
        Self { resolver }
    }

    /// Translate the device field of every entry, recording new -> old in `backward`.
    pub fn translate<T: DeviceField>(&self, mut entries: Vec<T>, backward: &mut BackwardMap) -> Vec<T> {
        let old_names: Vec<String> = entries.iter().map(|e| e.device().to_string()).collect();
        let new_names = self.resolver.resolve(&old_names);

        for (index, entry) in entries.iter_mut().enumerate() {
            let old = old_names[index].clone();
            let new = new_names.get(index).cloned().unwrap_or_else(|| old.clone());

            if new != old {
                tracing::debug!(old = %old, new = %new, "Translated device name");
            }
            backward.insert(new.clone(), old.clone());
            entry.set_device(new, old);

            if let Some(options) = entry.mount_options() {
                *options = rewrite_mount_options(options);
            }
        }

        tracing::debug!(translations = backward.len(), "Current backward translations");
        entries
    }
}

/// Log whether the target carries enough hardware data for reliable translation.
pub fn log_hardware_database(root: &Path) {
    let dir = root.join(HARDWARE_DB);
    let count = std::fs::read_dir(&dir).map_or(0, Iterator::count);
    if count < MIN_HARDWARE_FILES {
        tracing::error!(
            path = %dir.display(),
            count,
            "Too few hardware files, device translation may not work"
        );
    } else {
        tracing::info!(path = %dir.display(), count, "Hardware files available");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn renames() -> RenameTable {
        RenameTable::new(BTreeMap::from([
            ("/dev/hda".to_string(), "/dev/sda".to_string()),
            ("/dev/hdb".to_string(), "/dev/sdb".to_string()),
        ]))
    }

    #[test]
    fn option_rewrite() {
        assert_eq!(rewrite_mount_options("a,hotplug,b"), "a,nofail,b");
        assert_eq!(rewrite_mount_options("hotplug"), "nofail");
        assert_eq!(rewrite_mount_options("a,b"), "a,b");
        assert_eq!(rewrite_mount_options("nohotplug,a"), "nohotplug,a");
        assert_eq!(rewrite_mount_options(""), "");
    }

    #[test]
    fn rename_table_matches_whole_disks() {
        let table = renames();
        let names = vec![
            "/dev/hda5".to_string(),
            "/dev/hdb".to_string(),
            "/dev/hdab1".to_string(),
            "LABEL=root".to_string(),
        ];
        assert_eq!(
            table.resolve(&names),
            vec!["/dev/sda5", "/dev/sdb", "/dev/hdab1", "LABEL=root"]
        );
    }

    #[test]
    fn translate_fstab_keeps_originals() {
        let table = renames();
        let translator = Translator::new(&table);
        let mut backward = BackwardMap::default();

        let entries = vec![
            FstabEntry::new("/dev/hda2", "/", "ext4", "defaults"),
            FstabEntry::new("/dev/hda3", "/home", "ext4", "hotplug,rw"),
        ];
        let translated = translator.translate(entries, &mut backward);

        assert_eq!(translated[0].spec, "/dev/sda2");
        assert_eq!(translated[0].spec_old.as_deref(), Some("/dev/hda2"));
        assert_eq!(translated[1].mntops, "nofail,rw");
        assert_eq!(backward.original("/dev/sda3"), Some("/dev/hda3"));
    }

    #[test]
    fn translate_cryptotab_file_column() {
        let table = renames();
        let translator = Translator::new(&table);
        let mut backward = BackwardMap::default();

        let entries = crate::tab::parse_cryptotab(
            "/dev/loop0 /dev/hdb7 /secret ext2 twofish256 hotplug\n",
        );
        let translated = translator.translate(entries, &mut backward);

        assert_eq!(translated[0].file, "/dev/sdb7");
        assert_eq!(translated[0].file_old.as_deref(), Some("/dev/hdb7"));
        assert_eq!(translated[0].opt2, "hotplug");
    }

    proptest! {
        #[test]
        fn options_without_hotplug_are_unchanged(tokens in prop::collection::vec("[a-gi-z_=0-9]{1,8}", 0..6)) {
            let options = tokens.join(",");
            prop_assert_eq!(rewrite_mount_options(&options), options);
        }

        #[test]
        fn backward_map_round_trip(disk in "[a-d]", number in 1u32..64) {
            let table = renames();
            let translator = Translator::new(&table);
            let mut backward = BackwardMap::default();
            let original = format!("/dev/hd{disk}{number}");

            let translated = translator.translate(
                vec![FstabEntry::new(original.clone(), "/x", "ext4", "defaults")],
                &mut backward,
            );

            prop_assert_eq!(backward.original(&translated[0].spec), Some(original.as_str()));
        }
    }
}
