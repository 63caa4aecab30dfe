//! Integration tests for root partition discovery.

mod support;

use std::collections::BTreeMap;

use rootmount::inventory::{FsKind, Inventory, PartitionInfo, PartitionType};
use rootmount::operator::ConsistencyWarning;
use rootmount::translate::{Passthrough, RenameTable};
use rootmount::{Orchestrator, Scanner, Session};

use support::{FakeSystem, Fixture, RUNNING_ARCH, ScriptedOperator};

fn disk(partitions: Vec<PartitionInfo>) -> Inventory {
    Inventory::new().with_disk("/dev/sda", partitions)
}

#[test_log::test]
fn finds_valid_root_and_skips_swap_and_extended() {
    let fixture = Fixture::new();
    let image = fixture.root_image("root", RUNNING_ARCH, "/dev/sda2 / ext4 defaults 1 1\n");
    let system = FakeSystem::new().with_image("/dev/sda2", image);
    let inventory = disk(vec![
        PartitionInfo::new("/dev/sda1", FsKind::Ext2),
        PartitionInfo::new("/dev/sda2", FsKind::Ext4),
        PartitionInfo::new("/dev/sda4", FsKind::Unknown).with_type(PartitionType::Extended),
        PartitionInfo::new("/dev/sda5", FsKind::Swap),
        PartitionInfo::new("/dev/sda6", FsKind::Vfat),
    ]);
    let mut session = Session::new(fixture.config.clone());
    let mut operator = ScriptedOperator::default();

    let candidates = Scanner::new(&system, &Passthrough)
        .scan(&mut session, &inventory, &mut operator)
        .unwrap();

    assert_eq!(candidates.len(), 3);
    assert!(candidates.get("/dev/sda4").is_none());
    assert!(candidates.get("/dev/sda5").is_none());

    let root = candidates.get("/dev/sda2").unwrap();
    assert!(root.valid);
    assert!(root.arch_valid);
    assert_eq!(root.arch, RUNNING_ARCH);
    assert_eq!(root.name, "Test Linux 1.0");

    let boot = candidates.get("/dev/sda1").unwrap();
    assert!(!boot.valid);
    assert_eq!(boot.mismatch.as_deref(), Some("no /etc/fstab"));

    let fat = candidates.get("/dev/sda6").unwrap();
    assert!(!fat.valid);
    assert_eq!(fat.display_name(), "Non-Linux System");

    assert_eq!(candidates.first_valid(), Some("/dev/sda2"));
    // staging mounts never outlive the scan
    assert!(system.mounted().is_empty());
}

#[test_log::test]
fn scans_once_per_session() {
    let fixture = Fixture::new();
    let image = fixture.root_image("root", RUNNING_ARCH, "/dev/sda2 / ext4 defaults 1 1\n");
    let system = FakeSystem::new().with_image("/dev/sda2", image);
    let inventory = disk(vec![PartitionInfo::new("/dev/sda2", FsKind::Ext4)]);
    let mut session = Session::new(fixture.config.clone());
    let mut operator = ScriptedOperator::default();
    let scanner = Scanner::new(&system, &Passthrough);

    let mut steps = Vec::new();
    scanner
        .scan_with_progress(&mut session, &inventory, &mut operator, |done, total| {
            steps.push((done, total));
        })
        .unwrap();
    let calls = system.calls().len();
    scanner.scan(&mut session, &inventory, &mut operator).unwrap();

    assert_eq!(steps, vec![(1, 1)]);
    assert_eq!(system.calls().len(), calls);
    assert!(session.select_first_valid());
    assert_eq!(session.selected(), Some("/dev/sda2"));
}

#[test_log::test]
fn foreign_architecture_is_invalid() {
    let fixture = Fixture::new();
    let image = fixture.root_image("root", "s390x", "/dev/sda2 / ext4 defaults 1 1\n");
    let system = FakeSystem::new().with_image("/dev/sda2", image);
    let inventory = disk(vec![PartitionInfo::new("/dev/sda2", FsKind::Ext4)]);
    let mut session = Session::new(fixture.config.clone());
    let mut operator = ScriptedOperator::default();

    let candidates = Scanner::new(&system, &Passthrough)
        .scan(&mut session, &inventory, &mut operator)
        .unwrap();

    let root = candidates.get("/dev/sda2").unwrap();
    assert!(!root.valid);
    assert!(!root.arch_valid);
    assert_eq!(root.arch, "s390x");
    assert!(root.mismatch.as_deref().unwrap().contains("architecture"));
}

#[test_log::test]
fn equivalent_architecture_is_valid_with_warning() {
    let mut fixture = Fixture::new();
    fixture.config.arch_equivalence = vec![vec![RUNNING_ARCH.to_string(), "i686".to_string()]];
    let image = fixture.root_image("root", "i686", "/dev/sda2 / ext4 defaults 1 1\n");
    let system = FakeSystem::new().with_image("/dev/sda2", image);
    let inventory = disk(vec![PartitionInfo::new("/dev/sda2", FsKind::Ext4)]);
    let mut session = Session::new(fixture.config.clone());
    let mut operator = ScriptedOperator::default();

    let candidates = Scanner::new(&system, &Passthrough)
        .scan(&mut session, &inventory, &mut operator)
        .unwrap();

    assert!(candidates.get("/dev/sda2").unwrap().valid);
    assert!(operator.warnings.iter().any(|w| matches!(
        w,
        ConsistencyWarning::ArchitectureEquivalent { target, .. } if target == "i686"
    )));
}

#[test_log::test]
fn unfinished_installation_is_invalid() {
    let fixture = Fixture::new();
    let image = fixture.image(
        "root",
        &[
            ("etc/fstab", "/dev/sda2 / ext4 defaults 1 1\n"),
            ("bin/bash", RUNNING_ARCH),
            ("var/lib/installer/runme_at_boot", ""),
        ],
    );
    let system = FakeSystem::new().with_image("/dev/sda2", image);
    let inventory = disk(vec![PartitionInfo::new("/dev/sda2", FsKind::Ext4)]);
    let mut session = Session::new(fixture.config.clone());
    let mut operator = ScriptedOperator::default();

    let candidates = Scanner::new(&system, &Passthrough)
        .scan(&mut session, &inventory, &mut operator)
        .unwrap();

    let root = candidates.get("/dev/sda2").unwrap();
    assert!(!root.valid);
    assert_eq!(root.mismatch.as_deref(), Some("installation was not finished"));
}

#[test_log::test]
fn fstab_must_name_the_partition() {
    let fixture = Fixture::new();
    let other = fixture.root_image("other", RUNNING_ARCH, "/dev/sda3 / ext4 defaults 1 1\n");
    let by_uuid = fixture.root_image("uuid", RUNNING_ARCH, "UUID=0a1b-2c3d / ext4 defaults 1 1\n");
    let system = FakeSystem::new()
        .with_image("/dev/sda2", other)
        .with_image("/dev/sda4", by_uuid);
    let inventory = disk(vec![
        PartitionInfo::new("/dev/sda2", FsKind::Ext4),
        PartitionInfo::new("/dev/sda4", FsKind::Btrfs).with_uuid("0a1b-2c3d"),
    ]);
    let mut session = Session::new(fixture.config.clone());
    let mut operator = ScriptedOperator::default();

    let candidates = Scanner::new(&system, &Passthrough)
        .scan(&mut session, &inventory, &mut operator)
        .unwrap();

    assert!(!candidates.get("/dev/sda2").unwrap().valid);
    assert!(candidates.get("/dev/sda4").unwrap().valid);
}

#[test_log::test]
fn fstab_needs_exactly_one_root_row() {
    let fixture = Fixture::new();
    let no_root = fixture.root_image("none", RUNNING_ARCH, "/dev/sda6 /home ext4 defaults 1 2\n");
    let two_roots = fixture.root_image(
        "two",
        RUNNING_ARCH,
        "/dev/sda3 / ext4 defaults 1 1\n/dev/sda3 / ext4 defaults 1 1\n",
    );
    let system = FakeSystem::new()
        .with_image("/dev/sda2", no_root)
        .with_image("/dev/sda3", two_roots);
    let inventory = disk(vec![
        PartitionInfo::new("/dev/sda2", FsKind::Ext4),
        PartitionInfo::new("/dev/sda3", FsKind::Ext4),
    ]);
    let mut session = Session::new(fixture.config.clone());
    let mut operator = ScriptedOperator::default();

    let candidates = Scanner::new(&system, &Passthrough)
        .scan(&mut session, &inventory, &mut operator)
        .unwrap();

    let none = candidates.get("/dev/sda2").unwrap();
    assert!(!none.valid);
    assert_eq!(
        none.mismatch.as_deref(),
        Some("expected exactly one / entry in fstab, found 0")
    );

    let two = candidates.get("/dev/sda3").unwrap();
    assert!(!two.valid);
    assert_eq!(
        two.mismatch.as_deref(),
        Some("expected exactly one / entry in fstab, found 2")
    );
    assert_eq!(candidates.first_valid(), None);
}

#[test_log::test]
fn renamed_disks_are_translated() {
    let fixture = Fixture::new();
    let image = fixture.root_image("root", RUNNING_ARCH, "/dev/hda2 / ext4 defaults 1 1\n");
    let system = FakeSystem::new().with_image("/dev/sda2", image);
    let inventory = disk(vec![PartitionInfo::new("/dev/sda2", FsKind::Ext4)]);
    let resolver = RenameTable::new(BTreeMap::from([(
        "/dev/hda".to_string(),
        "/dev/sda".to_string(),
    )]));
    let mut session = Session::new(fixture.config.clone());
    let mut operator = ScriptedOperator::default();

    let candidates = Scanner::new(&system, &resolver)
        .scan(&mut session, &inventory, &mut operator)
        .unwrap();

    assert!(candidates.get("/dev/sda2").unwrap().valid);
    assert_eq!(session.backward().original("/dev/sda2"), Some("/dev/hda2"));
}

#[test_log::test]
fn failed_check_asks_operator_once() {
    let fixture = Fixture::new();
    let image = fixture.root_image("root", RUNNING_ARCH, "/dev/sda2 / jfs defaults 1 1\n");
    let system = FakeSystem::new()
        .with_image("/dev/sda2", image)
        .check_fails("/dev/sda2");
    let inventory = disk(vec![PartitionInfo::new("/dev/sda2", FsKind::Jfs)]);
    let mut session = Session::new(fixture.config.clone());
    let mut operator = ScriptedOperator {
        continue_after_check: true,
        ..ScriptedOperator::default()
    };

    let candidates = Scanner::new(&system, &Passthrough)
        .scan(&mut session, &inventory, &mut operator)
        .unwrap();
    assert!(candidates.get("/dev/sda2").unwrap().valid);
    assert!(session.select_first_valid());

    Orchestrator::new(&system, &Passthrough, &inventory)
        .mount(&mut session, &mut operator)
        .unwrap();

    assert_eq!(system.calls_starting_with("fsck"), vec!["fsck /dev/sda2 jfs"]);
    assert_eq!(operator.check_failures, vec!["/dev/sda2".to_string()]);
}

#[test_log::test]
fn skipped_check_rejects_partition() {
    let fixture = Fixture::new();
    let image = fixture.root_image("root", RUNNING_ARCH, "/dev/sda2 / jfs defaults 1 1\n");
    let system = FakeSystem::new()
        .with_image("/dev/sda2", image)
        .check_fails("/dev/sda2");
    let inventory = disk(vec![PartitionInfo::new("/dev/sda2", FsKind::Jfs)]);
    let mut session = Session::new(fixture.config.clone());
    let mut operator = ScriptedOperator::default();

    let candidates = Scanner::new(&system, &Passthrough)
        .scan(&mut session, &inventory, &mut operator)
        .unwrap();

    let root = candidates.get("/dev/sda2").unwrap();
    assert!(!root.valid);
    assert_eq!(root.mismatch.as_deref(), Some("file system check failed"));
    assert!(system.calls_starting_with("mount").is_empty());
}
