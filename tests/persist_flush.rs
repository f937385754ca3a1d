mod common;

use std::io::Read;

use classbind::persist::{CoordinatorState, PersistError, PersistenceCoordinator};
use classbind::rewrite::{Modification, ModificationKind};
use classbind::scan::{ScanLocation, UnitOrigin};
use tempfile::tempdir;

#[test]
fn unmodified_results_are_never_queued() {
    let mut coordinator = PersistenceCoordinator::new();
    coordinator.begin();
    coordinator.enqueue(Modification::new(
        UnitOrigin::loose("/build/Person.class"),
        ModificationKind::Unmodified,
        vec![1, 2, 3],
    ));
    assert_eq!(coordinator.pending_count(), 0);
}

#[test]
fn flush_writes_a_loose_file_back() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("Person.class");
    std::fs::write(&path, b"old").expect("seed file");

    let mut coordinator = PersistenceCoordinator::new();
    coordinator.begin();
    coordinator.enqueue(Modification::new(
        UnitOrigin::loose(path.clone()),
        ModificationKind::Modified,
        b"new".to_vec(),
    ));
    assert_eq!(coordinator.pending_count(), 1);
    assert_eq!(coordinator.state(), CoordinatorState::Collecting);

    coordinator.flush().expect("flush");
    assert_eq!(coordinator.state(), CoordinatorState::Idle);
    assert_eq!(coordinator.pending_count(), 0);
    assert_eq!(std::fs::read(&path).expect("read back"), b"new");
}

#[test]
fn two_modifications_for_one_loose_file_are_rejected() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("Person.class");
    std::fs::write(&path, b"old").expect("seed file");

    let mut coordinator = PersistenceCoordinator::new();
    coordinator.begin();
    for payload in [b"one".to_vec(), b"two".to_vec()] {
        coordinator.enqueue(Modification::new(
            UnitOrigin::loose(path.clone()),
            ModificationKind::Modified,
            payload,
        ));
    }

    let result = coordinator.flush();
    assert!(matches!(result, Err(PersistError::TooManyModificationsForSingleFile(_))));
    // The file was not touched.
    assert_eq!(std::fs::read(&path).expect("read back"), b"old");
}

#[test]
fn flush_clears_the_queue_even_on_failure() {
    let mut coordinator = PersistenceCoordinator::new();
    coordinator.begin();
    coordinator.enqueue(Modification::new(
        UnitOrigin::loose("/nonexistent/elsewhere/Person.class"),
        ModificationKind::Modified,
        b"new".to_vec(),
    ));

    assert!(coordinator.flush().is_err());
    assert_eq!(coordinator.state(), CoordinatorState::Idle);
    assert_eq!(coordinator.pending_count(), 0);
}

#[test]
fn directory_locations_cannot_be_flush_targets() {
    let dir = tempdir().expect("tempdir");
    let mut coordinator = PersistenceCoordinator::new();
    coordinator.begin();
    coordinator.enqueue(Modification::new(
        UnitOrigin {
            location: ScanLocation::Dir(dir.path().to_path_buf()),
            member: None,
        },
        ModificationKind::Modified,
        b"new".to_vec(),
    ));

    let result = coordinator.flush();
    assert!(matches!(result, Err(PersistError::UnsupportedLocationScheme(_))));
}

#[test]
fn flush_replaces_archive_members_in_place() {
    let dir = tempdir().expect("tempdir");
    let jar = dir.path().join("model.jar");
    common::write_archive(
        &jar,
        &[
            ("com.acme.Person", &common::interface_class("com.acme.Person")),
            (
                "com.acme.PersonImpl",
                &common::marked_class("com.acme.PersonImpl", &["com.acme.Person"]),
            ),
        ],
    );
    let untouched = {
        let file = std::fs::File::open(&jar).expect("open archive");
        let mut archive = zip::ZipArchive::new(file).expect("read archive");
        let mut member = archive.by_name("com/acme/PersonImpl.class").expect("member");
        let mut bytes = Vec::new();
        member.read_to_end(&mut bytes).expect("read member");
        bytes
    };

    let mut coordinator = PersistenceCoordinator::new();
    coordinator.begin();
    coordinator.enqueue(Modification::new(
        UnitOrigin::archived(jar.clone(), "com/acme/Person.class"),
        ModificationKind::Modified,
        b"rewritten".to_vec(),
    ));
    coordinator.flush().expect("flush");

    let file = std::fs::File::open(&jar).expect("reopen archive");
    let mut archive = zip::ZipArchive::new(file).expect("reread archive");
    assert_eq!(archive.len(), 2);
    {
        let mut member = archive.by_name("com/acme/Person.class").expect("replaced member");
        let mut bytes = Vec::new();
        member.read_to_end(&mut bytes).expect("read member");
        assert_eq!(bytes, b"rewritten");
    }
    {
        let mut member = archive.by_name("com/acme/PersonImpl.class").expect("kept member");
        let mut bytes = Vec::new();
        member.read_to_end(&mut bytes).expect("read member");
        assert_eq!(bytes, untouched);
    }
}

#[test]
fn a_modification_for_a_missing_archive_member_fails_the_flush() {
    let dir = tempdir().expect("tempdir");
    let jar = dir.path().join("model.jar");
    common::write_archive(
        &jar,
        &[("com.acme.Person", &common::interface_class("com.acme.Person"))],
    );

    let mut coordinator = PersistenceCoordinator::new();
    coordinator.begin();
    coordinator.enqueue(Modification::new(
        UnitOrigin::archived(jar.clone(), "com/acme/Ghost.class"),
        ModificationKind::Modified,
        b"rewritten".to_vec(),
    ));

    let result = coordinator.flush();
    assert!(matches!(
        result,
        Err(PersistError::MissingArchiveMember { member, .. }) if member == "com/acme/Ghost.class"
    ));
    // The original archive file still opens cleanly.
    let file = std::fs::File::open(&jar).expect("reopen archive");
    let archive = zip::ZipArchive::new(file).expect("reread archive");
    assert_eq!(archive.len(), 1);
}

#[test]
fn begin_drops_anything_left_from_a_prior_cycle() {
    let mut coordinator = PersistenceCoordinator::new();
    coordinator.begin();
    coordinator.enqueue(Modification::new(
        UnitOrigin::loose("/build/Person.class"),
        ModificationKind::Modified,
        b"stale".to_vec(),
    ));
    assert_eq!(coordinator.pending_count(), 1);

    coordinator.begin();
    assert_eq!(coordinator.pending_count(), 0);
    assert_eq!(coordinator.state(), CoordinatorState::Collecting);
}
