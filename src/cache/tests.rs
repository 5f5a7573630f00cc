use super::*;
use std::io::Write as _;
use std::thread::sleep;
use std::time::Duration;

fn write_fixture(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> String {
    let path = dir.path().join(name);
    std::fs::File::create(&path).unwrap().write_all(contents).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn scenario_1_write_then_reopen_is_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_fixture(&dir, "a.txt", b"hello world\n");
    let b = write_fixture(&dir, "b.txt", b"goodbye world\n");
    let sidecar = dir.path().join("sidecar.bin");

    let manager = Manager::new(1, 0, 0);
    let mut cache = manager.cache(&sidecar, fingerprint_of(b"fixture"));
    cache.open().unwrap();
    let result = cache.validate(Some(&[&a, &b])).unwrap();
    assert!(result.changed);
    assert_eq!(result.rehashed, 2);
    cache.write(&WriteOptions::new()).unwrap();

    let mut reopened = manager.cache(&sidecar, fingerprint_of(b"fixture"));
    reopened.open().unwrap();
    let result = reopened.validate(Some(&[&a, &b])).unwrap();
    assert!(!result.changed);
    assert_eq!(result.rehashed, 0);
}

#[test]
fn scenario_2_modifying_a_file_forces_rehash_of_just_that_file() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_fixture(&dir, "a.txt", b"hello world\n");
    let b = write_fixture(&dir, "b.txt", b"goodbye world\n");
    let sidecar = dir.path().join("sidecar.bin");
    let manager = Manager::new(1, 0, 0);

    let mut cache = manager.cache(&sidecar, fingerprint_of(b"fixture"));
    cache.open().unwrap();
    let first = cache.validate(Some(&[&a, &b])).unwrap();
    cache.write(&WriteOptions::new()).unwrap();

    // Ensure mtime actually advances on coarse filesystems.
    sleep(Duration::from_millis(10));
    std::fs::write(&a, b"hello world, again\n").unwrap();

    let mut cache = manager.cache(&sidecar, fingerprint_of(b"fixture"));
    cache.open().unwrap();
    let second = cache.validate(Some(&[&a, &b])).unwrap();
    assert!(second.changed);
    assert_eq!(second.rehashed, 1);
    assert_ne!(second.digest, first.digest);
}

#[test]
fn scenario_3_manager_version_change_invalidates_header() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_fixture(&dir, "a.txt", b"hello world\n");
    let sidecar = dir.path().join("sidecar.bin");

    let manager_v1 = Manager::new(1, 0, 0);
    let mut cache = manager_v1.cache(&sidecar, fingerprint_of(b"fp"));
    cache.open().unwrap();
    cache.validate(Some(&[&a])).unwrap();
    cache.write(&WriteOptions::new()).unwrap();

    let manager_v2 = Manager::new(2, 0, 0);
    let mut cache = manager_v2.cache(&sidecar, fingerprint_of(b"fp"));
    cache.open().unwrap();
    assert!(cache.header().is_none());
    let result = cache.validate(Some(&[&a])).unwrap();
    assert!(result.changed);
    assert_eq!(result.rehashed, 1);
}

#[test]
fn scenario_4_fingerprint_change_invalidates_header() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_fixture(&dir, "a.txt", b"hello world\n");
    let sidecar = dir.path().join("sidecar.bin");
    let manager = Manager::new(1, 0, 0);

    let mut cache = manager.cache(&sidecar, fingerprint_of(b"fp-one"));
    cache.open().unwrap();
    cache.validate(Some(&[&a])).unwrap();
    cache.write(&WriteOptions::new()).unwrap();

    let mut cache = manager.cache(&sidecar, fingerprint_of(b"fp-two"));
    cache.open().unwrap();
    assert!(cache.header().is_none());
    let result = cache.validate(Some(&[&a])).unwrap();
    assert!(result.changed);
    assert_eq!(result.rehashed, 1);
}

#[test]
fn scenario_5_omitting_files_revalidates_stored_list() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_fixture(&dir, "a.txt", b"hello world\n");
    let b = write_fixture(&dir, "b.txt", b"goodbye world\n");
    let sidecar = dir.path().join("sidecar.bin");
    let manager = Manager::new(1, 0, 0);

    let mut cache = manager.cache(&sidecar, fingerprint_of(b"fp"));
    cache.open().unwrap();
    cache.validate(Some(&[&a, &b])).unwrap();
    cache.write(&WriteOptions::new()).unwrap();

    sleep(Duration::from_millis(10));
    std::fs::write(&b, b"goodbye world, again\n").unwrap();

    let mut cache = manager.cache(&sidecar, fingerprint_of(b"fp"));
    cache.open().unwrap();
    let result = cache.validate(None).unwrap();
    assert!(result.changed);
    assert_eq!(result.rehashed, 1);
    assert_eq!(cache.read_files(), vec![a, b]);
}

#[test]
fn scenario_6_raw_and_gzip_items_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_fixture(&dir, "a.txt", b"hello world\n");
    let sidecar = dir.path().join("sidecar.bin");
    let manager = Manager::new(1, 0, 0);

    let mut cache = manager.cache(&sidecar, fingerprint_of(b"fp"));
    cache.open().unwrap();
    cache.validate(Some(&[&a])).unwrap();

    let raw_items = vec![Item::Json(serde_json::json!({ "exportNames": ["foo", "bar"] }))];
    let gzip_items = vec![Item::Text("code".repeat(100))];
    let opts = WriteOptions {
        raw: raw_items.clone(),
        gzip: gzip_items.clone(),
        gzip_level: 3,
    };
    cache.write(&opts).unwrap();

    let mut reopened = manager.cache(&sidecar, fingerprint_of(b"fp"));
    reopened.open().unwrap();
    assert_eq!(reopened.read_gzip_data(), gzip_items);
    assert_eq!(reopened.read_raw_data(), raw_items);
}

#[test]
fn scenario_6b_null_and_absent_are_distinct() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_fixture(&dir, "a.txt", b"hello world\n");
    let sidecar = dir.path().join("sidecar.bin");
    let manager = Manager::new(1, 0, 0);

    let mut cache = manager.cache(&sidecar, fingerprint_of(b"fp"));
    cache.open().unwrap();
    cache.validate(Some(&[&a])).unwrap();
    cache
        .write(&WriteOptions {
            raw: vec![Item::Null, Item::Absent, Item::Bytes(vec![1, 2, 3])],
            gzip: Vec::new(),
            gzip_level: 1,
        })
        .unwrap();

    let mut reopened = manager.cache(&sidecar, fingerprint_of(b"fp"));
    reopened.open().unwrap();
    assert_eq!(
        reopened.read_raw_data(),
        vec![Item::Null, Item::Absent, Item::Bytes(vec![1, 2, 3])]
    );
}

#[test]
fn scenario_7_gzip_level_out_of_range_fails_with_range() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_fixture(&dir, "a.txt", b"hello world\n");
    let sidecar = dir.path().join("sidecar.bin");
    let manager = Manager::new(1, 0, 0);

    let mut cache = manager.cache(&sidecar, fingerprint_of(b"fp"));
    cache.open().unwrap();
    cache.validate(Some(&[&a])).unwrap();

    for bad_level in [0, 10] {
        let err = cache
            .write(&WriteOptions {
                raw: Vec::new(),
                gzip: Vec::new(),
                gzip_level: bad_level,
            })
            .unwrap_err();
        assert!(matches!(err, FxxhError::Range(_)));
    }
}

#[test]
fn write_before_validate_fails_with_precond_violation() {
    let dir = tempfile::tempdir().unwrap();
    let sidecar = dir.path().join("sidecar.bin");
    let manager = Manager::new(1, 0, 0);
    let mut cache = manager.cache(&sidecar, fingerprint_of(b"fp"));
    cache.open().unwrap();
    let err = cache.write(&WriteOptions::new()).unwrap_err();
    assert!(matches!(err, FxxhError::PrecondViolation(_)));
}

#[test]
fn missing_sidecar_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let sidecar = dir.path().join("does-not-exist.bin");
    let manager = Manager::new(1, 0, 0);
    let mut cache = manager.cache(&sidecar, fingerprint_of(b"fp"));
    cache.open().unwrap();
    assert!(cache.header().is_none());
}

#[test]
fn empty_file_list_validate_computes_seeded_empty_digest() {
    let dir = tempfile::tempdir().unwrap();
    let sidecar = dir.path().join("sidecar.bin");
    let manager = Manager::new(1, 7, 0);
    let mut cache = manager.cache(&sidecar, fingerprint_of(b"fp"));
    cache.open().unwrap();
    let empty: [&str; 0] = [];
    let result = cache.validate(Some(&empty)).unwrap();
    assert_eq!(result.digest, hasher::hash(&[], 7, 0));
    assert_eq!(result.rehashed, 0);
    assert!(result.changed);
}
