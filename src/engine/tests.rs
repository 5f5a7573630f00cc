use super::*;
use std::io::Write;

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn write_fixture(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> String {
    let path = dir.path().join(name);
    std::fs::File::create(&path).unwrap().write_all(contents).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn empty_path_list_yields_empty_output() {
    let out = hash_contiguous::<&str>(&[], 0).unwrap();
    assert!(out.is_empty());
}

#[test]
fn missing_file_hashes_to_zero() {
    let out = hash_contiguous(&["/no/such/file/fxxh-test"], 0).unwrap();
    assert_eq!(out, vec![0u8; 16]);
}

#[test]
fn empty_path_segment_hashes_to_zero() {
    let out = hash_contiguous(&[""], 0).unwrap();
    assert_eq!(out, vec![0u8; 16]);
}

#[test]
fn hashes_small_file_correctly() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(&dir, "a.txt", b"hello world\n");
    let out = hash_contiguous(&[path], 0).unwrap();
    assert_eq!(hex(&out), "eefac9d87100cd1336b2e733a5484425");
}

#[test]
fn hashes_multiple_files_in_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_fixture(&dir, "a.txt", b"hello world\n");
    let b = write_fixture(&dir, "b.txt", b"goodbye world\n");
    let out = hash_contiguous(&[a, b], 0).unwrap();
    assert_eq!(hex(&out[0..16]), "eefac9d87100cd1336b2e733a5484425");
    assert_eq!(hex(&out[16..32]), "472e10c9821c728278f31afb08378f2f");
}

#[test]
fn large_file_streaming_matches_one_shot_hash() {
    let dir = tempfile::tempdir().unwrap();
    // Larger than PER_THREAD_BUF so the streaming path is exercised.
    let contents = vec![b'x'; PER_THREAD_BUF * 3 + 17];
    let path = write_fixture(&dir, "big.bin", &contents);
    let out = hash_contiguous(&[path], 1).unwrap();
    assert_eq!(out, hasher::hash(&contents, 0, 0));
}

#[test]
fn concurrency_one_matches_concurrency_many() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<String> = (0..20)
        .map(|i| write_fixture(&dir, &format!("f{i}.txt"), format!("contents {i}").as_bytes()))
        .collect();
    let serial = hash_contiguous(&paths, 1).unwrap();
    let parallel = hash_contiguous(&paths, 8).unwrap();
    assert_eq!(serial, parallel);
}

#[test]
fn hash_indexed_scatters_into_requested_slots() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_fixture(&dir, "a.txt", b"hello world\n");
    let mut out = vec![0u8; 48];
    hash_indexed(&[(2, a.as_str())], 0, &mut out).unwrap();
    assert_eq!(out[0..32], [0u8; 32]);
    assert_eq!(hex(&out[32..48]), "eefac9d87100cd1336b2e733a5484425");
}

#[test]
fn hash_indexed_rejects_output_buffer_too_small() {
    let mut out = vec![0u8; 16];
    let err = hash_indexed(&[(1, "whatever")], 0, &mut out).unwrap_err();
    assert!(matches!(err, FxxhError::Range(_)));
}
