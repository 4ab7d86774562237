//! Unit tests for porcelain parsing and snapshot set operations.

use aidash_sandbox::snapshot::git::parse_status_z;
use aidash_sandbox::snapshot::{normalize_path, ChangeKind, Snapshot, StatusEntry};

fn entry(code: &str, path: &str) -> StatusEntry {
    StatusEntry {
        code: code.to_owned(),
        path: path.to_owned(),
        rename_source: false,
    }
}

fn source(code: &str, path: &str) -> StatusEntry {
    StatusEntry {
        rename_source: true,
        ..entry(code, path)
    }
}

#[test]
fn parses_modified_and_untracked_records() {
    let entries = parse_status_z(b" M src/a.rs\0?? notes.txt\0D  gone.rs\0").expect("parse");
    assert_eq!(
        entries,
        vec![
            entry(" M", "src/a.rs"),
            entry("??", "notes.txt"),
            entry("D ", "gone.rs"),
        ]
    );
}

#[test]
fn rename_reports_both_paths() {
    let entries = parse_status_z(b"R  new_name.rs\0old_name.rs\0 M other.rs\0").expect("parse");
    assert_eq!(
        entries,
        vec![
            entry("R ", "new_name.rs"),
            source("R ", "old_name.rs"),
            entry(" M", "other.rs"),
        ]
    );
}

#[test]
fn paths_with_spaces_survive() {
    let entries = parse_status_z(b"?? dir with space/file name.txt\0").expect("parse");
    assert_eq!(entries, vec![entry("??", "dir with space/file name.txt")]);
}

#[test]
fn ignored_entries_are_skipped() {
    let entries = parse_status_z(b"!! target/\0 M src/lib.rs\0").expect("parse");
    assert_eq!(entries, vec![entry(" M", "src/lib.rs")]);
}

#[test]
fn empty_output_is_clean_tree() {
    assert!(parse_status_z(b"").expect("parse").is_empty());
}

#[test]
fn truncated_record_is_an_error() {
    assert!(parse_status_z(b"M\0").is_err());
}

#[test]
fn non_utf8_path_is_decoded_lossily() {
    let entries = parse_status_z(b"?? caf\xe9.txt\0").expect("parse");
    assert_eq!(entries, vec![entry("??", "caf\u{fffd}.txt")]);
}

#[test]
fn staged_new_file_is_tagged_added() {
    let snap = Snapshot::from_entries(vec![entry("A ", "lib.txt"), entry("AM", "lib2.txt")]);
    assert_eq!(snap.kind("lib.txt"), Some(ChangeKind::Added));
    assert_eq!(snap.kind("lib2.txt"), Some(ChangeKind::Added));
}

#[test]
fn staged_rename_splits_destination_and_source() {
    let entries = parse_status_z(b"R  moved.rs\0orig.rs\0").expect("parse");
    let snap = Snapshot::from_entries(entries);
    assert_eq!(snap.kind("moved.rs"), Some(ChangeKind::Added));
    assert_eq!(snap.kind("orig.rs"), Some(ChangeKind::Tracked));
}

#[test]
fn tracked_tag_wins_over_added_for_repeated_path() {
    let snap = Snapshot::from_entries(vec![entry("A ", "x.rs"), source("R ", "x.rs")]);
    assert_eq!(snap.kind("x.rs"), Some(ChangeKind::Tracked));
}

#[test]
fn snapshot_tags_untracked_paths() {
    let snap = Snapshot::from_entries(vec![entry(" M", "src/a.rs"), entry("??", "new.txt")]);
    assert_eq!(snap.kind("src/a.rs"), Some(ChangeKind::Tracked));
    assert_eq!(snap.kind("new.txt"), Some(ChangeKind::Untracked));
    assert_eq!(snap.kind("missing"), None);
    assert_eq!(snap.len(), 2);
}

#[test]
fn difference_is_sorted_set_difference() {
    let before = Snapshot::from_entries(vec![entry(" M", "b.rs")]);
    let after = Snapshot::from_entries(vec![
        entry(" M", "b.rs"),
        entry("??", "z.txt"),
        entry(" M", "a.rs"),
    ]);
    assert_eq!(after.difference(&before), vec!["a.rs", "z.txt"]);
    assert!(before.difference(&after).is_empty());
}

#[test]
fn excluding_drops_prefix_at_separator_boundary() {
    let snap = Snapshot::from_entries(vec![
        entry("??", "artifacts/T-1/run.log"),
        entry("??", "artifacts-old.txt"),
        entry(" M", "src/a.rs"),
    ]);
    let filtered = snap.excluding("./artifacts/");
    assert!(!filtered.contains("artifacts/T-1/run.log"));
    assert!(filtered.contains("artifacts-old.txt"));
    assert!(filtered.contains("src/a.rs"));
}

#[test]
fn normalize_path_unifies_separators() {
    assert_eq!(normalize_path("./src\\a.rs"), "src/a.rs");
    assert_eq!(normalize_path("build/"), "build");
}
