//! Unit tests for the task whitelist loader and prefix matcher.

use std::fs;
use std::path::Path;

use aidash_sandbox::models::run::TaskRef;
use aidash_sandbox::policy::Whitelist;

fn write_whitelist(workdir: &Path, task_key: &str, content: &str) {
    let dir = workdir.join("ai").join("tasks").join(task_key);
    fs::create_dir_all(&dir).expect("create task dir");
    fs::write(dir.join("whitelist.txt"), content).expect("write whitelist");
}

// ── Parsing ─────────────────────────────────────────────────────────────────

#[test]
fn parse_skips_blank_lines_and_comments() {
    let wl = Whitelist::parse("# allowed paths\n\nsrc\n  docs/guide.md  \n");
    assert_eq!(wl.entries(), ["src", "docs/guide.md"]);
}

#[test]
fn parse_normalizes_entries() {
    let wl = Whitelist::parse("./src/\nlib\\util\n./\n.\n");
    assert_eq!(wl.entries(), ["src", "lib/util"]);
}

// ── Matching ────────────────────────────────────────────────────────────────

#[test]
fn directory_entry_allows_nested_paths() {
    let wl = Whitelist::new(["src"]);
    assert!(wl.is_allowed("src/a.ts"));
    assert!(wl.is_allowed("src/deep/nested/b.ts"));
}

#[test]
fn exact_file_entry_allows_only_that_file() {
    let wl = Whitelist::new(["README.md"]);
    assert!(wl.is_allowed("README.md"));
    assert!(!wl.is_allowed("README.md.bak"));
    assert!(!wl.is_allowed("docs/README.md"));
}

#[test]
fn prefix_match_requires_separator_boundary() {
    let wl = Whitelist::new(["src"]);
    assert!(!wl.is_allowed("src-backup/file.ts"));
    assert!(!wl.is_allowed("srcfile.ts"));
    assert!(wl.is_allowed("src"));
}

#[test]
fn unrelated_paths_are_disallowed() {
    let wl = Whitelist::new(["src", "tests"]);
    assert!(!wl.is_allowed("lib/b.ts"));
    assert!(wl.is_allowed("tests/it.rs"));
}

#[test]
fn empty_whitelist_allows_everything() {
    let wl = Whitelist::default();
    assert!(wl.is_empty());
    assert!(wl.is_allowed("anything/at/all.txt"));
}

// ── Loading ─────────────────────────────────────────────────────────────────

#[test]
fn load_reads_file_for_task_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_whitelist(dir.path(), "FEAT-0001", "src\ndocs\n");

    let wl = Whitelist::load(dir.path(), &TaskRef::new("FEAT-0001/PR1"));
    assert_eq!(wl.entries(), ["src", "docs"]);
}

#[test]
fn load_missing_file_is_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let wl = Whitelist::load(dir.path(), &TaskRef::new("FEAT-0002"));
    assert!(wl.is_empty());
}

#[test]
fn load_without_task_is_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let wl = Whitelist::load(dir.path(), &TaskRef::default());
    assert!(wl.is_empty());
}

#[test]
fn unsafe_task_key_has_no_whitelist_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(Whitelist::path_for(dir.path(), &TaskRef::new("../escape")).is_none());
    assert!(Whitelist::path_for(dir.path(), &TaskRef::new("a\\b")).is_none());
}
