//! Unit tests for run, session and output models.

use std::path::PathBuf;

use aidash_sandbox::models::output::StreamKind;
use aidash_sandbox::models::run::{RevertFailure, RunResult, RunState, TaskRef, NO_TASK_KEY};
use aidash_sandbox::models::session::{ExitInfo, SessionId};

// ── TaskRef ─────────────────────────────────────────────────────────────────

#[test]
fn task_key_is_first_segment() {
    assert_eq!(TaskRef::new("FEAT-0001/PR1").key(), Some("FEAT-0001"));
    assert_eq!(TaskRef::new("BUG-7").key(), Some("BUG-7"));
}

#[test]
fn empty_task_uses_placeholder_key() {
    assert_eq!(TaskRef::default().key(), None);
    assert_eq!(TaskRef::new("  ").artifact_key(), NO_TASK_KEY);
    assert_eq!(TaskRef::new("/PR1").artifact_key(), NO_TASK_KEY);
}

#[test]
fn unsafe_task_keys_are_rejected() {
    for raw in ["..", ".", "../etc", "C:evil", "a\\b", "tab\there"] {
        assert_eq!(TaskRef::new(raw).key(), None, "{raw:?} should be rejected");
    }
}

// ── Session ids ─────────────────────────────────────────────────────────────

#[test]
fn session_ids_are_prefixed_and_unique() {
    let a = SessionId::generate();
    let b = SessionId::generate();
    assert!(a.as_str().starts_with("p_"));
    assert_eq!(a.as_str().len(), 2 + 32);
    assert_ne!(a, b);
}

#[test]
fn exit_info_success_requires_clean_exit() {
    let id = SessionId::from("p_x");
    let clean = ExitInfo {
        session_id: id.clone(),
        exit_code: Some(0),
        killed: false,
        reason: "exited".into(),
    };
    let killed = ExitInfo {
        killed: true,
        ..clean.clone()
    };
    assert!(clean.success());
    assert!(!killed.success());
}

// ── Run state ───────────────────────────────────────────────────────────────

#[test]
fn run_state_transitions() {
    assert!(RunState::Pending.can_transition_to(RunState::Running));
    assert!(RunState::Running.can_transition_to(RunState::Completed));
    assert!(RunState::Running.can_transition_to(RunState::Failed));
    assert!(!RunState::Pending.can_transition_to(RunState::Completed));
    assert!(!RunState::Completed.can_transition_to(RunState::Running));
}

fn sample_result() -> RunResult {
    RunResult {
        ok: true,
        provider: "claude".into(),
        artifacts_dir: PathBuf::from("artifacts/FEAT-1/2024-05-01T12-00-00.000Z"),
        changed: vec!["lib/b.ts".into(), "src/a.ts".into()],
        blocked: vec!["lib/b.ts".into()],
        revert_failures: Vec::new(),
        exit_code: 0,
    }
}

#[test]
fn run_result_serializes_snake_case_without_empty_failures() {
    let json = serde_json::to_value(sample_result()).expect("serialize");
    assert_eq!(json["artifacts_dir"], "artifacts/FEAT-1/2024-05-01T12-00-00.000Z");
    assert_eq!(json["blocked"][0], "lib/b.ts");
    assert!(json.get("revert_failures").is_none());
}

#[test]
fn run_result_state_follows_ok() {
    let mut result = sample_result();
    assert_eq!(result.state(), RunState::Completed);
    result.ok = false;
    result.revert_failures.push(RevertFailure {
        path: "lib/b.ts".into(),
        reason: "revert: locked".into(),
    });
    assert_eq!(result.state(), RunState::Failed);

    let json = serde_json::to_value(&result).expect("serialize");
    assert_eq!(json["revert_failures"][0]["path"], "lib/b.ts");
}

#[test]
fn stream_kind_displays_lowercase() {
    assert_eq!(StreamKind::Stdout.to_string(), "stdout");
    assert_eq!(
        serde_json::to_string(&StreamKind::Stderr).expect("serialize"),
        "\"stderr\""
    );
}
