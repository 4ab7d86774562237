//! Unit tests for the provider registry loader.

use std::fs;
use std::path::Path;

use aidash_sandbox::providers::{ProviderRegistry, DEFAULT_PROVIDER, PROVIDERS_PATH};

fn write_registry(workdir: &Path, json: &str) {
    let path = workdir.join(PROVIDERS_PATH);
    fs::create_dir_all(path.parent().expect("parent")).expect("create config dir");
    fs::write(path, json).expect("write providers.json");
}

#[test]
fn missing_registry_falls_back_to_default_provider() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = ProviderRegistry::load(dir.path());

    let resolved = registry.resolve(None);
    assert_eq!(resolved.name, DEFAULT_PROVIDER);
    assert_eq!(resolved.command, DEFAULT_PROVIDER);
}

#[test]
fn registry_default_and_cli_are_used() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_registry(
        dir.path(),
        r#"{
            "default": "codex",
            "providers": [
                {"name": "codex", "cli": "codex exec --full-auto", "model": "o4"},
                {"name": "claude", "cli": "claude -p"}
            ]
        }"#,
    );
    let registry = ProviderRegistry::load(dir.path());

    let resolved = registry.resolve(None);
    assert_eq!(resolved.name, "codex");
    assert_eq!(resolved.command, "codex exec --full-auto");

    let resolved = registry.resolve(Some("claude"));
    assert_eq!(resolved.command, "claude -p");
}

#[test]
fn unknown_key_is_its_own_command() {
    let registry = ProviderRegistry::default();
    let resolved = registry.resolve(Some("gemini"));
    assert_eq!(resolved.name, "gemini");
    assert_eq!(resolved.command, "gemini");
}

#[test]
fn entry_without_cli_uses_its_name() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_registry(dir.path(), r#"{"providers": [{"name": "aider"}]}"#);

    let resolved = ProviderRegistry::load(dir.path()).resolve(Some("aider"));
    assert_eq!(resolved.command, "aider");
}

#[test]
fn blank_request_selects_default() {
    let registry = ProviderRegistry::default();
    assert_eq!(registry.resolve(Some("   ")).name, DEFAULT_PROVIDER);
}

#[test]
fn malformed_registry_degrades_to_default() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_registry(dir.path(), "{ not json");

    assert_eq!(ProviderRegistry::load(dir.path()), ProviderRegistry::default());
}
