//! CLI integration tests for the treesweeper binary
//!
//! These tests run the compiled binary against documents and edit scripts
//! written to a temp directory.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Get a Command instance for the treesweeper binary
#[allow(deprecated)]
fn treesweeper_cmd() -> Command {
    Command::cargo_bin("treesweeper").expect("Failed to find treesweeper binary")
}

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("Failed to write fixture");
    path
}

// ============================================================================
// check
// ============================================================================

#[test]
fn test_check_clean_document() {
    let dir = TempDir::new().unwrap();
    let doc = write(&dir, "doc.json", r#"{ "a": true, "list": [1, 2, { "b": null }] }"#);

    treesweeper_cmd()
        .args(["check", "--no-color"])
        .arg(&doc)
        .assert()
        .success()
        .stdout(predicate::str::contains("No issues found"));
}

#[test]
fn test_check_reports_type_change_from_ops() {
    let dir = TempDir::new().unwrap();
    let doc = write(&dir, "doc.json", r#"{ "a": true }"#);
    let ops = write(
        &dir,
        "ops.json",
        r#"[ { "op": "assign", "path": ["a"], "value": "string" } ]"#,
    );

    treesweeper_cmd()
        .args(["check", "--no-color"])
        .arg(&doc)
        .arg("--ops")
        .arg(&ops)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("primitiveToPrimitive"))
        .stdout(predicate::str::contains("1 issue (1 primitiveToPrimitive)"));
}

#[test]
fn test_check_json_output() {
    let dir = TempDir::new().unwrap();
    let doc = write(&dir, "doc.json", r#"{ "a": { "b": [1] } }"#);
    let ops = write(
        &dir,
        "ops.json",
        r#"[ { "op": "injectRaw", "path": ["a", "b"], "key": 0, "value": 5 } ]"#,
    );

    let output = treesweeper_cmd()
        .args(["check", "--format", "json"])
        .arg(&doc)
        .arg("--ops")
        .arg(&ops)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let issues: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let issues = issues.as_array().unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0]["kind"], "keyInjection");
    assert_eq!(issues[0]["chain"], serde_json::json!(["a", "b", 0]));
}

#[test]
fn test_check_reports_in_document_key_order() {
    let dir = TempDir::new().unwrap();
    let doc = write(&dir, "doc.json", r#"{ "zeta": 1, "alpha": 2 }"#);
    let ops = write(
        &dir,
        "ops.json",
        r#"[
            { "op": "injectRaw", "key": "zeta", "value": 1 },
            { "op": "injectRaw", "key": "alpha", "value": 2 }
        ]"#,
    );

    let output = treesweeper_cmd()
        .args(["check", "--format", "json"])
        .arg(&doc)
        .arg("--ops")
        .arg(&ops)
        .output()
        .unwrap();

    let issues: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let chains: Vec<&serde_json::Value> = issues
        .as_array()
        .unwrap()
        .iter()
        .map(|issue| &issue["chain"])
        .collect();
    // First injection reports zeta, the second reports both keys in order
    assert_eq!(
        chains,
        [
            &serde_json::json!(["zeta"]),
            &serde_json::json!(["zeta"]),
            &serde_json::json!(["alpha"])
        ]
    );
}

#[test]
fn test_check_disable_all_suppresses_findings() {
    let dir = TempDir::new().unwrap();
    let doc = write(&dir, "doc.json", r#"{ "a": 1 }"#);
    let ops = write(&dir, "ops.json", r#"[ { "op": "assign", "path": ["a"], "value": null } ]"#);

    treesweeper_cmd()
        .args(["check", "--no-color", "--disable-all"])
        .arg(&doc)
        .arg("--ops")
        .arg(&ops)
        .assert()
        .success();
}

#[test]
fn test_check_with_config_file() {
    let dir = TempDir::new().unwrap();
    let doc = write(&dir, "doc.json", r#"{ "a": 1 }"#);
    let ops = write(&dir, "ops.json", r#"[ { "op": "assign", "path": ["a"], "value": "x" } ]"#);
    let config = write(
        &dir,
        "sweeper.toml",
        "[checks]\ntype_change = [\"primitiveToNull\"]\n",
    );

    treesweeper_cmd()
        .args(["check", "--no-color"])
        .arg(&doc)
        .arg("--ops")
        .arg(&ops)
        .arg("--config")
        .arg(&config)
        .assert()
        .success();
}

#[test]
fn test_check_unknown_kind_fails() {
    let dir = TempDir::new().unwrap();
    let doc = write(&dir, "doc.json", "{}");

    treesweeper_cmd()
        .args(["check", "--enable", "noSuchCheck"])
        .arg(&doc)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown issue kind: noSuchCheck"));
}

#[test]
fn test_check_type_change_kind_rejects_mode() {
    let dir = TempDir::new().unwrap();
    let doc = write(&dir, "doc.json", "{}");

    treesweeper_cmd()
        .args(["check", "--enable", "primitiveToNull:reactive"])
        .arg(&doc)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("does not accept reactive"));
}

#[test]
fn test_check_bad_path_in_ops_fails() {
    let dir = TempDir::new().unwrap();
    let doc = write(&dir, "doc.json", r#"{ "a": 1 }"#);
    let ops = write(&dir, "ops.json", r#"[ { "op": "assign", "path": ["zz"], "value": 2 } ]"#);

    treesweeper_cmd()
        .args(["check"])
        .arg(&doc)
        .arg("--ops")
        .arg(&ops)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No node at path"));
}

#[test]
fn test_check_rejects_huge_array_index() {
    let dir = TempDir::new().unwrap();
    let doc = write(&dir, "doc.json", r#"{ "list": [1] }"#);
    let ops = write(
        &dir,
        "ops.json",
        r#"[ { "op": "set", "path": ["list"], "key": 1000000000000, "value": 0 } ]"#,
    );

    treesweeper_cmd()
        .args(["check"])
        .arg(&doc)
        .arg("--ops")
        .arg(&ops)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("holes"));
}

#[test]
fn test_check_all_checks_on_clean_document() {
    let dir = TempDir::new().unwrap();
    let doc = write(&dir, "doc.json", r#"{ "a": 1, "list": [true, { "b": "s" }] }"#);
    let ops = write(&dir, "ops.json", r#"[ { "op": "push", "path": ["list"], "value": 3 } ]"#);

    treesweeper_cmd()
        .args(["check", "--no-color", "--all-checks"])
        .arg(&doc)
        .arg("--ops")
        .arg(&ops)
        .assert()
        .success()
        .stdout(predicate::str::contains("No issues found"));
}

#[test]
fn test_check_all_checks_conflicts_with_config() {
    let dir = TempDir::new().unwrap();
    let doc = write(&dir, "doc.json", "{}");
    let config = write(&dir, "sweeper.toml", "[checks]\n");

    treesweeper_cmd()
        .args(["check", "--all-checks", "--config"])
        .arg(&config)
        .arg(&doc)
        .assert()
        .failure();
}

#[test]
fn test_check_missing_file_fails() {
    treesweeper_cmd()
        .args(["check", "/nonexistent/doc.json"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to read"));
}

// ============================================================================
// config
// ============================================================================

#[test]
fn test_config_prints_all_checks() {
    let output = treesweeper_cmd()
        .args(["config", "--all-checks"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: toml::Value = toml::from_str(&String::from_utf8_lossy(&output.stdout)).unwrap();
    let checks = &parsed["checks"];
    assert_eq!(checks["type_change"].as_array().unwrap().len(), 4);
    assert_eq!(checks["reactive"].as_array().unwrap().len(), 5);
    assert_eq!(
        checks["on_demand"].as_array().unwrap(),
        &vec![toml::Value::from("rootMismatch")]
    );
}

#[test]
fn test_config_applies_environment_override() {
    let dir = TempDir::new().unwrap();
    let config = write(
        &dir,
        "sweeper.toml",
        "[checks]\nreactive = [\"keyInjection\"]\n",
    );

    let output = treesweeper_cmd()
        .args(["config", "--config"])
        .arg(&config)
        .env("TREESWEEPER__CHECKS__REACTIVE", "keyMismatch,valueTypeMismatch")
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: toml::Value = toml::from_str(&String::from_utf8_lossy(&output.stdout)).unwrap();
    assert_eq!(
        parsed["checks"]["reactive"].as_array().unwrap(),
        &vec![
            toml::Value::from("keyMismatch"),
            toml::Value::from("valueTypeMismatch")
        ]
    );
}

#[test]
fn test_config_output_loads_back() {
    let dir = TempDir::new().unwrap();
    let output = treesweeper_cmd().arg("config").output().unwrap();
    assert!(output.status.success());
    let printed = String::from_utf8_lossy(&output.stdout).into_owned();
    let config = write(&dir, "sweeper.toml", &printed);

    let reloaded = treesweeper_cmd()
        .args(["config", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(reloaded.status.success());
    assert_eq!(String::from_utf8_lossy(&reloaded.stdout), printed);
}

// ============================================================================
// kinds
// ============================================================================

#[test]
fn test_kinds_lists_catalog() {
    let output = treesweeper_cmd().arg("kinds").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in [
        "keyInjection",
        "keyMismatch",
        "undefinedNodeNotOnArrayParent",
        "valueTypeMismatch",
        "parentNotObjectOrArray",
        "rootMismatch",
        "primitiveToPrimitive",
        "primitiveToObject",
        "primitiveToArray",
        "primitiveToNull",
    ] {
        assert!(stdout.contains(name), "missing {name}");
    }
}

#[test]
fn test_version_flag() {
    treesweeper_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
