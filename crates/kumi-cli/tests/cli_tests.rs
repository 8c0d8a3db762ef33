//! End-to-end tests of the `kumi` binary against workspaces on disk.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn write_member(root: &Path, name: &str, deps: &[&str]) {
    let dir = root.join("packages").join(name);
    fs::create_dir_all(&dir).unwrap();
    let deps: Vec<String> = deps.iter().map(|d| format!("\"{d}\"")).collect();
    fs::write(
        dir.join("pyproject.toml"),
        format!(
            "[project]\nname = \"{name}\"\nversion = \"0.3.0\"\ndependencies = [{}]\n",
            deps.join(", ")
        ),
    )
    .unwrap();
}

/// `cli -> api -> core` with a couple of scripts.
fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("kumi.toml"),
        r#"
[env]
GREETING = "hello"

[scripts]
hello = 'echo "$GREETING from $KUMI_PACKAGE_NAME"'

[scripts.shout]
run = 'echo "$GREETING"'
scope = "core"
env = { GREETING = "HELLO" }
"#,
    )
    .unwrap();
    write_member(dir.path(), "core", &[]);
    write_member(dir.path(), "api", &["core"]);
    write_member(dir.path(), "cli", &["api"]);
    dir
}

fn kumi(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_kumi"))
        .arg("-C")
        .arg(dir)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run kumi")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ============================================================================
// Inspection
// ============================================================================

#[test]
fn list_prints_members() {
    let ws = workspace();
    let out = kumi(ws.path(), &["list"]);

    assert!(out.status.success(), "{}", stderr(&out));
    let lines: Vec<String> = stdout(&out).lines().map(|l| l.split_whitespace().collect::<Vec<_>>().join(" ")).collect();
    assert_eq!(
        lines,
        [
            "api 0.3.0 packages/api",
            "cli 0.3.0 packages/cli",
            "core 0.3.0 packages/core",
        ]
    );
}

#[test]
fn list_json_is_machine_readable() {
    let ws = workspace();
    let out = kumi(ws.path(), &["list", "--json", "--scope", "c*"]);

    assert!(out.status.success(), "{}", stderr(&out));
    let rows: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    let names: Vec<&str> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["cli", "core"]);
    assert_eq!(rows[0]["dependencies"], serde_json::json!(["api"]));
}

#[test]
fn graph_prints_layers() {
    let ws = workspace();
    let out = kumi(ws.path(), &["graph"]);

    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "0: core\n1: api\n2: cli\n");
}

#[test]
fn cyclic_graph_exits_2() {
    let ws = workspace();
    write_member(ws.path(), "core", &["cli"]);

    let out = kumi(ws.path(), &["exec", "--", "touch", "ran"]);

    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("dependency cycle detected"), "{}", stderr(&out));
    assert!(!ws.path().join("packages/core/ran").exists());
}

#[test]
fn missing_workspace_exits_1() {
    let dir = TempDir::new().unwrap();
    let out = kumi(dir.path(), &["list"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("no kumi.toml"), "{}", stderr(&out));
}

// ============================================================================
// Execution
// ============================================================================

#[test]
fn exec_prefixes_output_and_summarizes() {
    let ws = workspace();
    let out = kumi(ws.path(), &["exec", "-j", "2", "--", "echo", "hi"]);

    assert!(out.status.success(), "{}", stderr(&out));
    let mut lines: Vec<String> = stdout(&out).lines().map(String::from).collect();
    lines.sort();
    assert_eq!(lines, ["[api] hi", "[cli] hi", "[core] hi"]);
    assert!(stderr(&out).contains("0 failed, 3 passed"), "{}", stderr(&out));
}

#[test]
fn exec_keeps_arguments_with_spaces_intact() {
    let ws = workspace();
    let out = kumi(
        ws.path(),
        &["exec", "--scope", "core", "--", "printf", "%s|", "a b", "c"],
    );

    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "[core] a b|c|\n");
}

#[test]
fn failing_package_exits_1() {
    let ws = workspace();
    let out = kumi(
        ws.path(),
        &["exec", "--", r#"test "$KUMI_PACKAGE_NAME" != api"#],
    );

    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("1 failed, 2 passed"), "{err}");
    assert!(err.contains("failed: api"), "{err}");
}

#[test]
fn fail_fast_topological_cancels_dependents() {
    let ws = workspace();
    let out = kumi(
        ws.path(),
        &["exec", "--topological", "--fail-fast", "--", "exit 1"],
    );

    assert_eq!(out.status.code(), Some(1));
    assert!(
        stderr(&out).contains("1 failed, 0 passed, 2 cancelled"),
        "{}",
        stderr(&out)
    );
}

#[test]
fn run_script_layers_workspace_env() {
    let ws = workspace();
    let out = kumi(ws.path(), &["run", "hello", "--scope", "api"]);

    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "[api] hello from api\n");
}

#[test]
fn run_script_uses_its_own_scope_and_env() {
    let ws = workspace();
    let out = kumi(ws.path(), &["run", "shout"]);

    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "[core] HELLO\n");
}

#[test]
fn unknown_script_lists_available() {
    let ws = workspace();
    let out = kumi(ws.path(), &["run", "deploy"]);

    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("available: hello, shout"), "{}", stderr(&out));
}

#[test]
fn unknown_scope_selects_nothing() {
    let ws = workspace();
    let out = kumi(ws.path(), &["exec", "--scope", "nope", "--", "true"]);

    assert!(out.status.success());
    assert!(stderr(&out).contains("no packages selected"));
}

#[test]
fn timeout_is_reported() {
    let ws = workspace();
    let out = kumi(
        ws.path(),
        &["exec", "--scope", "core", "--timeout", "1", "--", "sleep", "10"],
    );

    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("[core] command timed out after 1000ms"), "{}", stderr(&out));
}

// ============================================================================
// Clean
// ============================================================================

#[test]
fn clean_dry_run_then_clean() {
    let ws = workspace();
    let core = ws.path().join("packages/core");
    fs::create_dir_all(core.join("__pycache__")).unwrap();
    fs::write(core.join("__pycache__/mod.cpython-312.pyc"), [0u8; 512]).unwrap();
    fs::create_dir_all(core.join(".venv/lib")).unwrap();
    fs::write(core.join(".venv/lib/cached.pyc"), "keep").unwrap();
    fs::create_dir_all(ws.path().join("packages/api/dist")).unwrap();

    let out = kumi(ws.path(), &["clean", "--dry-run", "--scope", "core"]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(
        stdout(&out),
        "would remove packages/core/__pycache__/\nWould clean 0 files, 1 directories (0.5 KB)\n"
    );
    assert!(core.join("__pycache__").exists());

    let out = kumi(ws.path(), &["clean", "--json"]);
    assert!(out.status.success(), "{}", stderr(&out));
    let report: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(report["dirs_removed"], 2);
    assert_eq!(report["packages_cleaned"], serde_json::json!(["api", "core"]));
    assert!(!core.join("__pycache__").exists());
    assert!(!ws.path().join("packages/api/dist").exists());
    assert!(core.join(".venv/lib/cached.pyc").exists());
}
