//! Integration tests for the aexpy CLI
//!
//! Drives the binary end to end over temporary directories. Tests that need
//! a Python interpreter and the inspector binary return early without them.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use aexpy_core::extracting::{mark_private, resolve_aliases};
use aexpy_core::io::{read_product, write_product};
use aexpy_core::models::{
    ApiDescription, ApiDifference, ApiEntry, Distribution, FunctionEntry, ModuleEntry, Parameter, ParameterKind,
    ProduceState, Release, Report,
};
use serde_json::Value;
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

/// Get the path to the aexpy binary (built by cargo)
fn aexpy_binary() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_aexpy"));
    command.env_remove("AEXPY_GZIP").env_remove("AEXPY_PYTHON").env_remove("RUST_LOG");
    command
}

/// Run aexpy with the given args in the specified directory
fn run_aexpy(dir: &Path, args: &[&str]) -> Output {
    aexpy_binary()
        .current_dir(dir)
        .args(args)
        .output()
        .expect("Failed to execute aexpy command")
}

/// Run aexpy feeding `input` on stdin
fn run_aexpy_with_stdin(dir: &Path, args: &[&str], input: &[u8]) -> Output {
    let mut child = aexpy_binary()
        .current_dir(dir)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn aexpy command");
    child.stdin.take().unwrap().write_all(input).unwrap();
    child.wait_with_output().expect("Failed to wait for aexpy command")
}

/// Get stdout as string
fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Get stderr as string
fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

/// A small package with one module and one sub module
fn setup_sample_package(dir: &Path) -> PathBuf {
    let root = dir.join("demo-1.0");
    fs::create_dir_all(root.join("demo")).unwrap();
    fs::write(
        root.join("demo/__init__.py"),
        "from .core import run\n\n__all__ = [\"run\"]\n",
    )
    .unwrap();
    fs::write(
        root.join("demo/core.py"),
        "def run(x, retries=3):\n    return x\n\n\ndef _helper():\n    pass\n",
    )
    .unwrap();
    fs::write(root.join("setup.py"), "from setuptools import setup\nsetup()\n").unwrap();
    root
}

fn function(id: &str, params: &[(&str, bool)]) -> ApiEntry {
    let mut f = FunctionEntry::new(id);
    f.parameters = params
        .iter()
        .map(|(name, optional)| {
            let mut p = Parameter::new(ParameterKind::PositionalOrKeyword, *name);
            p.optional = *optional;
            p.source = id.to_string();
            p
        })
        .collect();
    f.into()
}

fn module(id: &str, members: &[&str]) -> ApiEntry {
    let mut m = ModuleEntry::new(id);
    for name in members {
        m.members.insert(name.to_string(), format!("{}.{}", id, name));
    }
    m.into()
}

fn description(version: &str, entries: Vec<ApiEntry>) -> ApiDescription {
    let dist = Distribution::new(Release::new("demo", version));
    let mut desc = ApiDescription::from_entries(dist, entries).unwrap();
    resolve_aliases(&mut desc);
    mark_private(&mut desc);
    desc.info.state = ProduceState::Success;
    desc
}

/// Old and new descriptions: `demo.g` is removed, `demo.f` gains a required parameter.
fn write_descriptions(dir: &Path) -> (PathBuf, PathBuf) {
    let old = description(
        "1.0",
        vec![
            module("demo", &["f", "g"]),
            function("demo.f", &[("x", false)]),
            function("demo.g", &[]),
        ],
    );
    let new = description(
        "2.0",
        vec![module("demo", &["f"]), function("demo.f", &[("x", false), ("y", false)])],
    );
    let old_path = dir.join("api1.json");
    let new_path = dir.join("api2.json");
    write_product(&old_path, &old, false).unwrap();
    write_product(&new_path, &new, false).unwrap();
    (old_path, new_path)
}

// ============================================================================
// General
// ============================================================================

#[test]
fn test_help_lists_stages() {
    let dir = TempDir::new().unwrap();
    let output = run_aexpy(dir.path(), &["--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    for stage in ["preprocess", "extract", "diff", "report", "view"] {
        assert!(text.contains(stage), "missing {} in help:\n{}", stage, text);
    }
}

#[test]
fn test_unknown_command_fails() {
    let dir = TempDir::new().unwrap();
    let output = run_aexpy(dir.path(), &["compress"]);
    assert!(!output.status.success());
}

// ============================================================================
// Preprocess
// ============================================================================

#[test]
fn test_preprocess_writes_distribution() {
    let dir = TempDir::new().unwrap();
    let root = setup_sample_package(dir.path());

    let output = run_aexpy(
        dir.path(),
        &["preprocess", root.to_str().unwrap(), "dist.json", "-r", "demo@1.0", "-p", "3.11"],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let dist = read_json(&dir.path().join("dist.json"));
    assert_eq!(dist["release"]["project"], "demo");
    assert_eq!(dist["release"]["version"], "1.0");
    assert_eq!(dist["topModules"], serde_json::json!(["demo"]));
    assert_eq!(dist["pyversion"], "3.11");
    assert_eq!(dist["fileCount"], 3);
    assert_eq!(dist["state"], 1);
    assert!(dist["producer"].as_str().unwrap().contains("counter"));
}

#[test]
fn test_preprocess_to_stdout() {
    let dir = TempDir::new().unwrap();
    let root = setup_sample_package(dir.path());

    let output = run_aexpy(dir.path(), &["preprocess", root.to_str().unwrap(), "-", "-m", "demo"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let dist: Distribution = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(dist.release, Release::new("demo-1.0", "unknown"));
    assert_eq!(dist.top_modules, vec!["demo"]);
}

#[test]
fn test_preprocess_missing_directory_fails() {
    let dir = TempDir::new().unwrap();

    let output = run_aexpy(dir.path(), &["preprocess", "nowhere", "dist.json", "-r", "demo@1.0"]);
    assert_eq!(output.status.code(), Some(1));

    // the failed product is still written
    let dist: Distribution = read_product(&dir.path().join("dist.json")).unwrap();
    assert_eq!(dist.info.state, ProduceState::Failure);
}

#[test]
fn test_preprocess_rejects_bad_release() {
    let dir = TempDir::new().unwrap();
    let root = setup_sample_package(dir.path());
    let output = run_aexpy(dir.path(), &["preprocess", root.to_str().unwrap(), "-", "-r", "demo"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("project@version"));
}

// ============================================================================
// Extract
// ============================================================================

#[test]
fn test_extract_without_inspector_fails() {
    let dir = TempDir::new().unwrap();
    let root = setup_sample_package(dir.path());
    let prep = run_aexpy(dir.path(), &["preprocess", root.to_str().unwrap(), "dist.json", "-r", "demo@1.0"]);
    assert!(prep.status.success());

    let output = run_aexpy(
        dir.path(),
        &["extract", "dist.json", "api.json", "--inspector", "/nonexistent/aexpy-inspect"],
    );
    assert_eq!(output.status.code(), Some(1));
    let api: ApiDescription = read_product(&dir.path().join("api.json")).unwrap();
    assert_eq!(api.info.state, ProduceState::Failure);
    assert!(api.info.producer.contains("inspector!"));
}

#[test]
fn test_extract_refuses_failed_distribution() {
    let dir = TempDir::new().unwrap();
    let mut dist = Distribution::new(Release::new("demo", "1.0"));
    dist.info.state = ProduceState::Failure;
    write_product(&dir.path().join("dist.json"), &dist, false).unwrap();

    let output = run_aexpy(dir.path(), &["extract", "dist.json", "api.json"]);
    assert_eq!(output.status.code(), Some(1));
}

fn inspector_binary() -> Option<PathBuf> {
    let aexpy = PathBuf::from(env!("CARGO_BIN_EXE_aexpy"));
    let inspector = aexpy.with_file_name(format!("aexpy-inspect{}", std::env::consts::EXE_SUFFIX));
    inspector.is_file().then_some(inspector)
}

#[test]
fn test_extract_and_diff_real_package() {
    if !aexpy_core::environment::python_available("python3") {
        eprintln!("python3 not available, skipping");
        return;
    }
    let Some(inspector) = inspector_binary() else {
        eprintln!("aexpy-inspect not built, skipping");
        return;
    };
    let dir = TempDir::new().unwrap();
    let old_root = setup_sample_package(dir.path());
    let new_root = dir.path().join("demo-2.0");
    fs::create_dir_all(new_root.join("demo")).unwrap();
    fs::write(new_root.join("demo/__init__.py"), "from .core import run\n\n__all__ = [\"run\"]\n").unwrap();
    fs::write(new_root.join("demo/core.py"), "def run(x, retries):\n    return x\n").unwrap();

    let inspector = inspector.to_str().unwrap();
    for (root, release, dist, api) in [
        (&old_root, "demo@1.0", "d1.json", "a1.json"),
        (&new_root, "demo@2.0", "d2.json", "a2.json"),
    ] {
        let output = run_aexpy(dir.path(), &["preprocess", root.to_str().unwrap(), dist, "-r", release]);
        assert!(output.status.success(), "stderr: {}", stderr(&output));
        let output = run_aexpy(dir.path(), &["extract", dist, api, "--inspector", inspector]);
        assert!(output.status.success(), "stderr: {}", stderr(&output));
    }

    let output = run_aexpy(dir.path(), &["diff", "a1.json", "a2.json", "diff.json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let difference: ApiDifference = read_product(&dir.path().join("diff.json")).unwrap();
    assert!(!difference.kind("ChangeParameterOptional").is_empty());
}

// ============================================================================
// Diff, report, view
// ============================================================================

#[test]
fn test_diff_report_view_pipeline() {
    let dir = TempDir::new().unwrap();
    write_descriptions(dir.path());

    let output = run_aexpy(dir.path(), &["diff", "api1.json", "api2.json", "diff.json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let difference: ApiDifference = read_product(&dir.path().join("diff.json")).unwrap();
    assert_eq!(difference.info.state, ProduceState::Success);
    assert_eq!(difference.kind("RemoveFunction").len(), 1);
    let added = difference.kind("AddParameter");
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].data_str("new"), Some("y"));

    let output = run_aexpy(dir.path(), &["report", "diff.json", "report.json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let report: Report = read_product(&dir.path().join("report.json")).unwrap();
    assert!(report.content.contains("Breakings"));
    assert!(report.content.contains("Remove function"));

    let output = run_aexpy(dir.path(), &["view", "report.json"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("demo@1.0:2.0"));
    assert!(text.contains("Remove function"));

    let output = run_aexpy(dir.path(), &["view", "diff.json", "--rank", "all"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("RemoveFunction"));
    assert!(text.contains("AddParameter"));
}

#[test]
fn test_view_json_format() {
    let dir = TempDir::new().unwrap();
    write_descriptions(dir.path());

    let output = run_aexpy(dir.path(), &["view", "api1.json", "--format", "json"]);
    assert!(output.status.success());
    let value: Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(value["distribution"]["release"]["version"], "1.0");
    assert!(value["entries"]["demo.f"].is_object());
}

#[test]
fn test_view_reads_stdin() {
    let dir = TempDir::new().unwrap();
    let (old, _) = write_descriptions(dir.path());

    let output = run_aexpy_with_stdin(dir.path(), &["view", "-"], &fs::read(old).unwrap());
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("demo@1.0"));
    assert!(text.contains("Functions: 2"));
}

#[test]
fn test_diff_identical_descriptions_is_compatible() {
    let dir = TempDir::new().unwrap();
    write_descriptions(dir.path());

    let output = run_aexpy(dir.path(), &["diff", "api1.json", "api1.json", "-"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let difference: ApiDifference = serde_json::from_str(&stdout(&output)).unwrap();
    assert!(difference.entries.is_empty());
}

#[test]
fn test_diff_refuses_failed_description() {
    let dir = TempDir::new().unwrap();
    let (old, _) = write_descriptions(dir.path());
    let mut broken = description("2.0", vec![module("demo", &[])]);
    broken.info.state = ProduceState::Failure;
    write_product(&dir.path().join("broken.json"), &broken, false).unwrap();

    let output = run_aexpy(dir.path(), &["diff", old.to_str().unwrap(), "broken.json", "diff.json"]);
    assert_eq!(output.status.code(), Some(1));
    let difference: ApiDifference = read_product(&dir.path().join("diff.json")).unwrap();
    assert_eq!(difference.info.state, ProduceState::Failure);
}

#[test]
fn test_diff_rejects_two_stdin_inputs() {
    let dir = TempDir::new().unwrap();
    let output = run_aexpy(dir.path(), &["diff", "-", "-"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("stdin"));
}

#[test]
fn test_missing_input_fails() {
    let dir = TempDir::new().unwrap();
    let output = run_aexpy(dir.path(), &["report", "missing.json", "-"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("missing.json"));
}

// ============================================================================
// Gzip and cache
// ============================================================================

#[test]
fn test_gzip_round_trip() {
    let dir = TempDir::new().unwrap();
    write_descriptions(dir.path());

    let output = run_aexpy(dir.path(), &["-z", "diff", "api1.json", "api2.json", "diff.json.gz"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let bytes = fs::read(dir.path().join("diff.json.gz")).unwrap();
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);

    // gzip input is detected without a flag
    let output = run_aexpy(dir.path(), &["report", "diff.json.gz", "report.json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(read_json(&dir.path().join("report.json"))["content"].is_string());
}

#[test]
fn test_gzip_from_environment() {
    let dir = TempDir::new().unwrap();
    write_descriptions(dir.path());

    let output = aexpy_binary()
        .current_dir(dir.path())
        .env("AEXPY_GZIP", "1")
        .args(["diff", "api1.json", "api2.json", "diff.gz"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let bytes = fs::read(dir.path().join("diff.gz")).unwrap();
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
}

#[test]
fn test_cache_stores_product_and_log() {
    let dir = TempDir::new().unwrap();
    write_descriptions(dir.path());
    fs::write(dir.path().join(".aexpyrc.toml"), "[cache]\nenabled = true\ndirectory = \"cache\"\n").unwrap();

    let output = run_aexpy(dir.path(), &["diff", "api1.json", "api2.json", "diff.json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let cached = dir.path().join("cache/diff/demo@1.0_2.0.json");
    assert!(cached.is_file());
    let log = fs::read_to_string(dir.path().join("cache/diff/demo@1.0_2.0.log")).unwrap();
    assert!(log.contains("Start producing."));

    // a second run reuses the cached product
    let output = run_aexpy(dir.path(), &["diff", "api1.json", "api2.json", "again.json"]);
    assert!(output.status.success());
    assert!(stderr(&output).contains("cached"));
    assert_eq!(read_json(&dir.path().join("again.json")), read_json(&cached));

    let output = run_aexpy(dir.path(), &["--force", "diff", "api1.json", "api2.json", "forced.json"]);
    assert!(output.status.success());
    assert!(!stderr(&output).contains("cached"));
}
