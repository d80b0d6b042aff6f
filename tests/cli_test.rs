//! CLI contract tests
//!
//! Drives the built binary: `scan` prints a JSON report on stdout, logs stay
//! on stderr, `--fail-on-findings` sets the exit code, and `compile` writes
//! both caches.

use std::path::{Path, PathBuf};
use std::process::Command;

fn pkgaudit_bin() -> &'static str {
    env!("CARGO_BIN_EXE_pkgaudit")
}

fn resources() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("resources/forbidden_patterns")
}

/// Run the binary inside `cwd` so no stray pkgaudit.toml is picked up
fn run_pkgaudit(cwd: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(pkgaudit_bin())
        .args(args)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute pkgaudit binary");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}

fn setup_package() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let pkg = dir.path().join("pkg");
    std::fs::create_dir_all(pkg.join("lib")).expect("Failed to create package dir");
    std::fs::write(
        pkg.join("setup.py"),
        "import base64\nURL = 'https://malicious-domain.test/p'\nexec(base64.b64decode(URL))\n",
    )
    .expect("Failed to write setup.py");
    std::fs::write(pkg.join("lib/util.py"), "def add(a, b):\n    return a + b\n")
        .expect("Failed to write util.py");
    std::fs::write(dir.path().join("blacklist.txt"), "malicious-domain.test\n")
        .expect("Failed to write blacklist");
    dir
}

fn cache_args(dir: &Path) -> Vec<String> {
    vec![
        "--automaton-cache".to_string(),
        dir.join("cache/automaton.bin").display().to_string(),
        "--bundle".to_string(),
        dir.join("cache/forbidden.bin").display().to_string(),
    ]
}

#[test]
fn test_scan_prints_json_report() {
    let dir = setup_package();
    let samples = resources();
    let mut args = vec![
        "--log-level".to_string(),
        "warn".to_string(),
        "scan".to_string(),
        "pkg".to_string(),
        "--blacklist".to_string(),
        "blacklist.txt".to_string(),
        "--samples".to_string(),
        samples.display().to_string(),
    ];
    args.extend(cache_args(dir.path()));
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let (stdout, stderr, code) = run_pkgaudit(dir.path(), &args);
    assert_eq!(code, 0, "stderr: {}", stderr);

    let report: serde_json::Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("stdout should be JSON ({e}): {stdout}"));
    assert_eq!(report["summary"]["files_scanned"], 2);
    assert_eq!(report["summary"]["text_matches"], 1);

    let findings = report["findings"].as_array().expect("findings array");
    let text = findings
        .iter()
        .find(|f| f["kind"] == "text")
        .expect("a text finding");
    assert_eq!(text["pattern"], "malicious-domain.test");
    assert_eq!(text["offset"], 29);

    assert!(
        findings
            .iter()
            .any(|f| f["kind"] == "structural" && f["pattern_name"] == "exec_b64"),
        "expected exec_b64 structural finding: {stdout}"
    );
}

#[test]
fn test_fail_on_findings_sets_exit_code() {
    let dir = setup_package();
    let mut args = vec![
        "scan".to_string(),
        "pkg".to_string(),
        "--blacklist".to_string(),
        "blacklist.txt".to_string(),
        "--fail-on-findings".to_string(),
    ];
    args.extend(cache_args(dir.path()));
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let (_, stderr, code) = run_pkgaudit(dir.path(), &args);
    assert_eq!(code, 1, "stderr: {}", stderr);
}

#[test]
fn test_clean_package_exits_zero_with_fail_on_findings() {
    let dir = setup_package();
    let mut args = vec![
        "scan".to_string(),
        "pkg/lib".to_string(),
        "--blacklist".to_string(),
        "blacklist.txt".to_string(),
        "--fail-on-findings".to_string(),
    ];
    args.extend(cache_args(dir.path()));
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let (stdout, stderr, code) = run_pkgaudit(dir.path(), &args);
    assert_eq!(code, 0, "stderr: {}", stderr);
    let report: serde_json::Value = serde_json::from_str(&stdout).expect("stdout should be JSON");
    assert!(report["findings"].as_array().is_some_and(|f| f.is_empty()));
}

#[test]
fn test_compile_writes_caches() {
    let dir = setup_package();
    let samples = resources();
    let mut args = vec![
        "compile".to_string(),
        "--blacklist".to_string(),
        "blacklist.txt".to_string(),
        "--samples".to_string(),
        samples.display().to_string(),
    ];
    args.extend(cache_args(dir.path()));
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let (stdout, stderr, code) = run_pkgaudit(dir.path(), &args);
    assert_eq!(code, 0, "stderr: {}", stderr);
    assert!(stdout.contains("automaton: 1 patterns"), "stdout: {}", stdout);
    assert!(dir.path().join("cache/automaton.bin").is_file());
    assert!(dir.path().join("cache/forbidden.bin").is_file());
}

#[test]
fn test_failed_compile_removes_previous_bundle() {
    let dir = setup_package();
    let samples = dir.path().join("bad-samples");
    std::fs::create_dir_all(&samples).expect("Failed to create samples dir");
    std::fs::write(samples.join("broken.py"), "def broken(:\n").expect("Failed to write sample");
    let bundle = dir.path().join("cache/forbidden.bin");
    std::fs::create_dir_all(dir.path().join("cache")).expect("Failed to create cache dir");
    std::fs::write(&bundle, b"older bundle").expect("Failed to write bundle");

    let mut args = vec![
        "compile".to_string(),
        "--samples".to_string(),
        samples.display().to_string(),
    ];
    args.extend(cache_args(dir.path()));
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let (_, stderr, code) = run_pkgaudit(dir.path(), &args);
    assert_ne!(code, 0);
    assert!(stderr.contains("No usable samples"), "stderr: {}", stderr);
    assert!(!bundle.exists());
}

#[test]
fn test_scan_reports_typosquatted_name() {
    let dir = setup_package();
    std::fs::write(
        dir.path().join("pkg/PKG-INFO"),
        "Metadata-Version: 2.1\nName: reqeusts\nVersion: 0.0.1\n",
    )
    .expect("Failed to write PKG-INFO");
    std::fs::write(
        dir.path().join("top.json"),
        r#"{"rows": [{"project": "requests"}, {"project": "urllib3"}]}"#,
    )
    .expect("Failed to write popular list");

    let mut args = vec![
        "scan".to_string(),
        "pkg".to_string(),
        "--popular-packages".to_string(),
        "top.json".to_string(),
    ];
    args.extend(cache_args(dir.path()));
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let (stdout, stderr, code) = run_pkgaudit(dir.path(), &args);
    assert_eq!(code, 0, "stderr: {}", stderr);
    let report: serde_json::Value = serde_json::from_str(&stdout).expect("stdout should be JSON");
    assert_eq!(report["summary"]["typosquat_matches"], 1);
    let finding = report["findings"]
        .as_array()
        .and_then(|f| f.iter().find(|f| f["kind"] == "typosquat"))
        .expect("a typosquat finding");
    assert_eq!(finding["package"], "reqeusts");
    assert_eq!(finding["similar_to"], "requests");
}

#[test]
fn test_compile_without_inputs_fails() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let (_, _, code) = run_pkgaudit(dir.path(), &["compile"]);
    assert_ne!(code, 0);
}

#[test]
fn test_scan_missing_path_fails() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let (_, stderr, code) = run_pkgaudit(dir.path(), &["scan", "does-not-exist"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("does-not-exist"), "stderr: {}", stderr);
}
