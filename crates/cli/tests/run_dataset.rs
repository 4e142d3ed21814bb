use std::fs;
use std::path::Path;
use std::process::Command;

use predicates::prelude::*;
use tempfile::tempdir;

const PROGRAM: &str = "#include <stdio.h>\n\nint helper(int x) {\n    return x + 1;\n}\n\nint main_0(void) {\n    printf(\"%d\\n\", helper(1));\n    return 0;\n}\n";

const SNAPSHOT: &str = r#"[
  {"name": "helper", "filename": "prog.c", "startLine": 3, "startCol": 1, "endLine": 5, "endCol": 1, "calledFunctions": []},
  {"name": "main_0", "filename": "prog.c", "startLine": 7, "startCol": 1, "endLine": 10, "endCol": 1, "calledFunctions": ["printf", "helper"]}
]"#;

/// Builds a shell-script "executable" instead of invoking cargo.
const CONFIG: &str = r#"attempts: 1
toolchain:
  build_command: "mkdir -p target/debug && printf '#!/bin/sh\\nexit 0\\n' > target/debug/prog && chmod +x target/debug/prog"
  build_env: []
  format_command: null
"#;

fn have_make() -> bool {
    Command::new("make").arg("--version").output().map(|o| o.status.success()).unwrap_or(false)
}

fn write(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(path, body).expect("write");
}

fn dataset(root: &Path) {
    write(
        &root.join("rust_wrapper/Cargo.toml"),
        "[package]\nname = \"wrapper\"\nversion = \"0.1.0\"\n\n[[bin]]\nname = \"placeholder\"\npath = \"src/main.rs\"\n",
    );
    write(&root.join("rust_wrapper/src/main.rs"), "fn main() {}\n");

    write(&root.join("data/toy/src/Makefile"), "prog: prog.c\n\tcc -o prog prog.c\n\n.PHONY: clean\nclean:\n\trm -f prog\n");
    write(&root.join("data/toy/src/prog.c"), PROGRAM);
    write(&root.join("data/toy/src/functions.json"), SNAPSHOT);
    write(&root.join("data/toy/tests/ok.sh"), "exit 0\n");
    write(&root.join("data/toy/tests/broken.sh"), "echo 'never passed'; exit 1\n");
    write(
        &root.join("data/datasets.json"),
        r#"{"toy": {"code_dir": "toy/src", "test_dir": "toy/tests", "test_scripts": ["ok.sh", "broken.sh"], "setup_script": ""}}"#,
    );
    write(&root.join("pipeline.yaml"), CONFIG);
}

#[test]
fn dummy_model_runs_whole_dataset() {
    if !have_make() {
        eprintln!("skipping: make is not installed");
        return;
    }
    let dir = tempdir().expect("tempdir");
    dataset(dir.path());

    assert_cmd::cargo::cargo_bin_cmd!("transplant")
        .current_dir(dir.path())
        .args(["run", "--dataset", "toy", "--model", "dummy", "--config", "pipeline.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Translated 2 function(s), 0 failed."));

    let out = dir.path().join("output/translation");
    let manifest = fs::read_to_string(out.join("Cargo.toml")).expect("Cargo.toml");
    assert!(manifest.contains("name = \"prog\""), "bin target follows the Makefile");

    let log: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("log.json")).expect("log")).expect("json");
    assert_eq!(log["model"], "dummy");
    assert_eq!(log["attempts"], 1);
    assert_eq!(log["analysis_hash"].as_str().map(str::len), Some(64));
    let results = log["results"].as_array().expect("results");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["function"], "helper");
    assert_eq!(results[1]["function"], "main_0");
    assert!(results.iter().all(|r| r["result"] == "Success"));

    let c = fs::read_to_string(out.join("c_src/prog.c")).expect("prog.c");
    assert!(c.contains("// int helper(int x) {"));
    assert_eq!(
        fs::read_to_string(out.join("bindgen_blocklist.txt")).expect("blocklist"),
        "helper\nmain_0\n"
    );
    assert!(!out.join(".transplant/journal.json").exists());
}

#[test]
fn failing_baseline_build_is_fatal() {
    if !have_make() {
        eprintln!("skipping: make is not installed");
        return;
    }
    let dir = tempdir().expect("tempdir");
    dataset(dir.path());
    write(
        &dir.path().join("pipeline.yaml"),
        "toolchain:\n  build_command: \"echo 'linking failed' >&2; exit 1\"\n  format_command: null\n",
    );

    assert_cmd::cargo::cargo_bin_cmd!("transplant")
        .current_dir(dir.path())
        .args(["run", "--model", "dummy", "--config", "pipeline.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Baseline compilation failed"));
    assert!(!dir.path().join("output/translation/log.json").exists());
}

#[test]
fn failing_baseline_setup_script_is_fatal() {
    if !have_make() {
        eprintln!("skipping: make is not installed");
        return;
    }
    let dir = tempdir().expect("tempdir");
    dataset(dir.path());
    write(&dir.path().join("data/toy/tests/setup.sh"), "echo 'fixture missing' >&2; exit 1\n");
    write(
        &dir.path().join("data/datasets.json"),
        r#"{"toy": {"code_dir": "toy/src", "test_dir": "toy/tests", "test_scripts": ["ok.sh"], "setup_script": "toy/tests/setup.sh"}}"#,
    );

    assert_cmd::cargo::cargo_bin_cmd!("transplant")
        .current_dir(dir.path())
        .args(["run", "--model", "dummy", "--config", "pipeline.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Baseline setup script"))
        .stderr(predicate::str::contains("fixture missing"));
    assert!(!dir.path().join("output/translation/log.json").exists());
}
