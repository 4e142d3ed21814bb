use std::fs;
use std::path::{Path, PathBuf};

use tempfile::tempdir;
use transplant::commands::{copy_tree, resolve_pipeline_config};
use transplant::{canonicalize_or_current, load_datasets};

#[test]
fn canonicalize_or_current_resolves_existing_relative_path() {
    let original = std::env::current_dir().expect("cwd");
    let tmp = tempdir().expect("tempdir");
    let subdir = tmp.path().join("nested");
    fs::create_dir_all(&subdir).expect("create nested");
    std::env::set_current_dir(tmp.path()).expect("chdir tmp");

    let result = canonicalize_or_current("nested").expect("canonicalize nested");
    assert_eq!(result, subdir.canonicalize().expect("canonicalize subdir"));

    std::env::set_current_dir(original).expect("restore cwd");
}

#[test]
fn canonicalize_or_current_keeps_missing_paths_absolute() {
    let result = canonicalize_or_current("does/not/exist/yet").expect("canonicalize");
    assert!(result.is_absolute());
    assert!(result.ends_with("does/not/exist/yet"));
}

#[test]
fn datasets_load_from_json_and_yaml() {
    let tmp = tempdir().expect("tempdir");
    let json = tmp.path().join("datasets.json");
    fs::write(
        &json,
        r#"{"toy": {"code_dir": "toy/src", "test_dir": "toy/tests", "test_scripts": ["t1.sh", "t2.sh"], "setup_script": ""}}"#,
    )
    .expect("write json");
    let yaml = tmp.path().join("datasets.yaml");
    fs::write(&yaml, "grep:\n  code_dir: grep/src\n  setup_script: grep/setup.sh\n").expect("write yaml");

    let from_json = load_datasets(&json).expect("json datasets");
    let toy = &from_json["toy"];
    assert_eq!(toy.code_dir, PathBuf::from("toy/src"));
    assert_eq!(toy.test_scripts, vec!["t1.sh".to_string(), "t2.sh".to_string()]);
    assert_eq!(toy.setup_script(), None, "empty setup script means none");

    let from_yaml = load_datasets(&yaml).expect("yaml datasets");
    let grep = &from_yaml["grep"];
    assert!(grep.test_scripts.is_empty());
    assert_eq!(grep.test_dir, PathBuf::new());
    assert_eq!(grep.setup_script(), Some("grep/setup.sh"));
}

#[test]
fn datasets_parse_errors_name_the_file() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("datasets.json");
    fs::write(&path, "[1, 2").expect("write");
    let err = load_datasets(&path).expect_err("bad json");
    assert!(err.to_string().contains("Failed to parse datasets JSON"), "unexpected error: {err}");
}

#[test]
fn cli_overrides_beat_config_file() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("pipeline.yaml");
    fs::write(&path, "attempts: 7\nmodel: gpt-4o\ntoolchain:\n  build_command: make\n").expect("write");

    let from_file = resolve_pipeline_config(Some(&path), None, None).expect("config");
    assert_eq!(from_file.attempts, 7);
    assert_eq!(from_file.model, "gpt-4o");
    assert_eq!(from_file.compile_attempts, 2, "unset keys keep defaults");
    assert_eq!(from_file.toolchain.build_command, "make");
    assert_eq!(from_file.toolchain.build_timeout_secs, 60);

    let overridden =
        resolve_pipeline_config(Some(&path), Some("dummy".into()), Some(2)).expect("config");
    assert_eq!(overridden.model, "dummy");
    assert_eq!(overridden.attempts, 2);

    assert!(resolve_pipeline_config(None, None, Some(0)).is_err());
}

#[test]
fn copy_tree_copies_nested_files() {
    let tmp = tempdir().expect("tempdir");
    let src = tmp.path().join("src");
    fs::create_dir_all(src.join("a/b")).expect("mkdir");
    fs::write(src.join("top.c"), "int x;").expect("write");
    fs::write(src.join("a/b/deep.h"), "#pragma once").expect("write");
    let dst = tmp.path().join("out/c_src");

    let copied = copy_tree(&src, &dst).expect("copy");
    assert_eq!(copied, 2);
    assert_eq!(fs::read_to_string(dst.join("a/b/deep.h")).expect("read"), "#pragma once");
    assert!(copy_tree(Path::new("/definitely/not/here"), &dst).is_err());
}
