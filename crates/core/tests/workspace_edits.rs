mod support;

use std::fs;

use support::{Fixture, BUILD_OK, MAIN_RS, PROGRAM_C};
use transplant_core::analysis::plan_translation;
use transplant_core::model::{FunctionDescriptor, Translation};
use transplant_core::workspace::{Journal, WorkspaceError};

fn helper() -> FunctionDescriptor {
    plan_translation(support::program_records(), "main_0")
        .expect("plan")
        .find(|f| f.name == "helper")
        .expect("helper planned")
}

fn translation() -> Translation {
    Translation {
        func: "fn helper_rust(x: i32) -> i32 { x + 1 }".into(),
        wrapper: "#[no_mangle]\npub extern \"C\" fn helper(x: libc::c_int) -> libc::c_int { helper_rust(x) }".into(),
        imports: "use std::ffi::c_int;".into(),
    }
}

#[test]
fn extract_body_returns_exact_source() {
    let fx = Fixture::new();
    let ws = fx.workspace(BUILD_OK);
    let body = ws.extract_body(&helper()).expect("extract");
    assert_eq!(body, "int helper(int x) {\n    return x + 1;\n}");
}

#[test]
fn apply_then_restore_is_byte_identical() {
    let fx = Fixture::new();
    let ws = fx.workspace(BUILD_OK);

    ws.apply_translation(&helper(), &translation()).expect("apply");
    let c = fx.read("c_src/prog.c");
    assert!(c.contains("// int helper(int x) {\n//     return x + 1;\n// }\n"));
    assert!(c.contains("\nint main_0(void) {\n"), "other functions stay live");
    let rs = fx.read("src/main.rs");
    assert!(rs.contains("fn helper_rust(x: i32) -> i32 { x + 1 }"));
    assert!(rs.contains("pub extern \"C\" fn helper("));
    assert!(rs.contains("use std::ffi::c_int;"));
    assert_eq!(fx.read("bindgen_blocklist.txt"), "helper\n");
    assert!(ws.journal().is_pending());
    assert!(fx.path("c_src/prog.c.old").is_file());

    assert_eq!(ws.restore().expect("restore"), 3);
    assert_eq!(fx.read("c_src/prog.c"), PROGRAM_C);
    assert_eq!(fx.read("src/main.rs"), MAIN_RS);
    assert_eq!(fx.read("bindgen_blocklist.txt"), "");
    assert!(!ws.journal().is_pending());
    assert!(!fx.path("c_src/prog.c.old").exists());
    assert!(!fx.path("src/main.rs.old").exists());
}

#[test]
fn restore_is_idempotent() {
    let fx = Fixture::new();
    let ws = fx.workspace(BUILD_OK);
    assert_eq!(ws.restore().expect("nothing pending"), 0);

    ws.comment_out_source_function(&helper()).expect("comment out");
    assert_eq!(ws.restore().expect("first restore"), 1);
    assert_eq!(ws.restore().expect("second restore"), 0);
    assert_eq!(fx.read("c_src/prog.c"), PROGRAM_C);
}

#[test]
fn commit_keeps_the_edit_and_drops_backups() {
    let fx = Fixture::new();
    let ws = fx.workspace(BUILD_OK);
    ws.apply_translation(&helper(), &translation()).expect("apply");
    ws.commit().expect("commit");

    assert!(!ws.journal().is_pending());
    assert!(fx.read("src/main.rs").contains("helper_rust"));
    assert!(!fx.path("src/main.rs.old").exists());
    assert!(!fx.path("bindgen_blocklist.txt.old").exists());
    assert_eq!(ws.restore().expect("restore after commit"), 0);
    assert!(fx.read("src/main.rs").contains("helper_rust"));
}

#[test]
fn second_edit_while_pending_is_refused() {
    let fx = Fixture::new();
    let ws = fx.workspace(BUILD_OK);
    ws.insert_target_translation(&translation()).expect("insert");
    let err = ws.apply_translation(&helper(), &translation()).expect_err("pending");
    assert!(matches!(err, WorkspaceError::PendingBackup(_)));
    assert_eq!(fx.read("c_src/prog.c"), PROGRAM_C, "refused edit touches nothing");
}

#[test]
fn bad_span_opens_no_journal() {
    let fx = Fixture::new();
    let ws = fx.workspace(BUILD_OK);
    let mut func = helper();
    func.span.end_line = 400;

    let err = ws.apply_translation(&func, &translation()).expect_err("bad span");
    assert!(matches!(err, WorkspaceError::InvalidSpan { .. }));
    assert!(!ws.journal().is_pending());
    assert_eq!(fx.read("src/main.rs"), MAIN_RS);
}

#[test]
fn tampered_backup_is_not_restored() {
    let fx = Fixture::new();
    let ws = fx.workspace(BUILD_OK);
    ws.apply_translation(&helper(), &translation()).expect("apply");
    fs::write(Journal::backup_path(&fx.path("src/main.rs")), "garbage").expect("tamper");

    let err = ws.restore().expect_err("corrupt");
    assert!(matches!(err, WorkspaceError::CorruptBackup(_)));
    assert!(fx.read("c_src/prog.c").contains("// int helper"), "no file restored on failure");
    assert!(ws.journal().is_pending());
}

#[test]
fn executable_requires_a_build() {
    let fx = Fixture::new();
    let ws = fx.workspace(BUILD_OK);
    assert_eq!(ws.bin_target(), "prog");
    assert!(matches!(ws.get_executable(), Err(WorkspaceError::NotBuilt(_))));

    ws.compile(false).expect("build");
    assert_eq!(ws.get_executable().expect("built"), fx.path("target/debug/prog"));

    ws.clean_build_artifacts();
    assert!(!fx.path("target").exists());
}

#[test]
fn compile_failure_carries_compiler_output() {
    let fx = Fixture::new();
    let ws = fx.workspace("echo 'error: expected one of' >&2; exit 101");
    match ws.compile(false) {
        Err(WorkspaceError::Compile(message)) => assert_eq!(message.trim(), "error: expected one of"),
        other => panic!("expected a compile error, got {other:?}"),
    }
}

#[test]
fn verbose_compile_failure_still_carries_compiler_output() {
    let fx = Fixture::new();
    let ws = fx.workspace("printf 'rust-%s: error: undefined symbol\\n' lld >&2; exit 1");
    match ws.compile(true) {
        Err(WorkspaceError::Compile(message)) => {
            assert!(message.contains("rust-lld: error:"), "got: {message}");
            assert!(ws.toolchain().is_linker_error(&message));
        }
        other => panic!("expected a compile error, got {other:?}"),
    }
}

#[test]
fn compile_timeout_reads_timeout() {
    let fx = Fixture::new();
    let mut toolchain = fx.toolchain("sleep 5");
    toolchain.build_timeout_secs = 1;
    let ws = transplant_core::workspace::Workspace::open(fx.root(), toolchain).expect("open");
    match ws.compile(false) {
        Err(WorkspaceError::Compile(message)) => assert_eq!(message, "Timeout"),
        other => panic!("expected a timeout, got {other:?}"),
    }
}

#[test]
fn set_bin_target_rewrites_manifest() {
    let fx = Fixture::new();
    let mut ws = fx.workspace(BUILD_OK);
    ws.set_bin_target("grep").expect("rename");
    assert_eq!(ws.bin_target(), "grep");
    assert!(fx.read("Cargo.toml").contains("[[bin]]\nname = \"grep\"\n"));
    assert_eq!(ws.layout().executable_path("grep"), fx.path("target/debug/grep"));
}
