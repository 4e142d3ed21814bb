#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use transplant_core::model::{Conversation, FunctionRecord};
use transplant_core::services::models::{ModelError, SamplingParams, TranslationModel};
use transplant_core::workspace::{ToolchainConfig, Workspace};

pub const PROGRAM_C: &str = concat!(
    "#include <stdio.h>\n",
    "\n",
    "int helper(int x) {\n",
    "    return x + 1;\n",
    "}\n",
    "\n",
    "int dead(void) {\n",
    "    return 0;\n",
    "}\n",
    "\n",
    "int main_0(void) {\n",
    "    printf(\"%d\\n\", helper(1));\n",
    "    return 0;\n",
    "}\n",
);

pub const MAIN_RS: &str = "#![allow(unused)]\n\nfn main() {}\n";

pub fn record(name: &str, lines: (usize, usize), calls: Option<&[&str]>) -> FunctionRecord {
    FunctionRecord {
        name: name.to_string(),
        filename: "prog.c".to_string(),
        start_line: lines.0,
        start_col: 1,
        end_line: lines.1,
        end_col: 1,
        called_functions: calls.map(|c| c.iter().map(|s| s.to_string()).collect()),
    }
}

/// Snapshot matching `PROGRAM_C`.
pub fn program_records() -> Vec<FunctionRecord> {
    vec![
        record("helper", (3, 5), Some(&[])),
        record("dead", (7, 9), Some(&[])),
        record("main_0", (11, 14), Some(&["printf", "helper"])),
    ]
}

/// A tiny hybrid workspace whose "build" just creates the executable.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        fs::create_dir_all(root.join("src")).expect("src dir");
        fs::create_dir_all(root.join("c_src")).expect("c_src dir");
        fs::write(
            root.join("Cargo.toml"),
            "[package]\nname = \"wrapper\"\n\n[[bin]]\nname = \"prog\"\npath = \"src/main.rs\"\n",
        )
        .expect("write Cargo.toml");
        fs::write(root.join("src/main.rs"), MAIN_RS).expect("write main.rs");
        fs::write(root.join("c_src/prog.c"), PROGRAM_C).expect("write prog.c");
        fs::write(
            root.join("c_src/functions.json"),
            serde_json::to_string_pretty(&program_records()).expect("encode snapshot"),
        )
        .expect("write functions.json");
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).expect("read fixture file")
    }

    /// Toolchain whose build runs `build_script` in the workspace root.
    pub fn toolchain(&self, build_script: &str) -> ToolchainConfig {
        ToolchainConfig {
            build_command: build_script.to_string(),
            build_env: Vec::new(),
            format_command: None,
            build_timeout_secs: 10,
            command_timeout_secs: 10,
            analysis_timeout_secs: 5,
            ..ToolchainConfig::default()
        }
    }

    pub fn workspace(&self, build_script: &str) -> Workspace {
        Workspace::open(self.root(), self.toolchain(build_script)).expect("open workspace")
    }

    /// Write an executable test script and return its path.
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, format!("#!/bin/bash\n{body}\n")).expect("write script");
        path
    }
}

/// Build that always produces `target/debug/prog`.
pub const BUILD_OK: &str = "mkdir -p target/debug && touch target/debug/prog";

/// Build that fails unless `src/main.rs` contains `COMPILES`.
pub const BUILD_IF_MARKED: &str =
    "grep -q COMPILES src/main.rs || { echo 'error[E0308]: mismatched types' >&2; exit 1; }; mkdir -p target/debug && touch target/debug/prog";

pub fn reply(name: &str, body: &str) -> String {
    format!(
        "<IMPORTS>\n</IMPORTS>\n<FUNC>\nfn {name}_rust() {{ {body} }}\n</FUNC>\n<WRAPPER>\n#[no_mangle]\npub extern \"C\" fn {name}() {{ {name}_rust() }}\n</WRAPPER>\n"
    )
}

/// Model that plays back canned replies and counts requests.
#[derive(Clone)]
pub struct ScriptedModel {
    replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
    calls: Arc<AtomicUsize>,
    conversations: Arc<Mutex<Vec<usize>>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect())),
            calls: Arc::new(AtomicUsize::new(0)),
            conversations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue an outage after the canned replies.
    pub fn then_unavailable(self, reason: &str) -> Self {
        self.replies.lock().expect("lock").push_back(Err(reason.to_string()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Conversation length seen by each request.
    pub fn conversation_lengths(&self) -> Vec<usize> {
        self.conversations.lock().expect("lock").clone()
    }
}

impl TranslationModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(
        &self,
        conversation: &Conversation,
        _params: &SamplingParams,
    ) -> Result<Vec<String>, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.conversations.lock().expect("lock").push(conversation.len());
        match self.replies.lock().expect("lock").pop_front() {
            Some(Ok(reply)) => Ok(vec![reply]),
            Some(Err(reason)) => Err(ModelError::Unavailable(reason)),
            None => Err(ModelError::Unavailable("script exhausted".into())),
        }
    }
}
