//! Workspace manager: every mutation of the C and Rust trees goes through here.
//!
//! A workspace is a Rust crate whose `c_src/` holds the program being migrated.
//! Translations are applied by commenting the C function out, appending the
//! Rust function and its `extern "C"` wrapper to `src/main.rs`, and adding the
//! name to the bindgen blocklist. All three files are journaled together so a
//! failed attempt can be rolled back as a unit.

pub mod config;
pub mod journal;
pub mod layout;
pub mod patch;
pub mod process;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info, warn};

pub use config::{load_pipeline_config, PipelineConfig, ToolchainConfig};
pub use journal::Journal;
pub use layout::WorkspaceLayout;
pub use patch::SpanError;
pub use process::{CommandOutput, ProcessError, ShellCommand};

use crate::model::{FunctionDescriptor, Translation};

/// Lists the non-phony, non-dot targets of the Makefile in the current
/// directory.
const MAKE_TARGETS_SCRIPT: &str = r#"make -pq | awk -F' ' '
/^[a-zA-Z0-9_-]+:([^=]|$)/ {
    target=$1;
    gsub(/:/, "", target);
    if (target !~ /^\./) targets[target]=1
}
/^\.PHONY:/ { for (i=2; i<=NF; i++) { phony[$i]=1 } }
END { for (t in targets) {
    if (!(t in phony) && (t != "Makefile")) { print t }
}}'"#;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid span for `{function}` in {path}: {source}")]
    InvalidSpan {
        function: String,
        path: PathBuf,
        #[source]
        source: SpanError,
    },
    #[error("An edit is already pending (journal at {0}); restore it first")]
    PendingBackup(PathBuf),
    #[error("Backup {0} does not match its journal entry")]
    CorruptBackup(PathBuf),
    #[error("Failed to read or write the journal: {0}")]
    Journal(#[from] serde_json::Error),
    /// Build failure; the message is the compiler output or `Timeout`.
    #[error("{0}")]
    Compile(String),
    #[error("Executable not found at {0}. Please compile the code first.")]
    NotBuilt(PathBuf),
    #[error("Binary target error: {0}")]
    BinTarget(String),
    #[error(transparent)]
    Command(#[from] ProcessError),
}

impl WorkspaceError {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        WorkspaceError::Io { path: path.as_ref().to_path_buf(), source }
    }
}

/// Handle on a hybrid workspace.
#[derive(Debug)]
pub struct Workspace {
    layout: WorkspaceLayout,
    toolchain: ToolchainConfig,
    journal: Journal,
    bin_target: String,
}

impl Workspace {
    /// Open an existing workspace. The binary target is read from
    /// `Cargo.toml`; the blocklist is created if missing.
    pub fn open(root: impl AsRef<Path>, toolchain: ToolchainConfig) -> Result<Self, WorkspaceError> {
        let layout = WorkspaceLayout::new(root);
        let manifest = fs::read_to_string(&layout.cargo_toml)
            .map_err(|e| WorkspaceError::io(&layout.cargo_toml, e))?;
        let bin_target = read_bin_target(&manifest).ok_or_else(|| {
            WorkspaceError::BinTarget(format!(
                "{} declares neither a [[bin]] nor a [package] name",
                layout.cargo_toml.display()
            ))
        })?;
        if !layout.blocklist_path.exists() {
            fs::write(&layout.blocklist_path, "")
                .map_err(|e| WorkspaceError::io(&layout.blocklist_path, e))?;
        }
        let journal = Journal::new(&layout.journal_path);
        Ok(Self { layout, toolchain, journal, bin_target })
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    pub fn toolchain(&self) -> &ToolchainConfig {
        &self.toolchain
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn bin_target(&self) -> &str {
        &self.bin_target
    }

    /// Ask make for the program's single executable target.
    pub fn detect_bin_target(&self) -> Result<String, WorkspaceError> {
        let output = ShellCommand::new(MAKE_TARGETS_SCRIPT)
            .cwd(&self.layout.source_dir)
            .timeout(self.toolchain.analysis_timeout())
            .run()?;
        let mut targets: Vec<&str> =
            output.stdout.lines().map(str::trim).filter(|t| !t.is_empty()).collect();
        targets.sort_unstable();
        match targets.as_slice() {
            [] => Err(WorkspaceError::BinTarget("No executable targets found in Makefile".into())),
            [target] => {
                info!(target = %target, "found executable target");
                Ok(target.to_string())
            }
            many => Err(WorkspaceError::BinTarget(format!(
                "Multiple executable targets ({}) are not supported",
                many.join(",")
            ))),
        }
    }

    /// Rename the `[[bin]]` target in `Cargo.toml` to match the C program.
    pub fn set_bin_target(&mut self, name: &str) -> Result<(), WorkspaceError> {
        let path = &self.layout.cargo_toml;
        let manifest = fs::read_to_string(path).map_err(|e| WorkspaceError::io(path, e))?;
        let updated = rename_bin_target(&manifest, name).ok_or_else(|| {
            WorkspaceError::BinTarget(format!("{} has no [[bin]] name to rewrite", path.display()))
        })?;
        fs::write(path, updated).map_err(|e| WorkspaceError::io(path, e))?;
        self.bin_target = name.to_string();
        Ok(())
    }

    /// Exact source text of `func`.
    pub fn extract_body(&self, func: &FunctionDescriptor) -> Result<String, WorkspaceError> {
        let path = self.layout.source_file(&func.file);
        let content = fs::read_to_string(&path).map_err(|e| WorkspaceError::io(&path, e))?;
        patch::extract_span(&content, func.span).map_err(|source| WorkspaceError::InvalidSpan {
            function: func.name.clone(),
            path,
            source,
        })
    }

    /// Comment `func` out of its C file, journaling the file first.
    pub fn comment_out_source_function(&self, func: &FunctionDescriptor) -> Result<(), WorkspaceError> {
        let (path, commented) = self.stage_source(func)?;
        self.journal.begin(&[path.as_path()])?;
        self.write_or_rollback(&[(path.as_path(), commented.as_str())])
    }

    /// Append a translation to `src/main.rs`, journaling the file first.
    pub fn insert_target_translation(&self, translation: &Translation) -> Result<(), WorkspaceError> {
        let (path, patched) = self.stage_target(translation)?;
        self.journal.begin(&[path.as_path()])?;
        self.write_or_rollback(&[(path.as_path(), patched.as_str())])?;
        self.format_target();
        Ok(())
    }

    /// Patch `translation` in for `func`: C side commented out, Rust side
    /// appended, name blocklisted. The three files are journaled as one edit.
    pub fn apply_translation(
        &self,
        func: &FunctionDescriptor,
        translation: &Translation,
    ) -> Result<(), WorkspaceError> {
        // Stage everything in memory first so a bad span never opens a journal.
        let (source_path, commented) = self.stage_source(func)?;
        let (target_path, patched) = self.stage_target(translation)?;
        let blocklist_path = self.layout.blocklist_path.as_path();
        let mut blocklist = fs::read_to_string(blocklist_path)
            .map_err(|e| WorkspaceError::io(blocklist_path, e))?;
        if !blocklist.is_empty() && !blocklist.ends_with('\n') {
            blocklist.push('\n');
        }
        blocklist.push_str(&func.name);
        blocklist.push('\n');

        self.journal.begin(&[source_path.as_path(), target_path.as_path(), blocklist_path])?;
        self.write_or_rollback(&[
            (source_path.as_path(), commented.as_str()),
            (target_path.as_path(), patched.as_str()),
            (blocklist_path, blocklist.as_str()),
        ])?;
        self.format_target();
        debug!(function = %func.name, "translation applied");
        Ok(())
    }

    /// Undo the pending edit, restoring every journaled file or none.
    /// Calling this with nothing pending is a no-op.
    pub fn restore(&self) -> Result<usize, WorkspaceError> {
        let restored = self.journal.rollback()?;
        if restored > 0 {
            info!(files = restored, "reset changes");
        }
        Ok(restored)
    }

    /// Keep the pending edit and drop its backups.
    pub fn commit(&self) -> Result<(), WorkspaceError> {
        self.journal.commit()
    }

    /// Build the hybrid binary. Failures carry the compiler output, or
    /// `Timeout` when the build budget runs out.
    pub fn compile(&self, verbose: bool) -> Result<(), WorkspaceError> {
        let mut cmd = ShellCommand::new(&self.toolchain.build_command)
            .cwd(&self.layout.root)
            .timeout(self.toolchain.build_timeout())
            .streaming(verbose);
        for (key, value) in &self.toolchain.build_env {
            cmd = cmd.env(key, value);
        }
        cmd.run().map(|_| ()).map_err(|e| WorkspaceError::Compile(e.to_string()))
    }

    /// Path of the debug build; errors if it has not been built.
    pub fn get_executable(&self) -> Result<PathBuf, WorkspaceError> {
        let exe = self.layout.executable_path(&self.bin_target);
        if exe.is_file() {
            Ok(exe)
        } else {
            Err(WorkspaceError::NotBuilt(exe))
        }
    }

    /// Remove the build directory. Files held open by another process are
    /// killed off and retried once; anything left is logged, never returned.
    pub fn clean_build_artifacts(&self) {
        let target = shell_quote(&self.layout.build_dir.display().to_string());
        let rm = ShellCommand::new(format!("rm -rf {target}"))
            .cwd(&self.layout.root)
            .timeout(self.toolchain.command_timeout());
        let Err(first) = rm.run() else {
            return;
        };

        for busy in busy_paths(&first.to_string()) {
            let quoted = shell_quote(&busy);
            let _ = ShellCommand::new(format!("fuser -k {quoted}"))
                .timeout(self.toolchain.command_timeout())
                .run();
            let _ = ShellCommand::new(format!("rm -rf {quoted}"))
                .timeout(self.toolchain.command_timeout())
                .run();
        }
        if let Err(e) = rm.run() {
            error!(root = %self.layout.root.display(), error = %e, "failed to fully clean build artifacts");
        }
    }

    fn stage_source(&self, func: &FunctionDescriptor) -> Result<(PathBuf, String), WorkspaceError> {
        let path = self.layout.source_file(&func.file);
        let content = fs::read_to_string(&path).map_err(|e| WorkspaceError::io(&path, e))?;
        let commented = patch::comment_out_span(&content, func.span).map_err(|source| {
            WorkspaceError::InvalidSpan { function: func.name.clone(), path: path.clone(), source }
        })?;
        Ok((path, commented))
    }

    fn stage_target(&self, translation: &Translation) -> Result<(PathBuf, String), WorkspaceError> {
        let path = self.layout.target_entry.clone();
        let content = fs::read_to_string(&path).map_err(|e| WorkspaceError::io(&path, e))?;
        Ok((path, patch::patch_target(&content, translation)))
    }

    fn write_or_rollback(&self, writes: &[(&Path, &str)]) -> Result<(), WorkspaceError> {
        for (path, content) in writes {
            if let Err(e) = fs::write(path, content) {
                let err = WorkspaceError::io(path, e);
                if let Err(rollback) = self.journal.rollback() {
                    error!(error = %rollback, "rollback after failed write also failed");
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Best effort: a formatter failure usually means the translation does not
    /// parse, which the build will report properly.
    fn format_target(&self) {
        let Some(template) = &self.toolchain.format_command else {
            return;
        };
        let file = self
            .layout
            .target_entry
            .strip_prefix(&self.layout.root)
            .unwrap_or(&self.layout.target_entry);
        let script = template.replace("{file}", &shell_quote(&file.display().to_string()));
        let result = ShellCommand::new(script)
            .cwd(&self.layout.root)
            .timeout(self.toolchain.command_timeout())
            .run();
        if let Err(e) = result {
            warn!(error = %e, "formatter failed; there may be a syntax error in the generated code");
        }
    }
}

/// Name of the first `[[bin]]` target, falling back to the package name.
pub fn read_bin_target(manifest: &str) -> Option<String> {
    let mut section = "";
    let mut package_name = None;
    for line in manifest.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            section = trimmed;
            continue;
        }
        let Some(value) = trimmed.strip_prefix("name").map(str::trim_start) else {
            continue;
        };
        let Some(value) = value.strip_prefix('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').to_string();
        match section {
            "[[bin]]" => return Some(value),
            "[package]" if package_name.is_none() => package_name = Some(value),
            _ => {}
        }
    }
    package_name
}

/// Rewrite the `name` of the first `[[bin]]` table. `None` if there is none.
pub fn rename_bin_target(manifest: &str, name: &str) -> Option<String> {
    let mut out = String::with_capacity(manifest.len() + name.len());
    let mut inside_bin = false;
    let mut renamed = false;
    for line in manifest.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if !renamed {
            if trimmed.starts_with("[[bin]]") {
                inside_bin = true;
            } else if trimmed.starts_with('[') {
                inside_bin = false;
            } else if inside_bin && trimmed.starts_with("name") && trimmed.contains('=') {
                out.push_str(&format!("name = \"{name}\""));
                if line.ends_with('\n') {
                    out.push('\n');
                }
                renamed = true;
                continue;
            }
        }
        out.push_str(line);
    }
    renamed.then_some(out)
}

/// Files `rm` could not delete because another process holds them open.
pub fn busy_paths(rm_output: &str) -> Vec<String> {
    rm_output
        .lines()
        .filter(|line| line.contains("cannot remove") && line.contains("Device or resource busy"))
        .filter_map(|line| {
            let (open, close) = if line.contains('\u{2018}') { ('\u{2018}', '\u{2019}') } else { ('\'', '\'') };
            let start = line.find(open)? + open.len_utf8();
            let len = line[start..].find(close)?;
            Some(line[start..start + len].to_string())
        })
        .collect()
}

pub(crate) fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}
