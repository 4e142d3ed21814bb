use std::path::{Path, PathBuf};

/// Logical layout of a hybrid C/Rust workspace on disk.
///
/// This is derived from a chosen root path. It does *not* perform any IO itself.
/// The Rust crate lives at the root; the C program being migrated lives under
/// `c_src/` next to the analyzer's `functions.json`.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    /// Root directory of the workspace (the Rust crate root).
    pub root: PathBuf,
    /// The C source tree (c_src).
    pub source_dir: PathBuf,
    /// Static-analysis snapshot (c_src/functions.json).
    pub snapshot_path: PathBuf,
    /// Rust file receiving translations (src/main.rs).
    pub target_entry: PathBuf,
    /// Cargo manifest of the hybrid binary.
    pub cargo_toml: PathBuf,
    /// Names bindgen must not generate bindings for.
    pub blocklist_path: PathBuf,
    /// Cargo build output (target).
    pub build_dir: PathBuf,
    /// Directory for internal metadata (.transplant).
    pub meta_dir: PathBuf,
    /// Manifest of the pending edit, if any.
    pub journal_path: PathBuf,
    /// Per-function outcomes of the current run (log.json).
    pub run_log_path: PathBuf,
}

impl WorkspaceLayout {
    /// Compute the default layout for a workspace rooted at `root`.
    ///
    /// This does *not* touch the filesystem.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let source_dir = root.join("c_src");
        let snapshot_path = source_dir.join("functions.json");
        let target_entry = root.join("src").join("main.rs");
        let cargo_toml = root.join("Cargo.toml");
        let blocklist_path = root.join("bindgen_blocklist.txt");
        let build_dir = root.join("target");
        let meta_dir = root.join(".transplant");
        let journal_path = meta_dir.join("journal.json");
        let run_log_path = root.join("log.json");

        Self {
            root,
            source_dir,
            snapshot_path,
            target_entry,
            cargo_toml,
            blocklist_path,
            build_dir,
            meta_dir,
            journal_path,
            run_log_path,
        }
    }

    /// Resolve a file named by the analyzer (relative to `c_src`).
    pub fn source_file(&self, relative: impl AsRef<Path>) -> PathBuf {
        let relative = relative.as_ref();
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.source_dir.join(relative)
        }
    }

    /// Debug build of the named binary target.
    pub fn executable_path(&self, bin_target: &str) -> PathBuf {
        self.build_dir.join("debug").join(bin_target)
    }
}
