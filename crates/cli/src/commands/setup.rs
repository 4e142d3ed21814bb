use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tracing::{info, warn};
use walkdir::WalkDir;

use transplant_core::services::validator::TestSuite;
use transplant_core::workspace::{ToolchainConfig, Workspace};

use crate::DatasetConfig;

/// Where a dataset's inputs live and where the workspace goes.
#[derive(Debug, Clone)]
pub struct SetupPaths {
    /// Directory the dataset's relative paths are resolved against.
    pub data_dir: PathBuf,
    /// Hybrid-binary crate copied as the workspace skeleton.
    pub template_dir: PathBuf,
    /// New workspace root; must not exist yet.
    pub output_dir: PathBuf,
}

/// Build a fresh workspace for `dataset` and check that the untouched program
/// builds and passes its tests.
///
/// Scripts that fail on the untouched program are dropped from the returned
/// suite, since they can never tell a good translation from a bad one. A
/// failing setup script is fatal.
pub fn setup_workspace(
    dataset: &DatasetConfig,
    paths: &SetupPaths,
    toolchain: ToolchainConfig,
    verbose: bool,
) -> Result<(Workspace, TestSuite)> {
    let code_dir = paths.data_dir.join(&dataset.code_dir);
    if !code_dir.is_dir() {
        bail!("Code directory {} does not exist", code_dir.display());
    }
    if paths.output_dir.exists() {
        bail!(
            "Directory {} already exists. Please remove it before running again.",
            paths.output_dir.display()
        );
    }
    info!(code_dir = %code_dir.display(), "translating code");

    let test_dir = paths.data_dir.join(&dataset.test_dir);
    let scripts: Vec<PathBuf> = dataset.test_scripts.iter().map(|t| test_dir.join(t)).collect();
    for script in &scripts {
        if !script.is_file() {
            bail!("Test file {} does not exist", script.display());
        }
    }
    let setup_script = dataset.setup_script().map(|s| paths.data_dir.join(s));

    copy_tree(&paths.template_dir, &paths.output_dir)?;
    let mut workspace = Workspace::open(&paths.output_dir, toolchain)
        .with_context(|| format!("Failed to open workspace {}", paths.output_dir.display()))?;
    copy_tree(&code_dir, &workspace.layout().source_dir)?;
    info!(output = %paths.output_dir.display(), "copied code into workspace");

    let target = workspace.detect_bin_target().context("Failed to detect the executable target")?;
    workspace.set_bin_target(&target)?;

    workspace.compile(verbose).map_err(|e| anyhow!("Baseline compilation failed: {e}"))?;
    let executable = workspace.get_executable()?;
    info!(executable = %executable.display(), "baseline build succeeded");

    let mut suite = TestSuite::new(scripts, setup_script, workspace.toolchain().command_timeout());
    let statuses = suite.run(&executable, false);
    if let Some(setup) = suite.setup_script() {
        if let Some(failed) = statuses.iter().find(|s| s.test == setup && !s.passed) {
            bail!(
                "Baseline setup script {} failed: {}",
                setup.display(),
                failed.error.as_deref().unwrap_or_default().trim()
            );
        }
    }
    for status in &statuses {
        if status.passed {
            info!(test = %status.test.display(), "baseline test passed");
        } else {
            warn!(test = %status.test.display(), "baseline test failed; it will be skipped");
        }
    }
    suite.retain_passing(&statuses);

    Ok((workspace, suite))
}

/// Recursively copy `src` into `dst`, creating `dst`. Returns the number of
/// files copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<usize> {
    if !src.is_dir() {
        bail!("Directory {} does not exist", src.display());
    }
    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.with_context(|| format!("Failed to walk {}", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("{} escaped {}", entry.path().display(), src.display()))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!("Failed to copy {} to {}", entry.path().display(), target.display())
            })?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    let dest = fs::read_link(link).with_context(|| format!("Failed to read link {}", link.display()))?;
    std::os::unix::fs::symlink(&dest, target)
        .with_context(|| format!("Failed to create link {}", target.display()))
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    fs::copy(link, target)
        .map(|_| ())
        .with_context(|| format!("Failed to copy {} to {}", link.display(), target.display()))
}
