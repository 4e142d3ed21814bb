use anyhow::{anyhow, Context, Result};

use transplant_core::analysis::load_snapshot;
use transplant_core::model::FunctionDescriptor;
use transplant_core::workspace::{ToolchainConfig, Workspace};

use crate::canonicalize_or_current;

fn open_workspace(root: &str) -> Result<Workspace> {
    let root_path = canonicalize_or_current(root)?;
    Workspace::open(&root_path, ToolchainConfig::default())
        .with_context(|| format!("Failed to open workspace at {}", root_path.display()))
}

/// Print the exact C source of `name` as recorded in the workspace snapshot.
pub fn extract_command(root: &str, name: &str) -> Result<()> {
    let workspace = open_workspace(root)?;
    let records = load_snapshot(&workspace.layout().snapshot_path)?;
    let record = records.iter().find(|r| r.name == name).ok_or_else(|| {
        anyhow!("Function {} not found in {}", name, workspace.layout().snapshot_path.display())
    })?;
    let body = workspace.extract_body(&FunctionDescriptor::from(record))?;
    println!("{}", body);
    Ok(())
}

/// Roll back an edit left pending by an interrupted run.
pub fn restore_command(root: &str) -> Result<()> {
    let workspace = open_workspace(root)?;
    let restored = workspace.restore()?;
    if restored == 0 {
        println!("Nothing to restore.");
    } else {
        println!("Restored {} file(s) in {}", restored, workspace.layout().root.display());
    }
    Ok(())
}

/// Remove the workspace's build directory.
pub fn clean_command(root: &str) -> Result<()> {
    let workspace = open_workspace(root)?;
    workspace.clean_build_artifacts();
    println!("Cleaned {}", workspace.layout().build_dir.display());
    Ok(())
}
