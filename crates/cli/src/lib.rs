pub mod commands;

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Canonicalize the root path if possible, falling back to the given string
/// relative to the current working directory.
pub fn canonicalize_or_current(root: &str) -> Result<PathBuf> {
    let path = Path::new(root);
    if path == Path::new(".") {
        Ok(env::current_dir().context("Failed to get current directory")?)
    } else {
        // Try to canonicalize; if it fails (e.g., path does not yet exist),
        // join it with the current dir to get an absolute path.
        match path.canonicalize() {
            Ok(p) => Ok(p),
            Err(_) => {
                let cwd = env::current_dir().context("Failed to get current directory")?;
                Ok(cwd.join(path))
            }
        }
    }
}

/// Install the global `tracing` subscriber. `RUST_LOG` wins when set.
pub fn init_tracing(verbose: bool) {
    let default = if verbose {
        "transplant=debug,transplant_core=debug"
    } else {
        "transplant=info,transplant_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second init (tests calling commands in-process) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// One program to migrate, with paths relative to the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub code_dir: PathBuf,
    #[serde(default)]
    pub test_dir: PathBuf,
    /// Test script names, relative to `test_dir`.
    #[serde(default)]
    pub test_scripts: Vec<String>,
    /// Optional script run before the tests; an empty string means none.
    #[serde(default)]
    pub setup_script: Option<String>,
}

impl DatasetConfig {
    pub fn setup_script(&self) -> Option<&str> {
        self.setup_script.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Load a datasets file keyed by dataset name. YAML for `.yaml`/`.yml`,
/// JSON otherwise.
pub fn load_datasets(path: &Path) -> Result<BTreeMap<String, DatasetConfig>> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("Failed to read datasets file {}", path.display()))?;
    let is_yaml = matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml"));
    if is_yaml {
        serde_yaml::from_str(&body)
            .with_context(|| format!("Failed to parse datasets YAML {}", path.display()))
    } else {
        serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse datasets JSON {}", path.display()))
    }
}
