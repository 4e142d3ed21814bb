use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::DEFAULT_ENTRY_FUNCTION;

/// External tools the workspace drives, and their time budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Shell command run in the workspace root to build the hybrid binary.
    pub build_command: String,
    /// Extra environment for the build; warnings are suppressed by default.
    pub build_env: Vec<(String, String)>,
    /// Formatter run on the Rust entry file after each insertion. `{file}` is
    /// replaced with the path relative to the workspace root.
    pub format_command: Option<String>,
    pub build_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub analysis_timeout_secs: u64,
    /// Substrings identifying a spurious linker failure worth a clean rebuild.
    pub linker_error_markers: Vec<String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            build_command: "cargo build".to_string(),
            build_env: vec![("RUSTFLAGS".to_string(), "-Awarnings".to_string())],
            format_command: Some("rustfmt --config imports_granularity=Crate {file}".to_string()),
            build_timeout_secs: 60,
            command_timeout_secs: 120,
            analysis_timeout_secs: 20,
            linker_error_markers: vec!["rust-lld: error:".to_string()],
        }
    }
}

impl ToolchainConfig {
    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }

    pub fn is_linker_error(&self, message: &str) -> bool {
        self.linker_error_markers.iter().any(|m| message.contains(m.as_str()))
    }
}

/// Knobs for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the call graph; only functions it reaches are translated.
    pub entry_function: String,
    /// Translate-and-validate cycles per function.
    pub attempts: u32,
    /// Builds per attempt; extra builds only absorb timeouts and linker flakes.
    pub compile_attempts: u32,
    /// Malformed model replies tolerated per request before giving up.
    pub max_malformed_responses: u32,
    /// Model identifier, resolved through the model registry.
    pub model: String,
    pub toolchain: ToolchainConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            entry_function: DEFAULT_ENTRY_FUNCTION.to_string(),
            attempts: 5,
            compile_attempts: 2,
            max_malformed_responses: 5,
            model: "gpt-4o-mini".to_string(),
            toolchain: ToolchainConfig::default(),
        }
    }
}

/// Load a pipeline config from JSON or YAML, chosen by file extension.
pub fn load_pipeline_config(path: &Path) -> Result<PipelineConfig> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline config at {}", path.display()))?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let config = if matches!(ext, "yaml" | "yml") {
        serde_yaml::from_str(&body).context("Failed to parse pipeline config YAML")?
    } else {
        serde_json::from_str(&body).context("Failed to parse pipeline config JSON")?
    };
    Ok(config)
}
