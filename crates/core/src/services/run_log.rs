use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Outcome;

#[derive(Debug, Error)]
pub enum RunLogError {
    #[error("Failed to write run log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to encode or decode run log: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub function: String,
    pub result: Outcome,
    /// Translate-and-validate cycles spent on the function.
    pub attempts: u32,
}

/// Everything persisted in `log.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLogData {
    pub date: String,
    /// Attempt budget per function.
    pub attempts: u32,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_hash: Option<String>,
    pub results: Vec<RunLogEntry>,
}

/// Append-only record of the run, rewritten after every function so a crash
/// loses at most the function in flight.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    data: RunLogData,
}

impl RunLog {
    /// Start a new log at `path`, writing the header immediately.
    pub fn create(
        path: impl Into<PathBuf>,
        attempts: u32,
        model: impl Into<String>,
        analysis_hash: Option<String>,
    ) -> Result<Self, RunLogError> {
        let log = Self {
            path: path.into(),
            data: RunLogData {
                date: Utc::now().to_rfc3339(),
                attempts,
                model: model.into(),
                analysis_hash,
                results: Vec::new(),
            },
        };
        log.flush()?;
        Ok(log)
    }

    pub fn load(path: &Path) -> Result<RunLogData, RunLogError> {
        let body = fs::read_to_string(path)
            .map_err(|source| RunLogError::Io { path: path.to_path_buf(), source })?;
        Ok(serde_json::from_str(&body)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &RunLogData {
        &self.data
    }

    pub fn entries(&self) -> &[RunLogEntry] {
        &self.data.results
    }

    pub fn record(
        &mut self,
        function: impl Into<String>,
        result: Outcome,
        attempts: u32,
    ) -> Result<(), RunLogError> {
        self.data.results.push(RunLogEntry { function: function.into(), result, attempts });
        self.flush()
    }

    /// Write through a sibling temp file so readers never see a torn log.
    fn flush(&self) -> Result<(), RunLogError> {
        let json = serde_json::to_string_pretty(&self.data)?;
        let mut tmp_name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);
        fs::write(&tmp, json).map_err(|source| RunLogError::Io { path: tmp.clone(), source })?;
        fs::rename(&tmp, &self.path)
            .map_err(|source| RunLogError::Io { path: self.path.clone(), source })
    }
}
