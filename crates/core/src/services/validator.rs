//! Validation of one translation attempt: patch, build, test.
//!
//! The validator only reports what happened. Whether to commit, roll back, or
//! ask for a repair is the pipeline's call.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::model::{FunctionDescriptor, Translation, ValidationResult};
use crate::workspace::{shell_quote, ShellCommand, Workspace, WorkspaceError};

/// Outcome of one test script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestStatus {
    pub test: PathBuf,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The program's own test scripts, run against the built executable.
#[derive(Debug, Clone)]
pub struct TestSuite {
    scripts: Vec<PathBuf>,
    setup_script: Option<PathBuf>,
    timeout: Duration,
}

impl TestSuite {
    pub fn new(scripts: Vec<PathBuf>, setup_script: Option<PathBuf>, timeout: Duration) -> Self {
        Self { scripts, setup_script, timeout }
    }

    pub fn scripts(&self) -> &[PathBuf] {
        &self.scripts
    }

    pub fn setup_script(&self) -> Option<&Path> {
        self.setup_script.as_deref()
    }

    /// Drop every script that did not pass in `statuses`.
    pub fn retain_passing(&mut self, statuses: &[TestStatus]) {
        self.scripts.retain(|script| statuses.iter().any(|s| s.passed && &s.test == script));
    }

    /// Run the setup script once, then each test with the executable's
    /// directory first on `PATH`. With `stop_on_failure` the run ends at the
    /// first failing script. A failing setup script is reported as the only
    /// status.
    pub fn run(&self, executable: &Path, stop_on_failure: bool) -> Vec<TestStatus> {
        info!(executable = %executable.display(), "running tests");
        let search_path = self.search_path(executable);

        if let Some(setup) = &self.setup_script {
            let status = self.run_script(setup, &search_path);
            if !status.passed {
                warn!(script = %setup.display(), "setup script failed");
                return vec![status];
            }
            debug!(script = %setup.display(), "setup script passed");
        }

        let mut statuses = Vec::with_capacity(self.scripts.len());
        for script in &self.scripts {
            let status = self.run_script(script, &search_path);
            let failed = !status.passed;
            if failed {
                debug!(test = %script.display(), "test failed");
            } else {
                debug!(test = %script.display(), "test passed");
            }
            statuses.push(status);
            if failed && stop_on_failure {
                break;
            }
        }
        statuses
    }

    fn run_script(&self, script: &Path, search_path: &str) -> TestStatus {
        let result = ShellCommand::new(format!("bash {}", shell_quote(&script.display().to_string())))
            .env("PATH", search_path)
            .timeout(self.timeout)
            .run();
        match result {
            Ok(_) => TestStatus { test: script.to_path_buf(), passed: true, error: None },
            Err(e) => TestStatus { test: script.to_path_buf(), passed: false, error: Some(e.to_string()) },
        }
    }

    fn search_path(&self, executable: &Path) -> String {
        let dir = executable.parent().unwrap_or_else(|| Path::new("."));
        let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        match env::var("PATH") {
            Ok(existing) if !existing.is_empty() => format!("{}:{existing}", dir.display()),
            _ => dir.display().to_string(),
        }
    }
}

/// Where an attempt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Patched,
    Compiling,
    Testing,
}

#[derive(Debug, Clone)]
pub struct Validator {
    compile_attempts: u32,
    verbose: bool,
}

impl Validator {
    /// `compile_attempts` bounds builds per attempt; only timeouts and linker
    /// errors earn another build.
    pub fn new(compile_attempts: u32, verbose: bool) -> Self {
        Self { compile_attempts: compile_attempts.max(1), verbose }
    }

    /// Patch `translation` in and check it. The edit is left pending either
    /// way. `Err` is reserved for failures outside the attempt (I/O, journal).
    pub fn validate(
        &self,
        workspace: &Workspace,
        tests: &TestSuite,
        func: &FunctionDescriptor,
        translation: &Translation,
    ) -> Result<ValidationResult, WorkspaceError> {
        workspace.apply_translation(func, translation)?;
        debug!(function = %func.name, stage = ?Stage::Patched, "validating");

        if let Some(message) = self.build(workspace)? {
            return Ok(ValidationResult::CompileError(message));
        }

        let executable = match workspace.get_executable() {
            Ok(exe) => exe,
            Err(e @ WorkspaceError::NotBuilt(_)) => {
                return Ok(ValidationResult::CompileError(e.to_string()))
            }
            Err(e) => return Err(e),
        };

        debug!(function = %func.name, stage = ?Stage::Testing, "validating");
        let statuses = tests.run(&executable, true);
        match statuses.into_iter().find(|s| !s.passed) {
            Some(failed) => Ok(ValidationResult::TestFailure(failed.error.unwrap_or_default())),
            None => Ok(ValidationResult::Success),
        }
    }

    /// Build, retrying timeouts and linker errors. Returns the last compiler
    /// message if the build never succeeded.
    fn build(&self, workspace: &Workspace) -> Result<Option<String>, WorkspaceError> {
        let mut last = String::new();
        for attempt in 1..=self.compile_attempts {
            debug!(attempt, stage = ?Stage::Compiling, "building");
            match workspace.compile(self.verbose) {
                Ok(()) => return Ok(None),
                Err(WorkspaceError::Compile(message)) => {
                    let retry = if message.trim() == "Timeout" {
                        warn!(attempt, "build timed out; trying again");
                        true
                    } else if workspace.toolchain().is_linker_error(&message) {
                        warn!(attempt, "linker error; cleaning build artifacts and trying again");
                        workspace.clean_build_artifacts();
                        true
                    } else {
                        false
                    };
                    last = message;
                    if !retry {
                        break;
                    }
                }
                Err(other) => return Err(other),
            }
        }
        Ok(Some(last))
    }
}
