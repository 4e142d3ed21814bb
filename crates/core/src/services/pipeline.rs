//! Pipeline controller: ordering -> translation -> validation -> repair ->
//! commit or rollback, one function at a time.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::analysis::AnalysisError;
use crate::model::{FunctionDescriptor, Outcome, Translation, ValidationResult};
use crate::services::oracle::{Oracle, OracleError};
use crate::services::run_log::{RunLog, RunLogError};
use crate::services::validator::{TestSuite, Validator};
use crate::workspace::{Workspace, WorkspaceError};

/// Anything that aborts the whole run. Compile and test failures never show
/// up here; they drive the repair loop.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    RunLog(#[from] RunLogError),
}

/// Final state of one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionReport {
    pub function: String,
    pub outcome: Outcome,
    pub attempts: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub translated: usize,
    pub failed: usize,
    pub reports: Vec<FunctionReport>,
}

pub struct Pipeline {
    workspace: Workspace,
    oracle: Oracle,
    validator: Validator,
    tests: TestSuite,
    attempts: u32,
    run_log: RunLog,
}

impl Pipeline {
    pub fn new(
        workspace: Workspace,
        oracle: Oracle,
        validator: Validator,
        tests: TestSuite,
        attempts: u32,
        run_log: RunLog,
    ) -> Self {
        Self { workspace, oracle, validator, tests, attempts: attempts.max(1), run_log }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn run_log(&self) -> &RunLog {
        &self.run_log
    }

    /// Translate every function in `order`. A function that exhausts its
    /// budget is logged and skipped; only errors outside the attempt loop stop
    /// the run.
    pub fn run(
        &mut self,
        order: impl IntoIterator<Item = FunctionDescriptor>,
    ) -> Result<RunSummary, PipelineError> {
        if self.workspace.journal().is_pending() {
            warn!("found an unfinished edit from a previous run; restoring it");
            self.workspace.restore()?;
        }

        let mut summary = RunSummary::default();
        for func in order {
            let report = self.translate_function(func)?;
            if report.outcome == Outcome::Success {
                summary.translated += 1;
            } else {
                summary.failed += 1;
            }
            summary.reports.push(report);
        }
        info!(translated = summary.translated, failed = summary.failed, "run finished");
        Ok(summary)
    }

    /// Run the attempt loop for one function and record its outcome.
    pub fn translate_function(
        &mut self,
        mut func: FunctionDescriptor,
    ) -> Result<FunctionReport, PipelineError> {
        info!(function = %func.name, "translating function");
        func.body = Some(self.workspace.extract_body(&func)?);

        let (translation, mut conversation) = self.oracle.translate(&func)?;
        let mut result = self.attempt(&func, &translation)?;
        let mut attempt = 1;
        loop {
            info!(function = %func.name, attempt, budget = self.attempts, "attempt finished");
            if result.is_success() {
                self.workspace.commit()?;
                info!(function = %func.name, "translation succeeded");
                break;
            }

            warn!(function = %func.name, attempt, outcome = %result.outcome(), "translation failed");
            debug!(detail = %result.message(), "failure detail");
            self.workspace.restore()?;
            if attempt >= self.attempts {
                break;
            }

            let (translation, next) = self.oracle.repair(conversation, &result)?;
            conversation = next;
            result = self.attempt(&func, &translation)?;
            attempt += 1;
        }

        let outcome = result.outcome();
        self.run_log.record(&func.name, outcome, attempt)?;
        Ok(FunctionReport { function: func.name, outcome, attempts: attempt })
    }

    /// Validate one candidate. On a fatal error the pending edit is rolled
    /// back before the error is returned.
    fn attempt(
        &self,
        func: &FunctionDescriptor,
        translation: &Translation,
    ) -> Result<ValidationResult, PipelineError> {
        match self.validator.validate(&self.workspace, &self.tests, func, translation) {
            Ok(result) => Ok(result),
            Err(e) => {
                if let Err(restore) = self.workspace.restore() {
                    error!(error = %restore, "failed to restore workspace after error");
                }
                Err(e.into())
            }
        }
    }
}
