use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::config::RunnerConfig;
use crate::report::{self, ParsedTestOutput, TestCaseResult, TestRunSummary};
use crate::sandbox::{
    AssembleMode, ExecError, ExecutionOutcome, ReferenceTestSet, Toolchain, Workspace, assemble,
};
use crate::sources::{SourceError, SourceRegistry, is_valid_slug};

const NO_REFERENCE_TESTS: &str = "No tests found for this exercise";
const NO_TEST_EVENTS: &str = "Tests ran but reported no results";

/// Code submitted by a client, optionally tied to an exercise
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Submission {
    #[serde(default)]
    pub code: String,
    pub source: Option<String>,
    pub slug: Option<String>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ok,
    Error,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Pass,
    Fail,
    Error,
    MissingTests,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Error => "error",
            Self::MissingTests => "missing_tests",
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub status: RunStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl RunReport {
    fn from_outcome(outcome: ExecutionOutcome) -> Self {
        let duration_ms = outcome.duration_ms();
        match outcome.error {
            Some(error) => Self {
                status: RunStatus::Error,
                stdout: outcome.stdout,
                stderr: if outcome.stderr.is_empty() {
                    error
                } else {
                    outcome.stderr
                },
                duration_ms,
            },
            None => Self {
                status: RunStatus::Ok,
                stdout: outcome.stdout,
                stderr: outcome.stderr,
                duration_ms,
            },
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub status: TestStatus,
    pub duration_ms: u64,
    pub stdout: String,
    pub stderr: String,
    pub tests: Vec<TestCaseResult>,
    pub summary: TestRunSummary,
    pub package_output: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TestReport {
    fn missing_tests() -> Self {
        Self {
            status: TestStatus::MissingTests,
            duration_ms: 0,
            stdout: String::new(),
            stderr: String::new(),
            tests: Vec::new(),
            summary: TestRunSummary::default(),
            package_output: Vec::new(),
            error: None,
            message: Some(NO_REFERENCE_TESTS.to_string()),
        }
    }

    fn from_run(outcome: ExecutionOutcome, parsed: ParsedTestOutput) -> Self {
        let summary = parsed.summary();
        let status = classify(&summary, &outcome);
        let duration_ms = outcome.duration_ms();
        let (error, message) = match status {
            TestStatus::Error => (outcome.error, None),
            TestStatus::MissingTests => (None, Some(NO_TEST_EVENTS.to_string())),
            TestStatus::Pass | TestStatus::Fail => (None, None),
        };

        Self {
            status,
            duration_ms,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            tests: parsed.tests,
            summary,
            package_output: parsed.package_output,
            error,
            message,
        }
    }
}

/// Maps a finished test run onto a status
///
/// A run without any test events is an error when the process failed (the
/// package did not compile, or the run timed out) and `missing_tests` when it
/// exited cleanly. A timed-out run never finished, so it is an error whatever
/// the tests seen so far reported.
pub fn classify(summary: &TestRunSummary, outcome: &ExecutionOutcome) -> TestStatus {
    match (summary.total, outcome.succeeded()) {
        (0, false) => TestStatus::Error,
        (0, true) => TestStatus::MissingTests,
        _ if outcome.timed_out => TestStatus::Error,
        _ if summary.failed > 0 => TestStatus::Fail,
        _ => TestStatus::Pass,
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("{0}")]
    InvalidInput(&'static str),

    #[error("Invalid source '{0}'")]
    UnknownSource(String),

    #[error(transparent)]
    Toolchain(#[from] ExecError),

    #[error(transparent)]
    Upstream(#[from] SourceError),

    #[error("Workspace error: {0}")]
    Workspace(#[from] std::io::Error),
}

impl RunError {
    /// Whether the error was caused by the request rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::UnknownSource(_))
    }
}

/// Drives run and test invocations from submission to report
///
/// Every invocation gets its own workspace, which is removed before the
/// report is returned regardless of how the invocation ended.
pub struct Orchestrator {
    config: RunnerConfig,
    toolchain: Arc<dyn Toolchain>,
    sources: SourceRegistry,
    toolchain_ready: AtomicBool,
}

impl Orchestrator {
    pub fn new(config: RunnerConfig, toolchain: Arc<dyn Toolchain>, sources: SourceRegistry) -> Self {
        Self {
            config,
            toolchain,
            sources,
            toolchain_ready: AtomicBool::new(false),
        }
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    /// Checks that the toolchain can be invoked and remembers the answer
    pub async fn check_toolchain(&self) -> Result<String, RunError> {
        let version = self.toolchain.version().await?;
        self.toolchain_ready.store(true, Ordering::Release);
        Ok(version)
    }

    /// Builds and runs `code` as a standalone program
    pub async fn run(&self, code: &str) -> Result<RunReport, RunError> {
        if code.trim().is_empty() {
            return Err(RunError::InvalidInput("Missing code"));
        }
        self.ensure_toolchain().await?;

        let workspace = self.create_workspace()?;
        let result = self.run_in(workspace.path(), code).await;
        workspace.close();

        match &result {
            Ok(report) => log::info!(
                "Run finished with status {} in {}ms",
                report.status.as_str(),
                report.duration_ms
            ),
            Err(e) => log::error!("Run errored: {e}"),
        }
        result
    }

    /// Compiles `submission` together with its exercise's reference tests and runs them
    pub async fn test(&self, submission: &Submission) -> Result<TestReport, RunError> {
        if submission.code.trim().is_empty() {
            return Err(RunError::InvalidInput("Missing code"));
        }
        let source_key = non_blank(&submission.source).ok_or(RunError::InvalidInput("Missing source"))?;
        let slug = non_blank(&submission.slug).ok_or(RunError::InvalidInput("Missing slug"))?;
        if !is_valid_slug(slug) {
            return Err(RunError::InvalidInput("Invalid slug"));
        }
        let source = self
            .sources
            .get(source_key)
            .ok_or_else(|| RunError::UnknownSource(source_key.to_string()))?;

        let reference = source.reference_tests(slug).await?;
        if reference.is_empty() {
            log::info!("No reference tests for {source_key}/{slug}");
            return Ok(TestReport::missing_tests());
        }
        self.ensure_toolchain().await?;

        let workspace = self.create_workspace()?;
        let result = self
            .test_in(workspace.path(), &submission.code, &reference)
            .await;
        workspace.close();

        match &result {
            Ok(report) => log::info!(
                "Tests for {source_key}/{slug} finished with status {} ({}/{} passed)",
                report.status.as_str(),
                report.summary.passed,
                report.summary.total
            ),
            Err(e) => log::error!("Tests for {source_key}/{slug} errored: {e}"),
        }
        result
    }

    async fn run_in(&self, work_dir: &Path, code: &str) -> Result<RunReport, RunError> {
        log::debug!("Assembling run in {}", work_dir.display());
        let unit = assemble(work_dir, code, AssembleMode::Run, &self.config)?;

        log::debug!("Executing {}", unit.file_name);
        let args = ["run".to_string(), unit.file_name.to_string()];
        let outcome = self.execute(work_dir, &args).await?;

        Ok(RunReport::from_outcome(outcome))
    }

    async fn test_in(
        &self,
        work_dir: &Path,
        code: &str,
        reference: &ReferenceTestSet,
    ) -> Result<TestReport, RunError> {
        log::debug!("Assembling tests in {}", work_dir.display());
        let unit = assemble(work_dir, code, AssembleMode::Test(reference), &self.config)?;

        log::debug!("Executing tests of package {}", unit.package);
        let args = ["test", "-json", "."].map(String::from);
        let outcome = self.execute(work_dir, &args).await?;

        log::debug!("Parsing test events");
        let mut raw = outcome.stdout.clone();
        if !outcome.stderr.is_empty() {
            raw.push('\n');
            raw.push_str(&outcome.stderr);
        }
        let parsed = report::parse(&raw);

        Ok(TestReport::from_run(outcome, parsed))
    }

    async fn execute(&self, work_dir: &Path, args: &[String]) -> Result<ExecutionOutcome, RunError> {
        let result = self
            .toolchain
            .execute(work_dir, args, self.config.timeout.into())
            .await;
        if let Err(ExecError::ToolchainUnavailable { .. }) = &result {
            log::warn!("Toolchain disappeared, probing again on the next request");
            self.toolchain_ready.store(false, Ordering::Release);
        }
        Ok(result?)
    }

    async fn ensure_toolchain(&self) -> Result<(), RunError> {
        if self.toolchain_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        let version = self.check_toolchain().await?;
        log::info!("Toolchain available: {version}");
        Ok(())
    }

    fn create_workspace(&self) -> Result<Workspace, RunError> {
        Ok(Workspace::create(
            &self.config.workspace_root(),
            &self.config.workspace_prefix,
        )?)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
