use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::RunnerConfig;

use super::{ExecError, ExecutionOutcome, execute_command};

/// Trait for the external compiler the orchestrator drives
///
/// This abstracts the subprocess so that the run/test state machine can be
/// exercised against scripted outcomes.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Reports the toolchain version, failing if it cannot be invoked
    async fn version(&self) -> Result<String, ExecError>;

    /// Runs the toolchain with `args` inside `work_dir`
    async fn execute(
        &self,
        work_dir: &Path,
        args: &[String],
        timeout: Duration,
    ) -> Result<ExecutionOutcome, ExecError>;
}

/// The locally installed `go` command
pub struct GoToolchain {
    config: RunnerConfig,
}

impl GoToolchain {
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl Toolchain for GoToolchain {
    async fn version(&self) -> Result<String, ExecError> {
        let work_dir = std::env::temp_dir();
        let outcome = execute_command(
            &self.config.go_binary,
            &["version".to_string()],
            &work_dir,
            &self.config.env,
            self.config.version_check_timeout.into(),
        )
        .await?;

        if let Some(error) = outcome.error {
            return Err(ExecError::ToolchainUnavailable {
                program: self.config.go_binary.display().to_string(),
                source: std::io::Error::other(error),
            });
        }
        Ok(outcome.stdout.trim().to_string())
    }

    async fn execute(
        &self,
        work_dir: &Path,
        args: &[String],
        timeout: Duration,
    ) -> Result<ExecutionOutcome, ExecError> {
        execute_command(&self.config.go_binary, args, work_dir, &self.config.env, timeout).await
    }
}
