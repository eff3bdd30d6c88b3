use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// Upper bound on the bytes kept per output stream
const MAX_CAPTURED_BYTES: usize = 1 << 20;
/// Line appended to a stream once it hits the cap
const TRUNCATION_NOTICE: &str = "\n[output truncated at 1048576 bytes]\n";
/// How long to wait for the output pipes to close once the process is gone
const READER_GRACE: Duration = Duration::from_millis(500);

/// Raw result of one subprocess invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    /// Process-level failure: timeout, non-zero exit or a terminating signal
    pub error: Option<String>,
    pub timed_out: bool,
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl ExecutionOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ExecError {
    #[error("{program} is not installed or not in PATH")]
    ToolchainUnavailable {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to execute {program}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Runs `program` in `work_dir` and waits at most `timeout` for it to finish
///
/// The child is placed in its own process group so that everything it spawns
/// is killed together on timeout. Output produced before the kill is kept.
pub async fn execute_command(
    program: impl AsRef<OsStr>,
    args: &[String],
    work_dir: &Path,
    env: &BTreeMap<String, String>,
    timeout: Duration,
) -> Result<ExecutionOutcome, ExecError> {
    let program_name = program.as_ref().to_string_lossy().into_owned();

    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(env)
        .current_dir(work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    let start_time = Instant::now();
    let mut child = cmd.spawn().map_err(|source| match source.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
            ExecError::ToolchainUnavailable {
                program: program_name.clone(),
                source,
            }
        }
        _ => ExecError::Io {
            program: program_name.clone(),
            source,
        },
    })?;
    log::debug!("Spawned {program_name} {args:?} in {}", work_dir.display());

    let stdout = Arc::new(Mutex::new(Vec::new()));
    let stderr = Arc::new(Mutex::new(Vec::new()));
    let readers = [
        child.stdout.take().map(|pipe| spawn_drain(pipe, stdout.clone())),
        child.stderr.take().map(|pipe| spawn_drain(pipe, stderr.clone())),
    ];

    let waited = tokio::time::timeout(timeout, child.wait()).await;
    let (status, timed_out) = match waited {
        Ok(Ok(status)) => (Some(status), false),
        Ok(Err(source)) => {
            kill_process_group(&mut child).await;
            return Err(ExecError::Io {
                program: program_name,
                source,
            });
        }
        Err(_) => {
            log::info!("{program_name} exceeded {}ms, killing it", timeout.as_millis());
            kill_process_group(&mut child).await;
            (None, true)
        }
    };
    let duration = start_time.elapsed();

    for mut reader in readers.into_iter().flatten() {
        if tokio::time::timeout(READER_GRACE, &mut reader).await.is_err() {
            log::warn!("Output pipe of {program_name} still open after exit, abandoning it");
            reader.abort();
        }
    }

    let error = match status {
        _ if timed_out => Some(format!(
            "Execution timed out after {}ms",
            timeout.as_millis()
        )),
        Some(status) => describe_failure(status),
        None => None,
    };

    let stdout = String::from_utf8_lossy(&stdout.lock()).into_owned();
    let stderr = String::from_utf8_lossy(&stderr.lock()).into_owned();

    Ok(ExecutionOutcome {
        stdout,
        stderr,
        error,
        timed_out,
        exit_code: status.and_then(|s| s.code()),
        duration,
    })
}

fn describe_failure(status: ExitStatus) -> Option<String> {
    if status.success() {
        return None;
    }
    match (status.code(), status.signal()) {
        (Some(code), _) => Some(format!("Process exited with status {code}")),
        (None, Some(signal)) => Some(format!("Process terminated by signal {signal}")),
        (None, None) => Some("Process exited abnormally".to_string()),
    }
}

/// Kills the whole process group of `child` and reaps it
async fn kill_process_group(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: kill(2) has no memory-safety preconditions; the negative pid
        // addresses the group created by `process_group(0)` at spawn time.
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
        }
    }
    if let Err(e) = child.kill().await {
        log::debug!("Child already gone while killing: {e}");
    }
}

fn spawn_drain<R>(pipe: R, sink: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut pipe = pipe;
        let mut chunk = [0u8; 8192];
        let mut truncated = false;
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) => break,
                Ok(_) if truncated => {}
                Ok(n) => {
                    let mut buf = sink.lock();
                    let room = MAX_CAPTURED_BYTES.saturating_sub(buf.len());
                    buf.extend_from_slice(&chunk[..n.min(room)]);
                    if n > room {
                        // the rest is still drained, only not stored
                        truncated = true;
                        buf.extend_from_slice(TRUNCATION_NOTICE.as_bytes());
                        log::warn!("Child output exceeded {MAX_CAPTURED_BYTES} bytes, truncating");
                    }
                }
                Err(e) => {
                    log::debug!("Stopped reading child output: {e}");
                    break;
                }
            }
        }
    })
}
