#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use codelab::config::RunnerConfig;
use codelab::orchestrator::Orchestrator;
use codelab::sandbox::{
    ExecError, ExecutionOutcome, ReferenceFile, ReferenceTestSet, Toolchain,
};
use codelab::sources::{
    ExerciseDetail, ExerciseMeta, ExerciseSource, SourceError, SourceRegistry,
};

/// What the fake toolchain does when asked to execute
#[derive(Clone)]
pub enum Script {
    Finish(ExecutionOutcome),
    /// Sleeps before finishing, keeping the workspace alive meanwhile
    Slow(Duration, ExecutionOutcome),
    Unavailable,
    /// Reports a version, then is gone by the time anything executes
    Vanishes,
}

/// Toolchain spy recording every invocation
pub struct FakeToolchain {
    script: Script,
    calls: AtomicUsize,
    version_checks: AtomicUsize,
    seen: Mutex<Vec<Invocation>>,
}

/// Snapshot of a workspace at execution time
#[derive(Debug, Clone)]
pub struct Invocation {
    pub work_dir: PathBuf,
    pub args: Vec<String>,
    pub files: BTreeMap<String, String>,
}

impl FakeToolchain {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            version_checks: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn version_checks(&self) -> usize {
        self.version_checks.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.seen.lock().clone()
    }

    fn unavailable() -> ExecError {
        ExecError::ToolchainUnavailable {
            program: "go".to_string(),
            source: io::Error::from(io::ErrorKind::NotFound),
        }
    }
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn version(&self) -> Result<String, ExecError> {
        self.version_checks.fetch_add(1, Ordering::SeqCst);
        match self.script {
            Script::Unavailable => Err(Self::unavailable()),
            _ => Ok("go version go1.21.0 fake/amd64".to_string()),
        }
    }

    async fn execute(
        &self,
        work_dir: &Path,
        args: &[String],
        _timeout: Duration,
    ) -> Result<ExecutionOutcome, ExecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(Invocation {
            work_dir: work_dir.to_path_buf(),
            args: args.to_vec(),
            files: snapshot(work_dir),
        });

        match &self.script {
            Script::Finish(outcome) => Ok(outcome.clone()),
            Script::Slow(delay, outcome) => {
                tokio::time::sleep(*delay).await;
                Ok(outcome.clone())
            }
            Script::Unavailable | Script::Vanishes => Err(Self::unavailable()),
        }
    }
}

/// Every file under `dir`, keyed by its relative path
fn snapshot(dir: &Path) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let name = path.strip_prefix(dir).unwrap().to_string_lossy().into_owned();
                files.insert(name, fs::read_to_string(&path).unwrap());
            }
        }
    }
    files
}

/// Exercise source serving one fixed reference test set
pub struct FakeSource {
    pub reference: ReferenceTestSet,
    pub fetches: AtomicUsize,
}

impl FakeSource {
    pub fn new(reference: ReferenceTestSet) -> Arc<Self> {
        Arc::new(Self {
            reference,
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn with_test(content: &str) -> Arc<Self> {
        Self::new(ReferenceTestSet {
            tests: vec![ReferenceFile::new("sum_test.go", content)],
            assets: vec![ReferenceFile::new("testdata/input.txt", "1 2 3\n")],
        })
    }
}

#[async_trait]
impl ExerciseSource for FakeSource {
    fn key(&self) -> &'static str {
        "fake"
    }

    fn label(&self) -> &'static str {
        "fake-exercises"
    }

    async fn list_exercises(&self) -> Result<Vec<ExerciseMeta>, SourceError> {
        Ok(vec![ExerciseMeta {
            slug: "sum".to_string(),
            title: "Sum".to_string(),
            path: "sum".to_string(),
            source: self.key().to_string(),
            source_label: self.label().to_string(),
        }])
    }

    async fn exercise_detail(&self, slug: &str) -> Result<ExerciseDetail, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(ExerciseDetail {
            slug: slug.to_string(),
            title: "Sum".to_string(),
            path: slug.to_string(),
            description: "Add numbers".to_string(),
            solution_code: "package main".to_string(),
            starter_code: codelab::sources::starter_code("Solve \"Sum\""),
            source: "fake exercises".to_string(),
            source_key: self.key().to_string(),
            source_label: self.label().to_string(),
            has_solution: true,
            has_tests: !self.reference.is_empty(),
        })
    }

    async fn reference_tests(&self, _slug: &str) -> Result<ReferenceTestSet, SourceError> {
        Ok(self.reference.clone())
    }
}

/// Orchestrator whose workspaces live under a directory the test owns
pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub toolchain: Arc<FakeToolchain>,
    pub root: TempDir,
}

impl Harness {
    pub fn new(script: Script, source: Arc<FakeSource>) -> Self {
        let root = tempfile::tempdir().unwrap();
        let config = RunnerConfig {
            workspace_root: Some(root.path().to_path_buf()),
            ..RunnerConfig::default()
        };
        let toolchain = FakeToolchain::new(script);
        let orchestrator = Orchestrator::new(
            config,
            toolchain.clone(),
            SourceRegistry::new().register(source),
        );
        Self {
            orchestrator: Arc::new(orchestrator),
            toolchain,
            root,
        }
    }

    /// Entries left under the workspace root
    pub fn leftovers(&self) -> Vec<PathBuf> {
        fs::read_dir(self.root.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }
}

pub fn finished(stdout: &str) -> ExecutionOutcome {
    ExecutionOutcome {
        stdout: stdout.to_string(),
        exit_code: Some(0),
        duration: Duration::from_millis(40),
        ..ExecutionOutcome::default()
    }
}

pub fn failed(stdout: &str, stderr: &str) -> ExecutionOutcome {
    ExecutionOutcome {
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        error: Some("Process exited with status 1".to_string()),
        exit_code: Some(1),
        duration: Duration::from_millis(40),
        ..ExecutionOutcome::default()
    }
}

pub fn timed_out() -> ExecutionOutcome {
    timed_out_with("partial\n")
}

pub fn timed_out_with(stdout: &str) -> ExecutionOutcome {
    ExecutionOutcome {
        stdout: stdout.to_string(),
        error: Some("Execution timed out after 6000ms".to_string()),
        timed_out: true,
        duration: Duration::from_millis(6000),
        ..ExecutionOutcome::default()
    }
}
