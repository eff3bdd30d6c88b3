mod assemble;
mod executor;
mod toolchain;
mod workspace;

// Re-export the toolchain seam and the pieces the orchestrator drives
pub use assemble::{AssembleMode, ENTRY_PACKAGE, SourceUnit, assemble};
pub use executor::{ExecError, ExecutionOutcome, execute_command};
pub use toolchain::{GoToolchain, Toolchain};
pub use workspace::Workspace;

use serde::{Deserialize, Serialize};

/// A named file fetched from an exercise repository
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ReferenceFile {
    pub name: String,
    pub content: String,
}

impl ReferenceFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Test files and the fixtures they need, in the order they were listed upstream
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceTestSet {
    pub tests: Vec<ReferenceFile>,
    pub assets: Vec<ReferenceFile>,
}

impl ReferenceTestSet {
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}
