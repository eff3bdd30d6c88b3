mod extract;

pub use extract::{ExpectedActual, extract_expected_actual};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One line of `go test -json` output
///
/// Every field is optional; records that carry none of them are ignored.
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct TestEvent {
    #[serde(rename = "Test")]
    test: Option<String>,
    #[serde(rename = "Output")]
    output: Option<String>,
    #[serde(rename = "Action")]
    action: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TestCaseResult {
    pub name: String,
    /// `None` until the runner reports a terminal action for the test
    pub passed: Option<bool>,
    pub output: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestRunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl TestRunSummary {
    pub fn of(tests: &[TestCaseResult]) -> Self {
        let total = tests.len();
        let passed = tests.iter().filter(|t| t.passed == Some(true)).count();
        Self {
            total,
            passed,
            failed: total - passed,
        }
    }
}

/// Normalized view of a test run
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTestOutput {
    pub tests: Vec<TestCaseResult>,
    pub package_output: Vec<String>,
}

impl ParsedTestOutput {
    pub fn summary(&self) -> TestRunSummary {
        TestRunSummary::of(&self.tests)
    }
}

/// Parses a line-delimited structured event stream
///
/// Tests are reported in the order they first appear. Lines that are not
/// event records are kept verbatim (trimmed) as package output.
pub fn parse(raw_output: &str) -> ParsedTestOutput {
    let mut tests: Vec<TestCaseResult> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut package_output = Vec::new();

    for line in raw_output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let event = match serde_json::from_str::<TestEvent>(trimmed) {
            Ok(event) => event,
            Err(_) => {
                package_output.push(trimmed.to_string());
                continue;
            }
        };

        let Some(name) = event.test else {
            if let Some(output) = event.output {
                package_output.push(output.trim_end().to_string());
            }
            continue;
        };

        let slot = *index.entry(name.clone()).or_insert_with(|| {
            tests.push(TestCaseResult {
                name,
                passed: None,
                output: Vec::new(),
                expected: None,
                actual: None,
            });
            tests.len() - 1
        });
        let test = &mut tests[slot];

        if let Some(output) = event.output {
            test.output.push(output.trim_end().to_string());
        }
        match event.action.as_deref() {
            Some("pass") => test.passed = Some(true),
            Some("fail") => test.passed = Some(false),
            _ => {}
        }
    }

    for test in &mut tests {
        if let Some(found) = extract_expected_actual(&test.output.join(" ")) {
            test.expected = Some(found.expected);
            test.actual = Some(found.actual);
        }
    }

    ParsedTestOutput {
        tests,
        package_output,
    }
}
