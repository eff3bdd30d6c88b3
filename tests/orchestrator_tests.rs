mod common;

use std::collections::HashSet;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::task::JoinSet;

use codelab::orchestrator::{RunError, RunStatus, Submission, TestStatus};
use codelab::report::TestRunSummary;
use codelab::sandbox::{ExecError, ReferenceTestSet};

use common::{FakeSource, Harness, Script, failed, finished, timed_out, timed_out_with};

const SUM_TEST: &str = "package sum\n\nimport \"testing\"\n\nfunc TestSum(t *testing.T) {}\n";

fn submission(code: &str) -> Submission {
    Submission {
        code: code.to_string(),
        source: Some("fake".to_string()),
        slug: Some("sum".to_string()),
    }
}

fn test_events(lines: &[&str]) -> String {
    lines.iter().map(|l| format!("{l}\n")).collect()
}

#[tokio::test]
async fn test_run_reports_exact_stdout() {
    let harness = Harness::new(
        Script::Finish(finished("hi\n")),
        FakeSource::new(ReferenceTestSet::default()),
    );

    let report = harness
        .orchestrator
        .run("package main\nimport \"fmt\"\nfunc main(){ fmt.Println(\"hi\") }")
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Ok);
    assert_eq!(report.stdout, "hi\n");
    assert_eq!(report.stderr, "");
    assert_eq!(report.duration_ms, 40);

    let invocations = harness.toolchain.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].args, vec!["run", "main.go"]);
    assert!(invocations[0].files.contains_key("go.mod"));
    assert!(harness.leftovers().is_empty());
}

#[tokio::test]
async fn test_run_injects_entry_point_and_keeps_code_contiguous() {
    let harness = Harness::new(
        Script::Finish(finished("")),
        FakeSource::new(ReferenceTestSet::default()),
    );
    let code = "func Add(a, b int) int {\n\treturn a + b\n}";

    harness.orchestrator.run(code).await.unwrap();

    let main_go = &harness.toolchain.invocations()[0].files["main.go"];
    assert!(main_go.starts_with("package main\n"));
    assert!(main_go.contains(code));
    assert_eq!(main_go.matches("func main()").count(), 1);
}

#[tokio::test]
async fn test_run_rejects_blank_code_without_workspace() {
    let harness = Harness::new(
        Script::Finish(finished("")),
        FakeSource::new(ReferenceTestSet::default()),
    );

    let err = harness.orchestrator.run("  \n").await.unwrap_err();

    assert!(matches!(err, RunError::InvalidInput("Missing code")));
    assert!(err.is_client_error());
    assert_eq!(harness.toolchain.calls(), 0);
    assert!(harness.leftovers().is_empty());
}

#[tokio::test]
async fn test_run_without_toolchain_creates_no_workspace() {
    let harness = Harness::new(Script::Unavailable, FakeSource::new(ReferenceTestSet::default()));

    let err = harness
        .orchestrator
        .run("package main\nfunc main() {}")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RunError::Toolchain(ExecError::ToolchainUnavailable { .. })
    ));
    assert_eq!(err.to_string(), "go is not installed or not in PATH");
    assert_eq!(harness.toolchain.calls(), 0);
    assert!(harness.leftovers().is_empty());
}

#[tokio::test]
async fn test_toolchain_check_is_cached() {
    let harness = Harness::new(
        Script::Finish(finished("")),
        FakeSource::new(ReferenceTestSet::default()),
    );

    for _ in 0..3 {
        harness.orchestrator.run("package main\nfunc main() {}").await.unwrap();
    }

    assert_eq!(harness.toolchain.version_checks(), 1);
    assert_eq!(harness.toolchain.calls(), 3);
}

#[tokio::test]
async fn test_toolchain_vanishing_mid_session_cleans_up_and_rechecks() {
    let harness = Harness::new(Script::Vanishes, FakeSource::with_test(SUM_TEST));

    let err = harness
        .orchestrator
        .run("package main\nfunc main() {}")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RunError::Toolchain(ExecError::ToolchainUnavailable { .. })
    ));
    assert_eq!(harness.toolchain.calls(), 1);
    assert!(!harness.toolchain.invocations()[0].work_dir.exists());
    assert!(harness.leftovers().is_empty());

    let err = harness
        .orchestrator
        .test(&submission("package sum"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RunError::Toolchain(ExecError::ToolchainUnavailable { .. })
    ));
    assert_eq!(harness.toolchain.version_checks(), 2);
    assert_eq!(harness.toolchain.calls(), 2);
    assert!(harness.leftovers().is_empty());
}

#[tokio::test]
async fn test_run_failure_is_a_status() {
    let harness = Harness::new(
        Script::Finish(failed("", "./main.go:3:1: syntax error\n")),
        FakeSource::new(ReferenceTestSet::default()),
    );

    let report = harness.orchestrator.run("package main\nfunc main() {").await.unwrap();

    assert_eq!(report.status, RunStatus::Error);
    assert_eq!(report.stderr, "./main.go:3:1: syntax error\n");
    assert!(harness.leftovers().is_empty());
}

#[tokio::test]
async fn test_run_timeout_keeps_partial_output_and_cleans_up() {
    let harness = Harness::new(
        Script::Finish(timed_out()),
        FakeSource::new(ReferenceTestSet::default()),
    );

    let report = harness
        .orchestrator
        .run("package main\nfunc main() { for {} }")
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Error);
    assert_eq!(report.stdout, "partial\n");
    assert_eq!(report.stderr, "Execution timed out after 6000ms");
    assert!(!harness.toolchain.invocations()[0].work_dir.exists());
    assert!(harness.leftovers().is_empty());
}

#[tokio::test]
async fn test_missing_reference_tests_skip_toolchain() {
    let harness = Harness::new(
        Script::Finish(finished("")),
        FakeSource::new(ReferenceTestSet::default()),
    );

    let report = harness
        .orchestrator
        .test(&submission("package main\nfunc Sum() int { return 0 }"))
        .await
        .unwrap();

    assert_eq!(report.status, TestStatus::MissingTests);
    assert_eq!(report.summary, TestRunSummary::default());
    assert_eq!(report.message.as_deref(), Some("No tests found for this exercise"));
    assert_eq!(harness.toolchain.calls(), 0);
    assert!(harness.leftovers().is_empty());
}

#[tokio::test]
async fn test_test_mode_assembles_reference_files() {
    let stdout = test_events(&[
        r#"{"Action":"run","Test":"TestSum"}"#,
        r#"{"Action":"pass","Test":"TestSum"}"#,
    ]);
    let harness = Harness::new(Script::Finish(finished(&stdout)), FakeSource::with_test(SUM_TEST));

    let report = harness
        .orchestrator
        .test(&submission("package main\n\nfunc Sum(xs []int) int { return 0 }\n"))
        .await
        .unwrap();

    assert_eq!(report.status, TestStatus::Pass);
    assert_eq!(
        report.summary,
        TestRunSummary {
            total: 1,
            passed: 1,
            failed: 0
        }
    );

    let invocation = &harness.toolchain.invocations()[0];
    assert_eq!(invocation.args, vec!["test", "-json", "."]);
    assert!(invocation.files["solution.go"].starts_with("package sum\n"));
    assert_eq!(invocation.files["sum_test.go"], SUM_TEST);
    assert_eq!(invocation.files["testdata/input.txt"], "1 2 3\n");
    assert!(harness.leftovers().is_empty());
}

#[tokio::test]
async fn test_test_mode_reports_failures_with_expected_and_actual() {
    let stdout = test_events(&[
        r#"{"Action":"run","Test":"TestSum"}"#,
        r#"{"Action":"output","Test":"TestSum","Output":"    sum_test.go:9: want 5 got 3\n"}"#,
        r#"{"Action":"fail","Test":"TestSum"}"#,
        r#"{"Action":"run","Test":"TestEmpty"}"#,
        r#"{"Action":"pass","Test":"TestEmpty"}"#,
    ]);
    let harness = Harness::new(
        Script::Finish(failed(&stdout, "")),
        FakeSource::with_test(SUM_TEST),
    );

    let report = harness.orchestrator.test(&submission("package sum")).await.unwrap();

    assert_eq!(report.status, TestStatus::Fail);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.tests[0].name, "TestSum");
    assert_eq!(report.tests[0].expected.as_deref(), Some("5"));
    assert_eq!(report.tests[0].actual.as_deref(), Some("3"));
    assert_eq!(report.error, None);
}

#[tokio::test]
async fn test_compile_failure_is_an_error_and_cleans_up() {
    let harness = Harness::new(
        Script::Finish(failed("", "# sum\n./solution.go:3:1: undefined: x\n")),
        FakeSource::with_test(SUM_TEST),
    );

    let report = harness.orchestrator.test(&submission("package sum\nx")).await.unwrap();

    assert_eq!(report.status, TestStatus::Error);
    assert_eq!(report.error.as_deref(), Some("Process exited with status 1"));
    assert_eq!(
        report.package_output,
        vec!["# sum", "./solution.go:3:1: undefined: x"]
    );
    assert!(harness.leftovers().is_empty());
}

#[tokio::test]
async fn test_test_timeout_after_passing_tests_is_an_error() {
    let stdout = test_events(&[
        r#"{"Action":"run","Test":"TestSum"}"#,
        r#"{"Action":"pass","Test":"TestSum"}"#,
        r#"{"Action":"run","Test":"TestHang"}"#,
    ]);
    let harness = Harness::new(
        Script::Finish(timed_out_with(&stdout)),
        FakeSource::with_test(SUM_TEST),
    );

    let report = harness.orchestrator.test(&submission("package sum")).await.unwrap();

    assert_eq!(report.status, TestStatus::Error);
    assert_eq!(report.error.as_deref(), Some("Execution timed out after 6000ms"));
    assert_eq!(report.tests[0].passed, Some(true));
    assert_eq!(report.tests[1].passed, None);
    assert!(!harness.toolchain.invocations()[0].work_dir.exists());
    assert!(harness.leftovers().is_empty());
}

#[tokio::test]
async fn test_test_timeout_with_every_seen_test_passed_is_an_error() {
    let stdout = test_events(&[
        r#"{"Action":"run","Test":"TestSum"}"#,
        r#"{"Action":"pass","Test":"TestSum"}"#,
    ]);
    let harness = Harness::new(
        Script::Finish(timed_out_with(&stdout)),
        FakeSource::with_test(SUM_TEST),
    );

    let report = harness.orchestrator.test(&submission("package sum")).await.unwrap();

    assert_eq!(report.status, TestStatus::Error);
    assert_eq!(report.summary.passed, 1);
    assert!(harness.leftovers().is_empty());
}

#[tokio::test]
async fn test_test_mode_validates_request() {
    let harness = Harness::new(Script::Finish(finished("")), FakeSource::with_test(SUM_TEST));

    let mut no_slug = submission("package sum");
    no_slug.slug = None;
    let mut unknown = submission("package sum");
    unknown.source = Some("gitlab".to_string());
    let mut traversal = submission("package sum");
    traversal.slug = Some("../etc".to_string());

    assert!(matches!(
        harness.orchestrator.test(&no_slug).await,
        Err(RunError::InvalidInput("Missing slug"))
    ));
    assert!(matches!(
        harness.orchestrator.test(&unknown).await,
        Err(RunError::UnknownSource(key)) if key == "gitlab"
    ));
    assert!(matches!(
        harness.orchestrator.test(&traversal).await,
        Err(RunError::InvalidInput("Invalid slug"))
    ));
    assert_eq!(harness.toolchain.calls(), 0);
}

#[tokio::test]
async fn test_concurrent_runs_use_distinct_workspaces() {
    let harness = Harness::new(
        Script::Slow(Duration::from_millis(50), finished("ok\n")),
        FakeSource::new(ReferenceTestSet::default()),
    );

    let mut runs = JoinSet::new();
    for i in 0..8 {
        let orchestrator = harness.orchestrator.clone();
        runs.spawn(async move {
            orchestrator
                .run(&format!("package main\nfunc main() {{ println({i}) }}"))
                .await
        });
    }
    while let Some(result) = runs.join_next().await {
        assert_eq!(result.unwrap().unwrap().status, RunStatus::Ok);
    }

    let dirs: HashSet<_> = harness
        .toolchain
        .invocations()
        .into_iter()
        .map(|i| i.work_dir)
        .collect();
    assert_eq!(dirs.len(), 8);
    assert!(harness.leftovers().is_empty());
}
