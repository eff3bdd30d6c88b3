use actix_web::{HttpResponse, Responder, post, web};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;

use super::run_error;
use crate::create_timestamp;
use crate::database::{self as db, RunRecord};
use crate::orchestrator::{Orchestrator, Submission};

/// A report together with the id it is stored under
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WithRunId<T> {
    #[serde(flatten)]
    report: T,
    run_id: String,
}

struct RunSummary<'a> {
    mode: &'static str,
    status: &'static str,
    stdout: &'a str,
    stderr: &'a str,
    duration_ms: u64,
}

/// Persists the run in the background; failures only reach the log
fn spawn_record(pool: &SqlitePool, submission: &Submission, summary: RunSummary<'_>) -> String {
    let record = RunRecord {
        id: uuid::Uuid::new_v4().to_string(),
        source: submission.source.clone(),
        slug: submission.slug.clone(),
        code: submission.code.clone(),
        mode: summary.mode.to_string(),
        status: summary.status.to_string(),
        stdout: summary.stdout.to_string(),
        stderr: summary.stderr.to_string(),
        duration_ms: i64::try_from(summary.duration_ms).unwrap_or(i64::MAX),
        created_time: create_timestamp(),
    };
    let run_id = record.id.clone();

    let pool = pool.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = db::insert_run(&record, &pool).await {
            log::warn!("Failed to persist run {}: {e}", record.id);
        }
    });

    run_id
}

#[post("/api/run")]
pub async fn post_run_handler(
    orchestrator: web::Data<Orchestrator>,
    pool: web::Data<SqlitePool>,
    body: web::Json<Submission>,
) -> impl Responder {
    let submission = body.into_inner();

    let report = match orchestrator.run(&submission.code).await {
        Ok(report) => report,
        Err(e) => return run_error(&e),
    };

    let run_id = spawn_record(
        pool.get_ref(),
        &submission,
        RunSummary {
            mode: "run",
            status: report.status.as_str(),
            stdout: &report.stdout,
            stderr: &report.stderr,
            duration_ms: report.duration_ms,
        },
    );

    HttpResponse::Ok().json(WithRunId { report, run_id })
}

#[post("/api/test")]
pub async fn post_test_handler(
    orchestrator: web::Data<Orchestrator>,
    pool: web::Data<SqlitePool>,
    body: web::Json<Submission>,
) -> impl Responder {
    let submission = body.into_inner();

    let report = match orchestrator.test(&submission).await {
        Ok(report) => report,
        Err(e) => return run_error(&e),
    };

    let run_id = spawn_record(
        pool.get_ref(),
        &submission,
        RunSummary {
            mode: "test",
            status: report.status.as_str(),
            stdout: &report.stdout,
            stderr: &report.stderr,
            duration_ms: report.duration_ms,
        },
    );

    HttpResponse::Ok().json(WithRunId { report, run_id })
}
