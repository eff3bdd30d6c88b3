mod code;
mod exercises;
mod run;

pub use code::{get_code_handler, put_code_handler};
pub use exercises::{get_exercise_handler, get_exercises_handler};
pub use run::{post_run_handler, post_test_handler};

use actix_web::error::{InternalError, JsonPayloadError, QueryPayloadError};
use actix_web::{HttpRequest, HttpResponse, Responder, get, web};
use serde::Serialize;
use serde_json::json;
use sqlx::sqlite::SqlitePool;

use crate::orchestrator::RunError;
use crate::sandbox::ExecError;
use crate::sources::SourceError;

#[derive(Serialize)]
struct ErrorResponse {
    reason: &'static str,
    code: u32,
}

#[derive(Serialize)]
struct ErrorResponseWithMessage {
    reason: &'static str,
    code: u32,
    message: String,
}

impl ErrorResponseWithMessage {
    fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            reason: "ERR_INVALID_ARGUMENT",
            code: 1,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            reason: "ERR_NOT_FOUND",
            code: 3,
            message: message.into(),
        }
    }

    fn external(message: impl Into<String>) -> Self {
        Self {
            reason: "ERR_EXTERNAL",
            code: 5,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            reason: "ERR_INTERNAL",
            code: 6,
            message: message.into(),
        }
    }
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorResponse {
        reason: "ERR_INVALID_ARGUMENT",
        code: 1,
    });
    InternalError::from_response(err, response).into()
}

pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorResponse {
        reason: "ERR_INVALID_ARGUMENT",
        code: 1,
    });
    InternalError::from_response(err, response).into()
}

fn database_error(e: sqlx::Error) -> HttpResponse {
    log::error!("Database error: {e}");
    HttpResponse::InternalServerError().json(ErrorResponseWithMessage::external(e.to_string()))
}

fn source_error(e: &SourceError) -> HttpResponse {
    match e {
        SourceError::UnexpectedStatus { status, .. } if status.as_u16() == 404 => {
            HttpResponse::NotFound().json(ErrorResponseWithMessage::not_found(e.to_string()))
        }
        _ => HttpResponse::BadGateway().json(ErrorResponseWithMessage::external(e.to_string())),
    }
}

fn run_error(e: &RunError) -> HttpResponse {
    match e {
        RunError::InvalidInput(_) | RunError::UnknownSource(_) => {
            HttpResponse::BadRequest().json(ErrorResponseWithMessage::invalid_argument(e.to_string()))
        }
        RunError::Toolchain(ExecError::ToolchainUnavailable { .. }) => {
            HttpResponse::ServiceUnavailable()
                .json(ErrorResponseWithMessage::external(e.to_string()))
        }
        RunError::Upstream(source) => source_error(source),
        RunError::Toolchain(ExecError::Io { .. }) | RunError::Workspace(_) => {
            HttpResponse::InternalServerError()
                .json(ErrorResponseWithMessage::internal(e.to_string()))
        }
    }
}

#[get("/api/healthz")]
pub async fn healthz_handler(pool: web::Data<SqlitePool>) -> impl Responder {
    match sqlx::query("SELECT 1").execute(pool.get_ref()).await {
        Ok(_) => HttpResponse::Ok().json(json!({ "ok": true })),
        Err(e) => {
            log::error!("Health check failed: {e}");
            HttpResponse::InternalServerError().json(json!({ "ok": false, "error": e.to_string() }))
        }
    }
}
