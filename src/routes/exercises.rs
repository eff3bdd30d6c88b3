use actix_web::{HttpResponse, Responder, get, web};
use serde::Deserialize;
use sqlx::sqlite::SqlitePool;

use super::{ErrorResponseWithMessage, database_error, source_error};
use crate::database as db;
use crate::sources::{DEFAULT_SOURCE, SourceRegistry, is_valid_slug};

#[derive(Deserialize)]
pub struct ExercisesQueryParams {
    pub source: Option<String>,
}

fn invalid_source() -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponseWithMessage::invalid_argument("Invalid source"))
}

#[get("/api/exercises")]
pub async fn get_exercises_handler(
    sources: web::Data<SourceRegistry>,
    query: web::Query<ExercisesQueryParams>,
) -> impl Responder {
    let key = query
        .source
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SOURCE);
    let Some(source) = sources.get(key) else {
        return invalid_source();
    };

    match source.list_exercises().await {
        Ok(list) => {
            log::info!("Listed {} exercises from {key}", list.len());
            HttpResponse::Ok().json(list)
        }
        Err(e) => {
            log::error!("Failed to list exercises from {key}: {e}");
            source_error(&e)
        }
    }
}

#[get("/api/exercises/{source}/{slug}")]
pub async fn get_exercise_handler(
    sources: web::Data<SourceRegistry>,
    pool: web::Data<SqlitePool>,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let (key, slug) = path.into_inner();
    let Some(source) = sources.get(&key) else {
        return invalid_source();
    };
    if !is_valid_slug(&slug) {
        return HttpResponse::BadRequest()
            .json(ErrorResponseWithMessage::invalid_argument("Invalid slug"));
    }

    match db::fetch_exercise(&key, &slug, pool.get_ref()).await {
        Ok(Some(detail)) => {
            log::info!("Served exercise {key}/{slug} from cache");
            return HttpResponse::Ok().json(detail);
        }
        Ok(None) => {}
        Err(e) => return database_error(e),
    }

    let detail = match source.exercise_detail(&slug).await {
        Ok(detail) => detail,
        Err(e) => {
            log::error!("Failed to fetch exercise {key}/{slug}: {e}");
            return source_error(&e);
        }
    };

    if let Err(e) = db::upsert_exercise(&detail, pool.get_ref()).await {
        return database_error(e);
    }
    log::info!("Fetched exercise {key}/{slug} from upstream");

    HttpResponse::Ok().json(detail)
}
