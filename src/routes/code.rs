use actix_web::{HttpResponse, Responder, get, put, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::sqlite::SqlitePool;

use super::database_error;
use crate::database as db;

#[derive(Deserialize)]
pub struct SavedCode {
    #[serde(default)]
    pub code: String,
}

#[get("/api/code/{source}/{slug}")]
pub async fn get_code_handler(
    pool: web::Data<SqlitePool>,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let (source, slug) = path.into_inner();

    match db::fetch_user_code(&source, &slug, pool.get_ref()).await {
        Ok(Some(saved)) => HttpResponse::Ok().json(saved),
        Ok(None) => HttpResponse::Ok().json(json!({ "code": null, "updatedAt": null })),
        Err(e) => database_error(e),
    }
}

#[put("/api/code/{source}/{slug}")]
pub async fn put_code_handler(
    pool: web::Data<SqlitePool>,
    path: web::Path<(String, String)>,
    body: web::Json<SavedCode>,
) -> impl Responder {
    let (source, slug) = path.into_inner();

    match db::save_user_code(&source, &slug, &body.code, pool.get_ref()).await {
        Ok(()) => {
            log::info!("Saved code for {source}/{slug}");
            HttpResponse::Ok().json(json!({ "ok": true }))
        }
        Err(e) => database_error(e),
    }
}
