use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware, web};
use sqlx::sqlite::SqlitePool;

use crate::config::ServerConfig;
use crate::orchestrator::Orchestrator;
use crate::routes::{
    get_code_handler, get_exercise_handler, get_exercises_handler, healthz_handler,
    json_error_handler, post_run_handler, post_test_handler, put_code_handler,
    query_error_handler,
};

/// Upper bound of a JSON request body
const JSON_LIMIT: usize = 500 * 1024;

pub fn build_server(
    server_config: ServerConfig,
    db_pool: SqlitePool,
    orchestrator: Arc<Orchestrator>,
) -> std::io::Result<Server> {
    let sources = web::Data::new(orchestrator.sources().clone());
    let db_pool = web::Data::new(db_pool);
    let orchestrator = web::Data::from(orchestrator);

    let bind_address = server_config
        .bind_address
        .unwrap_or("127.0.0.1".to_string());
    let bind_port = server_config.bind_port.unwrap_or(3001);
    log::info!("Listening on http://{bind_address}:{bind_port}");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(db_pool.clone())
            .app_data(sources.clone())
            .app_data(orchestrator.clone())
            .app_data(
                web::JsonConfig::default()
                    .limit(JSON_LIMIT)
                    .error_handler(json_error_handler),
            )
            .app_data(web::QueryConfig::default().error_handler(query_error_handler))
            .wrap(middleware::Logger::default())
            .service(healthz_handler)
            .service(get_exercises_handler)
            .service(get_exercise_handler)
            .service(get_code_handler)
            .service(put_code_handler)
            .service(post_run_handler)
            .service(post_test_handler)
    })
    .bind((bind_address, bind_port))?
    .run();

    Ok(server)
}
