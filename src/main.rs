use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use codelab::config::{CliArgs, Config};
use codelab::database as db;
use codelab::orchestrator::Orchestrator;
use codelab::sandbox::GoToolchain;
use codelab::sources::{GithubClient, SourceRegistry};
use codelab::web_server::build_server;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();

    let Config {
        server: server_config,
        runner: runner_config,
        sources: mut sources_config,
        database: database_config,
    } = cli.to_config().context("Failed to load configuration")?;

    if sources_config.github_token.is_none() {
        sources_config.github_token = std::env::var("GITHUB_TOKEN").ok();
    }

    let db_path = db::get_db_path(&database_config)?;
    if cli.flush_data {
        db::remove_db(&db_path);
    }

    let db_pool = db::init_db(&db_path)
        .await
        .context("Failed to initialize database")?;

    let client = GithubClient::new(&sources_config).context("Failed to build HTTP client")?;
    let toolchain = Arc::new(GoToolchain::new(&runner_config));
    let orchestrator = Arc::new(Orchestrator::new(
        runner_config,
        toolchain,
        SourceRegistry::github(client),
    ));

    // Later requests retry when the toolchain was not found
    match orchestrator.check_toolchain().await {
        Ok(version) => log::info!("Using {version}"),
        Err(e) => log::warn!("Go toolchain unavailable: {e}"),
    }

    // ======= PREPARATION END, EXECUTION START =======

    let server = build_server(server_config, db_pool.clone(), orchestrator)
        .context("Failed to build server")?;

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
    }

    server_handle.stop(true).await;
    db_pool.close().await;

    log::info!("Shutdown complete");
    Ok(())
}
