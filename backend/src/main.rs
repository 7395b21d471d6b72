use actix_web::{App, HttpServer, middleware, web};
use anyhow::Context;
use video_splitter::{Ffmpeg, Workspace};

use crate::config::ServerConfig;
use crate::state::AppState;

mod config;
mod error;
mod files;
mod negotiate;
mod page;
mod state;
mod upload;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env().context("invalid server configuration")?;
    let ffmpeg = Ffmpeg::new(config.ffmpeg_path.clone(), config.ffprobe_path.clone())?;

    let workspace = Workspace::new(&config.data_dir);
    workspace
        .ensure()
        .await
        .with_context(|| format!("cannot create folders under {}", config.data_dir.display()))?;
    // Leftovers from a previous run are never served.
    if !workspace.clean().await {
        tracing::warn!("Some leftover files could not be removed at startup");
    }

    let state = web::Data::new(AppState::new(workspace, ffmpeg, config.max_upload_bytes));

    tracing::info!(bind = %config.bind, data_dir = %config.data_dir.display(), "Starting video splitter");
    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(routes)
    })
    .keep_alive(config.keep_alive)
    .shutdown_timeout(config.shutdown_timeout.as_secs());
    if let Some(workers) = config.workers {
        server = server.workers(workers);
    }

    server.bind(config.bind)?.run().await?;
    Ok(())
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(files::index)
        .service(upload::split_upload)
        .service(files::clear_all)
        .service(files::download_file);
}
