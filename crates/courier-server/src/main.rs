use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use courier_server::App;
use courier_server::config::ServerConfig;
use courier_server::http::router;
use courier_server::logging::init_tracing;

/// DICOM task orchestration server.
#[derive(Debug, Parser)]
#[command(name = "courier-server", version, about)]
struct Args {
    /// Path to a TOML config file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // (A) config と logging
    let config = ServerConfig::load(args.config.as_deref()).context("loading configuration")?;
    init_tracing(&config.logging);
    let addr = config.bind_addr()?;

    // (B) task store / pipeline / scheduler / HTTP state を組み立てる
    let app = App::build(&config).await.context("building application")?;
    let recovered = app.scheduler.recover().await?;
    if recovered > 0 {
        warn!(recovered, "resuming interrupted tasks");
    }

    // (C) worker を起動
    let workers = app
        .scheduler
        .start()
        .context("starting scheduler")?;

    // (D) HTTP を起動し、Ctrl-C で止める
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, workers = workers.workers(), "listening");
    axum::serve(listener, router(app.state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    // 実行中の step は最後まで走らせる
    info!("shutting down workers");
    workers.shutdown_and_join().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
