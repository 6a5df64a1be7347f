//! `serve`: HTTP API, dispatcher and worker pool in one process.

use anyhow::{Context, Result};
use clap::Args;

use crate::adapters::http::HttpServer;
use crate::domain::models::config::Config;
use crate::infrastructure::setup::{build_runtime, open_database};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Override the configured listen host
    #[arg(long)]
    pub host: Option<String>,

    /// Override the configured listen port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Serve the API without starting the dispatcher
    #[arg(long)]
    pub no_dispatcher: bool,
}

pub async fn execute(args: ServeArgs, config: &Config) -> Result<()> {
    let mut server_config = config.server.clone();
    if let Some(host) = args.host {
        server_config.host = host;
    }
    if let Some(port) = args.port {
        server_config.port = port;
    }

    let pool = open_database(config).await?;
    let runtime = build_runtime(pool.clone(), config)?;
    let shutdown = runtime.dispatcher.shutdown_token();

    let dispatcher = if args.no_dispatcher {
        tracing::info!("Dispatcher disabled; manual runs only");
        None
    } else {
        Some(runtime.dispatcher.clone().start())
    };

    let server = HttpServer::new(runtime.service.clone(), server_config);
    let signal_token = shutdown.clone();
    let served = server
        .serve_with_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received");
            signal_token.cancel();
        })
        .await;

    // The server may also stop on its own error; stop the dispatcher either way.
    shutdown.cancel();
    match dispatcher {
        Some(handle) => handle.await.context("Dispatcher task failed")?,
        None => runtime.pool.shutdown(config.reports.drain_timeout()).await,
    }
    pool.close().await;

    served.map_err(|e| anyhow::anyhow!(e)).context("HTTP server failed")?;
    tracing::info!("texpro-reports stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
