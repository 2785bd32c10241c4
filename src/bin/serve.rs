//! `uni-serve`: load one task and serve it over RPC (and optionally HTTP/JSON).
//!
//! Usage:
//!
//! ```text
//! uni-serve --task question_answering --model deepset/bert-base-cased-squad2 \
//!     [--models-dir <path>] [--rpc-address <addr>] [--http-address <addr>]
//! ```
//!
//! Configuration is layered defaults < `--config` JSON file < `UNI_*`
//! environment variables < flags. Load failures exit non-zero before any
//! listener is bound.

use std::process;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use uni_tasks::config::{CliArgs, ServeConfig, USAGE};
use uni_tasks::registry::TaskRegistry;
use uni_tasks::server::{resolve_request_handler, serve_http, serve_rpc};
use uni_tasks::telemetry::init_logging;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        tracing::error!(error = %e, "uni-serve failed");
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = CliArgs::parse(std::env::args().skip(1))?;
    if cli.help {
        println!("{USAGE}");
        return Ok(());
    }
    let config = ServeConfig::load(&cli)?;
    init_logging(&config.log)?;

    let descriptor = config.descriptor()?;
    tracing::info!(
        task = %descriptor.kind,
        model = %descriptor.model_name,
        directory = %descriptor.model_directory.display(),
        "Starting uni-serve"
    );

    #[cfg(feature = "hub")]
    uni_tasks::hub::ensure_model(&config.model_name, &descriptor.model_directory).await?;

    let task = tokio::task::spawn_blocking(move || {
        let registry = TaskRegistry::builder().with_defaults().build();
        tracing::info!(backend = registry.backend_name(), "Loading task");
        registry.load_task(&descriptor)
    })
    .await??;
    let handler = resolve_request_handler(task);

    let shutdown = CancellationToken::new();
    let rpc_listener = TcpListener::bind(&config.rpc_address).await?;
    let mut servers = tokio::task::JoinSet::new();
    servers.spawn(serve_rpc(rpc_listener, handler.clone(), shutdown.clone()));
    if let Some(address) = &config.http_address {
        let http_listener = TcpListener::bind(address).await?;
        servers.spawn(serve_http(http_listener, handler, shutdown.clone()));
    }

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Interrupt received, shutting down");
        }
        Some(finished) = servers.join_next() => {
            tracing::warn!("A listener stopped unexpectedly");
            finished??;
        }
    }
    shutdown.cancel();
    while let Some(finished) = servers.join_next().await {
        finished??;
    }
    tracing::info!("uni-serve stopped");
    Ok(())
}
