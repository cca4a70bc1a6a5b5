use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use chainidx::config::init_global_config;
use chainidx::liveness::LIVENESS;
use chainidx::rpc::client::RpcClient;
use chainidx::storage::{pool, StorageGateway};
use chainidx::telemetry::{init_tracing, TelemetryConfig};
use chainidx::{api, backfill, metrics, pipeline::Pipeline, reorg::Reconciler, tailer::HeadTailer};

/// Overrides for the two launch-time settings §6 calls out explicitly; every
/// other setting is environment-only (see `config.rs`).
#[derive(Parser, Debug)]
#[command(name = "chainidx")]
struct Cli {
    /// Overrides BIND_ADDR for the HTTP read API.
    #[arg(long)]
    bind_addr: Option<String>,

    /// Overrides LOG_FORMAT ("pretty" or "json").
    #[arg(long)]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut settings = init_global_config()?;
    if let Some(bind_addr) = cli.bind_addr {
        settings.bind_addr = bind_addr;
    }
    if let Some(log_format) = cli.log_format {
        settings.log_format = log_format;
    }
    init_tracing(TelemetryConfig::from_settings(&settings))?;
    metrics::register_all().ok();

    tracing::info!(
        confirmed_block = settings.confirmed_block,
        dialect = %settings.database.dialect,
        "starting chainidx"
    );

    let db_pool = pool::connect(&settings.database).await?;
    let storage = StorageGateway::new(db_pool);

    let rpc = Arc::new(RpcClient::connect(&settings.rpc_http_endpoint, &settings.rpc_ws_endpoint).await?);
    let reconciler = Arc::new(Reconciler::new(storage.clone()));
    let pipeline = Arc::new(Pipeline::new(rpc.clone(), storage.clone(), reconciler));

    let shutdown = CancellationToken::new();

    let backfill_handle = tokio::spawn({
        let rpc = rpc.clone();
        let pipeline = pipeline.clone();
        let confirmed_block = settings.confirmed_block;
        let concurrency = settings.pipeline_concurrency;
        async move {
            backfill::run(rpc, pipeline, confirmed_block, concurrency).await;
        }
    });

    let tailer = HeadTailer::new(
        rpc.clone(),
        pipeline.clone(),
        settings.confirmed_block,
        settings.pipeline_concurrency,
        shutdown.clone(),
    );
    let tailer_handle = tokio::spawn(async move {
        tailer.run().await;
    });

    let app: Router = api::router(storage.clone(), settings.api_max_block_req, &LIVENESS);
    let bind_addr = settings.bind_addr.clone();
    let server_shutdown = shutdown.clone();
    let server_handle = tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(error = %e, addr = %bind_addr, "failed to bind HTTP listener");
                return;
            }
        };
        tracing::info!(addr = %bind_addr, "HTTP read API listening");
        let serve = axum::serve(listener, app);
        tokio::select! {
            result = serve => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "HTTP server exited with error");
                }
            }
            _ = server_shutdown.cancelled() => {
                tracing::info!("HTTP server shutting down");
            }
        }
    });

    // Storage, RPC, the tailer, the backfill driver, and the server are all
    // spawned by this point; flip liveness/readiness true (§5, §6), mirroring
    // `global.Ready = true; global.Alive = true` right before the original
    // started servicing requests.
    LIVENESS.mark_up();

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, cancelling subsystems");
    LIVENESS.mark_down();
    shutdown.cancel();

    let _ = backfill_handle.await;
    let _ = tailer_handle.await;
    let _ = server_handle.await;

    tracing::info!("chainidx stopped");
    Ok(())
}

/// Waits for SIGINT or SIGTERM, whichever arrives first. Writes in flight
/// are allowed to complete; cancellation only stops new work from starting
/// (§5, "Cancellation").
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
