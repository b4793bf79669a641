use anyhow::Context;
use clap::Parser;
use cuckoo_tonic_core::proto::{FILE_DESCRIPTOR_SET, cuckoo_filter_server::CuckooFilterServer};
use cuckoo_tonic_server::server::{
    config::{CliArgs, ServerConfig},
    registry::Registry,
    service::handler::FilterService,
    snapshot::{DumpScheduler, SnapshotManager},
    telemetry::init_telemetry,
};
use futures::Stream;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Connected;
use tonic::{codec::CompressionEncoding, transport::Server};
use tonic_health::server::HealthReporter;
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let registry = Arc::new(Registry::new());
    let snapshots = Arc::new(SnapshotManager::new(
        Arc::clone(&registry),
        &config.dump_path,
    ));
    let loaded = snapshots
        .load()
        .await
        .with_context(|| format!("failed to load snapshots from {}", config.dump_path.display()))?;
    tracing::info!(filters = loaded, "Loaded snapshots from {}", config.dump_path.display());

    let scheduler = DumpScheduler::start(Arc::clone(&snapshots), config.dump_interval);
    let service = FilterService::new(registry, &config);

    let served = if config.uds {
        #[cfg(unix)]
        {
            use tokio::net::UnixListener;
            use tokio_stream::wrappers::UnixListenerStream;
            let uds_path = config.server_addr.clone();
            let res = match UnixListener::bind(&uds_path) {
                Ok(uds) => {
                    log_startup_info(&uds_path, &config);
                    run_server_with_incoming(UnixListenerStream::new(uds), service, &config).await
                }
                Err(e) => Err(anyhow::Error::new(e).context(format!("failed to bind {uds_path}"))),
            };
            // Best effort; a panic can still leave the socket file behind.
            let _ = std::fs::remove_file(&uds_path);
            res
        }
        #[cfg(not(unix))]
        {
            Err(anyhow::anyhow!(
                "Unix domain sockets are not supported on this platform"
            ))
        }
    } else {
        match TcpListener::bind(&config.server_addr).await {
            Ok(tcp) => {
                log_startup_info(&config.server_addr, &config);
                run_server_with_incoming(TcpListenerStream::new(tcp), service, &config).await
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("failed to bind {}", config.server_addr))),
        }
    };

    // The transport is down (or never came up); no RPC can mutate the
    // registry anymore.
    scheduler.shutdown().await;

    if config.dump_on_shutdown && served.is_ok() {
        match snapshots.dump().await {
            Ok(report) => tracing::info!(
                written = report.written,
                removed = report.removed,
                elapsed = ?report.elapsed,
                "Final dump complete"
            ),
            Err(e) => tracing::error!("Final dump failed: {e:?}"),
        }
    }

    tracing::info!("Service shut down");
    providers.shutdown();
    served
}

async fn run_server_with_incoming<I, IO, IE>(
    incoming: I,
    service: FilterService,
    config: &ServerConfig,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<CuckooFilterServer<FilterService>>()
        .await;

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service)
        .add_service(reflection)
        .add_service(build_filter_service(service.clone()))
        .serve_with_incoming_shutdown(
            incoming,
            shutdown_signal(service, health_reporter, config.shutdown_timeout),
        )
        .await?;

    Ok(())
}

fn log_startup_info(addr: &str, config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting filter registry on {} with full config: {:#?}",
            addr,
            config
        );
    } else {
        tracing::info!(
            "Starting filter registry on {} (dumping to {} every {:?})",
            addr,
            config.dump_path.display(),
            config.dump_interval
        );
    }
}

fn build_filter_service(service: FilterService) -> CuckooFilterServer<FilterService> {
    CuckooFilterServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

/// Resolves on SIGINT/SIGTERM once the service has drained.
///
/// If a signal handler cannot be installed, that source is ignored and the
/// other one still triggers shutdown.
async fn shutdown_signal(
    service: FilterService,
    health_reporter: HealthReporter,
    drain_timeout: core::time::Duration,
) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");

    // 1. Publish the status
    health_reporter
        .set_not_serving::<CuckooFilterServer<FilterService>>()
        .await;

    // 2. Refuse new calls and drain open streams
    service.shutdown(drain_timeout).await;
}
