use crate::clock::SystemClock;
use crate::config::GatewayConfig;
use crate::engine::AdmissionEngine;
use crate::metrics::Metrics;
use crate::server::{self, AdminState};
use crate::sweeper;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// CLI arguments forwarded from `main()`.
pub struct BootstrapArgs {
    pub config_path: std::path::PathBuf,
    pub admin_listen: Option<String>,
}

/// Process lifecycle: init → load → serve → shutdown.
pub async fn run(args: BootstrapArgs) -> Result<()> {
    init_tracing();

    let config = GatewayConfig::load(&args.config_path)?;
    let metrics = Metrics::install()?;
    let engine = Arc::new(AdmissionEngine::from_config(&config, Arc::new(SystemClock))?);
    tracing::info!("server: engine ready, routes={}", engine.routes().len());

    let shutdown = Arc::new(Notify::new());
    let sweeper_handle = sweeper::spawn_sweeper(
        engine.clone(),
        Duration::from_secs(config.sweeper.interval_secs),
        shutdown.clone(),
    );

    let admin_listen = args.admin_listen.unwrap_or_else(|| config.admin.listen.clone());
    let admin_handle = tokio::spawn({
        let state = AdminState {
            engine: engine.clone(),
            metrics: Some(metrics),
        };
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = server::run_admin_server(&admin_listen, state, shutdown).await {
                tracing::error!("server: admin failed, error={}", e);
            }
        }
    });

    wait_for_shutdown(&shutdown).await?;

    if let Err(e) = sweeper_handle.await {
        tracing::error!("server: sweeper task error: {}", e);
    }
    if let Err(e) = admin_handle.await {
        tracing::error!("server: admin task error: {}", e);
    }

    tracing::info!("server: shutdown complete");
    Ok(())
}

fn init_tracing() {
    let (non_blocking, _guard) = tracing_appender::non_blocking::NonBlockingBuilder::default()
        .buffered_lines_limit(128_000)
        .lossy(true)
        .finish(std::io::stdout());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .json(),
        )
        .init();

    // The writer must outlive every log call, including those during shutdown.
    std::mem::forget(_guard);
}

async fn wait_for_shutdown(shutdown: &Notify) -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let terminate = sigterm.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("server: received SIGINT, shutting down"),
        _ = terminate => tracing::info!("server: received SIGTERM, shutting down"),
    }

    shutdown.notify_waiters();
    Ok(())
}
