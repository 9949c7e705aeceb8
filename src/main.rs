mod api;
mod bot;
mod config;
mod errors;
mod metrics;
mod reporting;
mod shell;

use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use crate::api::AppState;
use crate::config::Config;
use crate::metrics::SystemMetrics;
use crate::reporting::ReportingState;
use crate::shell::ShellRunner;

#[tokio::main]
async fn main() {
    // A missing .env file is fine, the variables may come from the environment.
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pimon=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("🖥️ pimon v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Cannot start without a Discord token");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        error!(error = ?e, "pimon stopped");
        std::process::exit(1);
    }

    info!("pimon shutdown complete");
}

async fn run(config: Config) -> anyhow::Result<()> {
    let reporting = ReportingState::new(config.reporting());
    let shell = ShellRunner::new(config.shell_timeout);
    let metrics = Arc::new(SystemMetrics::new(config.disk_path.clone()));
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    info!(
        channel = ?config.default_channel.map(|c| c.get()),
        interval_secs = config.default_interval.secs(),
        disk_path = %config.disk_path.display(),
        shell_timeout_secs = shell.timeout().as_secs(),
        "Reporting configured"
    );

    if let Some(addr) = config.status_addr {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind status server on {}", addr))?;
        let app = api::router(AppState { reporting: reporting.clone() });
        let mut stop = shutdown_tx.subscribe();

        tokio::spawn(async move {
            let served = axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await;
            if let Err(e) = served {
                error!(error = %e, "Status server error");
            }
        });
        info!(addr = %addr, "Status server listening");
    }

    let mut client = bot::client(&config, reporting, shell, metrics, shutdown_tx.clone())
        .await
        .context("Failed to build Discord client")?;
    let shard_manager = client.shard_manager.clone();

    let result = tokio::select! {
        started = client.start() => started.context("Discord client stopped"),
        _ = shutdown_signal() => {
            shard_manager.shutdown_all().await;
            Ok(())
        }
    };

    // No receivers yet if the bot never became ready.
    let _ = shutdown_tx.send(());
    result
}

/// Listen for Ctrl-C or SIGTERM for graceful shutdown
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c  => info!("Received Ctrl-C"),
        _ = sigterm => info!("Received SIGTERM"),
    }

    info!("Initiating graceful shutdown...");
}
