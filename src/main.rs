use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tunnelgate::config::Config;
use tunnelgate::lookup::{HttpRouteLookup, RouteLookup};
use tunnelgate::registry::RegistryHandle;
use tunnelgate::transport::TcpTransport;
use tunnelgate::watchdog::{Heartbeat, WatchdogHandle};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tunnelgate=debug".parse().expect("valid log directive")),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path.display(), error = %e, "Failed to load configuration");
        e
    })?;

    info!(path = %config_path.display(), "Configuration loaded");
    print_startup_banner(&config);

    let transport = Arc::new(TcpTransport::new(
        config.proxy_command.clone(),
        config.retry.dial_timeout(),
    ));

    let lookup: Option<Arc<dyn RouteLookup>> = match &config.lookup_url {
        Some(url) => {
            let lookup = HttpRouteLookup::new(url.clone()).map_err(|e| {
                error!(url = %url, error = %e, "Failed to build lookup client");
                anyhow::anyhow!("lookup client: {e}")
            })?;
            Some(Arc::new(lookup))
        }
        None => None,
    };

    // The watchdog task exits when its last handle is dropped, so the
    // handle lives for the whole of main.
    let mut watchdog = None;
    let heartbeat = if config.watchdog.enabled {
        let handle = WatchdogHandle::spawn(config.watchdog.clone());
        info!(
            interval_secs = config.watchdog.interval_secs,
            deadline_secs = config.watchdog.deadline_secs,
            abort_on_miss = config.watchdog.abort_on_miss,
            "Watchdog enabled"
        );
        let heartbeat = handle.register("registry").await;
        watchdog = Some(handle);
        heartbeat
    } else {
        Heartbeat::disabled()
    };
    let _watchdog = watchdog;

    let registry = RegistryHandle::spawn(transport, lookup, config.retry.clone(), heartbeat);

    // Seed routes from the config file
    for route in config.routes {
        info!(host = %route.host, prefix = %route.prefix, "Registering configured route");
        registry.add_path(route).await;
    }

    // Wait for shutdown signal (Ctrl+C or SIGTERM)
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down...");
    }

    // Backends run tunnel sessions to remote machines; give in-flight
    // channel opens a moment before the process exits.
    tokio::time::sleep(Duration::from_millis(100)).await;
    info!("Shutdown complete");
    Ok(())
}

fn print_startup_banner(config: &Config) {
    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        "Starting gateway"
    );
    info!(
        lookup_url = config.lookup_url.as_deref(),
        proxy_command = config.proxy_command.as_deref(),
        "Route resolution"
    );
    info!(
        connect_attempts = config.retry.connect_attempts,
        connect_delay_ms = config.retry.connect_delay_ms,
        dial_timeout_ms = config.retry.dial_timeout_ms,
        ready_attempts = config.retry.ready_attempts,
        ready_delay_ms = config.retry.ready_delay_ms,
        "Retry policy"
    );
    info!(
        route_count = config.routes.len(),
        routes = ?config
            .routes
            .iter()
            .map(|r| format!("{}{}", r.host, r.prefix))
            .collect::<Vec<_>>(),
        "Configured routes"
    );
}
