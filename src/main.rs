use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use casgate::{
    AppState, build_app,
    config::CasgateConfig,
    db::DbPool,
    observability,
    retention::{run_retention, start_retention_worker},
};
use clap::Parser;

/// CLI arguments for casgate
#[derive(Parser, Debug)]
#[command(version, about = "CAS 2.0 client service", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "casgate.toml")]
    config: PathBuf,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the server (default)
    Serve,
    /// Delete stale PGT IOUs once and exit
    ///
    /// Useful as a cron job when the retention worker is disabled.
    Purge,
    /// Parse and validate the configuration file, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::CheckConfig) => run_check_config(&args.config),
        Some(Command::Purge) => run_purge(&args.config).await,
        Some(Command::Serve) | None => run_server(&args.config).await,
    }
}

fn load_config(path: &Path) -> CasgateConfig {
    match CasgateConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn init_tracing(config: &CasgateConfig) {
    if let Err(e) = observability::init_tracing(&config.observability.logging) {
        eprintln!("Failed to initialize tracing: {e}");
        std::process::exit(1);
    }
}

fn run_check_config(path: &Path) {
    let config = load_config(path);
    println!("Configuration OK: {}", path.display());
    println!("  CAS server:       {}", config.cas.server_url);
    println!("  Service base URL: {}", config.cas.service_base_url);
    println!(
        "  Proxy tickets:    {}",
        if config.cas.proxy_enabled() { "enabled" } else { "disabled" }
    );
    println!(
        "  Single sign-out:  {}",
        if config.cas.single_sign_out { "enabled" } else { "disabled" }
    );
}

async fn run_purge(path: &Path) {
    let config = load_config(path);
    init_tracing(&config);

    let db = match DbPool::from_config(&config.database).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            eprintln!("Error: Failed to connect to database: {e}");
            std::process::exit(1);
        }
    };

    // Sessions live in the serving process, so only PGT IOUs can be purged here
    match run_retention(&db, None, chrono::Utc::now()).await {
        Ok(result) => {
            tracing::info!(pgt_ious = result.pgt_ious_deleted, "Purge complete");
            println!("Deleted {} stale PGT IOUs", result.pgt_ious_deleted);
        }
        Err(e) => {
            tracing::error!(error = %e, "Purge failed");
            eprintln!("Error: Purge failed: {e}");
            std::process::exit(1);
        }
    }
}

async fn run_server(path: &Path) {
    let config = load_config(path);
    init_tracing(&config);

    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics");
    }

    tracing::info!(config_file = %path.display(), "Starting casgate");

    if config.cas.single_sign_out
        && config.cas.logout_allowed.is_empty()
        && !config.server.host.is_loopback()
    {
        tracing::warn!(
            "Single sign-out is enabled without [cas.logout_allowed]; anyone who can reach \
             this service can end sessions whose service ticket they know."
        );
    }

    let state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let retention = tokio::spawn(start_retention_worker(
        Arc::clone(&state.db),
        Arc::clone(&state.sessions),
        config.retention.clone(),
    ));

    let app = build_app(&config, state);

    let bind_addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %bind_addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on http://{}", bind_addr);

    // Client addresses feed the single sign-out origin check
    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    retention.abort();

    if let Err(e) = result {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
