use std::path::Path;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use tally_server::config::TallyConfig;

/// Tally metering HTTP server.
#[derive(Parser, Debug)]
#[command(name = "tally-server", about = "Storage quota and bandwidth metering service")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "tally.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse and validate the configuration, then exit.
    Check,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = TallyConfig::load(Path::new(&cli.config))?;

    if let Some(Commands::Check) = cli.command {
        println!("{}: ok", cli.config);
        return Ok(());
    }

    let telemetry = tally_server::telemetry::init(&config.telemetry);
    if !Path::new(&cli.config).exists() {
        info!(path = %cli.config, "config file not found, using defaults");
    }

    let state = tally_server::bootstrap::build_state(&config).await?;
    let audit = state.meter.audit().clone();
    let app = tally_server::api::router(state);

    let host = cli.host.unwrap_or(config.server.host);
    let port = cli.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "tally-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let drain = Duration::from_secs(config.server.shutdown_timeout_seconds);
    if !audit.shutdown(drain).await {
        warn!(
            timeout_secs = config.server.shutdown_timeout_seconds,
            "shutdown timeout exceeded, some audit events may be lost"
        );
    }
    info!("tally-server shut down");
    telemetry.shutdown();
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
