//! Identity verification and credential server.

use std::net::SocketAddr;

use anyhow::{Context, Error};
use log::info;
use pico_args::Arguments;

use mi_server::{api, config::ServerConfig, logging, metrics, wiring};

const HELP: &str = "\
Run the identity verification and credential server

USAGE:
  mi_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  --memory                 Keep credentials and codes in memory (no database)
  -h, --help               Print help information

ENVIRONMENT:
  JWT_SECRET               JWT signing secret (at least 32 characters)
  PASSWORD_PEPPER          Password hashing pepper (at least 16 characters)
  FIREBASE_API_KEY         Identity Toolkit web API key (optional with --memory)
  TWILIO_*                 Enables the phone channel
  SMTP_*                   Enables email delivery; codes are logged otherwise
  (See .env.example for all configuration options)
";

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        memory: pargs.contains("--memory"),
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url, args.memory)?;
    config.validate()?;

    if let Some(metrics_bind) = config.metrics_bind {
        metrics::init_metrics(metrics_bind).map_err(anyhow::Error::msg)?;
        info!("Prometheus metrics exposed on {}", metrics_bind);
    }

    let state = wiring::build_state(&config).await?;
    let maintenance = wiring::spawn_maintenance(state.clone(), config.purge_interval);
    let database = state.database.clone();

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down server...");
    maintenance.abort();
    let _ = maintenance.await;
    if let Some(database) = database
        && let Ok(database) = std::sync::Arc::try_unwrap(database)
    {
        database.close().await;
    }

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
}
