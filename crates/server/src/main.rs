//! Certfolio server binary.

use anyhow::{Context, Result};
use certfolio_auth::{PasswordHasher, Pbkdf2PasswordHasher};
use certfolio_core::config::AppConfig;
use certfolio_server::bootstrap::ensure_admin_identity;
use certfolio_server::{AppState, create_router};
use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::io::BufRead;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Certfolio - a certificate portfolio backend
#[derive(Parser, Debug)]
#[command(name = "certfoliod")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "CERTFOLIO_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Read a password from stdin and print its encoded hash for auth.admin.password_hash
    HashPassword,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&args.config).await,
        Command::HashPassword => hash_password(),
    }
}

fn hash_password() -> Result<()> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        anyhow::bail!("password cannot be empty");
    }

    let encoded = Pbkdf2PasswordHasher::new()
        .hash(password)
        .context("failed to hash password")?;
    println!("{encoded}");
    Ok(())
}

async fn serve(config_path: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Certfolio v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(config_path)?;

    certfolio_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = certfolio_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!("Storage backend initialized");

    let metadata = certfolio_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    ensure_admin_identity(metadata.as_ref(), &config.auth).await?;

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let state = AppState::new(config, storage, metadata)?;

    if let Some(cleanup_interval) = state.rate_limit_cleanup_interval() {
        certfolio_server::ratelimit::spawn_cleanup_task(state.rate_limit.clone(), cleanup_interval);
        tracing::info!(
            interval_secs = cleanup_interval.as_secs(),
            "Rate limiter cleanup task spawned"
        );
    }

    let app = create_router(state);

    tracing::info!("Listening on {}", addr);

    // ConnectInfo feeds client IP extraction in the rate limiter
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Merge the optional config file with `CERTFOLIO_` environment variables.
fn load_config(config_path: &str) -> Result<AppConfig> {
    let path = std::path::Path::new(config_path);
    let mut figment = Figment::new();
    let has_config_file = path.exists();

    if has_config_file {
        tracing::info!(config_path = %config_path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", config_path);
    }

    let has_env_config = std::env::vars()
        .any(|(key, _)| key.starts_with("CERTFOLIO_") && key != "CERTFOLIO_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: certfoliod --config /path/to/config.toml\n  \
             2. Environment variables: CERTFOLIO_AUTH__SECRET_KEY=... \
             CERTFOLIO_SERVER__BIND=0.0.0.0:8080 certfoliod\n\n\
             See config/server.example.toml for example configuration."
        );
    }

    figment
        .merge(Env::prefixed("CERTFOLIO_").split("__"))
        .extract()
        .context("failed to load configuration")
}
