//! CLI subcommand definitions and handlers.
//!
//! Uses clap derive to define the subcommands:
//! - `serve` -- expose the configured metrics over HTTP
//! - `render` -- print one exposition document and exit
//! - `version` -- print version info

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ExporterConfig;
use crate::error::MetricsError;
use crate::logging;
use crate::registry::Registry;
use crate::server;
use crate::store::{RedisStore, Store};

/// Prometheus exporter for metrics aggregated in a shared Redis store.
#[derive(Parser, Debug)]
#[command(
    name = "promstore",
    version = env!("CARGO_PKG_VERSION"),
    about = "Prometheus exporter for metrics shared through Redis"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the configured metrics on an HTTP endpoint.
    Serve {
        /// JSON5 configuration file.
        #[arg(short, long)]
        config: PathBuf,

        /// Listen address, overriding the configuration.
        #[arg(short, long)]
        listen: Option<String>,

        /// Redis URL, overriding the configuration.
        #[arg(long)]
        redis_url: Option<String>,
    },

    /// Print the current exposition document once.
    Render {
        /// JSON5 configuration file.
        #[arg(short, long)]
        config: PathBuf,

        /// Redis URL, overriding the configuration.
        #[arg(long)]
        redis_url: Option<String>,
    },

    /// Print version information.
    Version,
}

/// Load the configuration file and apply command-line overrides.
pub fn load_config(
    path: &Path,
    listen: Option<String>,
    redis_url: Option<String>,
) -> Result<ExporterConfig, Box<dyn std::error::Error>> {
    let mut config = ExporterConfig::load(path)?;
    if let Some(listen) = listen {
        config.listen = listen;
    }
    if redis_url.is_some() {
        config.redis.url = redis_url;
    }
    Ok(config)
}

/// A registry holding every metric the configuration declares.
pub fn build_registry(config: &ExporterConfig, store: Arc<dyn Store>) -> Result<Arc<Registry>, MetricsError> {
    let registry = Registry::with_config(store, config.registry.clone());
    for desc in &config.metrics {
        registry.register_descriptor(desc)?;
    }
    Ok(Arc::new(registry))
}

async fn connect(config: &ExporterConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    let store = RedisStore::connect(config.redis.clone()).await?;
    Ok(Arc::new(store))
}

/// Run the `serve` subcommand.
pub async fn handle_serve(
    config: PathBuf,
    listen: Option<String>,
    redis_url: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&config, listen, redis_url)?;
    logging::init_tracing(&config.logging)?;

    let registry = build_registry(&config, connect(&config).await?)?;
    tracing::info!(metrics = config.metrics.len(), "Registry ready");

    registry.start();
    server::serve(registry.clone(), &config.listen, server::shutdown_signal()).await?;
    registry.stop().await;
    Ok(())
}

/// Run the `render` subcommand.
pub async fn handle_render(
    config: PathBuf,
    redis_url: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&config, None, redis_url)?;
    logging::init_tracing(&config.logging)?;

    let registry = build_registry(&config, connect(&config).await?)?;
    print!("{}", registry.render().await);
    Ok(())
}

/// Run the `version` subcommand.
pub fn handle_version() {
    println!("promstore {}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Platform:   {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}
