//! docvault command line entry point

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use docvault::backend::BackendRegistry;
use docvault::config::{LoggingConfig, VaultConfig};
use docvault::db;
use docvault::document::DocumentStore;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("docvault=info"));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so command output on stdout stays machine readable
    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = VaultConfig::from_env().context("Failed to load configuration")?;
    init_tracing(&config.logging);
    config.validate().context("Invalid configuration")?;

    let pool = db::create_pool(&config.database)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;
    db::run_migrations(&pool).await.context("Failed to run migrations")?;

    let registry = BackendRegistry::from_config(&config.storage)?;
    info!(
        "docvault ready: database {}, backends {:?}",
        config.database.path.display(),
        registry.backend_ids()
    );

    let store = DocumentStore::new(pool.clone(), Arc::new(registry));
    let result = cli::run(cli.command, &store).await;

    pool.close().await;
    result
}
