//! # Leadflow Main Entry Point
//!
//! Loads configuration, initializes telemetry and the configured lead
//! store, then starts the server.

use std::sync::Arc;

use leadflow::config::ConfigLoader;
use leadflow::server::run_server;
use leadflow::store::{DatabaseLeadStore, FileLeadStore, LeadStore};
use leadflow::{db, telemetry};
use migration::MigratorTrait;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from layered env files and variables
    let config_loader = ConfigLoader::new();
    let config = config_loader.load()?;

    telemetry::init_tracing(&config)?;
    tracing::info!(profile = %config.profile, "loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "effective configuration");
    }

    let store: Arc<dyn LeadStore> = match config.store_backend.as_str() {
        "file" => Arc::new(FileLeadStore::open(&config.file_store_path).await?),
        _ => {
            let pool = db::init_pool(&config).await?;
            migration::Migrator::up(&pool, None).await?;
            Arc::new(DatabaseLeadStore::new(pool))
        }
    };

    run_server(config, store).await
}
