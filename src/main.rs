// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::{path::Path, time::Instant};

use kg_clustering_lib::{
    clustering, config::ClusteringConfig, db, storage::postgres::ensure_kg_tables_exist,
    storage::PgKgStoreFactory,
};

#[derive(Parser, Debug)]
#[command(name = "kg-clustering")]
#[command(about = "Merge grounded staged entities into the normalized knowledge graph")]
#[command(version)]
struct CliArgs {
    /// Tenant whose schema holds the staged extractions
    tenant_id: String,
    /// Search index the tenant's documents live in
    index_name: String,
    /// Create the knowledge graph tables before clustering
    #[arg(long)]
    init_schema: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let args = CliArgs::parse();
    info!(
        "Starting knowledge graph clustering for tenant {}",
        args.tenant_id
    );
    let start_time = Instant::now();

    // Try to load .env file if it exists
    let env_paths = [".env", ".env.local", "../.env"];
    let mut loaded_env = false;

    for path in env_paths.iter() {
        if Path::new(path).exists() {
            if let Err(e) = db::load_env_from_file(path) {
                warn!("Failed to load environment from {}: {}", path, e);
            } else {
                info!("Loaded environment variables from {}", path);
                loaded_env = true;
                break;
            }
        }
    }

    if !loaded_env {
        info!("No .env file found, using environment variables from system");
    }

    let config = ClusteringConfig::from_env().context("Invalid clustering configuration")?;

    let pool = db::connect()
        .await
        .context("Failed to connect to database")?;
    info!("Successfully connected to the database");

    if args.init_schema {
        ensure_kg_tables_exist(&pool, &args.tenant_id).await?;
    }

    let stores = PgKgStoreFactory::new(pool);
    clustering::kg_clustering(&stores, &args.tenant_id, &args.index_name, &config).await?;

    info!(
        "Knowledge graph clustering completed in {:.2?}",
        start_time.elapsed()
    );
    Ok(())
}
