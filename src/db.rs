// src/db.rs

use anyhow::{Context, Result, bail};
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use log::{debug, info, warn};
use std::time::Duration;
use tokio_postgres::{Config, NoTls};

pub type PgPool = Pool<PostgresConnectionManager<NoTls>>;

/// Overrides the number of pooled connections.
pub const DB_POOL_SIZE_ENV: &str = "KG_DB_POOL_SIZE";
const DEFAULT_DB_POOL_SIZE: u32 = 4;

/// A clustering pass holds one connection at a time; extra slots only serve
/// concurrent runs for other tenants sharing the process.
fn parse_pool_size(raw: Option<&str>) -> Result<u32> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(DEFAULT_DB_POOL_SIZE);
    };
    let size = raw
        .parse::<u32>()
        .with_context(|| format!("Invalid value for {}: {:?}", DB_POOL_SIZE_ENV, raw))?;
    if size == 0 {
        bail!("{} must be at least 1", DB_POOL_SIZE_ENV);
    }
    Ok(size)
}

/// Reads environment variables and constructs a PostgreSQL config.
fn build_pg_config() -> Config {
    let mut config = Config::new();
    let host = std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port_str = std::env::var("POSTGRES_PORT").unwrap_or_else(|_| "5432".to_string());
    let port = port_str.parse::<u16>().unwrap_or(5432);
    let dbname = std::env::var("POSTGRES_DB").unwrap_or_else(|_| "postgres".to_string());
    let user = std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = std::env::var("POSTGRES_PASSWORD").unwrap_or_default();

    info!(
        "DB Config: Host={}, Port={}, DB={}, User={}",
        host, port, dbname, user
    );
    config
        .host(&host)
        .port(port)
        .dbname(&dbname)
        .user(&user)
        .password(&password);
    config.application_name("kg_clustering");
    config.connect_timeout(Duration::from_secs(10));
    config
}

/// Initializes the database connection pool and checks that trigram
/// matching is available.
pub async fn connect() -> Result<PgPool> {
    let pool_size = parse_pool_size(std::env::var(DB_POOL_SIZE_ENV).ok().as_deref())?;
    let config = build_pg_config();
    info!(
        "Connecting to PostgreSQL database (pool size {})...",
        pool_size
    );
    let manager = PostgresConnectionManager::new(config, NoTls);

    let pool = Pool::builder()
        .max_size(pool_size)
        .min_idle(Some(1))
        .idle_timeout(Some(Duration::from_secs(180)))
        .connection_timeout(Duration::from_secs(15))
        .build(manager)
        .await
        .context("Failed to build database connection pool")?;

    let conn = pool
        .get()
        .await
        .context("Failed to get test connection from pool")?;
    let row = conn
        .query_one(
            "SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = 'pg_trgm')",
            &[],
        )
        .await
        .context("Failed to check for the pg_trgm extension")?;
    if !row.get::<_, bool>(0) {
        warn!("pg_trgm is not installed; candidate retrieval will fail until --init-schema is run");
    }
    info!("Database connection pool initialized successfully.");
    drop(conn);
    Ok(pool)
}

/// Loads `KEY=value` pairs from an env file without overriding variables
/// that are already set in the process environment.
pub fn load_env_from_file(file_path: &str) -> Result<()> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    info!(
        "Attempting to load environment variables from: {}",
        file_path
    );
    match File::open(file_path) {
        Ok(file) => {
            let reader = BufReader::new(file);
            for line in reader.lines() {
                let line = line.context("Failed to read line from env file")?;
                let Some((key, value)) = parse_env_line(&line) else {
                    continue;
                };
                if std::env::var(key).is_err() {
                    // SAFETY: only called from the binary's startup path, before
                    // any task that reads the environment has been spawned.
                    unsafe { std::env::set_var(key, value) };
                    debug!(
                        "Set env var from file: {} = {}",
                        key,
                        if key == "POSTGRES_PASSWORD" {
                            "[hidden]"
                        } else {
                            value
                        }
                    );
                }
            }
            info!("Successfully processed env file: {}", file_path);
        }
        Err(e) => {
            warn!(
                "Could not open env file '{}': {}. Proceeding with system environment variables.",
                file_path, e
            );
        }
    }
    Ok(())
}

fn parse_env_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.starts_with('#') || line.is_empty() {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim().trim_matches('"')))
}
