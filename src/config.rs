// src/config.rs

use anyhow::{Context, Result};
use log::info;
use std::str::FromStr;
use thiserror::Error;

// Recall-oriented trigram cutoff used to bound the candidate set
pub const DEFAULT_CLUSTERING_RETRIEVE_THRESHOLD: f64 = 0.6;

// Precision cutoff a candidate's fuzzy ratio must clear to absorb a staged entity
pub const DEFAULT_CLUSTERING_THRESHOLD: f64 = 0.96;

// Accepted for parity with the extraction stage; the clustering pass itself is sequential
pub const DEFAULT_PROCESSING_CHUNK_BATCH_SIZE: usize = 8;

// Fuzzy ratio scores are reported on a 0..=100 scale
pub const SIMILARITY_SCALE: f64 = 100.0;

pub const RETRIEVE_THRESHOLD_ENV: &str = "KG_CLUSTERING_RETRIEVE_THRESHOLD";
pub const CLUSTERING_THRESHOLD_ENV: &str = "KG_CLUSTERING_THRESHOLD";
pub const BATCH_SIZE_ENV: &str = "KG_PROCESSING_CHUNK_BATCH_SIZE";
pub const CLEANUP_ENABLED_ENV: &str = "KG_CLUSTERING_CLEANUP_ENABLED";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f64 },

    #[error("processing chunk batch size must be at least 1")]
    ZeroBatchSize,
}

/// Settings for one clustering run.
///
/// Passed by reference into candidate retrieval and merge resolution so that
/// runs with different thresholds never share state.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringConfig {
    /// Trigram similarity a canonical entity needs to be retrieved as a candidate.
    pub retrieve_threshold: f64,
    /// Fraction of [`SIMILARITY_SCALE`] a candidate's score must reach to be merged into.
    pub clustering_threshold: f64,
    pub processing_chunk_batch_size: usize,
    /// Delete staged records and advance document stages after a fully consistent run.
    pub cleanup_enabled: bool,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            retrieve_threshold: DEFAULT_CLUSTERING_RETRIEVE_THRESHOLD,
            clustering_threshold: DEFAULT_CLUSTERING_THRESHOLD,
            processing_chunk_batch_size: DEFAULT_PROCESSING_CHUNK_BATCH_SIZE,
            cleanup_enabled: false,
        }
    }
}

impl ClusteringConfig {
    /// Builds a config from `KG_*` environment variables, falling back to the defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            retrieve_threshold: env_or(RETRIEVE_THRESHOLD_ENV, defaults.retrieve_threshold)?,
            clustering_threshold: env_or(CLUSTERING_THRESHOLD_ENV, defaults.clustering_threshold)?,
            processing_chunk_batch_size: env_or(
                BATCH_SIZE_ENV,
                defaults.processing_chunk_batch_size,
            )?,
            cleanup_enabled: env_or(CLEANUP_ENABLED_ENV, defaults.cleanup_enabled)?,
        };
        config.validate()?;

        info!(
            "Clustering config: retrieve_threshold={}, clustering_threshold={}, batch_size={}, cleanup_enabled={}",
            config.retrieve_threshold,
            config.clustering_threshold,
            config.processing_chunk_batch_size,
            config.cleanup_enabled
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("retrieve_threshold", self.retrieve_threshold),
            ("clustering_threshold", self.clustering_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        if self.processing_chunk_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }

    /// The acceptance threshold expressed on the scorer's 0..=100 scale.
    pub fn min_match_score(&self) -> f64 {
        self.clustering_threshold * SIMILARITY_SCALE
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        _ => Ok(default),
    }
}
