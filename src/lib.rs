// src/lib.rs
pub mod clustering;
pub mod config;
pub mod db;
pub mod models;
pub mod results;
pub mod storage;

// Re-export common types for easier access
pub use models::{
    CanonicalEntity, GroundingType, KgStage, RelationshipId, RelationshipIdError, StagedEntity,
    StagedRelationship, StagedRelationshipType,
};

// Re-export important functionality
pub use clustering::{kg_clustering, run_clustering};
pub use config::ClusteringConfig;
pub use db::PgPool;
pub use results::{CleanupOutcome, ClusteringReport};
pub use storage::{InMemoryKgStore, KgStore, KgStoreFactory, PgKgStore, PgKgStoreFactory};
