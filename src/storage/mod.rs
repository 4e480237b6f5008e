// src/storage/mod.rs
//
// Persistence collaborators of the clustering pass. Every method is its own
// unit of work: acquire a session, operate, commit (or roll back), release.
// A failure therefore never spans more than one record, and a batch is not
// atomic as a whole.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    CanonicalEntity, EntityUpsert, GroundingType, KgStage, StagedEntity, StagedRelationship,
    StagedRelationshipType,
};

pub use memory::{InMemoryKgStore, InMemoryKgStores};
pub use postgres::{PgKgStore, PgKgStoreFactory};

/// Parameters of the trigram-indexed candidate lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarEntityQuery<'a> {
    pub entity_type_id_name: &'a str,
    pub clustering_name: &'a str,
    /// Minimum trigram similarity, applied to this query only.
    pub threshold: f64,
    /// Restrict matches to canonical entities without a document link.
    pub only_without_document: bool,
}

/// Tenant-scoped access to the staged and normalized knowledge graph tables.
#[async_trait]
pub trait KgStore: Send + Sync {
    async fn get_all_relationship_types(&self, stage: KgStage)
    -> Result<Vec<StagedRelationshipType>>;

    async fn get_all_relationships(&self, stage: KgStage) -> Result<Vec<StagedRelationship>>;

    async fn get_entities_by_grounding(
        &self,
        stage: KgStage,
        grounding: GroundingType,
    ) -> Result<Vec<StagedEntity>>;

    /// `None` when the document is unknown or has no semantic identifier.
    async fn get_document_semantic_id(&self, document_id: &str) -> Result<Option<String>>;

    /// Normalized entities of one type whose clustering name is trigram-similar to the query.
    async fn find_similar_entities(
        &self,
        query: &SimilarEntityQuery<'_>,
    ) -> Result<Vec<CanonicalEntity>>;

    async fn add_or_update_entity(
        &self,
        stage: KgStage,
        upsert: &EntityUpsert,
    ) -> Result<CanonicalEntity>;

    /// Returns the id of the stored relationship type.
    async fn add_relationship_type(
        &self,
        stage: KgStage,
        source_entity_type: &str,
        relationship_type: &str,
        target_entity_type: &str,
        extraction_count: i32,
    ) -> Result<String>;

    /// Returns the id of the stored relationship.
    async fn add_relationship(
        &self,
        stage: KgStage,
        relationship_id_name: &str,
        source_document_id: &str,
        occurrences: i32,
    ) -> Result<String>;

    async fn delete_relationships_by_id_names(
        &self,
        id_names: &[String],
        stage: KgStage,
    ) -> Result<u64>;

    async fn delete_relationship_types_by_id_names(
        &self,
        id_names: &[String],
        stage: KgStage,
    ) -> Result<u64>;

    async fn delete_entities_by_id_names(&self, id_names: &[String], stage: KgStage)
    -> Result<u64>;

    async fn update_document_kg_stage(&self, document_id: &str, stage: KgStage) -> Result<()>;
}

/// Hands out a [`KgStore`] bound to one tenant.
pub trait KgStoreFactory {
    type Store: KgStore;

    fn for_tenant(&self, tenant_id: &str) -> Result<Self::Store>;
}
