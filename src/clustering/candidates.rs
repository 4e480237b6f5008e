// src/clustering/candidates.rs

use anyhow::{Result, anyhow};
use log::debug;

use crate::clustering::similarity::contains_digit;
use crate::config::ClusteringConfig;
use crate::models::{CanonicalEntity, StagedEntity};
use crate::storage::{KgStore, SimilarEntityQuery};

/// The string a staged entity is matched on, and which canonical entities it may join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusteringKey {
    pub clustering_name: String,
    /// Document-linked entities may only join canonical entities without a document,
    /// so two independently documented entities are never merged.
    pub only_without_document: bool,
}

/// Derives the clustering key of a staged entity.
///
/// Unlinked entities cluster on their own lowercased name; document-linked
/// ones on the lowercased semantic identifier of their document.
pub async fn clustering_key<S: KgStore + ?Sized>(
    store: &S,
    entity: &StagedEntity,
) -> Result<ClusteringKey> {
    match entity.document_id.as_deref() {
        None => Ok(ClusteringKey {
            clustering_name: entity.name.to_lowercase(),
            only_without_document: false,
        }),
        Some(document_id) => {
            let semantic_id = store
                .get_document_semantic_id(document_id)
                .await?
                .ok_or_else(|| {
                    anyhow!(
                        "Document {} linked from entity {} has no semantic identifier",
                        document_id,
                        entity.id_name
                    )
                })?;
            Ok(ClusteringKey {
                clustering_name: semantic_id.to_lowercase(),
                only_without_document: true,
            })
        }
    }
}

/// Retrieves the canonical entities a staged entity could be merged into.
///
/// This is the recall-oriented pre-filter: same entity type, eligible
/// document linkage, and trigram similarity above the retrieval threshold.
/// Names with digits are never clustered, so they skip the lookup entirely.
pub async fn find_candidates<S: KgStore + ?Sized>(
    store: &S,
    entity: &StagedEntity,
    key: &ClusteringKey,
    config: &ClusteringConfig,
) -> Result<Vec<CanonicalEntity>> {
    if contains_digit(&key.clustering_name) {
        debug!(
            "Skipping candidate retrieval for {}: clustering name {:?} contains a digit",
            entity.id_name, key.clustering_name
        );
        return Ok(Vec::new());
    }

    let query = SimilarEntityQuery {
        entity_type_id_name: &entity.entity_type_id_name,
        clustering_name: &key.clustering_name,
        threshold: config.retrieve_threshold,
        only_without_document: key.only_without_document,
    };
    let candidates = store.find_similar_entities(&query).await?;
    debug!(
        "Retrieved {} candidate(s) for {} ({:?})",
        candidates.len(),
        entity.id_name,
        key.clustering_name
    );
    Ok(candidates)
}
