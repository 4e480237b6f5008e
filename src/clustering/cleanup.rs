// src/clustering/cleanup.rs
//
// Staged records are the only record of what a run merged, so they are only
// removed once a run transferred everything it loaded.

use log::{error, info, warn};

use crate::config::ClusteringConfig;
use crate::models::KgStage;
use crate::results::{
    CleanupOutcome, CleanupStats, EntityTransferOutcome, RelationshipTransferOutcome,
    RelationshipTypeTransferOutcome, transfers_fully_consistent,
};
use crate::storage::KgStore;

/// Decides whether the cleanup stage may run for a finished transfer.
pub fn cleanup_gate(
    config: &ClusteringConfig,
    entities: &EntityTransferOutcome,
    relationship_types: &RelationshipTypeTransferOutcome,
    relationships: &RelationshipTransferOutcome,
) -> Option<CleanupOutcome> {
    if !config.cleanup_enabled {
        return Some(CleanupOutcome::Disabled);
    }
    if transfers_fully_consistent(entities, relationship_types, relationships) {
        return None;
    }
    Some(CleanupOutcome::SkippedInconsistent {
        failed_entities: entities.failed.len(),
        failed_relationship_types: relationship_types.failed.len(),
        failed_relationships: relationships.failed.len(),
    })
}

/// Deletes the transferred staged records and marks their source documents
/// as normalized. Every step is its own unit of work; failures are logged and
/// counted, never propagated.
pub async fn cleanup_staged_records<S: KgStore + ?Sized>(
    store: &S,
    entities: &EntityTransferOutcome,
    relationship_types: &RelationshipTypeTransferOutcome,
    relationships: &RelationshipTransferOutcome,
) -> CleanupStats {
    let mut stats = CleanupStats::default();

    match store
        .delete_relationships_by_id_names(&relationships.transferred, KgStage::Extracted)
        .await
    {
        Ok(deleted) => stats.deleted_relationships = deleted,
        Err(e) => {
            error!("Error deleting relationships: {:#}", e);
            stats.errors += 1;
        }
    }

    match store
        .delete_relationship_types_by_id_names(&relationship_types.transferred, KgStage::Extracted)
        .await
    {
        Ok(deleted) => stats.deleted_relationship_types = deleted,
        Err(e) => {
            error!("Error deleting relationship types: {:#}", e);
            stats.errors += 1;
        }
    }

    match store
        .delete_entities_by_id_names(&entities.transferred, KgStage::Extracted)
        .await
    {
        Ok(deleted) => stats.deleted_entities = deleted,
        Err(e) => {
            error!("Error deleting entities: {:#}", e);
            stats.errors += 1;
        }
    }

    for document_id in &relationships.documents_with_successful_transfers {
        match store
            .update_document_kg_stage(document_id, KgStage::Normalized)
            .await
        {
            Ok(()) => stats.documents_normalized += 1,
            Err(e) => {
                warn!("Error updating kg stage of document {}: {:#}", document_id, e);
                stats.errors += 1;
            }
        }
    }

    info!(
        "Cleanup finished: {} relationships, {} relationship types and {} entities deleted",
        stats.deleted_relationships, stats.deleted_relationship_types, stats.deleted_entities
    );
    stats
}
