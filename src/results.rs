// src/results.rs

use chrono::{DateTime, Utc};
use log::{info, warn};
use std::collections::BTreeSet;

use crate::clustering::translation::ClusterTranslations;

/// Outcome of moving grounded staged entities into the normalized stage.
#[derive(Debug, Clone, Default)]
pub struct EntityTransferOutcome {
    /// Staged entity ids that were merged or inserted.
    pub transferred: Vec<String>,
    /// Staged entity ids that could not be transferred; absent from `translations`.
    pub failed: Vec<String>,
    pub translations: ClusterTranslations,
}

#[derive(Debug, Clone, Default)]
pub struct RelationshipTypeTransferOutcome {
    /// Staged relationship type ids that were re-persisted.
    pub transferred: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RelationshipTransferOutcome {
    /// Staged relationship ids that were rewritten and re-persisted.
    pub transferred: Vec<String>,
    pub failed: Vec<String>,
    /// A document may appear in both sets when its relationships had mixed outcomes.
    pub documents_with_successful_transfers: BTreeSet<String>,
    pub documents_with_failed_transfers: BTreeSet<String>,
}

/// Counts from the deletion and document-stage phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub deleted_relationships: u64,
    pub deleted_relationship_types: u64,
    pub deleted_entities: u64,
    pub documents_normalized: usize,
    /// Deletions or document updates that failed and were only logged.
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// Cleanup is switched off in the configuration; staged records are kept.
    Disabled,
    /// The batch had failures, so staged records are kept as the only record of what was merged.
    SkippedInconsistent {
        failed_entities: usize,
        failed_relationship_types: usize,
        failed_relationships: usize,
    },
    Performed(CleanupStats),
}

/// True when no entity, relationship type or relationship failed to transfer.
pub fn transfers_fully_consistent(
    entities: &EntityTransferOutcome,
    relationship_types: &RelationshipTypeTransferOutcome,
    relationships: &RelationshipTransferOutcome,
) -> bool {
    entities.failed.is_empty()
        && relationship_types.failed.is_empty()
        && relationships.failed.is_empty()
}

/// Everything one clustering run did, for library callers and tests.
#[derive(Debug, Clone)]
pub struct ClusteringReport {
    pub run_id: String,
    pub tenant_id: String,
    pub index_name: String,
    pub started_at: DateTime<Utc>,
    pub entities: EntityTransferOutcome,
    pub relationship_types: RelationshipTypeTransferOutcome,
    pub relationships: RelationshipTransferOutcome,
    pub cleanup: CleanupOutcome,
}

impl ClusteringReport {
    pub fn is_fully_consistent(&self) -> bool {
        transfers_fully_consistent(&self.entities, &self.relationship_types, &self.relationships)
    }

    pub fn log_summary(&self) {
        info!(
            "Transferred {} entities ({} failed)",
            self.entities.transferred.len(),
            self.entities.failed.len()
        );
        info!(
            "Transferred {} relationships ({} failed)",
            self.relationships.transferred.len(),
            self.relationships.failed.len()
        );
        info!(
            "Transferred {} relationship types ({} failed)",
            self.relationship_types.transferred.len(),
            self.relationship_types.failed.len()
        );

        let mixed = self
            .relationships
            .documents_with_failed_transfers
            .intersection(&self.relationships.documents_with_successful_transfers)
            .count();
        if mixed > 0 {
            warn!(
                "{} document(s) had both successful and failed relationship transfers",
                mixed
            );
        }

        match &self.cleanup {
            CleanupOutcome::Disabled => info!("Cleanup disabled; staged records were kept"),
            CleanupOutcome::SkippedInconsistent { .. } => {
                warn!("Cleanup skipped because the batch was not fully consistent")
            }
            CleanupOutcome::Performed(stats) => info!(
                "Cleanup removed {} relationships, {} relationship types, {} entities and normalized {} documents ({} errors)",
                stats.deleted_relationships,
                stats.deleted_relationship_types,
                stats.deleted_entities,
                stats.documents_normalized,
                stats.errors
            ),
        }
    }
}
