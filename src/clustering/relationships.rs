// src/clustering/relationships.rs

use anyhow::{Context, Result};
use log::{debug, error};

use crate::clustering::translation::ClusterTranslations;
use crate::models::{
    KgStage, RelationshipId, RelationshipIdError, StagedRelationship, StagedRelationshipType,
    occurrences_or_default,
};
use crate::results::{RelationshipTransferOutcome, RelationshipTypeTransferOutcome};
use crate::storage::KgStore;

/// Rewrites both endpoints of a composite relationship id through the
/// translation map. The relationship type is carried over unchanged.
pub fn rewrite_relationship_id(
    id_name: &str,
    translations: &ClusterTranslations,
) -> Result<String, RelationshipIdError> {
    let id = RelationshipId::parse(id_name)?;
    Ok(id
        .map_endpoints(|endpoint| translations.translate(endpoint))
        .to_string())
}

/// Re-persists staged relationship types at the normalized stage, one
/// transactional unit each. Types are not deduplicated.
pub async fn transfer_relationship_types<S: KgStore + ?Sized>(
    store: &S,
    relationship_types: &[StagedRelationshipType],
) -> RelationshipTypeTransferOutcome {
    let mut outcome = RelationshipTypeTransferOutcome::default();

    for relationship_type in relationship_types {
        let added = store
            .add_relationship_type(
                KgStage::Normalized,
                &relationship_type.source_entity_type_id_name,
                &relationship_type.relationship_type,
                &relationship_type.target_entity_type_id_name,
                occurrences_or_default(relationship_type.occurrences),
            )
            .await;
        match added {
            Ok(added_id_name) => {
                debug!(
                    "Transferred relationship type {} as {}",
                    relationship_type.id_name, added_id_name
                );
                outcome.transferred.push(relationship_type.id_name.clone());
            }
            Err(e) => {
                error!(
                    "Error transferring relationship type {}: {:#}",
                    relationship_type.id_name, e
                );
                outcome.failed.push(relationship_type.id_name.clone());
            }
        }
    }

    outcome
}

async fn transfer_one_relationship<S: KgStore + ?Sized>(
    store: &S,
    relationship: &StagedRelationship,
    translations: &ClusterTranslations,
) -> Result<String> {
    let new_id_name = rewrite_relationship_id(&relationship.id_name, translations)?;
    store
        .add_relationship(
            KgStage::Normalized,
            &new_id_name,
            relationship.source_document.as_deref().unwrap_or_default(),
            occurrences_or_default(relationship.occurrences),
        )
        .await
        .with_context(|| format!("Failed to add relationship {}", new_id_name))
}

/// Rewrites every staged relationship onto canonical entity ids and
/// re-persists it.
///
/// Each relationship succeeds or fails on its own: a malformed key or a
/// persistence error marks that relationship (and its source document) as
/// failed and processing moves on to the next one.
pub async fn transfer_relationships<S: KgStore + ?Sized>(
    store: &S,
    relationships: &[StagedRelationship],
    translations: &ClusterTranslations,
) -> RelationshipTransferOutcome {
    let mut outcome = RelationshipTransferOutcome::default();

    for relationship in relationships {
        match transfer_one_relationship(store, relationship, translations).await {
            Ok(added_id_name) => {
                debug!(
                    "Transferred relationship {} as {}",
                    relationship.id_name, added_id_name
                );
                if let Some(document) = &relationship.source_document {
                    outcome
                        .documents_with_successful_transfers
                        .insert(document.clone());
                }
                outcome.transferred.push(relationship.id_name.clone());
            }
            Err(e) => {
                if let Some(document) = &relationship.source_document {
                    outcome
                        .documents_with_failed_transfers
                        .insert(document.clone());
                }
                error!(
                    "Error transferring relationship {}: {:#}",
                    relationship.id_name, e
                );
                outcome.failed.push(relationship.id_name.clone());
            }
        }
    }

    outcome
}
