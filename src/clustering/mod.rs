// src/clustering/mod.rs
//
// Moves grounded extractions from the staging tables into the normalized
// knowledge graph. Each staged entity is merged into its closest canonical
// entity (or inserted as a new one); relationships are then rewritten onto the
// canonical ids. Ungrounded entities and entity clustering beyond
// "merge into best existing match" are not handled here.

pub mod candidates;
pub mod cleanup;
pub mod merge;
pub mod relationships;
pub mod similarity;
pub mod translation;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{error, info};
use std::time::Instant;
use uuid::Uuid;

use crate::config::ClusteringConfig;
use crate::models::{GroundingType, KgStage, StagedEntity};
use crate::results::{CleanupOutcome, ClusteringReport, EntityTransferOutcome};
use crate::storage::{KgStore, KgStoreFactory};

use cleanup::{cleanup_gate, cleanup_staged_records};
use merge::transfer_grounded_entity;
use relationships::{transfer_relationship_types, transfer_relationships};

/// Clusters the staged extractions of one tenant.
///
/// Outcomes are only observable through logs and persisted state; callers
/// that need the counts should use [`run_clustering`].
pub async fn kg_clustering<F: KgStoreFactory>(
    stores: &F,
    tenant_id: &str,
    index_name: &str,
    config: &ClusteringConfig,
) -> Result<()> {
    let store = stores
        .for_tenant(tenant_id)
        .with_context(|| format!("Failed to open knowledge graph store for tenant {}", tenant_id))?;
    let report = run_clustering(&store, tenant_id, index_name, config).await?;
    report.log_summary();
    Ok(())
}

/// Runs one clustering pass against `store` and reports what happened.
///
/// Only invalid configuration or a failure to load the staged batch aborts
/// the run; every per-record failure is logged and recorded in the report.
pub async fn run_clustering<S: KgStore + ?Sized>(
    store: &S,
    tenant_id: &str,
    index_name: &str,
    config: &ClusteringConfig,
) -> Result<ClusteringReport> {
    config.validate()?;

    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let start_time = Instant::now();
    info!(
        "Starting kg clustering for tenant {} (index {}, run {}, batch size {})",
        tenant_id, index_name, run_id, config.processing_chunk_batch_size
    );

    let relationship_types = store
        .get_all_relationship_types(KgStage::Extracted)
        .await
        .context("Failed to load staged relationship types")?;
    let relationships = store
        .get_all_relationships(KgStage::Extracted)
        .await
        .context("Failed to load staged relationships")?;
    let grounded_entities = store
        .get_entities_by_grounding(KgStage::Extracted, GroundingType::Grounded)
        .await
        .context("Failed to load grounded staged entities")?;
    info!(
        "Loaded {} grounded entities, {} relationships and {} relationship types",
        grounded_entities.len(),
        relationships.len(),
        relationship_types.len()
    );

    let entities = transfer_grounded_entities(store, &grounded_entities, config).await;
    let relationship_types = transfer_relationship_types(store, &relationship_types).await;
    let relationships = transfer_relationships(store, &relationships, &entities.translations).await;

    let cleanup = match cleanup_gate(config, &entities, &relationship_types, &relationships) {
        Some(skipped) => skipped,
        None => CleanupOutcome::Performed(
            cleanup_staged_records(store, &entities, &relationship_types, &relationships).await,
        ),
    };

    info!(
        "Kg clustering for tenant {} finished in {:.2?}",
        tenant_id,
        start_time.elapsed()
    );

    Ok(ClusteringReport {
        run_id,
        tenant_id: tenant_id.to_string(),
        index_name: index_name.to_string(),
        started_at,
        entities,
        relationship_types,
        relationships,
        cleanup,
    })
}

/// Transfers staged entities one at a time, building the translation map.
///
/// The map is complete before any relationship is rewritten.
pub async fn transfer_grounded_entities<S: KgStore + ?Sized>(
    store: &S,
    grounded_entities: &[StagedEntity],
    config: &ClusteringConfig,
) -> EntityTransferOutcome {
    let mut outcome = EntityTransferOutcome::default();

    for (i, entity) in grounded_entities.iter().enumerate() {
        match transfer_grounded_entity(store, entity, config).await {
            Ok(canonical_id_name) => {
                outcome
                    .translations
                    .record(entity.id_name.clone(), canonical_id_name);
                outcome.transferred.push(entity.id_name.clone());
            }
            Err(e) => {
                error!("Error transferring entity {}: {:#}", entity.id_name, e);
                outcome.failed.push(entity.id_name.clone());
            }
        }

        if (i + 1) % 1000 == 0 || i + 1 == grounded_entities.len() {
            info!(
                "Processed {}/{} grounded entities ({:.1}%)",
                i + 1,
                grounded_entities.len(),
                (i + 1) as f32 / grounded_entities.len() as f32 * 100.0
            );
        }
    }

    outcome
}
