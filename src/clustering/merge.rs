// src/clustering/merge.rs

use anyhow::{Context, Result};
use log::{debug, info};
use std::collections::BTreeSet;

use crate::clustering::candidates::{clustering_key, find_candidates};
use crate::clustering::similarity::accepted_score;
use crate::config::ClusteringConfig;
use crate::models::{
    CanonicalEntity, EntityUpsert, KgStage, StagedEntity, UpsertTarget, occurrences_or_default,
};
use crate::storage::KgStore;

/// A candidate that cleared the acceptance threshold, with its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestMatch<'a> {
    pub entity: &'a CanonicalEntity,
    pub score: f64,
}

/// Picks the highest scoring acceptable candidate.
///
/// Only a strictly greater score replaces the running best, so among equal
/// scores the first candidate in iteration order wins.
pub fn select_best_match<'a>(
    clustering_name: &str,
    candidates: &'a [CanonicalEntity],
    config: &ClusteringConfig,
) -> Option<BestMatch<'a>> {
    let min_score = config.min_match_score();
    candidates
        .iter()
        .fold(None, |best: Option<BestMatch<'a>>, candidate| {
            let Some(score) = accepted_score(&candidate.clustering_name, clustering_name, min_score)
            else {
                return best;
            };
            match best {
                Some(current) if score <= current.score => Some(current),
                _ => Some(BestMatch {
                    entity: candidate,
                    score,
                }),
            }
        })
}

/// Computes what to persist for a staged entity given its best match, if any.
///
/// On a match the canonical entity keeps its name, its document link (when it
/// has one) and its attribute values on key collisions; occurrences add up and
/// aliases are unioned together with the staged entity's own name. Without a
/// match the staged entity is inserted as-is.
pub fn merge_entity(staged: &StagedEntity, best: Option<&CanonicalEntity>) -> EntityUpsert {
    let mut alternative_names: BTreeSet<String> =
        staged.alternative_names.iter().cloned().collect();
    let mut attributes = staged.attributes.clone();
    let mut occurrences = occurrences_or_default(staged.occurrences);

    let Some(existing) = best else {
        return EntityUpsert {
            target: UpsertTarget::New,
            entity_type_id_name: staged.entity_type_id_name.clone(),
            name: staged.name.clone(),
            document_id: staged.document_id.clone(),
            occurrences,
            attributes,
            alternative_names: alternative_names.into_iter().collect(),
        };
    };

    occurrences += occurrences_or_default(existing.occurrences);
    attributes.extend(
        existing
            .attributes
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    alternative_names.extend(existing.alternative_names.iter().cloned());
    alternative_names.insert(staged.name.clone());

    EntityUpsert {
        target: UpsertTarget::Existing(existing.id_name.clone()),
        entity_type_id_name: staged.entity_type_id_name.clone(),
        name: existing.name.clone(),
        document_id: existing
            .document_id
            .clone()
            .or_else(|| staged.document_id.clone()),
        occurrences,
        attributes,
        alternative_names: alternative_names.into_iter().collect(),
    }
}

/// Moves one grounded staged entity into the normalized stage, merging it
/// into the closest canonical entity when one is similar enough.
///
/// Returns the id of the canonical entity that now represents it.
pub async fn transfer_grounded_entity<S: KgStore + ?Sized>(
    store: &S,
    entity: &StagedEntity,
    config: &ClusteringConfig,
) -> Result<String> {
    let key = clustering_key(store, entity)
        .await
        .with_context(|| format!("Failed to derive clustering name for {}", entity.id_name))?;
    let candidates = find_candidates(store, entity, &key, config)
        .await
        .with_context(|| format!("Failed to retrieve candidates for {}", entity.id_name))?;

    let best = select_best_match(&key.clustering_name, &candidates, config);
    match best {
        Some(best) => info!(
            "Merging {} with {} (score {:.1})",
            entity.id_name, best.entity.id_name, best.score
        ),
        None => debug!("No match for {}, inserting as new entity", entity.id_name),
    }

    let upsert = merge_entity(entity, best.map(|best| best.entity));
    let transferred = store
        .add_or_update_entity(KgStage::Normalized, &upsert)
        .await
        .with_context(|| {
            format!(
                "Failed to upsert entity {} as {}",
                entity.id_name,
                upsert.target_id_name()
            )
        })?;
    Ok(transferred.id_name)
}
