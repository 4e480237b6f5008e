// src/storage/memory.rs
//
// In-memory knowledge graph store. Mirrors the Postgres backend closely
// enough to run whole clustering passes in tests and dry runs, including
// pg_trgm-style candidate retrieval. Failures can be injected per entity name
// or relationship id to exercise the partial-failure paths.

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

use crate::clustering::similarity::trigram_similarity;
use crate::models::{
    CanonicalEntity, EntityUpsert, GroundingType, KgStage, RelationshipId, StagedEntity,
    StagedRelationship, StagedRelationshipType, UpsertTarget, canonical_entity_id,
    occurrences_or_default,
};
use crate::storage::{KgStore, KgStoreFactory, SimilarEntityQuery};

#[derive(Debug, Clone)]
struct EntityRecord {
    entity: CanonicalEntity,
    grounding: GroundingType,
}

#[derive(Debug, Clone, Default)]
struct DocumentRecord {
    semantic_id: Option<String>,
    kg_stage: Option<KgStage>,
}

#[derive(Debug, Default)]
struct State {
    documents: HashMap<String, DocumentRecord>,
    entities: HashMap<KgStage, Vec<EntityRecord>>,
    relationships: HashMap<KgStage, Vec<StagedRelationship>>,
    relationship_types: HashMap<KgStage, Vec<StagedRelationshipType>>,
    failing_entity_names: HashSet<String>,
    failing_relationship_ids: HashSet<String>,
}

impl State {
    fn clustering_name(&self, name: &str, document_id: Option<&str>) -> String {
        document_id
            .and_then(|id| self.documents.get(id))
            .and_then(|document| document.semantic_id.as_deref())
            .unwrap_or(name)
            .to_lowercase()
    }

    fn entities_mut(&mut self, stage: KgStage) -> &mut Vec<EntityRecord> {
        self.entities.entry(stage).or_default()
    }
}

fn delete_by_id_names<T>(rows: &mut Vec<T>, id_names: &[String], id_of: impl Fn(&T) -> &str) -> u64 {
    let doomed: HashSet<&str> = id_names.iter().map(String::as_str).collect();
    let before = rows.len();
    rows.retain(|row| !doomed.contains(id_of(row)));
    (before - rows.len()) as u64
}

/// A single tenant's knowledge graph held in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKgStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryKgStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_document(&self, document_id: &str, semantic_id: Option<&str>) {
        let mut state = self.state.lock().await;
        state.documents.insert(
            document_id.to_string(),
            DocumentRecord {
                semantic_id: semantic_id.map(str::to_string),
                kg_stage: Some(KgStage::Extracted),
            },
        );
    }

    pub async fn insert_staged_entity(&self, entity: StagedEntity) {
        let mut state = self.state.lock().await;
        let clustering_name = state.clustering_name(&entity.name, entity.document_id.as_deref());
        let record = EntityRecord {
            grounding: entity.grounding,
            entity: CanonicalEntity {
                id_name: entity.id_name,
                name: entity.name,
                entity_type_id_name: entity.entity_type_id_name,
                document_id: entity.document_id,
                occurrences: entity.occurrences,
                attributes: entity.attributes,
                alternative_names: entity.alternative_names,
                clustering_name,
            },
        };
        state.entities_mut(KgStage::Extracted).push(record);
    }

    pub async fn insert_canonical_entity(&self, entity: CanonicalEntity) {
        let mut state = self.state.lock().await;
        state.entities_mut(KgStage::Normalized).push(EntityRecord {
            entity,
            grounding: GroundingType::Grounded,
        });
    }

    pub async fn insert_staged_relationship(&self, relationship: StagedRelationship) {
        let mut state = self.state.lock().await;
        state
            .relationships
            .entry(KgStage::Extracted)
            .or_default()
            .push(relationship);
    }

    pub async fn insert_staged_relationship_type(&self, relationship_type: StagedRelationshipType) {
        let mut state = self.state.lock().await;
        state
            .relationship_types
            .entry(KgStage::Extracted)
            .or_default()
            .push(relationship_type);
    }

    /// Makes every upsert that would write an entity with this name fail.
    pub async fn fail_entity_upserts_for(&self, name: &str) {
        self.state
            .lock()
            .await
            .failing_entity_names
            .insert(name.to_string());
    }

    /// Makes inserting a relationship with this (rewritten) id fail.
    pub async fn fail_relationship_inserts_for(&self, relationship_id_name: &str) {
        self.state
            .lock()
            .await
            .failing_relationship_ids
            .insert(relationship_id_name.to_string());
    }

    pub async fn entities(&self, stage: KgStage) -> Vec<CanonicalEntity> {
        let state = self.state.lock().await;
        state
            .entities
            .get(&stage)
            .map(|records| records.iter().map(|record| record.entity.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn entity(&self, stage: KgStage, id_name: &str) -> Option<CanonicalEntity> {
        self.entities(stage)
            .await
            .into_iter()
            .find(|entity| entity.id_name == id_name)
    }

    pub async fn relationships(&self, stage: KgStage) -> Vec<StagedRelationship> {
        let state = self.state.lock().await;
        state.relationships.get(&stage).cloned().unwrap_or_default()
    }

    pub async fn relationship_types(&self, stage: KgStage) -> Vec<StagedRelationshipType> {
        let state = self.state.lock().await;
        state
            .relationship_types
            .get(&stage)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn document_kg_stage(&self, document_id: &str) -> Option<KgStage> {
        let state = self.state.lock().await;
        state
            .documents
            .get(document_id)
            .and_then(|document| document.kg_stage)
    }
}

#[async_trait]
impl KgStore for InMemoryKgStore {
    async fn get_all_relationship_types(
        &self,
        stage: KgStage,
    ) -> Result<Vec<StagedRelationshipType>> {
        Ok(self.relationship_types(stage).await)
    }

    async fn get_all_relationships(&self, stage: KgStage) -> Result<Vec<StagedRelationship>> {
        Ok(self.relationships(stage).await)
    }

    async fn get_entities_by_grounding(
        &self,
        stage: KgStage,
        grounding: GroundingType,
    ) -> Result<Vec<StagedEntity>> {
        let state = self.state.lock().await;
        let Some(records) = state.entities.get(&stage) else {
            return Ok(Vec::new());
        };
        Ok(records
            .iter()
            .filter(|record| record.grounding == grounding)
            .map(|record| StagedEntity {
                id_name: record.entity.id_name.clone(),
                name: record.entity.name.clone(),
                entity_type_id_name: record.entity.entity_type_id_name.clone(),
                document_id: record.entity.document_id.clone(),
                occurrences: record.entity.occurrences,
                attributes: record.entity.attributes.clone(),
                alternative_names: record.entity.alternative_names.clone(),
                grounding: record.grounding,
            })
            .collect())
    }

    async fn get_document_semantic_id(&self, document_id: &str) -> Result<Option<String>> {
        let state = self.state.lock().await;
        Ok(state
            .documents
            .get(document_id)
            .and_then(|document| document.semantic_id.clone()))
    }

    async fn find_similar_entities(
        &self,
        query: &SimilarEntityQuery<'_>,
    ) -> Result<Vec<CanonicalEntity>> {
        let state = self.state.lock().await;
        let Some(records) = state.entities.get(&KgStage::Normalized) else {
            return Ok(Vec::new());
        };
        let mut matches: Vec<CanonicalEntity> = records
            .iter()
            .map(|record| &record.entity)
            .filter(|entity| entity.entity_type_id_name == query.entity_type_id_name)
            .filter(|entity| !query.only_without_document || entity.document_id.is_none())
            .filter(|entity| {
                trigram_similarity(&entity.clustering_name, query.clustering_name)
                    >= query.threshold
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.id_name.cmp(&b.id_name));
        Ok(matches)
    }

    async fn add_or_update_entity(
        &self,
        stage: KgStage,
        upsert: &EntityUpsert,
    ) -> Result<CanonicalEntity> {
        let mut state = self.state.lock().await;
        if state.failing_entity_names.contains(&upsert.name) {
            bail!("Injected failure upserting entity {:?}", upsert.name);
        }
        let clustering_name = state.clustering_name(&upsert.name, upsert.document_id.as_deref());
        let id_name = upsert.target_id_name();
        let entities = state.entities_mut(stage);
        let existing = entities
            .iter_mut()
            .find(|record| record.entity.id_name == id_name);

        let entity = match (&upsert.target, existing) {
            (UpsertTarget::Existing(_), None) => {
                bail!("Canonical entity {} no longer exists", id_name)
            }
            (UpsertTarget::Existing(_), Some(record)) => {
                let entity = &mut record.entity;
                entity.name = upsert.name.clone();
                entity.document_id = upsert.document_id.clone();
                entity.occurrences = Some(upsert.occurrences);
                entity.attributes = upsert.attributes.clone();
                entity.alternative_names = upsert.alternative_names.clone();
                entity.clustering_name = clustering_name;
                entity.clone()
            }
            (UpsertTarget::New, Some(record)) => {
                let entity = &mut record.entity;
                entity.occurrences =
                    Some(occurrences_or_default(entity.occurrences) + upsert.occurrences);
                let mut attributes = upsert.attributes.clone();
                attributes.extend(entity.attributes.clone());
                entity.attributes = attributes;
                let aliases: BTreeSet<String> = entity
                    .alternative_names
                    .iter()
                    .chain(upsert.alternative_names.iter())
                    .cloned()
                    .collect();
                entity.alternative_names = aliases.into_iter().collect();
                if entity.document_id.is_none() {
                    entity.document_id = upsert.document_id.clone();
                }
                entity.clone()
            }
            (UpsertTarget::New, None) => {
                let entity = CanonicalEntity {
                    id_name: canonical_entity_id(&upsert.entity_type_id_name, &upsert.name),
                    name: upsert.name.clone(),
                    entity_type_id_name: upsert.entity_type_id_name.clone(),
                    document_id: upsert.document_id.clone(),
                    occurrences: Some(upsert.occurrences),
                    attributes: upsert.attributes.clone(),
                    alternative_names: upsert.alternative_names.clone(),
                    clustering_name,
                };
                entities.push(EntityRecord {
                    entity: entity.clone(),
                    grounding: GroundingType::Grounded,
                });
                entity
            }
        };
        Ok(entity)
    }

    async fn add_relationship_type(
        &self,
        stage: KgStage,
        source_entity_type: &str,
        relationship_type: &str,
        target_entity_type: &str,
        extraction_count: i32,
    ) -> Result<String> {
        let id_name =
            RelationshipId::new(source_entity_type, relationship_type, target_entity_type)
                .to_string();
        let mut state = self.state.lock().await;
        let types = state.relationship_types.entry(stage).or_default();
        match types.iter_mut().find(|existing| existing.id_name == id_name) {
            Some(existing) => {
                existing.occurrences =
                    Some(occurrences_or_default(existing.occurrences) + extraction_count);
            }
            None => types.push(StagedRelationshipType {
                id_name: id_name.clone(),
                source_entity_type_id_name: source_entity_type.to_string(),
                relationship_type: relationship_type.to_string(),
                target_entity_type_id_name: target_entity_type.to_string(),
                occurrences: Some(extraction_count),
            }),
        }
        Ok(id_name)
    }

    async fn add_relationship(
        &self,
        stage: KgStage,
        relationship_id_name: &str,
        source_document_id: &str,
        occurrences: i32,
    ) -> Result<String> {
        RelationshipId::parse(relationship_id_name)?;
        let mut state = self.state.lock().await;
        if state.failing_relationship_ids.contains(relationship_id_name) {
            bail!("Injected failure adding relationship {}", relationship_id_name);
        }
        let source_document =
            (!source_document_id.is_empty()).then(|| source_document_id.to_string());
        let relationships = state.relationships.entry(stage).or_default();
        match relationships
            .iter_mut()
            .find(|existing| existing.id_name == relationship_id_name)
        {
            Some(existing) => {
                existing.occurrences =
                    Some(occurrences_or_default(existing.occurrences) + occurrences);
                if existing.source_document.is_none() {
                    existing.source_document = source_document;
                }
            }
            None => relationships.push(StagedRelationship {
                id_name: relationship_id_name.to_string(),
                source_document,
                occurrences: Some(occurrences),
            }),
        }
        Ok(relationship_id_name.to_string())
    }

    async fn delete_relationships_by_id_names(
        &self,
        id_names: &[String],
        stage: KgStage,
    ) -> Result<u64> {
        let mut state = self.state.lock().await;
        let rows = state.relationships.entry(stage).or_default();
        Ok(delete_by_id_names(rows, id_names, |row| row.id_name.as_str()))
    }

    async fn delete_relationship_types_by_id_names(
        &self,
        id_names: &[String],
        stage: KgStage,
    ) -> Result<u64> {
        let mut state = self.state.lock().await;
        let rows = state.relationship_types.entry(stage).or_default();
        Ok(delete_by_id_names(rows, id_names, |row| row.id_name.as_str()))
    }

    async fn delete_entities_by_id_names(
        &self,
        id_names: &[String],
        stage: KgStage,
    ) -> Result<u64> {
        let mut state = self.state.lock().await;
        let rows = state.entities_mut(stage);
        Ok(delete_by_id_names(rows, id_names, |row| row.entity.id_name.as_str()))
    }

    async fn update_document_kg_stage(&self, document_id: &str, stage: KgStage) -> Result<()> {
        let mut state = self.state.lock().await;
        let document = state
            .documents
            .get_mut(document_id)
            .ok_or_else(|| anyhow!("Document {} not found", document_id))?;
        document.kg_stage = Some(stage);
        Ok(())
    }
}

/// In-memory stores keyed by tenant id, created on first use.
#[derive(Debug, Default)]
pub struct InMemoryKgStores {
    tenants: StdMutex<HashMap<String, InMemoryKgStore>>,
}

impl InMemoryKgStores {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KgStoreFactory for InMemoryKgStores {
    type Store = InMemoryKgStore;

    fn for_tenant(&self, tenant_id: &str) -> Result<InMemoryKgStore> {
        let mut tenants = self
            .tenants
            .lock()
            .map_err(|_| anyhow!("In-memory tenant registry lock poisoned"))?;
        Ok(tenants.entry(tenant_id.to_string()).or_default().clone())
    }
}
