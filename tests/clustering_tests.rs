// tests/clustering_tests.rs

use anyhow::Result;
use serde_json::json;

use kg_clustering_lib::{
    CanonicalEntity, CleanupOutcome, ClusteringConfig, GroundingType, InMemoryKgStore, KgStage,
    KgStoreFactory, StagedEntity, StagedRelationship, StagedRelationshipType, kg_clustering,
    models::Attributes, run_clustering, storage::InMemoryKgStores,
};

const TENANT: &str = "tenant_test";
const INDEX: &str = "test_index";

// --- Fixtures ---

fn staged_entity(id_name: &str, name: &str, entity_type: &str) -> StagedEntity {
    StagedEntity {
        id_name: id_name.to_string(),
        name: name.to_string(),
        entity_type_id_name: entity_type.to_string(),
        document_id: None,
        occurrences: None,
        attributes: Attributes::new(),
        alternative_names: Vec::new(),
        grounding: GroundingType::Grounded,
    }
}

fn canonical_entity(id_name: &str, name: &str, entity_type: &str) -> CanonicalEntity {
    CanonicalEntity {
        id_name: id_name.to_string(),
        name: name.to_string(),
        entity_type_id_name: entity_type.to_string(),
        document_id: None,
        occurrences: Some(1),
        attributes: Attributes::new(),
        alternative_names: Vec::new(),
        clustering_name: name.to_lowercase(),
    }
}

fn staged_relationship(id_name: &str, source_document: Option<&str>) -> StagedRelationship {
    StagedRelationship {
        id_name: id_name.to_string(),
        source_document: source_document.map(str::to_string),
        occurrences: None,
    }
}

fn staged_relationship_type(
    id_name: &str,
    source: &str,
    label: &str,
    target: &str,
    occurrences: Option<i32>,
) -> StagedRelationshipType {
    StagedRelationshipType {
        id_name: id_name.to_string(),
        source_entity_type_id_name: source.to_string(),
        relationship_type: label.to_string(),
        target_entity_type_id_name: target.to_string(),
        occurrences,
    }
}

/// "acme corporation" scores 72 against "acme corp" with a trigram similarity of 0.5.
fn lenient_config() -> ClusteringConfig {
    ClusteringConfig {
        retrieve_threshold: 0.4,
        clustering_threshold: 0.7,
        ..ClusteringConfig::default()
    }
}

fn cleanup_config() -> ClusteringConfig {
    ClusteringConfig {
        cleanup_enabled: true,
        ..ClusteringConfig::default()
    }
}

// --- Entity transfer ---

#[tokio::test]
async fn unmatched_entity_is_inserted_as_new_canonical_entity() -> Result<()> {
    let store = InMemoryKgStore::new();
    let mut entity = staged_entity("S1", "Acme Corp", "ORG");
    entity.attributes.insert("industry".to_string(), json!("tools"));
    entity.alternative_names = vec!["ACME".to_string()];
    store.insert_staged_entity(entity).await;

    let report = run_clustering(&store, TENANT, INDEX, &ClusteringConfig::default()).await?;

    assert_eq!(report.entities.transferred, vec!["S1".to_string()]);
    assert_eq!(report.entities.translations.get("S1"), Some("ORG::Acme Corp"));

    let canonical = store
        .entity(KgStage::Normalized, "ORG::Acme Corp")
        .await
        .expect("canonical entity inserted");
    assert_eq!(canonical.name, "Acme Corp");
    assert_eq!(canonical.occurrences, Some(1));
    assert_eq!(canonical.attributes["industry"], json!("tools"));
    assert_eq!(canonical.alternative_names, vec!["ACME".to_string()]);
    assert_eq!(canonical.clustering_name, "acme corp");
    Ok(())
}

#[tokio::test]
async fn similar_entity_merges_into_existing_canonical_entity() -> Result<()> {
    let store = InMemoryKgStore::new();
    let mut existing = canonical_entity("ORG::Acme Corp", "Acme Corp", "ORG");
    existing.occurrences = Some(3);
    existing.attributes.insert("industry".to_string(), json!("anvils"));
    store.insert_canonical_entity(existing).await;

    let mut entity = staged_entity("S1", "Acme Corporation", "ORG");
    entity.attributes.insert("industry".to_string(), json!("tools"));
    entity.attributes.insert("hq".to_string(), json!("Boston"));
    store.insert_staged_entity(entity).await;

    let report = run_clustering(&store, TENANT, INDEX, &lenient_config()).await?;
    assert_eq!(report.entities.translations.get("S1"), Some("ORG::Acme Corp"));

    let normalized = store.entities(KgStage::Normalized).await;
    assert_eq!(normalized.len(), 1);
    let merged = &normalized[0];
    assert_eq!(merged.name, "Acme Corp");
    assert_eq!(merged.occurrences, Some(4));
    assert!(merged.alternative_names.contains(&"Acme Corporation".to_string()));
    assert_eq!(merged.attributes["industry"], json!("anvils"));
    assert_eq!(merged.attributes["hq"], json!("Boston"));
    Ok(())
}

#[tokio::test]
async fn default_thresholds_keep_loosely_similar_names_apart() -> Result<()> {
    let store = InMemoryKgStore::new();
    store
        .insert_canonical_entity(canonical_entity("ORG::Acme Corp", "Acme Corp", "ORG"))
        .await;
    store
        .insert_staged_entity(staged_entity("S1", "Acme Corporation", "ORG"))
        .await;

    let report = run_clustering(&store, TENANT, INDEX, &ClusteringConfig::default()).await?;

    assert_eq!(
        report.entities.translations.get("S1"),
        Some("ORG::Acme Corporation")
    );
    assert_eq!(store.entities(KgStage::Normalized).await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn retrieval_threshold_bounds_candidates() -> Result<()> {
    // Acceptance alone would take the 72-point match; only retrieval differs
    for (retrieve_threshold, expected) in [(0.4, "ORG::Acme Corp"), (0.9, "ORG::Acme Corporation")] {
        let store = InMemoryKgStore::new();
        store
            .insert_canonical_entity(canonical_entity("ORG::Acme Corp", "Acme Corp", "ORG"))
            .await;
        store
            .insert_staged_entity(staged_entity("S1", "Acme Corporation", "ORG"))
            .await;

        let config = ClusteringConfig {
            retrieve_threshold,
            clustering_threshold: 0.5,
            ..ClusteringConfig::default()
        };
        let report = run_clustering(&store, TENANT, INDEX, &config).await?;

        assert_eq!(
            report.entities.translations.get("S1"),
            Some(expected),
            "retrieve_threshold {}",
            retrieve_threshold
        );
    }
    Ok(())
}

#[tokio::test]
async fn versioned_names_never_merge() -> Result<()> {
    let store = InMemoryKgStore::new();
    store
        .insert_staged_entity(staged_entity("S1", "Project X v1", "PROJECT"))
        .await;
    store
        .insert_staged_entity(staged_entity("S2", "Project X v2", "PROJECT"))
        .await;

    let config = ClusteringConfig {
        retrieve_threshold: 0.0,
        clustering_threshold: 0.0,
        ..ClusteringConfig::default()
    };
    let report = run_clustering(&store, TENANT, INDEX, &config).await?;

    assert_eq!(
        report.entities.translations.get("S1"),
        Some("PROJECT::Project X v1")
    );
    assert_eq!(
        report.entities.translations.get("S2"),
        Some("PROJECT::Project X v2")
    );
    assert_eq!(store.entities(KgStage::Normalized).await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn digit_guard_holds_even_for_identical_names() -> Result<()> {
    let store = InMemoryKgStore::new();
    store
        .insert_canonical_entity(canonical_entity("C-v1", "Project X v1", "PROJECT"))
        .await;
    store
        .insert_staged_entity(staged_entity("S1", "Project X v1", "PROJECT"))
        .await;

    let report = run_clustering(&store, TENANT, INDEX, &ClusteringConfig::default()).await?;

    assert_eq!(
        report.entities.translations.get("S1"),
        Some("PROJECT::Project X v1")
    );
    let untouched = store
        .entity(KgStage::Normalized, "C-v1")
        .await
        .expect("existing entity kept");
    assert_eq!(untouched.occurrences, Some(1));
    assert!(untouched.alternative_names.is_empty());
    Ok(())
}

#[tokio::test]
async fn entity_types_are_never_mixed() -> Result<()> {
    let store = InMemoryKgStore::new();
    store
        .insert_canonical_entity(canonical_entity("PERSON::Jordan", "Jordan", "PERSON"))
        .await;
    store
        .insert_staged_entity(staged_entity("S1", "Jordan", "COUNTRY"))
        .await;

    let report = run_clustering(&store, TENANT, INDEX, &ClusteringConfig::default()).await?;

    assert_eq!(
        report.entities.translations.get("S1"),
        Some("COUNTRY::Jordan")
    );
    Ok(())
}

#[tokio::test]
async fn document_linked_entities_cluster_on_semantic_id() -> Result<()> {
    let store = InMemoryKgStore::new();
    store.add_document("doc-1", Some("Acme Corp")).await;

    let mut documented = canonical_entity("C-documented", "Acme Corp", "ORG");
    documented.document_id = Some("doc-0".to_string());
    store.insert_canonical_entity(documented).await;

    let mut entity = staged_entity("S1", "ACME", "ORG");
    entity.document_id = Some("doc-1".to_string());
    store.insert_staged_entity(entity.clone()).await;

    // The only similar canonical entity has its own document, so no merge
    let report = run_clustering(&store, TENANT, INDEX, &ClusteringConfig::default()).await?;
    assert_eq!(report.entities.translations.get("S1"), Some("ORG::ACME"));
    let inserted = store
        .entity(KgStage::Normalized, "ORG::ACME")
        .await
        .expect("document-linked entity inserted");
    assert_eq!(inserted.clustering_name, "acme corp");
    assert_eq!(inserted.document_id.as_deref(), Some("doc-1"));

    // A document-free canonical entity is eligible and takes the staged document link
    let store = InMemoryKgStore::new();
    store.add_document("doc-1", Some("Acme Corp")).await;
    store
        .insert_canonical_entity(canonical_entity("C-free", "Acme Corp", "ORG"))
        .await;
    store.insert_staged_entity(entity).await;

    let report = run_clustering(&store, TENANT, INDEX, &ClusteringConfig::default()).await?;
    assert_eq!(report.entities.translations.get("S1"), Some("C-free"));
    let merged = store
        .entity(KgStage::Normalized, "C-free")
        .await
        .expect("canonical entity kept");
    assert_eq!(merged.name, "Acme Corp");
    assert_eq!(merged.document_id.as_deref(), Some("doc-1"));
    assert!(merged.alternative_names.contains(&"ACME".to_string()));
    Ok(())
}

#[tokio::test]
async fn missing_semantic_id_fails_only_that_entity() -> Result<()> {
    let store = InMemoryKgStore::new();
    store.add_document("doc-unnamed", None).await;

    let mut orphan = staged_entity("S-orphan", "Orphan Co", "ORG");
    orphan.document_id = Some("doc-unnamed".to_string());
    store.insert_staged_entity(orphan).await;
    store
        .insert_staged_entity(staged_entity("S-ok", "Fine Co", "ORG"))
        .await;

    let report = run_clustering(&store, TENANT, INDEX, &ClusteringConfig::default()).await?;

    assert_eq!(report.entities.failed, vec!["S-orphan".to_string()]);
    assert_eq!(report.entities.transferred, vec!["S-ok".to_string()]);
    assert_eq!(report.entities.translations.get("S-orphan"), None);
    Ok(())
}

#[tokio::test]
async fn repeated_merges_accumulate_occurrences_and_aliases() -> Result<()> {
    let store = InMemoryKgStore::new();
    let mut first = staged_entity("S1", "Acme Corp", "ORG");
    first.occurrences = Some(2);
    store.insert_staged_entity(first).await;
    let mut second = staged_entity("S2", "Acme Corp", "ORG");
    second.alternative_names = vec!["ACME Corporation".to_string()];
    store.insert_staged_entity(second).await;

    let report = run_clustering(&store, TENANT, INDEX, &ClusteringConfig::default()).await?;
    assert_eq!(report.entities.translations.get("S1"), Some("ORG::Acme Corp"));
    assert_eq!(report.entities.translations.get("S2"), Some("ORG::Acme Corp"));

    let canonical = store
        .entity(KgStage::Normalized, "ORG::Acme Corp")
        .await
        .expect("canonical entity inserted");
    assert_eq!(canonical.occurrences, Some(3));
    assert_eq!(
        canonical.alternative_names,
        vec!["ACME Corporation".to_string(), "Acme Corp".to_string()]
    );

    // Cleanup is off, so a second pass merges the same staged entities again
    run_clustering(&store, TENANT, INDEX, &ClusteringConfig::default()).await?;
    let canonical = store
        .entity(KgStage::Normalized, "ORG::Acme Corp")
        .await
        .expect("canonical entity kept");
    assert_eq!(canonical.occurrences, Some(6));
    assert_eq!(store.entities(KgStage::Normalized).await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn upsert_failure_excludes_entity_from_translations() -> Result<()> {
    let store = InMemoryKgStore::new();
    store
        .insert_staged_entity(staged_entity("S-broken", "Broken Co", "ORG"))
        .await;
    store
        .insert_staged_entity(staged_entity("S-ok", "Fine Co", "ORG"))
        .await;
    store
        .insert_staged_relationship(staged_relationship("S-broken__OWNS__S-ok", None))
        .await;
    store.fail_entity_upserts_for("Broken Co").await;

    let report = run_clustering(&store, TENANT, INDEX, &ClusteringConfig::default()).await?;

    assert_eq!(report.entities.failed, vec!["S-broken".to_string()]);
    assert_eq!(report.entities.translations.len(), 1);
    assert_eq!(report.relationships.failed, Vec::<String>::new());

    let relationships = store.relationships(KgStage::Normalized).await;
    assert_eq!(relationships.len(), 1);
    assert_eq!(relationships[0].id_name, "S-broken__OWNS__ORG::Fine Co");
    Ok(())
}

// --- Relationship rewriting ---

#[tokio::test]
async fn relationship_endpoints_are_rewritten_through_translations() -> Result<()> {
    let store = InMemoryKgStore::new();
    store
        .insert_canonical_entity(canonical_entity("C1", "Jane Doe", "PERSON"))
        .await;
    store
        .insert_staged_entity(staged_entity("E1", "Jane Doe", "PERSON"))
        .await;
    let mut relationship = staged_relationship("E1__WORKS_AT__E2", Some("doc-1"));
    relationship.occurrences = Some(3);
    store.insert_staged_relationship(relationship).await;

    let report = run_clustering(&store, TENANT, INDEX, &ClusteringConfig::default()).await?;

    assert_eq!(report.entities.translations.get("E1"), Some("C1"));
    assert_eq!(report.entities.translations.get("E2"), None);
    assert_eq!(
        report.relationships.transferred,
        vec!["E1__WORKS_AT__E2".to_string()]
    );
    assert!(
        report
            .relationships
            .documents_with_successful_transfers
            .contains("doc-1")
    );

    let relationships = store.relationships(KgStage::Normalized).await;
    assert_eq!(relationships.len(), 1);
    assert_eq!(relationships[0].id_name, "C1__WORKS_AT__E2");
    assert_eq!(relationships[0].occurrences, Some(3));
    assert_eq!(relationships[0].source_document.as_deref(), Some("doc-1"));
    Ok(())
}

#[tokio::test]
async fn malformed_relationship_fails_in_isolation() -> Result<()> {
    let store = InMemoryKgStore::new();
    store
        .insert_staged_relationship(staged_relationship("E1_WORKS_AT", Some("doc-bad")))
        .await;
    store
        .insert_staged_relationship(staged_relationship("E3__KNOWS__E4", Some("doc-good")))
        .await;
    store
        .insert_staged_relationship(staged_relationship("E5____E6", None))
        .await;

    let report = run_clustering(&store, TENANT, INDEX, &ClusteringConfig::default()).await?;

    assert_eq!(
        report.relationships.failed,
        vec!["E1_WORKS_AT".to_string(), "E5____E6".to_string()]
    );
    assert_eq!(
        report.relationships.transferred,
        vec!["E3__KNOWS__E4".to_string()]
    );
    assert!(
        report
            .relationships
            .documents_with_failed_transfers
            .contains("doc-bad")
    );
    assert!(
        report
            .relationships
            .documents_with_successful_transfers
            .contains("doc-good")
    );

    let relationships = store.relationships(KgStage::Normalized).await;
    assert_eq!(relationships.len(), 1);
    assert_eq!(relationships[0].id_name, "E3__KNOWS__E4");
    assert_eq!(relationships[0].occurrences, Some(1));
    assert_eq!(relationships[0].source_document.as_deref(), Some("doc-good"));
    Ok(())
}

#[tokio::test]
async fn document_with_mixed_outcomes_lands_in_both_sets() -> Result<()> {
    let store = InMemoryKgStore::new();
    store
        .insert_staged_relationship(staged_relationship("A__KNOWS__B", Some("doc-1")))
        .await;
    store
        .insert_staged_relationship(staged_relationship("B__KNOWS__C", Some("doc-1")))
        .await;
    store.fail_relationship_inserts_for("B__KNOWS__C").await;

    let report = run_clustering(&store, TENANT, INDEX, &ClusteringConfig::default()).await?;

    assert_eq!(report.relationships.failed, vec!["B__KNOWS__C".to_string()]);
    assert!(
        report
            .relationships
            .documents_with_successful_transfers
            .contains("doc-1")
    );
    assert!(
        report
            .relationships
            .documents_with_failed_transfers
            .contains("doc-1")
    );
    Ok(())
}

#[tokio::test]
async fn colliding_rewritten_relationships_add_occurrences() -> Result<()> {
    let store = InMemoryKgStore::new();
    store
        .insert_staged_entity(staged_entity("S1", "Acme Corp", "ORG"))
        .await;
    store
        .insert_staged_entity(staged_entity("S2", "Acme Corp", "ORG"))
        .await;
    let mut first = staged_relationship("S1__LOCATED_IN__Boston", None);
    first.occurrences = Some(2);
    store.insert_staged_relationship(first).await;
    store
        .insert_staged_relationship(staged_relationship("S2__LOCATED_IN__Boston", None))
        .await;

    let report = run_clustering(&store, TENANT, INDEX, &ClusteringConfig::default()).await?;
    assert_eq!(report.relationships.transferred.len(), 2);

    let relationships = store.relationships(KgStage::Normalized).await;
    assert_eq!(relationships.len(), 1);
    assert_eq!(relationships[0].id_name, "ORG::Acme Corp__LOCATED_IN__Boston");
    assert_eq!(relationships[0].occurrences, Some(3));
    Ok(())
}

#[tokio::test]
async fn relationship_types_are_carried_over_untranslated() -> Result<()> {
    let store = InMemoryKgStore::new();
    store
        .insert_staged_relationship_type(staged_relationship_type(
            "PERSON__WORKS_AT__ORG",
            "PERSON",
            "WORKS_AT",
            "ORG",
            Some(2),
        ))
        .await;
    store
        .insert_staged_relationship_type(staged_relationship_type(
            "PERSON__WORKS_AT__ORG__dup",
            "PERSON",
            "WORKS_AT",
            "ORG",
            None,
        ))
        .await;

    let report = run_clustering(&store, TENANT, INDEX, &ClusteringConfig::default()).await?;
    assert_eq!(report.relationship_types.transferred.len(), 2);
    assert!(report.relationship_types.failed.is_empty());

    let types = store.relationship_types(KgStage::Normalized).await;
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].id_name, "PERSON__WORKS_AT__ORG");
    assert_eq!(types[0].relationship_type, "WORKS_AT");
    assert_eq!(types[0].occurrences, Some(3));
    Ok(())
}

// --- Cleanup gate ---

#[tokio::test]
async fn cleanup_is_disabled_by_default() -> Result<()> {
    let store = InMemoryKgStore::new();
    store.add_document("doc-1", Some("Handbook")).await;
    store
        .insert_staged_entity(staged_entity("S1", "Acme Corp", "ORG"))
        .await;
    store
        .insert_staged_relationship(staged_relationship("S1__WROTE__X", Some("doc-1")))
        .await;

    let report = run_clustering(&store, TENANT, INDEX, &ClusteringConfig::default()).await?;

    assert_eq!(report.cleanup, CleanupOutcome::Disabled);
    assert!(report.is_fully_consistent());
    assert_eq!(store.entities(KgStage::Extracted).await.len(), 1);
    assert_eq!(store.relationships(KgStage::Extracted).await.len(), 1);
    assert_eq!(
        store.document_kg_stage("doc-1").await,
        Some(KgStage::Extracted)
    );
    Ok(())
}

#[tokio::test]
async fn cleanup_is_skipped_when_batch_is_inconsistent() -> Result<()> {
    let store = InMemoryKgStore::new();
    store
        .insert_staged_entity(staged_entity("S1", "Acme Corp", "ORG"))
        .await;
    store
        .insert_staged_relationship(staged_relationship("S1__WROTE__X", None))
        .await;
    store
        .insert_staged_relationship(staged_relationship("broken", None))
        .await;

    let report = run_clustering(&store, TENANT, INDEX, &cleanup_config()).await?;

    assert!(!report.is_fully_consistent());
    assert_eq!(
        report.cleanup,
        CleanupOutcome::SkippedInconsistent {
            failed_entities: 0,
            failed_relationship_types: 0,
            failed_relationships: 1,
        }
    );
    assert_eq!(store.entities(KgStage::Extracted).await.len(), 1);
    assert_eq!(store.relationships(KgStage::Extracted).await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn cleanup_removes_staged_records_of_consistent_batch() -> Result<()> {
    let store = InMemoryKgStore::new();
    store.add_document("doc-1", Some("Handbook")).await;
    store.add_document("doc-2", Some("Roadmap")).await;
    store
        .insert_staged_entity(staged_entity("S1", "Acme Corp", "ORG"))
        .await;
    store
        .insert_staged_entity(staged_entity("S2", "Jane Doe", "PERSON"))
        .await;
    store
        .insert_staged_relationship(staged_relationship("S2__WORKS_AT__S1", Some("doc-1")))
        .await;
    store
        .insert_staged_relationship_type(staged_relationship_type(
            "PERSON__WORKS_AT__ORG",
            "PERSON",
            "WORKS_AT",
            "ORG",
            None,
        ))
        .await;

    let report = run_clustering(&store, TENANT, INDEX, &cleanup_config()).await?;

    match &report.cleanup {
        CleanupOutcome::Performed(stats) => {
            assert_eq!(stats.deleted_relationships, 1);
            assert_eq!(stats.deleted_relationship_types, 1);
            assert_eq!(stats.deleted_entities, 2);
            assert_eq!(stats.documents_normalized, 1);
            assert_eq!(stats.errors, 0);
        }
        other => panic!("expected cleanup to run, got {:?}", other),
    }

    assert!(store.entities(KgStage::Extracted).await.is_empty());
    assert!(store.relationships(KgStage::Extracted).await.is_empty());
    assert!(store.relationship_types(KgStage::Extracted).await.is_empty());
    assert_eq!(store.entities(KgStage::Normalized).await.len(), 2);
    assert_eq!(
        store.relationships(KgStage::Normalized).await[0].id_name,
        "PERSON::Jane Doe__WORKS_AT__ORG::Acme Corp"
    );
    assert_eq!(
        store.document_kg_stage("doc-1").await,
        Some(KgStage::Normalized)
    );
    assert_eq!(
        store.document_kg_stage("doc-2").await,
        Some(KgStage::Extracted)
    );
    Ok(())
}

#[tokio::test]
async fn ungrounded_entities_stay_staged() -> Result<()> {
    let store = InMemoryKgStore::new();
    let mut ungrounded = staged_entity("U1", "Someone", "PERSON");
    ungrounded.grounding = GroundingType::Ungrounded;
    store.insert_staged_entity(ungrounded).await;

    let report = run_clustering(&store, TENANT, INDEX, &cleanup_config()).await?;

    assert!(report.entities.transferred.is_empty());
    assert!(store.entities(KgStage::Normalized).await.is_empty());
    assert_eq!(store.entities(KgStage::Extracted).await.len(), 1);
    Ok(())
}

// --- Entry points ---

#[tokio::test]
async fn invalid_config_aborts_run() {
    let store = InMemoryKgStore::new();
    let config = ClusteringConfig {
        clustering_threshold: 1.5,
        ..ClusteringConfig::default()
    };
    assert!(run_clustering(&store, TENANT, INDEX, &config).await.is_err());
}

#[tokio::test]
async fn kg_clustering_resolves_tenant_store_through_factory() -> Result<()> {
    let stores = InMemoryKgStores::new();
    stores
        .for_tenant("tenant_a")?
        .insert_staged_entity(staged_entity("S1", "Acme Corp", "ORG"))
        .await;

    kg_clustering(&stores, "tenant_a", INDEX, &ClusteringConfig::default()).await?;

    let tenant_a = stores.for_tenant("tenant_a")?;
    assert!(
        tenant_a
            .entity(KgStage::Normalized, "ORG::Acme Corp")
            .await
            .is_some()
    );
    let tenant_b = stores.for_tenant("tenant_b")?;
    assert!(tenant_b.entities(KgStage::Normalized).await.is_empty());
    Ok(())
}
