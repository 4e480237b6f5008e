// src/storage/postgres.rs

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use bb8::PooledConnection;
use bb8_postgres::PostgresConnectionManager;
use log::{debug, info};
use serde_json::Value;
use tokio_postgres::{NoTls, Row as PgRow, Transaction};

use crate::db::PgPool;
use crate::models::{
    Attributes, CanonicalEntity, EntityUpsert, GroundingType, KgStage, RelationshipId,
    StagedEntity, StagedRelationship, StagedRelationshipType, UpsertTarget,
};
use crate::storage::{KgStore, KgStoreFactory, SimilarEntityQuery};

type PgConnection<'a> = PooledConnection<'a, PostgresConnectionManager<NoTls>>;

fn entity_table(stage: KgStage) -> &'static str {
    match stage {
        KgStage::Extracted => "kg_entity_extraction_staging",
        KgStage::Normalized => "kg_entity",
    }
}

fn relationship_table(stage: KgStage) -> &'static str {
    match stage {
        KgStage::Extracted => "kg_relationship_extraction_staging",
        KgStage::Normalized => "kg_relationship",
    }
}

fn relationship_type_table(stage: KgStage) -> &'static str {
    match stage {
        KgStage::Extracted => "kg_relationship_type_extraction_staging",
        KgStage::Normalized => "kg_relationship_type",
    }
}

/// Double-quotes a tenant schema name for use in `search_path`.
fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn attributes_from_json(value: Option<Value>) -> Attributes {
    match value {
        Some(Value::Object(map)) => map,
        _ => Attributes::new(),
    }
}

const ENTITY_COLUMNS: &str = "id_name, name, entity_type_id_name, document_id, occurrences, \
     attributes, alternative_names, clustering_name";

fn canonical_entity_from_row(row: &PgRow) -> CanonicalEntity {
    CanonicalEntity {
        id_name: row.get("id_name"),
        name: row.get("name"),
        entity_type_id_name: row.get("entity_type_id_name"),
        document_id: row.get("document_id"),
        occurrences: row.get("occurrences"),
        attributes: attributes_from_json(row.get("attributes")),
        alternative_names: row
            .get::<_, Option<Vec<String>>>("alternative_names")
            .unwrap_or_default(),
        clustering_name: row.get("clustering_name"),
    }
}

/// Creates the staging and normalized knowledge graph tables of a tenant schema.
pub async fn ensure_kg_tables_exist(pool: &PgPool, tenant_id: &str) -> Result<()> {
    let client = pool.get().await.context("Failed to get DB connection")?;
    let schema = quote_identifier(tenant_id);

    let mut statements = vec![
        "CREATE EXTENSION IF NOT EXISTS pg_trgm".to_string(),
        format!("CREATE SCHEMA IF NOT EXISTS {}", schema),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.document (
                id TEXT PRIMARY KEY,
                semantic_id TEXT,
                kg_stage TEXT
            )",
            schema
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.kg_entity_type (
                id_name TEXT PRIMARY KEY,
                grounding TEXT NOT NULL
            )",
            schema
        ),
    ];
    for stage in [KgStage::Extracted, KgStage::Normalized] {
        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (
                id_name TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                entity_type_id_name TEXT NOT NULL,
                document_id TEXT,
                occurrences INTEGER,
                attributes JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                alternative_names TEXT[] NOT NULL DEFAULT '{{}}',
                clustering_name TEXT NOT NULL DEFAULT ''
            )",
            schema,
            entity_table(stage)
        ));
        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (
                id_name TEXT PRIMARY KEY,
                source_entity_type_id_name TEXT NOT NULL,
                type TEXT NOT NULL,
                target_entity_type_id_name TEXT NOT NULL,
                occurrences INTEGER
            )",
            schema,
            relationship_type_table(stage)
        ));
        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (
                id_name TEXT PRIMARY KEY,
                source_node TEXT NOT NULL,
                type TEXT NOT NULL,
                target_node TEXT NOT NULL,
                source_document TEXT,
                occurrences INTEGER
            )",
            schema,
            relationship_table(stage)
        ));
    }
    statements.push(format!(
        "CREATE INDEX IF NOT EXISTS idx_kg_entity_clustering_name_trgm
         ON {}.kg_entity USING GIN (clustering_name gin_trgm_ops)",
        schema
    ));

    for sql in &statements {
        client
            .batch_execute(sql)
            .await
            .context(format!("Failed to bootstrap kg tables with SQL: {}", sql))?;
    }
    info!("Knowledge graph tables ready for tenant {}", tenant_id);
    Ok(())
}

/// Knowledge graph tables of one tenant schema.
///
/// Every operation takes a pooled connection, opens a transaction scoped to
/// the tenant's `search_path`, and commits before returning. A transaction
/// dropped on an error path is rolled back.
#[derive(Clone)]
pub struct PgKgStore {
    pool: PgPool,
    tenant_id: String,
}

impl PgKgStore {
    pub fn new(pool: PgPool, tenant_id: impl Into<String>) -> Self {
        Self {
            pool,
            tenant_id: tenant_id.into(),
        }
    }

    async fn connection(&self) -> Result<PgConnection<'_>> {
        self.pool
            .get()
            .await
            .context("Failed to get DB connection from pool")
    }

    async fn begin<'c>(&self, conn: &'c mut PgConnection<'_>) -> Result<Transaction<'c>> {
        let tx = conn
            .transaction()
            .await
            .context("Failed to start transaction")?;
        tx.execute(
            "SELECT set_config('search_path', $1, true)",
            &[&format!("{}, public", quote_identifier(&self.tenant_id))],
        )
        .await
        .with_context(|| format!("Failed to scope transaction to tenant {}", self.tenant_id))?;
        Ok(tx)
    }
}

#[async_trait]
impl KgStore for PgKgStore {
    async fn get_all_relationship_types(
        &self,
        stage: KgStage,
    ) -> Result<Vec<StagedRelationshipType>> {
        let mut conn = self.connection().await?;
        let tx = self.begin(&mut conn).await?;
        let sql = format!(
            "SELECT id_name, source_entity_type_id_name, type, target_entity_type_id_name, occurrences
             FROM {} ORDER BY id_name",
            relationship_type_table(stage)
        );
        let rows = tx
            .query(sql.as_str(), &[])
            .await
            .context("Failed to query relationship types")?;
        tx.commit().await.context("Failed to commit transaction")?;

        Ok(rows
            .iter()
            .map(|row| StagedRelationshipType {
                id_name: row.get("id_name"),
                source_entity_type_id_name: row.get("source_entity_type_id_name"),
                relationship_type: row.get("type"),
                target_entity_type_id_name: row.get("target_entity_type_id_name"),
                occurrences: row.get("occurrences"),
            })
            .collect())
    }

    async fn get_all_relationships(&self, stage: KgStage) -> Result<Vec<StagedRelationship>> {
        let mut conn = self.connection().await?;
        let tx = self.begin(&mut conn).await?;
        let sql = format!(
            "SELECT id_name, source_document, occurrences FROM {} ORDER BY id_name",
            relationship_table(stage)
        );
        let rows = tx
            .query(sql.as_str(), &[])
            .await
            .context("Failed to query relationships")?;
        tx.commit().await.context("Failed to commit transaction")?;

        Ok(rows
            .iter()
            .map(|row| StagedRelationship {
                id_name: row.get("id_name"),
                source_document: row.get("source_document"),
                occurrences: row.get("occurrences"),
            })
            .collect())
    }

    async fn get_entities_by_grounding(
        &self,
        stage: KgStage,
        grounding: GroundingType,
    ) -> Result<Vec<StagedEntity>> {
        let mut conn = self.connection().await?;
        let tx = self.begin(&mut conn).await?;
        let sql = format!(
            "SELECT e.id_name, e.name, e.entity_type_id_name, e.document_id, e.occurrences,
                    e.attributes, e.alternative_names
             FROM {} e
             JOIN kg_entity_type t ON t.id_name = e.entity_type_id_name
             WHERE t.grounding = $1
             ORDER BY e.id_name",
            entity_table(stage)
        );
        let rows = tx
            .query(sql.as_str(), &[&grounding.as_str()])
            .await
            .context("Failed to query entities by grounding")?;
        tx.commit().await.context("Failed to commit transaction")?;

        Ok(rows
            .iter()
            .map(|row| StagedEntity {
                id_name: row.get("id_name"),
                name: row.get("name"),
                entity_type_id_name: row.get("entity_type_id_name"),
                document_id: row.get("document_id"),
                occurrences: row.get("occurrences"),
                attributes: attributes_from_json(row.get("attributes")),
                alternative_names: row
                    .get::<_, Option<Vec<String>>>("alternative_names")
                    .unwrap_or_default(),
                grounding,
            })
            .collect())
    }

    async fn get_document_semantic_id(&self, document_id: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let tx = self.begin(&mut conn).await?;
        let row = tx
            .query_opt("SELECT semantic_id FROM document WHERE id = $1", &[&document_id])
            .await
            .with_context(|| format!("Failed to query semantic id of document {}", document_id))?;
        tx.commit().await.context("Failed to commit transaction")?;
        Ok(row.and_then(|row| row.get::<_, Option<String>>("semantic_id")))
    }

    async fn find_similar_entities(
        &self,
        query: &SimilarEntityQuery<'_>,
    ) -> Result<Vec<CanonicalEntity>> {
        let mut conn = self.connection().await?;
        let tx = self.begin(&mut conn).await?;

        // Transaction-local, so concurrent runs with other thresholds are unaffected
        tx.execute(
            "SELECT set_config('pg_trgm.similarity_threshold', $1, true)",
            &[&query.threshold.to_string()],
        )
        .await
        .context("Failed to set trigram similarity threshold")?;

        let document_filter = if query.only_without_document {
            "AND document_id IS NULL"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {} FROM {}
             WHERE entity_type_id_name = $1 AND clustering_name % $2 {}
             ORDER BY id_name",
            ENTITY_COLUMNS,
            entity_table(KgStage::Normalized),
            document_filter
        );
        let rows = tx
            .query(
                sql.as_str(),
                &[&query.entity_type_id_name, &query.clustering_name],
            )
            .await
            .context("Failed to query similar entities")?;
        tx.commit().await.context("Failed to commit transaction")?;

        debug!(
            "Trigram lookup for {:?} ({}) returned {} rows",
            query.clustering_name,
            query.entity_type_id_name,
            rows.len()
        );
        Ok(rows.iter().map(canonical_entity_from_row).collect())
    }

    async fn add_or_update_entity(
        &self,
        stage: KgStage,
        upsert: &EntityUpsert,
    ) -> Result<CanonicalEntity> {
        let mut conn = self.connection().await?;
        let tx = self.begin(&mut conn).await?;
        let table = entity_table(stage);
        let attributes = Value::Object(upsert.attributes.clone());
        let clustering_name =
            "LOWER(COALESCE((SELECT semantic_id FROM document WHERE id = $3), $2))";

        let row = match &upsert.target {
            UpsertTarget::Existing(id_name) => {
                let sql = format!(
                    "UPDATE {table}
                     SET name = $2, document_id = $3, occurrences = $4, attributes = $5,
                         alternative_names = $6, clustering_name = {clustering_name}
                     WHERE id_name = $1
                     RETURNING {columns}",
                    columns = ENTITY_COLUMNS
                );
                tx.query_opt(
                    sql.as_str(),
                    &[
                        id_name,
                        &upsert.name,
                        &upsert.document_id,
                        &upsert.occurrences,
                        &attributes,
                        &upsert.alternative_names,
                    ],
                )
                .await
                .with_context(|| format!("Failed to update entity {}", id_name))?
                .ok_or_else(|| anyhow!("Canonical entity {} no longer exists", id_name))?
            }
            UpsertTarget::New => {
                let id_name = upsert.target_id_name();
                let sql = format!(
                    "INSERT INTO {table} AS existing (
                        id_name, name, document_id, occurrences, attributes,
                        alternative_names, clustering_name, entity_type_id_name
                     )
                     VALUES ($1, $2, $3, $4, $5, $6, {clustering_name}, $7)
                     ON CONFLICT (id_name) DO UPDATE SET
                        occurrences = COALESCE(existing.occurrences, 1) + EXCLUDED.occurrences,
                        attributes = EXCLUDED.attributes || existing.attributes,
                        alternative_names = ARRAY(
                            SELECT DISTINCT unnest(existing.alternative_names || EXCLUDED.alternative_names)
                            ORDER BY 1
                        ),
                        document_id = COALESCE(existing.document_id, EXCLUDED.document_id)
                     RETURNING {columns}",
                    columns = ENTITY_COLUMNS
                );
                tx.query_one(
                    sql.as_str(),
                    &[
                        &id_name,
                        &upsert.name,
                        &upsert.document_id,
                        &upsert.occurrences,
                        &attributes,
                        &upsert.alternative_names,
                        &upsert.entity_type_id_name,
                    ],
                )
                .await
                .with_context(|| format!("Failed to insert entity {}", id_name))?
            }
        };
        tx.commit().await.context("Failed to commit entity upsert")?;
        Ok(canonical_entity_from_row(&row))
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
        let mut conn = self.connection().await?;
        let tx = self.begin(&mut conn).await?;
        let sql = format!(
            "INSERT INTO {} AS existing (
                id_name, source_entity_type_id_name, type, target_entity_type_id_name, occurrences
             )
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id_name) DO UPDATE SET
                occurrences = COALESCE(existing.occurrences, 1) + EXCLUDED.occurrences
             RETURNING id_name",
            relationship_type_table(stage)
        );
        let row = tx
            .query_one(
                sql.as_str(),
                &[
                    &id_name,
                    &source_entity_type,
                    &relationship_type,
                    &target_entity_type,
                    &extraction_count,
                ],
            )
            .await
            .with_context(|| format!("Failed to insert relationship type {}", id_name))?;
        tx.commit()
            .await
            .context("Failed to commit relationship type insert")?;
        Ok(row.get("id_name"))
    }

    async fn add_relationship(
        &self,
        stage: KgStage,
        relationship_id_name: &str,
        source_document_id: &str,
        occurrences: i32,
    ) -> Result<String> {
        let id = RelationshipId::parse(relationship_id_name)?;
        let mut conn = self.connection().await?;
        let tx = self.begin(&mut conn).await?;
        let sql = format!(
            "INSERT INTO {} AS existing (
                id_name, source_node, type, target_node, source_document, occurrences
             )
             VALUES ($1, $2, $3, $4, NULLIF($5, ''), $6)
             ON CONFLICT (id_name) DO UPDATE SET
                occurrences = COALESCE(existing.occurrences, 1) + EXCLUDED.occurrences,
                source_document = COALESCE(existing.source_document, EXCLUDED.source_document)
             RETURNING id_name",
            relationship_table(stage)
        );
        let row = tx
            .query_one(
                sql.as_str(),
                &[
                    &relationship_id_name,
                    &id.source,
                    &id.relationship_type,
                    &id.target,
                    &source_document_id,
                    &occurrences,
                ],
            )
            .await
            .with_context(|| format!("Failed to insert relationship {}", relationship_id_name))?;
        tx.commit()
            .await
            .context("Failed to commit relationship insert")?;
        Ok(row.get("id_name"))
    }

    async fn delete_relationships_by_id_names(
        &self,
        id_names: &[String],
        stage: KgStage,
    ) -> Result<u64> {
        self.delete_by_id_names(relationship_table(stage), id_names)
            .await
    }

    async fn delete_relationship_types_by_id_names(
        &self,
        id_names: &[String],
        stage: KgStage,
    ) -> Result<u64> {
        self.delete_by_id_names(relationship_type_table(stage), id_names)
            .await
    }

    async fn delete_entities_by_id_names(
        &self,
        id_names: &[String],
        stage: KgStage,
    ) -> Result<u64> {
        self.delete_by_id_names(entity_table(stage), id_names).await
    }

    async fn update_document_kg_stage(&self, document_id: &str, stage: KgStage) -> Result<()> {
        let mut conn = self.connection().await?;
        let tx = self.begin(&mut conn).await?;
        let updated = tx
            .execute(
                "UPDATE document SET kg_stage = $1 WHERE id = $2",
                &[&stage.as_str(), &document_id],
            )
            .await
            .with_context(|| format!("Failed to update kg stage of document {}", document_id))?;
        if updated == 0 {
            bail!("Document {} not found", document_id);
        }
        tx.commit()
            .await
            .context("Failed to commit document kg stage update")?;
        Ok(())
    }
}

impl PgKgStore {
    async fn delete_by_id_names(&self, table: &str, id_names: &[String]) -> Result<u64> {
        if id_names.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection().await?;
        let tx = self.begin(&mut conn).await?;
        let sql = format!("DELETE FROM {} WHERE id_name = ANY($1)", table);
        let deleted = tx
            .execute(sql.as_str(), &[&id_names])
            .await
            .with_context(|| format!("Failed to delete from {}", table))?;
        tx.commit().await.context("Failed to commit deletion")?;
        Ok(deleted)
    }
}

/// Hands out [`PgKgStore`]s sharing one connection pool.
#[derive(Clone)]
pub struct PgKgStoreFactory {
    pool: PgPool,
}

impl PgKgStoreFactory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl KgStoreFactory for PgKgStoreFactory {
    type Store = PgKgStore;

    fn for_tenant(&self, tenant_id: &str) -> Result<PgKgStore> {
        if tenant_id.trim().is_empty() {
            bail!("Tenant id must not be empty");
        }
        Ok(PgKgStore::new(self.pool.clone(), tenant_id))
    }
}
