// src/models.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Free-form entity attributes, stored as a JSON object.
pub type Attributes = Map<String, Value>;

/// Separator of the three segments of a relationship (or relationship type) id.
pub const RELATIONSHIP_ID_DELIMITER: &str = "__";

/// Separator between entity type and name in a canonical entity id.
pub const ENTITY_ID_DELIMITER: &str = "::";

//------------------------------------------------------------------------------
// PIPELINE STAGES
//------------------------------------------------------------------------------

/// How far a record has progressed through the knowledge graph pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KgStage {
    /// Raw output of the extraction stage, possibly containing duplicates.
    Extracted,
    /// Deduplicated and ready to be committed to the graph.
    Normalized,
}

impl KgStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            KgStage::Extracted => "extracted",
            KgStage::Normalized => "normalized",
        }
    }
}

impl fmt::Display for KgStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundingType {
    /// Extracted with a predetermined, trusted context (e.g. backed by a connector document).
    Grounded,
    Ungrounded,
}

impl GroundingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroundingType::Grounded => "grounded",
            GroundingType::Ungrounded => "ungrounded",
        }
    }
}

impl fmt::Display for GroundingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//------------------------------------------------------------------------------
// RECORDS
//------------------------------------------------------------------------------

/// An entity as written by the extraction stage, before deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedEntity {
    /// Unique within the extracted stage
    pub id_name: String,
    pub name: String,
    pub entity_type_id_name: String,
    pub document_id: Option<String>,
    pub occurrences: Option<i32>,
    pub attributes: Attributes,
    pub alternative_names: Vec<String>,
    pub grounding: GroundingType,
}

/// A deduplicated entity at the normalized stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEntity {
    pub id_name: String,
    pub name: String,
    pub entity_type_id_name: String,
    pub document_id: Option<String>,
    pub occurrences: Option<i32>,
    pub attributes: Attributes,
    pub alternative_names: Vec<String>,
    /// Lowercased name (or linked document semantic id); used for matching only, never displayed.
    pub clustering_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedRelationship {
    /// Composite key `source__type__target`
    pub id_name: String,
    pub source_document: Option<String>,
    pub occurrences: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedRelationshipType {
    pub id_name: String,
    pub source_entity_type_id_name: String,
    pub relationship_type: String,
    pub target_entity_type_id_name: String,
    pub occurrences: Option<i32>,
}

/// Where a resolved entity is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertTarget {
    /// Overwrite the canonical entity the staged entity was merged into.
    Existing(String),
    /// Create a canonical entity, folding additively into one with the same id if present.
    New,
}

/// The values the merge resolver decided to persist for one staged entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityUpsert {
    pub target: UpsertTarget,
    pub entity_type_id_name: String,
    pub name: String,
    pub document_id: Option<String>,
    pub occurrences: i32,
    pub attributes: Attributes,
    pub alternative_names: Vec<String>,
}

impl EntityUpsert {
    /// Id of the canonical entity this upsert lands on.
    pub fn target_id_name(&self) -> String {
        match &self.target {
            UpsertTarget::Existing(id_name) => id_name.clone(),
            UpsertTarget::New => canonical_entity_id(&self.entity_type_id_name, &self.name),
        }
    }
}

/// Id given to a newly created canonical entity.
pub fn canonical_entity_id(entity_type_id_name: &str, name: &str) -> String {
    format!("{}{}{}", entity_type_id_name, ENTITY_ID_DELIMITER, name)
}

/// Unset and non-positive occurrence counts count as a single occurrence.
pub fn occurrences_or_default(occurrences: Option<i32>) -> i32 {
    occurrences.filter(|count| *count > 0).unwrap_or(1)
}

//------------------------------------------------------------------------------
// RELATIONSHIP IDS
//------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelationshipIdError {
    #[error("relationship id {id:?} has {segments} segment(s), expected 3")]
    WrongArity { id: String, segments: usize },

    #[error("relationship id {id:?} has an empty segment at position {position}")]
    EmptySegment { id: String, position: usize },
}

/// Decoded form of a `source__type__target` composite key.
///
/// Segments are assumed never to contain the delimiter; decoding enforces
/// exactly three non-empty segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationshipId {
    pub source: String,
    pub relationship_type: String,
    pub target: String,
}

impl RelationshipId {
    pub fn new(
        source: impl Into<String>,
        relationship_type: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            relationship_type: relationship_type.into(),
            target: target.into(),
        }
    }

    pub fn parse(id_name: &str) -> Result<Self, RelationshipIdError> {
        let segments: Vec<&str> = id_name.split(RELATIONSHIP_ID_DELIMITER).collect();
        let [source, relationship_type, target] = segments.as_slice() else {
            return Err(RelationshipIdError::WrongArity {
                id: id_name.to_string(),
                segments: segments.len(),
            });
        };
        if let Some(position) = [source, relationship_type, target]
            .iter()
            .position(|segment| segment.is_empty())
        {
            return Err(RelationshipIdError::EmptySegment {
                id: id_name.to_string(),
                position,
            });
        }
        Ok(Self::new(*source, *relationship_type, *target))
    }

    /// Rewrites both endpoints, leaving the relationship type untouched.
    pub fn map_endpoints<'a, F>(&'a self, mut translate: F) -> Self
    where
        F: FnMut(&'a str) -> &'a str,
    {
        Self {
            source: translate(&self.source).to_string(),
            relationship_type: self.relationship_type.clone(),
            target: translate(&self.target).to_string(),
        }
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{d}{}{d}{}",
            self.source,
            self.relationship_type,
            self.target,
            d = RELATIONSHIP_ID_DELIMITER
        )
    }
}
