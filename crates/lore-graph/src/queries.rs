//! Read operations for the knowledge graph.

use chrono::{DateTime, Utc};
use neo4rs::{query, BoltNull, BoltType, Row};
use uuid::Uuid;

use lore_core::{
    BloomLevel, CanonicalConcept, CanonicalRelationship, ConceptSnapshot, Dependency,
    DocumentStatus, RelKey, RelKind, RelSnapshot, SourceDocument,
};

use crate::client::{GraphClient, GraphError};
use crate::mutations::key_row;
use crate::statements;
use crate::store::RankedSnapshot;

impl GraphClient {
    // ── Documents ────────────────────────────────────────────────

    /// The live (non-deleted) document registered under a filename.
    pub async fn find_active_document(
        &self,
        filename: &str,
    ) -> Result<Option<SourceDocument>, GraphError> {
        let q = query(&statements::find_active_document()).param("filename", filename.to_string());
        self.query_one(q).await?.map(|row| row_document(&row)).transpose()
    }

    pub async fn get_document(&self, doc_id: &str) -> Result<Option<SourceDocument>, GraphError> {
        let q = query(&statements::get_document()).param("doc_id", doc_id.to_string());
        self.query_one(q).await?.map(|row| row_document(&row)).transpose()
    }

    pub async fn documents_with_status(
        &self,
        status: DocumentStatus,
    ) -> Result<Vec<SourceDocument>, GraphError> {
        let q = query(&statements::documents_with_status())
            .param("status", status.as_str().to_string());
        let rows = self.query_rows(q).await?;
        rows.iter().map(row_document).collect()
    }

    // ── Snapshots ────────────────────────────────────────────────

    pub async fn document_concept_ids(&self, doc_id: &str) -> Result<Vec<String>, GraphError> {
        let q = query(statements::DOCUMENT_CONCEPT_IDS).param("doc_id", doc_id.to_string());
        let rows = self.query_rows(q).await?;
        rows.iter().map(|row| get(row, "concept_id")).collect()
    }

    pub async fn document_rel_keys(&self, doc_id: &str) -> Result<Vec<RelKey>, GraphError> {
        let q = query(statements::DOCUMENT_REL_KEYS).param("doc_id", doc_id.to_string());
        let rows = self.query_rows(q).await?;
        rows.iter().map(row_rel_key).collect()
    }

    pub async fn committed_concept_snapshots(
        &self,
        concept_ids: &[String],
        in_flight: Option<&str>,
    ) -> Result<Vec<RankedSnapshot<ConceptSnapshot>>, GraphError> {
        let q = query(statements::COMMITTED_CONCEPT_SNAPSHOTS)
            .param("ids", concept_ids.to_vec())
            .param("in_flight", in_flight_param(in_flight));
        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let snapshot = ConceptSnapshot {
                snapshot_id: parse_uuid(&get::<String>(row, "snapshot_id")?)?,
                doc_id: get(row, "doc_id")?,
                concept_id: get(row, "concept_id")?,
                name: get(row, "name")?,
                description: get(row, "description")?,
                bloom_level: opt_bloom(get(row, "bloom_level")?),
                difficulty: opt_difficulty(get(row, "difficulty")?),
                tags: get::<Option<Vec<String>>>(row, "tags")?.unwrap_or_default(),
                confidence: get(row, "confidence")?,
            };
            results.push(RankedSnapshot {
                snapshot,
                uploaded_at: parse_time(&get::<String>(row, "uploaded_at")?)?,
            });
        }
        Ok(results)
    }

    pub async fn committed_rel_snapshots(
        &self,
        keys: &[RelKey],
        in_flight: Option<&str>,
    ) -> Result<Vec<RankedSnapshot<RelSnapshot>>, GraphError> {
        let key_rows: Vec<BoltType> = keys.iter().map(key_row).collect();
        let q = query(statements::COMMITTED_REL_SNAPSHOTS)
            .param("keys", key_rows)
            .param("in_flight", in_flight_param(in_flight));
        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let snapshot = RelSnapshot {
                snapshot_id: parse_uuid(&get::<String>(row, "snapshot_id")?)?,
                doc_id: get(row, "doc_id")?,
                rel_type: parse_kind(&get::<String>(row, "rel_type")?)?,
                source_id: get(row, "source_id")?,
                target_id: get(row, "target_id")?,
                weight: get(row, "weight")?,
                dependency: opt_dependency(get(row, "dependency")?),
                confidence: get(row, "confidence")?,
            };
            results.push(RankedSnapshot {
                snapshot,
                uploaded_at: parse_time(&get::<String>(row, "uploaded_at")?)?,
            });
        }
        Ok(results)
    }

    // ── Canonical Entities ───────────────────────────────────────

    pub async fn canonical_concepts(
        &self,
        concept_ids: &[String],
    ) -> Result<Vec<CanonicalConcept>, GraphError> {
        let q = query(statements::CANONICAL_CONCEPTS).param("ids", concept_ids.to_vec());
        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            results.push(CanonicalConcept {
                concept_id: get(row, "concept_id")?,
                name: get::<Option<String>>(row, "name")?.unwrap_or_default(),
                description: get(row, "description")?,
                bloom_level: opt_bloom(get(row, "bloom_level")?),
                difficulty: opt_difficulty(get(row, "difficulty")?),
                tags: get::<Option<Vec<String>>>(row, "tags")?.unwrap_or_default(),
                confidence: get::<Option<f64>>(row, "confidence")?.unwrap_or(0.0),
                provenance: get::<Option<Vec<String>>>(row, "provenance")?.unwrap_or_default(),
            });
        }
        Ok(results)
    }

    pub async fn canonical_relationships(
        &self,
        keys: &[RelKey],
    ) -> Result<Vec<CanonicalRelationship>, GraphError> {
        let key_rows: Vec<BoltType> = keys.iter().map(key_row).collect();
        let q = query(statements::CANONICAL_RELATIONSHIPS).param("keys", key_rows);
        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            results.push(CanonicalRelationship {
                source_id: get(row, "source_id")?,
                target_id: get(row, "target_id")?,
                kind: parse_kind(&get::<String>(row, "rel_type")?)?,
                weight: get::<Option<f64>>(row, "weight")?.unwrap_or(1.0),
                dependency: opt_dependency(get(row, "dependency")?),
                confidence: get::<Option<f64>>(row, "confidence")?.unwrap_or(0.0),
                provenance: get::<Option<Vec<String>>>(row, "provenance")?.unwrap_or_default(),
            });
        }
        Ok(results)
    }

    /// Every concept id in canonical state or in any snapshot.
    pub async fn all_concept_ids(&self) -> Result<Vec<String>, GraphError> {
        let rows = self.query_rows(query(statements::ALL_CONCEPT_IDS)).await?;
        rows.iter().map(|row| get(row, "id")).collect()
    }

    /// Every relationship key in canonical state or in any snapshot.
    pub async fn all_rel_keys(&self) -> Result<Vec<RelKey>, GraphError> {
        let kinds: Vec<String> = RelKind::ALL
            .iter()
            .map(|k| k.as_str().to_string())
            .collect();
        let q = query(statements::ALL_REL_KEYS).param("kinds", kinds);
        let rows = self.query_rows(q).await?;
        rows.iter().map(row_rel_key).collect()
    }
}

// ── Row Decoding ─────────────────────────────────────────────────

fn get<T: serde::de::DeserializeOwned>(row: &Row, key: &str) -> Result<T, GraphError> {
    row.get::<T>(key)
        .map_err(|e| GraphError::Serialization(format!("Failed to read column {key}: {e}")))
}

fn in_flight_param(in_flight: Option<&str>) -> BoltType {
    match in_flight {
        Some(doc_id) => doc_id.to_string().into(),
        None => BoltType::Null(BoltNull),
    }
}

fn row_document(row: &Row) -> Result<SourceDocument, GraphError> {
    let status: String = get(row, "status")?;
    Ok(SourceDocument {
        doc_id: get(row, "doc_id")?,
        filename: get(row, "filename")?,
        checksum: get(row, "checksum")?,
        status: status
            .parse()
            .map_err(|e: lore_core::LoreError| GraphError::Serialization(e.to_string()))?,
        uploaded_at: parse_time(&get::<String>(row, "uploaded_at")?)?,
        updated_at: parse_time(&get::<String>(row, "updated_at")?)?,
    })
}

fn row_rel_key(row: &Row) -> Result<RelKey, GraphError> {
    Ok(RelKey {
        source_id: get(row, "source_id")?,
        target_id: get(row, "target_id")?,
        kind: parse_kind(&get::<String>(row, "rel_type")?)?,
    })
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, GraphError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| GraphError::Serialization(format!("Invalid timestamp {raw}: {e}")))
}

fn parse_uuid(raw: &str) -> Result<Uuid, GraphError> {
    Uuid::parse_str(raw)
        .map_err(|e| GraphError::Serialization(format!("Invalid snapshot id {raw}: {e}")))
}

fn parse_kind(raw: &str) -> Result<RelKind, GraphError> {
    RelKind::parse(raw)
        .ok_or_else(|| GraphError::Serialization(format!("Unknown relationship type {raw}")))
}

fn opt_bloom(raw: Option<String>) -> Option<BloomLevel> {
    raw.as_deref().and_then(BloomLevel::parse)
}

fn opt_dependency(raw: Option<String>) -> Option<Dependency> {
    raw.as_deref().and_then(Dependency::parse)
}

fn opt_difficulty(raw: Option<i64>) -> Option<u8> {
    raw.and_then(|d| u8::try_from(d).ok())
}
