//! Cypher statements used by the Neo4j store.
//!
//! Relationship types cannot be parameterized in Cypher, so each
//! [`RelKind`] owns a fixed set of statements generated at compile time.
//! Nothing here is assembled from runtime strings.

use lore_core::RelKind;

/// Constraints and indexes the merge statements rely on.
pub const SCHEMA: [&str; 7] = [
    "CREATE CONSTRAINT concept_id IF NOT EXISTS
     FOR (c:Concept) REQUIRE c.id IS UNIQUE",
    "CREATE CONSTRAINT source_document_id IF NOT EXISTS
     FOR (d:SourceDocument) REQUIRE d.doc_id IS UNIQUE",
    "CREATE CONSTRAINT concept_snapshot_id IF NOT EXISTS
     FOR (s:ConceptSnapshot) REQUIRE s.snapshot_id IS UNIQUE",
    "CREATE CONSTRAINT rel_snapshot_id IF NOT EXISTS
     FOR (s:RelSnapshot) REQUIRE s.snapshot_id IS UNIQUE",
    "CREATE INDEX source_document_filename IF NOT EXISTS
     FOR (d:SourceDocument) ON (d.filename)",
    "CREATE INDEX concept_snapshot_concept IF NOT EXISTS
     FOR (s:ConceptSnapshot) ON (s.concept_id)",
    "CREATE INDEX rel_snapshot_doc IF NOT EXISTS
     FOR (s:RelSnapshot) ON (s.doc_id)",
];

// ── Documents ─────────────────────────────────────────────────────

const DOCUMENT_FIELDS: &str = "d.doc_id AS doc_id, d.filename AS filename,
       d.checksum AS checksum, d.status AS status,
       d.uploaded_at AS uploaded_at, d.updated_at AS updated_at";

pub fn find_active_document() -> String {
    format!(
        "MATCH (d:SourceDocument {{filename: $filename}})
         WHERE d.status <> 'DELETED'
         RETURN {DOCUMENT_FIELDS}
         ORDER BY d.uploaded_at DESC
         LIMIT 1"
    )
}

pub fn get_document() -> String {
    format!(
        "MATCH (d:SourceDocument {{doc_id: $doc_id}})
         RETURN {DOCUMENT_FIELDS}"
    )
}

pub fn documents_with_status() -> String {
    format!(
        "MATCH (d:SourceDocument {{status: $status}})
         RETURN {DOCUMENT_FIELDS}
         ORDER BY d.updated_at ASC"
    )
}

pub const SAVE_DOCUMENT: &str = "MERGE (d:SourceDocument {doc_id: $doc_id})
     SET d.filename = $filename, d.checksum = $checksum, d.status = $status,
         d.uploaded_at = $uploaded_at, d.updated_at = $updated_at";

// ── Snapshots ─────────────────────────────────────────────────────

/// Concept snapshots link to their document and to a canonical
/// placeholder, created bare on first reference.
pub const INSERT_CONCEPT_SNAPSHOTS: &str = "UNWIND $rows AS row
     MATCH (d:SourceDocument {doc_id: row.doc_id})
     MERGE (s:ConceptSnapshot {snapshot_id: row.snapshot_id})
     ON CREATE SET
       s.doc_id = row.doc_id, s.concept_id = row.concept_id,
       s.name = row.name, s.description = row.description,
       s.bloom_level = row.bloom_level, s.difficulty = row.difficulty,
       s.tags = row.tags, s.confidence = row.confidence
     MERGE (s)-[:EXTRACTED_FROM]->(d)
     MERGE (c:Concept {id: row.concept_id})
     ON CREATE SET
       c.name = row.name, c.tags = [], c.confidence = 0.0, c.provenance = []
     MERGE (s)-[:SNAPSHOT_OF]->(c)
     RETURN count(s) AS cnt";

pub const INSERT_REL_SNAPSHOTS: &str = "UNWIND $rows AS row
     MATCH (d:SourceDocument {doc_id: row.doc_id})
     MERGE (s:RelSnapshot {snapshot_id: row.snapshot_id})
     ON CREATE SET
       s.doc_id = row.doc_id, s.rel_type = row.rel_type,
       s.source_id = row.source_id, s.target_id = row.target_id,
       s.weight = row.weight, s.dependency = row.dependency,
       s.confidence = row.confidence
     MERGE (s)-[:EXTRACTED_FROM]->(d)
     RETURN count(s) AS cnt";

pub const DOCUMENT_CONCEPT_IDS: &str = "MATCH (s:ConceptSnapshot {doc_id: $doc_id})
     RETURN DISTINCT s.concept_id AS concept_id";

pub const DOCUMENT_REL_KEYS: &str = "MATCH (s:RelSnapshot {doc_id: $doc_id})
     RETURN DISTINCT s.source_id AS source_id, s.target_id AS target_id,
            s.rel_type AS rel_type";

pub const DELETE_DOCUMENT_SNAPSHOTS: &str = "MATCH (s)
     WHERE (s:ConceptSnapshot OR s:RelSnapshot) AND s.doc_id = $doc_id
     DETACH DELETE s
     RETURN count(s) AS cnt";

pub const COMMITTED_CONCEPT_SNAPSHOTS: &str = "UNWIND $ids AS id
     MATCH (s:ConceptSnapshot {concept_id: id})-[:EXTRACTED_FROM]->(d:SourceDocument)
     WHERE d.status = 'COMMITTED' OR d.doc_id = $in_flight
     RETURN s.snapshot_id AS snapshot_id, s.doc_id AS doc_id,
            s.concept_id AS concept_id, s.name AS name,
            s.description AS description, s.bloom_level AS bloom_level,
            s.difficulty AS difficulty, s.tags AS tags,
            s.confidence AS confidence, d.uploaded_at AS uploaded_at";

pub const COMMITTED_REL_SNAPSHOTS: &str = "UNWIND $keys AS k
     MATCH (s:RelSnapshot {source_id: k.source_id, target_id: k.target_id,
                           rel_type: k.rel_type})-[:EXTRACTED_FROM]->(d:SourceDocument)
     WHERE d.status = 'COMMITTED' OR d.doc_id = $in_flight
     RETURN s.snapshot_id AS snapshot_id, s.doc_id AS doc_id,
            s.rel_type AS rel_type, s.source_id AS source_id,
            s.target_id AS target_id, s.weight AS weight,
            s.dependency AS dependency, s.confidence AS confidence,
            d.uploaded_at AS uploaded_at";

// ── Canonical Concepts ────────────────────────────────────────────

pub const MERGE_CONCEPTS: &str = "UNWIND $rows AS row
     MERGE (c:Concept {id: row.concept_id})
     ON CREATE SET
       c.name = row.name, c.description = row.description,
       c.bloom_level = row.bloom_level, c.difficulty = row.difficulty,
       c.tags = row.tags, c.confidence = row.confidence,
       c.provenance = [$doc_id], c.updated_at = $now
     ON MATCH SET
       c.name = row.name,
       c.description = coalesce(row.description, c.description),
       c.bloom_level = coalesce(row.bloom_level, c.bloom_level),
       c.difficulty = coalesce(row.difficulty, c.difficulty),
       c.tags = row.tags, c.confidence = row.confidence,
       c.provenance = CASE
         WHEN $doc_id IN coalesce(c.provenance, []) THEN c.provenance
         ELSE coalesce(c.provenance, []) + $doc_id
       END,
       c.updated_at = $now
     RETURN count(c) AS cnt";

pub const REPLACE_CONCEPTS: &str = "UNWIND $rows AS row
     MERGE (c:Concept {id: row.concept_id})
     SET c.name = row.name, c.description = row.description,
         c.bloom_level = row.bloom_level, c.difficulty = row.difficulty,
         c.tags = row.tags, c.confidence = row.confidence,
         c.provenance = row.provenance, c.updated_at = $now
     RETURN count(c) AS cnt";

pub const DELETE_CONCEPTS: &str = "UNWIND $ids AS id
     MATCH (c:Concept {id: id})
     DETACH DELETE c
     RETURN count(c) AS cnt";

pub const CANONICAL_CONCEPTS: &str = "UNWIND $ids AS id
     MATCH (c:Concept {id: id})
     RETURN c.id AS concept_id, c.name AS name, c.description AS description,
            c.bloom_level AS bloom_level, c.difficulty AS difficulty,
            c.tags AS tags, c.confidence AS confidence,
            c.provenance AS provenance";

/// Counts the removed concepts plus the relationships detached with them.
pub const STRIP_CONCEPTS_SOLE_OWNER: &str = "MATCH (c:Concept)
     WHERE c.provenance = [$doc_id]
     OPTIONAL MATCH (c)-[r]-(:Concept)
     WITH collect(DISTINCT c) AS doomed, count(DISTINCT r) AS detached
     FOREACH (n IN doomed | DETACH DELETE n)
     RETURN size(doomed) + detached AS cnt";

pub const STRIP_CONCEPTS_SHARED: &str = "MATCH (c:Concept)
     WHERE $doc_id IN c.provenance
     SET c.provenance = [p IN c.provenance WHERE p <> $doc_id]
     RETURN count(c) AS cnt";

pub const ALL_CONCEPT_IDS: &str = "MATCH (c:Concept) RETURN c.id AS id
     UNION
     MATCH (s:ConceptSnapshot) RETURN s.concept_id AS id";

// ── Canonical Relationships ───────────────────────────────────────

pub const CANONICAL_RELATIONSHIPS: &str = "UNWIND $keys AS k
     MATCH (a:Concept {id: k.source_id})-[r]->(b:Concept {id: k.target_id})
     WHERE type(r) = k.rel_type
     RETURN a.id AS source_id, b.id AS target_id, type(r) AS rel_type,
            r.weight AS weight, r.dependency AS dependency,
            r.confidence AS confidence, r.provenance AS provenance";

pub const STRIP_RELATIONSHIPS_SOLE_OWNER: &str = "MATCH (:Concept)-[r]->(:Concept)
     WHERE r.provenance = [$doc_id]
     DELETE r
     RETURN count(r) AS cnt";

pub const STRIP_RELATIONSHIPS_SHARED: &str = "MATCH (:Concept)-[r]->(:Concept)
     WHERE $doc_id IN r.provenance
     SET r.provenance = [p IN r.provenance WHERE p <> $doc_id]
     RETURN count(r) AS cnt";

pub const ALL_REL_KEYS: &str = "MATCH (a:Concept)-[r]->(b:Concept)
     WHERE type(r) IN $kinds
     RETURN a.id AS source_id, b.id AS target_id, type(r) AS rel_type
     UNION
     MATCH (s:RelSnapshot)
     RETURN s.source_id AS source_id, s.target_id AS target_id,
            s.rel_type AS rel_type";

/// The grouped statements for one relationship kind.
#[derive(Debug)]
pub struct RelStatements {
    pub merge: &'static str,
    pub replace: &'static str,
    pub delete: &'static str,
}

macro_rules! rel_statements {
    ($rel_type:literal) => {
        RelStatements {
            merge: concat!(
                "UNWIND $rows AS row
     MATCH (a:Concept {id: row.source_id})
     MATCH (b:Concept {id: row.target_id})
     MERGE (a)-[r:",
                $rel_type,
                "]->(b)
     ON CREATE SET
       r.weight = row.weight, r.dependency = row.dependency,
       r.confidence = row.confidence, r.provenance = [$doc_id],
       r.updated_at = $now
     ON MATCH SET
       r.weight = row.weight,
       r.dependency = coalesce(row.dependency, r.dependency),
       r.confidence = row.confidence,
       r.provenance = CASE
         WHEN $doc_id IN coalesce(r.provenance, []) THEN r.provenance
         ELSE coalesce(r.provenance, []) + $doc_id
       END,
       r.updated_at = $now
     RETURN count(r) AS cnt"
            ),
            replace: concat!(
                "UNWIND $rows AS row
     MATCH (a:Concept {id: row.source_id})
     MATCH (b:Concept {id: row.target_id})
     MERGE (a)-[r:",
                $rel_type,
                "]->(b)
     SET r.weight = row.weight, r.dependency = row.dependency,
         r.confidence = row.confidence, r.provenance = row.provenance,
         r.updated_at = $now
     RETURN count(r) AS cnt"
            ),
            delete: concat!(
                "UNWIND $rows AS row
     MATCH (:Concept {id: row.source_id})-[r:",
                $rel_type,
                "]->(:Concept {id: row.target_id})
     DELETE r
     RETURN count(r) AS cnt"
            ),
        }
    };
}

static REQUIRES: RelStatements = rel_statements!("REQUIRES");
static BUILDS_ON: RelStatements = rel_statements!("BUILDS_ON");
static PART_OF: RelStatements = rel_statements!("PART_OF");
static RELATED_TO: RelStatements = rel_statements!("RELATED_TO");
static EXAMPLE_OF: RelStatements = rel_statements!("EXAMPLE_OF");
static CONTRASTS_WITH: RelStatements = rel_statements!("CONTRASTS_WITH");
static APPLIES_TO: RelStatements = rel_statements!("APPLIES_TO");

/// Look up the fixed statements for a relationship kind.
pub fn for_kind(kind: RelKind) -> &'static RelStatements {
    match kind {
        RelKind::Requires => &REQUIRES,
        RelKind::BuildsOn => &BUILDS_ON,
        RelKind::PartOf => &PART_OF,
        RelKind::RelatedTo => &RELATED_TO,
        RelKind::ExampleOf => &EXAMPLE_OF,
        RelKind::ContrastsWith => &CONTRASTS_WITH,
        RelKind::AppliesTo => &APPLIES_TO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_maps_to_its_own_type() {
        for kind in RelKind::ALL {
            let statements = for_kind(kind);
            let pattern = format!("[r:{}]", kind.as_str());
            assert!(statements.merge.contains(&pattern), "{kind}");
            assert!(statements.replace.contains(&pattern), "{kind}");
            assert!(statements.delete.contains(&pattern), "{kind}");
        }
    }

    #[test]
    fn test_merge_appends_provenance_conditionally() {
        assert!(MERGE_CONCEPTS.contains("WHEN $doc_id IN"));
        assert!(for_kind(RelKind::Requires).merge.contains("WHEN $doc_id IN"));
    }
}
