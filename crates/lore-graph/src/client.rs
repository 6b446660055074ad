//! Neo4j connection management and shared graph client.

use neo4rs::{ConfigBuilder, Graph, Query};
use serde::Deserialize;

use crate::statements;

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Graph store unavailable: {0}")]
    Unavailable(String),

    #[error("Document not found: {doc_id}")]
    DocumentNotFound { doc_id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "lore-dev".to_string(),
            max_connections: 16,
            fetch_size: 256,
        }
    }
}

/// Thread-safe Neo4j graph client with connection pooling.
///
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Create the uniqueness constraints the merge statements rely on.
    /// Safe to call on every start.
    pub async fn ensure_schema(&self) -> Result<(), GraphError> {
        for statement in statements::SCHEMA {
            self.run(neo4rs::query(statement)).await?;
        }
        tracing::info!(constraints = statements::SCHEMA.len(), "Graph schema ensured");
        Ok(())
    }

    /// Execute a write-only query (CREATE, MERGE, DELETE, SET).
    pub async fn run(&self, query: Query) -> Result<(), GraphError> {
        self.graph.run(query).await?;
        Ok(())
    }

    /// Execute a query and collect all rows.
    pub async fn query_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a query and return the first row, if any.
    pub async fn query_one(&self, query: Query) -> Result<Option<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        Ok(stream.next().await?)
    }

    /// Execute a query returning a single `cnt` column.
    pub(crate) async fn query_count(&self, query: Query) -> Result<u64, GraphError> {
        match self.query_one(query).await? {
            Some(row) => read_count(&row),
            None => Ok(0),
        }
    }
}

fn read_count(row: &neo4rs::Row) -> Result<u64, GraphError> {
    let count: i64 = row
        .get("cnt")
        .map_err(|e| GraphError::Serialization(format!("Failed to read column cnt: {e}")))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo4rs::{BoltList, BoltType, Row};

    fn row(value: BoltType) -> Row {
        Row::new(
            BoltList::from(vec![BoltType::from("cnt")]),
            BoltList::from(vec![value]),
        )
    }

    #[test]
    fn test_read_count() {
        assert_eq!(read_count(&row(BoltType::from(3_i64))).unwrap(), 3);
    }

    #[test]
    fn test_read_count_rejects_undecodable_column() {
        let err = read_count(&row(BoltType::from("three"))).unwrap_err();
        assert!(matches!(err, GraphError::Serialization(_)));
    }
}
