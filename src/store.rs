use crate::config::{self, StoreSettings};
use crate::loader::Operation;
use crate::models::{Row, Value};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use neo4rs::{query, BoltNull, BoltType, ConfigBuilder, Graph, Query};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::{debug, info};

/// The operations the pipeline needs from a graph database.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Executes a statement that returns nothing of interest (schema DDL).
    async fn run(&self, statement: &str) -> Result<()>;

    /// Applies one chunk of `operation` as a single write transaction.
    async fn write(&self, operation: &Operation, rows: &[Row]) -> Result<()>;

    /// Runs a read query and deserializes every returned record.
    async fn read<T>(&self, cypher: &str, params: Row) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static;
}

/// Neo4j over Bolt.
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    /// Opens a connection pool and checks it with a trivial query, retrying while the server comes up.
    pub async fn connect(settings: &StoreSettings) -> Result<Self> {
        let graph = connect_with_retry(settings).await?;
        Ok(Self { graph })
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn run(&self, statement: &str) -> Result<()> {
        self.graph
            .run(query(statement))
            .await
            .with_context(|| format!("Failed to execute: {statement}"))?;
        Ok(())
    }

    async fn write(&self, operation: &Operation, rows: &[Row]) -> Result<()> {
        let cypher = operation.cypher();
        let batch: Vec<HashMap<String, BoltType>> = rows.iter().map(row_to_bolt).collect();

        let mut txn = self
            .graph
            .start_txn()
            .await
            .context("Failed to start transaction")?;

        match txn.run(query(&cypher).param("batch", batch)).await {
            Ok(_) => {
                txn.commit().await.context("Failed to commit transaction")?;
                debug!(operation = %operation.describe(), rows = rows.len(), "Chunk committed");
                Ok(())
            }
            Err(e) => {
                txn.rollback()
                    .await
                    .context("Failed to rollback transaction")?;
                Err(e).with_context(|| format!("Failed to write {}", operation.describe()))
            }
        }
    }

    async fn read<T>(&self, cypher: &str, params: Row) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let mut result = self
            .graph
            .execute(with_params(query(cypher), &params))
            .await
            .with_context(|| format!("Failed to execute query: {cypher}"))?;

        let mut records = Vec::new();
        while let Some(row) = result.next().await? {
            let record: T = row
                .to()
                .with_context(|| format!("Unexpected record shape from: {cypher}"))?;
            records.push(record);
        }
        Ok(records)
    }
}

fn with_params(mut q: Query, params: &Row) -> Query {
    for (key, value) in params {
        q = q.param(key, to_bolt(value));
    }
    q
}

fn row_to_bolt(row: &Row) -> HashMap<String, BoltType> {
    row.iter().map(|(k, v)| (k.clone(), to_bolt(v))).collect()
}

/// Timestamps carry no zone in the extracts and are sent as UTC.
fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => (*b).into(),
        Value::Int(i) => (*i).into(),
        Value::Float(f) => (*f).into(),
        Value::Str(s) => s.as_str().into(),
        Value::Date(d) => (*d).into(),
        Value::DateTime(dt) => dt.and_utc().fixed_offset().into(),
    }
}

async fn connect_with_retry(settings: &StoreSettings) -> Result<Graph> {
    let max_retries = config::IMPORT_MAX_RETRIES;
    let delay = tokio::time::Duration::from_secs(config::IMPORT_RETRY_DELAY_SECS);

    let neo4j_config = ConfigBuilder::default()
        .uri(&settings.uri)
        .user(&settings.user)
        .password(&settings.password)
        .db(settings.database.as_str())
        .max_connections(settings.max_connections)
        .build()
        .context("Invalid Neo4j connection settings")?;

    let graph = Graph::connect(neo4j_config)
        .with_context(|| format!("Cannot create Neo4j client for {}", settings.uri))?;

    for attempt in 1..=max_retries {
        match graph.run(query("RETURN 1")).await {
            Ok(_) => {
                info!(uri = %settings.uri, database = %settings.database, "Connected to Neo4j");
                return Ok(graph);
            }
            Err(e) if attempt < max_retries => {
                info!(attempt, "Connection test failed, retrying: {e}");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(e).context(format!(
                    "Cannot connect to Neo4j at {} after {max_retries} attempts",
                    settings.uri
                ));
            }
        }
    }

    bail!(
        "Cannot connect to Neo4j at {} after {max_retries} attempts",
        settings.uri
    );
}
