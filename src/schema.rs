use crate::config::{INDEX_ONLINE_TIMEOUT_SECS, INDEX_POLL_INTERVAL_SECS};
use crate::models::Row;
use crate::store::GraphStore;
use anyhow::Result;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// NODE KEY constraint per natural key.
pub const CONSTRAINTS: &[&str] = &[
    "CREATE CONSTRAINT customer_id IF NOT EXISTS FOR (c:Customer) REQUIRE c.customerId IS NODE KEY",
    "CREATE CONSTRAINT account_number IF NOT EXISTS FOR (a:Account) REQUIRE a.accountNumber IS NODE KEY",
    "CREATE CONSTRAINT transaction_id IF NOT EXISTS FOR (t:Transaction) REQUIRE t.transactionId IS NODE KEY",
    "CREATE CONSTRAINT country_code IF NOT EXISTS FOR (c:Country) REQUIRE c.code IS NODE KEY",
    "CREATE CONSTRAINT address_hash IF NOT EXISTS FOR (a:Address) REQUIRE a.addressHash IS NODE KEY",
    "CREATE CONSTRAINT ssn_number IF NOT EXISTS FOR (s:SSN) REQUIRE s.ssnNumber IS NODE KEY",
];

/// Secondary indexes for common investigation queries.
pub const INDEXES: &[&str] = &[
    "CREATE INDEX transaction_date_idx IF NOT EXISTS FOR (t:Transaction) ON (t.date)",
    "CREATE INDEX transaction_amount_idx IF NOT EXISTS FOR (t:Transaction) ON (t.amount)",
    "CREATE INDEX account_type_idx IF NOT EXISTS FOR (a:Account) ON (a.accountType)",
    "CREATE INDEX customer_first_name_idx IF NOT EXISTS FOR (c:Customer) ON (c.firstName)",
    "CREATE INDEX customer_last_name_idx IF NOT EXISTS FOR (c:Customer) ON (c.lastName)",
    "CREATE INDEX transaction_sar_idx IF NOT EXISTS FOR (t:Transaction) ON (t.is_sar)",
    "CREATE INDEX transaction_alert_id_idx IF NOT EXISTS FOR (t:Transaction) ON (t.alert_id)",
    "CREATE INDEX account_behavior_idx IF NOT EXISTS FOR (a:Account) ON (a.tx_behavior_id)",
    "CREATE INDEX account_bank_idx IF NOT EXISTS FOR (a:Account) ON (a.bank_id)",
];

const SHOW_CONSTRAINTS: &str = "SHOW CONSTRAINTS YIELD name RETURN name";

/// Token lookup indexes and constraint-owned indexes are left alone.
const SHOW_DROPPABLE_INDEXES: &str = "SHOW INDEXES YIELD name, type, owningConstraint \
     WHERE owningConstraint IS NULL AND type <> 'LOOKUP' RETURN name";

const SHOW_INDEX_STATES: &str = "SHOW INDEXES YIELD name, state RETURN name, state";

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
struct IndexState {
    name: String,
    state: String,
}

#[derive(Debug, Clone, Copy)]
pub struct SchemaOptions {
    pub force: bool,
    pub constraints: bool,
    pub indexes: bool,
}

/// Creates constraints and indexes. Creation failures are logged and skipped;
/// only a failing `SHOW` query aborts.
pub struct SchemaManager<'a, S: GraphStore> {
    store: &'a S,
    timeout: Duration,
    poll_interval: Duration,
}

impl<'a, S: GraphStore> SchemaManager<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            timeout: Duration::from_secs(INDEX_ONLINE_TIMEOUT_SECS),
            poll_interval: Duration::from_secs(INDEX_POLL_INTERVAL_SECS),
        }
    }

    pub fn with_timeouts(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.timeout = timeout;
        self.poll_interval = poll_interval;
        self
    }

    /// Creates the requested schema objects and returns how many statements succeeded.
    pub async fn setup(&self, options: SchemaOptions) -> Result<usize> {
        if !options.constraints && !options.indexes {
            info!("Schema creation disabled");
            return Ok(0);
        }
        if options.force {
            self.drop_all_constraints().await?;
            self.drop_all_indexes().await?;
        }
        let mut created = 0;
        if options.constraints {
            created += self.run_all("constraint", CONSTRAINTS).await;
        }
        if options.indexes {
            created += self.run_all("index", INDEXES).await;
        }
        self.wait_for_indexes().await?;
        info!(created, "Schema setup complete");
        Ok(created)
    }

    async fn run_all(&self, kind: &str, statements: &[&str]) -> usize {
        let mut created = 0;
        for statement in statements {
            match self.store.run(statement).await {
                Ok(()) => {
                    created += 1;
                    debug!("Created {kind}: {statement}");
                }
                Err(e) => warn!("{kind} creation failed (may already exist): {e:#}"),
            }
        }
        info!(kind, created, total = statements.len(), "Schema statements applied");
        created
    }

    pub async fn drop_all_constraints(&self) -> Result<()> {
        warn!("Dropping all constraints");
        let constraints: Vec<Named> = self.store.read(SHOW_CONSTRAINTS, Row::new()).await?;
        for c in constraints {
            if let Err(e) = self.store.run(&format!("DROP CONSTRAINT `{}`", c.name)).await {
                warn!(constraint = %c.name, "Failed to drop constraint: {e:#}");
            }
        }
        Ok(())
    }

    pub async fn drop_all_indexes(&self) -> Result<()> {
        warn!("Dropping all indexes");
        let indexes: Vec<Named> = self.store.read(SHOW_DROPPABLE_INDEXES, Row::new()).await?;
        for idx in indexes {
            if let Err(e) = self.store.run(&format!("DROP INDEX `{}`", idx.name)).await {
                warn!(index = %idx.name, "Failed to drop index: {e:#}");
            }
        }
        Ok(())
    }

    /// Polls until every index is ONLINE. Timing out is a warning, not an error.
    pub async fn wait_for_indexes(&self) -> Result<bool> {
        let start = Instant::now();
        loop {
            let states: Vec<IndexState> = self.store.read(SHOW_INDEX_STATES, Row::new()).await?;
            let pending: Vec<&str> = states
                .iter()
                .filter(|s| s.state != "ONLINE")
                .map(|s| s.name.as_str())
                .collect();
            if pending.is_empty() {
                info!("All indexes are online");
                return Ok(true);
            }
            if start.elapsed() >= self.timeout {
                warn!(
                    pending = pending.len(),
                    "Timeout waiting for indexes after {}s",
                    self.timeout.as_secs()
                );
                return Ok(false);
            }
            debug!(pending = ?pending, "Waiting for indexes to come online");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
