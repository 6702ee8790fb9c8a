//! Read-only integrity checks run after a load.
//!
//! Anomalies (orphans, cash legs, unlinked accounts) are logged and reported,
//! never raised. Only a failing store query is an error.

use crate::config::SAR_SAMPLE_LIMIT;
use crate::models::{Row, Value};
use crate::store::GraphStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

const LABELS: &str = "CALL db.labels() YIELD label RETURN label";
const REL_TYPES: &str =
    "CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType";
const ORPHANS: &str = "MATCH (n) WHERE NOT EXISTS { (n)--() } \
     RETURN labels(n)[0] AS label, count(n) AS count ORDER BY count DESC";
const INCOMPLETE_TRANSACTIONS: &str = "MATCH (t:Transaction) \
     WHERE NOT EXISTS { (:Account)-[:PERFORMS]->(t)-[:BENEFITS_TO]->(:Account) } \
     RETURN count(t) AS count";
const TOTAL_TRANSACTIONS: &str = "MATCH (t:Transaction) RETURN count(t) AS count";
const UNLINKED_ACCOUNTS: &str = "MATCH (a:Account) \
     WHERE NOT EXISTS { (:Customer)-[:HAS_ACCOUNT]->(a) } \
     RETURN count(a) AS count";
const TOTAL_ACCOUNTS: &str = "MATCH (a:Account) RETURN count(a) AS count";
const SAR_SAMPLES: &str = "MATCH (orig:Account)-[:PERFORMS]->(t:SARTransaction)-[:BENEFITS_TO]->(dest:Account) \
     RETURN t.transactionId AS id, t.amount AS amount, toString(t.date) AS date, \
     t.alert_id AS alertId, orig.accountNumber AS origAccount, dest.accountNumber AS destAccount \
     LIMIT $limit";

#[derive(Debug, Deserialize)]
struct Count {
    count: i64,
}

#[derive(Debug, Deserialize)]
struct LabelRow {
    label: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelTypeRow {
    relationship_type: String,
}

#[derive(Debug, Deserialize)]
struct OrphanRow {
    label: Option<String>,
    count: i64,
}

/// Share of transactions with both an originating and a beneficiary account.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowCheck {
    pub total: i64,
    pub incomplete: i64,
    pub integrity_pct: f64,
}

/// Share of accounts owned by at least one customer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinkCheck {
    pub total: i64,
    pub orphaned: i64,
    pub linked_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarSample {
    pub id: String,
    pub amount: Option<f64>,
    pub date: Option<String>,
    pub alert_id: Option<i64>,
    pub orig_account: String,
    pub dest_account: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub node_counts: BTreeMap<String, i64>,
    pub relationship_counts: BTreeMap<String, i64>,
    pub orphaned_nodes: BTreeMap<String, i64>,
    pub transactions: FlowCheck,
    pub accounts: LinkCheck,
    pub sar_samples: Vec<SarSample>,
}

/// Percentage of `total` not counted in `missing`; 0 for an empty set.
pub fn complete_pct(total: i64, missing: i64) -> f64 {
    if total > 0 {
        100.0 * (total - missing) as f64 / total as f64
    } else {
        0.0
    }
}

/// Quotes a label or relationship type for interpolation into Cypher.
fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

pub struct Validator<'a, S: GraphStore> {
    store: &'a S,
    sample_limit: i64,
}

impl<'a, S: GraphStore> Validator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            sample_limit: SAR_SAMPLE_LIMIT,
        }
    }

    pub fn with_sample_limit(mut self, limit: i64) -> Self {
        self.sample_limit = limit;
        self
    }

    pub async fn run(&self) -> Result<ValidationReport> {
        info!("Running validation checks");

        let node_counts = self.count_nodes_by_label().await?;
        info!(labels = node_counts.len(), "Node counts collected");

        let relationship_counts = self.count_relationships_by_type().await?;
        info!(types = relationship_counts.len(), "Relationship counts collected");

        let orphaned_nodes = self.find_orphaned_nodes().await?;
        if orphaned_nodes.is_empty() {
            info!("No orphaned nodes found");
        } else {
            warn!("Orphaned nodes found: {orphaned_nodes:?}");
        }

        let transactions = self.check_transaction_flow().await?;
        if transactions.incomplete > 0 {
            warn!(
                "Found {} incomplete transactions out of {}",
                transactions.incomplete, transactions.total
            );
        } else {
            info!("All {} transactions have proper flow", transactions.total);
        }

        let accounts = self.check_account_links().await?;
        if accounts.orphaned > 0 {
            warn!(
                "Found {} accounts without customers out of {}",
                accounts.orphaned, accounts.total
            );
        } else {
            info!("All {} accounts are linked to customers", accounts.total);
        }

        let sar_samples = self.sample_sar_transactions().await?;
        if sar_samples.is_empty() {
            info!("No SAR transactions found");
        } else {
            info!(samples = sar_samples.len(), "SAR transaction samples collected");
        }

        info!("Validation complete");
        Ok(ValidationReport {
            node_counts,
            relationship_counts,
            orphaned_nodes,
            transactions,
            accounts,
            sar_samples,
        })
    }

    pub async fn count_nodes_by_label(&self) -> Result<BTreeMap<String, i64>> {
        let labels: Vec<LabelRow> = self.store.read(LABELS, Row::new()).await?;
        let mut counts = BTreeMap::new();
        for LabelRow { label } in labels {
            let cypher = format!(
                "MATCH (n:{}) RETURN count(n) AS count",
                quote_identifier(&label)
            );
            counts.insert(label, self.count(&cypher).await?);
        }
        Ok(counts)
    }

    pub async fn count_relationships_by_type(&self) -> Result<BTreeMap<String, i64>> {
        let types: Vec<RelTypeRow> = self.store.read(REL_TYPES, Row::new()).await?;
        let mut counts = BTreeMap::new();
        for RelTypeRow { relationship_type } in types {
            let cypher = format!(
                "MATCH ()-[r:{}]->() RETURN count(r) AS count",
                quote_identifier(&relationship_type)
            );
            counts.insert(relationship_type, self.count(&cypher).await?);
        }
        Ok(counts)
    }

    /// Nodes with no relationship at all, grouped by first label.
    pub async fn find_orphaned_nodes(&self) -> Result<BTreeMap<String, i64>> {
        let rows: Vec<OrphanRow> = self.store.read(ORPHANS, Row::new()).await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.label.unwrap_or_default(), r.count))
            .collect())
    }

    pub async fn check_transaction_flow(&self) -> Result<FlowCheck> {
        let incomplete = self.count(INCOMPLETE_TRANSACTIONS).await?;
        let total = self.count(TOTAL_TRANSACTIONS).await?;
        Ok(FlowCheck {
            total,
            incomplete,
            integrity_pct: complete_pct(total, incomplete),
        })
    }

    pub async fn check_account_links(&self) -> Result<LinkCheck> {
        let orphaned = self.count(UNLINKED_ACCOUNTS).await?;
        let total = self.count(TOTAL_ACCOUNTS).await?;
        Ok(LinkCheck {
            total,
            orphaned,
            linked_pct: complete_pct(total, orphaned),
        })
    }

    pub async fn sample_sar_transactions(&self) -> Result<Vec<SarSample>> {
        let params = crate::row! { "limit" => Value::Int(self.sample_limit) };
        self.store.read(SAR_SAMPLES, params).await
    }

    async fn count(&self, cypher: &str) -> Result<i64> {
        let rows: Vec<Count> = self.store.read(cypher, Row::new()).await?;
        Ok(rows.first().map_or(0, |r| r.count))
    }
}

impl ValidationReport {
    pub fn print_summary(&self) {
        println!();
        println!("============================================");
        println!("  Graph Validation Summary");
        println!("============================================");

        println!();
        println!("Node counts:");
        for (label, count) in &self.node_counts {
            println!("  {label:<24} {count}");
        }

        println!();
        println!("Relationship counts:");
        for (rel_type, count) in &self.relationship_counts {
            println!("  {rel_type:<24} {count}");
        }

        if !self.orphaned_nodes.is_empty() {
            println!();
            println!("Orphaned nodes (WARNING):");
            for (label, count) in &self.orphaned_nodes {
                println!("  {label:<24} {count}");
            }
        }

        println!();
        println!("Transaction flow:");
        println!("  Total:              {}", self.transactions.total);
        println!("  Incomplete:         {}", self.transactions.incomplete);
        println!("  Integrity:          {:.1}%", self.transactions.integrity_pct);

        println!();
        println!("Account-customer links:");
        println!("  Total accounts:     {}", self.accounts.total);
        println!("  Orphaned:           {}", self.accounts.orphaned);
        println!("  Linked:             {:.1}%", self.accounts.linked_pct);

        println!();
        println!("SAR transactions:     {} samples", self.sar_samples.len());
        for s in &self.sar_samples {
            println!(
                "  {} {} -> {} alert={}",
                s.id,
                s.orig_account,
                s.dest_account,
                s.alert_id.map_or_else(|| "-".to_string(), |a| a.to_string())
            );
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        info!(path = %path.display(), "Validation report written");
        Ok(())
    }
}
