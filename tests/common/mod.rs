//! Shared fixtures for the integration tests: an in-memory `GraphStore` that
//! applies the same upsert contract Neo4j does, and an AMLSim-shaped dataset
//! written to a temp directory.

#![allow(dead_code)]

use amlgraph::config::LoaderConfig;
use amlgraph::loader::Operation;
use amlgraph::models::{Row, Value};
use amlgraph::source::Sources;
use amlgraph::stats::RunStats;
use amlgraph::store::GraphStore;
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::de::DeserializeOwned;
use serde_json::{json, Value as Json};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub labels: BTreeSet<String>,
    pub props: Row,
}

#[derive(Debug, Default)]
pub struct Graph {
    /// Keyed by (primary label, natural key).
    pub nodes: BTreeMap<(String, String), Node>,
    /// Keyed by (type, from key, to key).
    pub edges: BTreeMap<(String, String, String), Row>,
    /// Nodes with at least one relationship, by (primary label, natural key).
    pub touched: BTreeSet<(String, String)>,
}

impl Graph {
    pub fn count_label(&self, label: &str) -> usize {
        self.nodes.values().filter(|n| n.labels.contains(label)).count()
    }

    pub fn count_type(&self, rel_type: &str) -> usize {
        self.edges.keys().filter(|(t, _, _)| t == rel_type).count()
    }

    pub fn node(&self, label: &str, key: &str) -> Option<&Node> {
        self.nodes.get(&(label.to_string(), key.to_string()))
    }

    pub fn label_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for node in self.nodes.values() {
            for label in &node.labels {
                *counts.entry(label.clone()).or_default() += 1;
            }
        }
        counts
    }

    pub fn type_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for (rel_type, _, _) in self.edges.keys() {
            *counts.entry(rel_type.clone()).or_default() += 1;
        }
        counts
    }

    fn has_edge(&self, rel_type: &str, from: Option<&str>, to: Option<&str>) -> bool {
        self.edges.keys().any(|(t, f, d)| {
            t == rel_type && from.is_none_or(|k| k == f) && to.is_none_or(|k| k == d)
        })
    }

    fn keys_with(&self, label: &'static str) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter(move |(_, node)| node.labels.contains(label))
            .map(|((_, key), _)| key.as_str())
    }

    /// Answers the read queries the validator issues, as JSON rows.
    fn answer(&self, cypher: &str, params: &Row) -> Vec<Json> {
        let count = |n: usize| vec![json!({ "count": n })];
        if cypher.contains("db.labels()") {
            return self.label_counts().into_keys().map(|l| json!({ "label": l })).collect();
        }
        if cypher.contains("db.relationshipTypes()") {
            return self
                .type_counts()
                .into_keys()
                .map(|t| json!({ "relationshipType": t }))
                .collect();
        }
        if let Some(label) = between(cypher, "MATCH (n:`", "`)") {
            return count(self.count_label(label));
        }
        if let Some(rel_type) = between(cypher, "[r:`", "`]") {
            return count(self.count_type(rel_type));
        }
        if cypher.contains("NOT EXISTS { (n)--() }") {
            let mut orphans: BTreeMap<&str, usize> = BTreeMap::new();
            for id in self.nodes.keys().filter(|id| !self.touched.contains(*id)) {
                *orphans.entry(id.0.as_str()).or_default() += 1;
            }
            return orphans
                .into_iter()
                .map(|(label, n)| json!({ "label": label, "count": n }))
                .collect();
        }
        if cypher.contains("-[:BENEFITS_TO]->(:Account) }") {
            let incomplete = self
                .keys_with("Transaction")
                .filter(|tx| {
                    !self.has_edge("PERFORMS", None, Some(*tx))
                        || !self.has_edge("BENEFITS_TO", Some(*tx), None)
                })
                .count();
            return count(incomplete);
        }
        if cypher.starts_with("MATCH (t:Transaction) RETURN") {
            return count(self.count_label("Transaction"));
        }
        if cypher.contains("-[:HAS_ACCOUNT]->(a) }") {
            let unlinked = self
                .keys_with("Account")
                .filter(|acct| !self.has_edge("HAS_ACCOUNT", None, Some(*acct)))
                .count();
            return count(unlinked);
        }
        if cypher.starts_with("MATCH (a:Account) RETURN") {
            return count(self.count_label("Account"));
        }
        if cypher.contains(":SARTransaction)") {
            let limit = match params.get("limit") {
                Some(Value::Int(n)) => *n as usize,
                _ => usize::MAX,
            };
            return self
                .keys_with("SARTransaction")
                .filter_map(|tx| {
                    let (_, orig, _) = self.edges.keys().find(|(t, _, d)| t == "PERFORMS" && d == tx)?;
                    let (_, _, dest) =
                        self.edges.keys().find(|(t, f, _)| t == "BENEFITS_TO" && f == tx)?;
                    let props = &self.node("Transaction", tx)?.props;
                    Some(json!({
                        "id": tx,
                        "amount": props.get("amount").map_or(Json::Null, to_json),
                        "date": props.get("date").map_or(Json::Null, to_json),
                        "alertId": props.get("alert_id").map_or(Json::Null, to_json),
                        "origAccount": orig,
                        "destAccount": dest,
                    }))
                })
                .take(limit)
                .collect();
        }
        Vec::new()
    }
}

fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let rest = &text[text.find(start)? + start.len()..];
    Some(&rest[..rest.find(end)?])
}

fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => json!(b),
        Value::Int(i) => json!(i),
        Value::Float(f) => json!(f),
        Value::Str(s) => json!(s),
        Value::Date(d) => json!(d.to_string()),
        Value::DateTime(dt) => json!(dt.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true)),
    }
}

/// Failure injected when a chunk of a matching operation contains a row
/// whose key equals `key`.
#[derive(Debug, Clone)]
struct Trap {
    operation: String,
    key: String,
}

#[derive(Default)]
pub struct MemoryStore {
    pub graph: Mutex<Graph>,
    /// (operation description, rows) per successful write, in completion order.
    pub writes: Mutex<Vec<(String, bool, usize)>>,
    pub statements: Mutex<Vec<String>>,
    traps: Vec<Trap>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_when(mut self, operation: &str, key: &str) -> Self {
        self.traps.push(Trap {
            operation: operation.to_string(),
            key: key.to_string(),
        });
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn label_counts(&self) -> BTreeMap<String, usize> {
        self.graph.lock().unwrap().label_counts()
    }

    pub fn type_counts(&self) -> BTreeMap<String, usize> {
        self.graph.lock().unwrap().type_counts()
    }

    fn trapped(&self, operation: &Operation, rows: &[Row]) -> bool {
        let description = operation.describe();
        self.traps.iter().any(|trap| {
            description.contains(&trap.operation)
                && rows.iter().any(|row| row.values().any(|v| key_of(v) == trap.key))
        })
    }

    fn apply(&self, operation: &Operation, rows: &[Row]) {
        let mut graph = self.graph.lock().unwrap();
        for row in rows {
            match operation {
                Operation::UpsertNodes(spec) => {
                    let key = key_of(&row[spec.key]);
                    let id = (spec.label.to_string(), key);
                    let created = !graph.nodes.contains_key(&id);
                    let node = graph.nodes.entry(id).or_default();
                    node.labels.insert(spec.label.to_string());
                    node.props.insert(spec.key.to_string(), row[spec.key].clone());
                    if created {
                        copy_fields(&mut node.props, row, spec.on_create);
                    }
                    copy_fields(&mut node.props, row, spec.always);
                    for label in spec.extra_labels {
                        node.labels.insert(label.to_string());
                    }
                }
                Operation::AddLabel { node, label } => {
                    let id = (node.label.to_string(), key_of(&row[node.key]));
                    if let Some(n) = graph.nodes.get_mut(&id) {
                        n.labels.insert(label.to_string());
                    }
                }
                Operation::UpsertEdges(spec) => {
                    let from = key_of(&row["from"]);
                    let to = key_of(&row["to"]);
                    let from_id = (spec.from.label.to_string(), from.clone());
                    let to_id = (spec.to.label.to_string(), to.clone());
                    if !graph.nodes.contains_key(&from_id) || !graph.nodes.contains_key(&to_id) {
                        continue;
                    }
                    graph.touched.insert(from_id);
                    graph.touched.insert(to_id);
                    let id = (spec.rel_type.to_string(), from, to);
                    let created = !graph.edges.contains_key(&id);
                    let props = graph.edges.entry(id).or_default();
                    if created {
                        copy_fields(props, row, spec.on_create);
                    }
                    copy_fields(props, row, spec.always);
                }
            }
        }
    }
}

fn key_of(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        other => format!("{other:?}"),
    }
}

fn copy_fields(props: &mut Row, row: &Row, fields: &[&str]) {
    for field in fields {
        match row.get(*field) {
            Some(Value::Null) | None => {
                props.remove(*field);
            }
            Some(value) => {
                props.insert(field.to_string(), value.clone());
            }
        }
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn run(&self, statement: &str) -> Result<()> {
        self.statements.lock().unwrap().push(statement.to_string());
        Ok(())
    }

    async fn write(&self, operation: &Operation, rows: &[Row]) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;

        let result = if self.trapped(operation, rows) {
            Err(anyhow::anyhow!("injected failure in {}", operation.describe()))
        } else {
            self.apply(operation, rows);
            self.writes.lock().unwrap().push((
                operation.describe(),
                operation.is_node_operation(),
                rows.len(),
            ));
            Ok(())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn read<T>(&self, cypher: &str, params: Row) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let rows = self.graph.lock().unwrap().answer(cypher, &params);
        rows.into_iter()
            .map(|row| Ok(serde_json::from_value(row)?))
            .collect()
    }
}

/// A store whose every call fails, standing in for an unreachable server.
pub struct DownStore;

#[async_trait]
impl GraphStore for DownStore {
    async fn run(&self, _statement: &str) -> Result<()> {
        bail!("connection refused")
    }

    async fn write(&self, _operation: &Operation, _rows: &[Row]) -> Result<()> {
        bail!("connection refused")
    }

    async fn read<T>(&self, _cypher: &str, _params: Row) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        bail!("connection refused")
    }
}

pub const ACCOUNTS_CSV: &str = "\
acct_id,dsply_nm,type,acct_stat,acct_rptng_crncy,prior_sar_count,branch_id,open_dt,close_dt,initial_deposit,tx_behavior_id,bank_id,first_name,last_name,street_addr,city,state,country,zip,gender,birth_date,ssn,lat,lon
A1,C_1,I,A,USD,0,1,0,1000000,5000.0,1,bank,Jane,Doe,1 Elm St,Boston,MA,US,02101,F,1980-03-04,111-22-3333,42.36,-71.05
A2,C_2,I,A,USD,1,1,5,1000000,1200.5,2,bank,John,Roe,9 Oak Ave,Austin,TX,US,73301,M,1975-11-30,222-33-4444,30.27,-97.74
A3,C_3,O,A,EUR,False,2,10,400,800.0,1,other,,,,,,DE,,,,,,
A4,C_4,I,A,USD,0,1,0,1000000,300.0,1,bank,Jane,Doe,1 ELM  ST,boston,MA,US,02101,F,1980-03-04,111-22-3333,42.36,-71.05
";

pub const TRANSACTIONS_CSV: &str = "\
tran_id,orig_acct,bene_acct,tx_type,base_amt,tran_timestamp,is_sar,alert_id
T1,A1,A2,TRANSFER,100.0,2017-01-02T00:00:00Z,False,-1
T2,A2,A3,TRANSFER,9500.0,2017-01-03T00:00:00Z,True,7
T3,,A1,CASH-IN,50.0,2017-01-04T00:00:00Z,False,-1
T4,A3,,CASH-OUT,25.0,2017-01-05T00:00:00Z,False,-1
T5,A1,A4,TRANSFER,10.0,2017-01-06T00:00:00Z,true,7
T6,A4,A1,TRANSFER,11.0,2017-01-07T00:00:00Z,False,
";

pub const INDIVIDUALS_CSV: &str = "\
partyId,nationality
C1,US
C2,GB
C4,US
";

pub const ORGANIZATIONS_CSV: &str = "\
partyId
C3
";

pub const MAPPING_CSV: &str = "\
mappingId,cust_id,acct_id,cust_acct_role
1,C1,A1,Primary
2,C2,A2,Primary
3,C3,A3,Primary
4,C4,A4,Joint
";

/// A simulation directory plus its conf.json and properties file.
pub struct Fixture {
    pub dir: TempDir,
    pub conf: PathBuf,
    pub properties: PathBuf,
}

impl Fixture {
    /// Writes the standard dataset; `skip` names extracts to leave out.
    pub fn new(skip: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();
        let sim_dir = dir.path().join("outputs").join("fixture");
        fs::create_dir_all(&sim_dir).unwrap();

        let files = [
            ("accounts", "accounts.csv", ACCOUNTS_CSV),
            ("transactions", "transactions.csv", TRANSACTIONS_CSV),
            ("party_individuals", "individuals-bulkload.csv", INDIVIDUALS_CSV),
            ("party_organizations", "organizations-bulkload.csv", ORGANIZATIONS_CSV),
            ("account_mapping", "accountMapping.csv", MAPPING_CSV),
        ];
        for (key, file, content) in files {
            if !skip.contains(&key) {
                fs::write(sim_dir.join(file), content).unwrap();
            }
        }

        let conf = dir.path().join("conf.json");
        let output: serde_json::Map<String, serde_json::Value> = files
            .iter()
            .map(|(key, file, _)| (key.to_string(), serde_json::Value::from(*file)))
            .chain([(
                "directory".to_string(),
                serde_json::Value::from(dir.path().join("outputs").display().to_string()),
            )])
            .collect();
        let json = serde_json::json!({
            "general": {"simulation_name": "fixture", "base_date": "2017-01-01"},
            "output": output,
        });
        fs::write(&conf, serde_json::to_string_pretty(&json).unwrap()).unwrap();

        let properties = dir.path().join("neo4j.properties");
        fs::write(
            &properties,
            "[neo4j]\nneo4j.primary_bank=bank\nneo4j.batch_size=2\n",
        )
        .unwrap();

        Self {
            dir,
            conf,
            properties,
        }
    }

    pub fn config(&self) -> LoaderConfig {
        LoaderConfig::load(&self.conf, &self.properties, None, None).unwrap()
    }

    pub fn sources(&self, config: &LoaderConfig) -> (Sources, RunStats) {
        let mut stats = RunStats::new();
        let sources = Sources::load(config, &mut stats).unwrap();
        (sources, stats)
    }
}
