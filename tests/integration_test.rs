//! End-to-end tests: CSV extracts on disk through the build and load stages
//! into an in-memory graph store.
//!
//! The fixture in `common` is a four-account AMLSim run with one external
//! account, one flagged account, two flagged transactions, a duplicated
//! address spelled two ways and two cash legs (one missing an originator,
//! one missing a beneficiary). Expected totals:
//!
//! - Nodes: 3 Country, 4 Customer (3 Individual, 1 Organization), 2 Address,
//!   2 SSN, 4 Account (3 Internal, 1 External, 1 SARAccount), 6 Transaction
//!   (2 SARTransaction)
//! - Relationships: 4 HAS_ACCOUNT, 3 HAS_ADDRESS, 2 LOCATED_IN, 4 IS_HOSTED,
//!   3 HAS_NATIONALITY, 3 HAS_SSN, 5 PERFORMS, 5 BENEFITS_TO

mod common;

use amlgraph::import::{run_pipeline, PipelineOptions};
use amlgraph::loader::ChunkError;
use amlgraph::models::Value;
use amlgraph::stats::RunStats;
use chrono::NaiveDate;
use common::{DownStore, Fixture, MemoryStore};
use std::collections::BTreeMap;

fn options() -> PipelineOptions {
    PipelineOptions {
        force: false,
        validate: false,
        show_progress: false,
    }
}

async fn load_into(store: &MemoryStore, fixture: &Fixture, batch_size: usize, parallel: usize) -> RunStats {
    let mut config = fixture.config();
    config.batch_size = batch_size;
    config.max_parallel_chunks = parallel;
    let (sources, mut stats) = fixture.sources(&config);
    run_pipeline(store, &config, &sources, &options(), &mut stats)
        .await
        .unwrap();
    stats
}

fn expected_labels() -> BTreeMap<String, usize> {
    [
        ("Country", 3),
        ("Customer", 4),
        ("Individual", 3),
        ("Organization", 1),
        ("Address", 2),
        ("SSN", 2),
        ("Account", 4),
        ("Internal", 3),
        ("External", 1),
        ("SARAccount", 1),
        ("Transaction", 6),
        ("SARTransaction", 2),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn expected_types() -> BTreeMap<String, usize> {
    [
        ("HAS_ACCOUNT", 4),
        ("HAS_ADDRESS", 3),
        ("LOCATED_IN", 2),
        ("IS_HOSTED", 4),
        ("HAS_NATIONALITY", 3),
        ("HAS_SSN", 3),
        ("PERFORMS", 5),
        ("BENEFITS_TO", 5),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

// ============================================================================
// Full pipeline
// ============================================================================

#[tokio::test]
async fn pipeline_loads_expected_graph() {
    let fixture = Fixture::new(&[]);
    let store = MemoryStore::new();
    let stats = load_into(&store, &fixture, 2, 1).await;

    assert_eq!(store.label_counts(), expected_labels());
    assert_eq!(store.type_counts(), expected_types());

    assert_eq!(stats.node_count("Account"), 4);
    assert_eq!(stats.relationship_count("PERFORMS"), 5);
    assert_eq!(stats.skipped("PERFORMS"), 1);
    assert_eq!(stats.skipped("BENEFITS_TO"), 1);
    assert!(!stats.warnings().iter().any(|w| w.contains("not found")));
}

#[tokio::test]
async fn schema_is_created_before_loading() {
    let fixture = Fixture::new(&[]);
    let store = MemoryStore::new();
    load_into(&store, &fixture, 2, 1).await;

    let statements = store.statements.lock().unwrap();
    assert_eq!(
        statements.len(),
        amlgraph::schema::CONSTRAINTS.len() + amlgraph::schema::INDEXES.len()
    );
}

#[tokio::test]
async fn properties_follow_transform_rules() {
    let fixture = Fixture::new(&[]);
    let store = MemoryStore::new();
    load_into(&store, &fixture, 100, 1).await;
    let graph = store.graph.lock().unwrap();
    let base = NaiveDate::from_ymd_opt(2017, 1, 1).unwrap();

    let a1 = graph.node("Account", "A1").unwrap();
    assert_eq!(a1.props["openDate"], Value::DateTime(base.and_hms_opt(0, 0, 0).unwrap()));
    assert!(!a1.props.contains_key("closedDate"));
    assert_eq!(a1.props["isInternal"], Value::Bool(true));

    let a2 = graph.node("Account", "A2").unwrap();
    assert_eq!(a2.props["isSAR"], Value::Bool(true));
    assert!(a2.labels.contains("SARAccount"));

    let a3 = graph.node("Account", "A3").unwrap();
    assert!(a3.labels.contains("External"));
    assert!(a3.props.contains_key("closedDate"));

    let t1 = graph.node("Transaction", "T1").unwrap();
    assert!(!t1.props.contains_key("alert_id"));
    assert_eq!(t1.props["is_sar"], Value::Bool(false));

    let t2 = graph.node("Transaction", "T2").unwrap();
    assert_eq!(t2.props["alert_id"], Value::Int(7));
    assert!(t2.labels.contains("SARTransaction"));

    let org = graph.node("Customer", "C3").unwrap();
    assert!(org.labels.contains("Organization"));
    assert!(matches!(&org.props["name"], Value::Str(name) if !name.is_empty()));
}

#[tokio::test]
async fn validation_report_matches_loaded_graph() {
    let fixture = Fixture::new(&[]);
    let store = MemoryStore::new();
    let config = fixture.config();
    let (sources, mut stats) = fixture.sources(&config);
    let options = PipelineOptions {
        validate: true,
        ..options()
    };

    let report = run_pipeline(&store, &config, &sources, &options, &mut stats)
        .await
        .unwrap()
        .unwrap();

    let as_i64 = |counts: BTreeMap<String, usize>| -> BTreeMap<String, i64> {
        counts.into_iter().map(|(k, v)| (k, v as i64)).collect()
    };
    assert_eq!(report.node_counts, as_i64(expected_labels()));
    assert_eq!(report.relationship_counts, as_i64(expected_types()));
    assert!(report.orphaned_nodes.is_empty());

    // T3 has no originator and T4 no beneficiary.
    assert_eq!(report.transactions.total, 6);
    assert_eq!(report.transactions.incomplete, 2);
    assert!((report.transactions.integrity_pct - 400.0 / 6.0).abs() < 1e-9);

    assert_eq!(report.accounts.total, 4);
    assert_eq!(report.accounts.orphaned, 0);
    assert_eq!(report.accounts.linked_pct, 100.0);

    let samples: Vec<_> = report
        .sar_samples
        .iter()
        .map(|s| (s.id.as_str(), s.orig_account.as_str(), s.dest_account.as_str(), s.alert_id))
        .collect();
    assert_eq!(samples, vec![("T2", "A2", "A3", Some(7)), ("T5", "A1", "A4", Some(7))]);
    assert_eq!(report.sar_samples[0].amount, Some(9500.0));
    assert_eq!(report.sar_samples[0].date.as_deref(), Some("2017-01-03T00:00:00Z"));
}

#[tokio::test]
async fn validation_reports_unlinked_accounts() {
    let fixture = Fixture::new(&["account_mapping"]);
    let store = MemoryStore::new();
    let config = fixture.config();
    let (sources, mut stats) = fixture.sources(&config);
    let options = PipelineOptions {
        validate: true,
        ..options()
    };

    let report = run_pipeline(&store, &config, &sources, &options, &mut stats)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.accounts.total, 4);
    assert_eq!(report.accounts.orphaned, 4);
    assert_eq!(report.accounts.linked_pct, 0.0);
    assert_eq!(report.relationship_counts.get("HAS_ACCOUNT"), None);
}

// ============================================================================
// Idempotence and upsert contract
// ============================================================================

#[tokio::test]
async fn running_twice_is_idempotent() {
    let fixture = Fixture::new(&[]);
    let store = MemoryStore::new();

    load_into(&store, &fixture, 2, 1).await;
    let labels = store.label_counts();
    let types = store.type_counts();

    load_into(&store, &fixture, 2, 1).await;
    assert_eq!(store.label_counts(), labels);
    assert_eq!(store.type_counts(), types);
}

#[tokio::test]
async fn create_only_fields_survive_reload() {
    let fixture = Fixture::new(&[]);
    let store = MemoryStore::new();
    load_into(&store, &fixture, 2, 1).await;

    {
        let mut graph = store.graph.lock().unwrap();
        let id = ("Country".to_string(), "US".to_string());
        graph.nodes.get_mut(&id).unwrap().props.insert("name".into(), Value::from("Edited"));
        let id = ("Account".to_string(), "A1".to_string());
        graph.nodes.get_mut(&id).unwrap().props.insert("accountType".into(), Value::from("Edited"));
    }

    load_into(&store, &fixture, 2, 1).await;
    let graph = store.graph.lock().unwrap();
    assert_eq!(graph.node("Country", "US").unwrap().props["name"], Value::from("Edited"));
    assert_eq!(graph.node("Account", "A1").unwrap().props["accountType"], Value::from("I"));
}

// ============================================================================
// Chunking and concurrency
// ============================================================================

#[tokio::test]
async fn chunk_size_does_not_change_end_state() {
    let fixture = Fixture::new(&[]);
    for batch_size in [1, 2, 3, 5, 10_000] {
        let store = MemoryStore::new();
        load_into(&store, &fixture, batch_size, 1).await;
        assert_eq!(store.label_counts(), expected_labels(), "batch size {batch_size}");
        assert_eq!(store.type_counts(), expected_types(), "batch size {batch_size}");
    }
}

#[tokio::test]
async fn parallel_chunks_reach_the_same_state() {
    let fixture = Fixture::new(&[]);
    let store = MemoryStore::new();
    load_into(&store, &fixture, 1, 4).await;

    assert_eq!(store.label_counts(), expected_labels());
    assert_eq!(store.type_counts(), expected_types());
    assert!(store.max_in_flight() <= 4);
    assert!(store.max_in_flight() > 1);
}

#[tokio::test]
async fn sequential_load_keeps_one_chunk_in_flight() {
    let fixture = Fixture::new(&[]);
    let store = MemoryStore::new();
    load_into(&store, &fixture, 1, 1).await;
    assert_eq!(store.max_in_flight(), 1);
}

#[tokio::test]
async fn nodes_are_loaded_before_relationships() {
    let fixture = Fixture::new(&[]);
    let store = MemoryStore::new();
    load_into(&store, &fixture, 2, 3).await;

    let writes = store.writes.lock().unwrap();
    let last_node = writes.iter().rposition(|(_, is_node, _)| *is_node).unwrap();
    let first_edge = writes.iter().position(|(_, is_node, _)| !*is_node).unwrap();
    assert!(last_node < first_edge);
    assert!(writes.iter().all(|(_, _, rows)| *rows <= 2));
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn failed_chunk_aborts_with_its_offset() {
    let fixture = Fixture::new(&[]);
    let store = MemoryStore::new().fail_when("Transaction nodes", "T5");
    let config = {
        let mut c = fixture.config();
        c.batch_size = 2;
        c
    };
    let (sources, mut stats) = fixture.sources(&config);

    let err = run_pipeline(&store, &config, &sources, &options(), &mut stats)
        .await
        .unwrap_err();
    let chunk = err.downcast_ref::<ChunkError>().unwrap();
    assert_eq!(chunk.offset, 4);
    assert_eq!(chunk.operation, "Transaction nodes");

    assert_eq!(store.graph.lock().unwrap().count_label("Transaction"), 4);
    let writes = store.writes.lock().unwrap();
    assert!(writes.iter().all(|(_, is_node, _)| *is_node));
}

#[tokio::test]
async fn parallel_failure_reports_smallest_offset() {
    let fixture = Fixture::new(&[]);
    let store = MemoryStore::new()
        .fail_when("Transaction nodes", "T4")
        .fail_when("Transaction nodes", "T3");
    let mut config = fixture.config();
    config.batch_size = 1;
    config.max_parallel_chunks = 4;
    let (sources, mut stats) = fixture.sources(&config);

    let err = run_pipeline(&store, &config, &sources, &options(), &mut stats)
        .await
        .unwrap_err();
    assert_eq!(err.downcast_ref::<ChunkError>().unwrap().offset, 2);
    assert_eq!(store.graph.lock().unwrap().count_type("PERFORMS"), 0);
}

#[tokio::test]
async fn unreachable_store_is_fatal() {
    let fixture = Fixture::new(&[]);
    let config = fixture.config();
    let (sources, mut stats) = fixture.sources(&config);
    let result = run_pipeline(&DownStore, &config, &sources, &options(), &mut stats).await;
    assert!(result.is_err());
}

// ============================================================================
// Missing inputs
// ============================================================================

#[tokio::test]
async fn missing_extract_is_a_warning() {
    let fixture = Fixture::new(&["party_organizations"]);
    let store = MemoryStore::new();
    let stats = load_into(&store, &fixture, 2, 1).await;

    assert!(stats
        .warnings()
        .iter()
        .any(|w| w.contains("CSV file not found")));
    let labels = store.label_counts();
    assert_eq!(labels.get("Organization"), None);
    assert_eq!(labels["Individual"], 3);
    assert_eq!(store.type_counts()["HAS_ACCOUNT"], 3);
    assert_eq!(stats.skipped("HAS_ACCOUNT"), 1);
}

#[tokio::test]
async fn missing_transactions_leave_accounts_loaded() {
    let fixture = Fixture::new(&["transactions"]);
    let store = MemoryStore::new();
    let stats = load_into(&store, &fixture, 2, 1).await;

    let labels = store.label_counts();
    assert_eq!(labels["Account"], 4);
    assert_eq!(labels.get("Transaction"), None);
    assert_eq!(store.type_counts().get("PERFORMS"), None);
    assert_eq!(stats.skipped("PERFORMS"), 0);
}
