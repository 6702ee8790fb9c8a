use crate::edges::EdgeSet;
use crate::models::{
    EdgeRecord, EdgeSpec, NodeRecord, NodeSpec, Row, Value, ACCOUNT, ADDRESS, COUNTRY,
    EXTERNAL_LABEL, INDIVIDUAL, INTERNAL_LABEL, ORGANIZATION, SAR_ACCOUNT_LABEL,
    SAR_TRANSACTION_LABEL, SSN, TRANSACTION,
};
use crate::nodes::NodeSet;
use crate::stats::RunStats;
use crate::store::GraphStore;
use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::fmt::Write as _;
use thiserror::Error;
use tracing::{debug, info, warn};

/// One kind of idempotent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    UpsertNodes(&'static NodeSpec),
    AddLabel {
        node: &'static NodeSpec,
        label: &'static str,
    },
    UpsertEdges(&'static EdgeSpec),
}

impl Operation {
    /// Cypher applied to each chunk; rows arrive as `$batch`.
    pub fn cypher(&self) -> String {
        let mut q = String::from("UNWIND $batch AS row\n");
        match self {
            Operation::UpsertNodes(spec) => {
                let _ = writeln!(
                    q,
                    "MERGE (n:{} {{{key}: row.{key}}})",
                    spec.label,
                    key = spec.key
                );
                push_set_clause(&mut q, "ON CREATE SET ", "n", &[], spec.on_create);
                push_set_clause(&mut q, "SET ", "n", spec.extra_labels, spec.always);
            }
            Operation::AddLabel { node, label } => {
                let _ = writeln!(
                    q,
                    "MATCH (n:{} {{{key}: row.{key}}})",
                    node.label,
                    key = node.key
                );
                let _ = writeln!(q, "SET n:{label}");
            }
            Operation::UpsertEdges(spec) => {
                let _ = writeln!(q, "MATCH (a:{} {{{}: row.from}})", spec.from.label, spec.from.key);
                let _ = writeln!(q, "MATCH (b:{} {{{}: row.to}})", spec.to.label, spec.to.key);
                let _ = writeln!(q, "MERGE (a)-[r:{}]->(b)", spec.rel_type);
                push_set_clause(&mut q, "ON CREATE SET ", "r", &[], spec.on_create);
                push_set_clause(&mut q, "SET ", "r", &[], spec.always);
            }
        }
        q
    }

    pub fn describe(&self) -> String {
        match self {
            Operation::UpsertNodes(spec) if spec.extra_labels.is_empty() => {
                format!("{} nodes", spec.label)
            }
            Operation::UpsertNodes(spec) => {
                format!("{}:{} nodes", spec.label, spec.extra_labels.join(":"))
            }
            Operation::AddLabel { node, label } => format!("{label} label on {}", node.label),
            Operation::UpsertEdges(spec) => format!("{} relationships", spec.rel_type),
        }
    }

    pub fn is_node_operation(&self) -> bool {
        !matches!(self, Operation::UpsertEdges(_))
    }
}

fn push_set_clause(
    q: &mut String,
    keyword: &str,
    var: &str,
    labels: &[&str],
    fields: &[&str],
) {
    if labels.is_empty() && fields.is_empty() {
        return;
    }
    let items: Vec<String> = labels
        .iter()
        .map(|label| format!("{var}:{label}"))
        .chain(fields.iter().map(|f| format!("{var}.{f} = row.{f}")))
        .collect();
    let _ = writeln!(q, "{keyword}{}", items.join(", "));
}

/// An operation together with every row it applies to.
#[derive(Debug, Clone)]
pub struct Batch {
    pub operation: Operation,
    pub rows: Vec<Row>,
}

impl Batch {
    fn nodes<'a, N: NodeRecord + 'a>(
        spec: &'static NodeSpec,
        items: impl IntoIterator<Item = &'a N>,
    ) -> Self {
        Self {
            operation: Operation::UpsertNodes(spec),
            rows: items.into_iter().map(|n| n.to_row()).collect(),
        }
    }

    fn labels<'a, N: NodeRecord + 'a>(
        node: &'static NodeSpec,
        label: &'static str,
        items: impl IntoIterator<Item = &'a N>,
    ) -> Self {
        Self {
            operation: Operation::AddLabel { node, label },
            rows: items
                .into_iter()
                .map(|n| {
                    let mut row = Row::new();
                    row.insert(node.key.to_string(), Value::from(n.key()));
                    row
                })
                .collect(),
        }
    }

    fn edges<E: EdgeRecord>(items: &[E]) -> Self {
        Self {
            operation: Operation::UpsertEdges(E::SPEC),
            rows: items.iter().map(|e| e.to_row()).collect(),
        }
    }

    pub fn chunk_count(&self, chunk_size: usize) -> usize {
        self.rows.len().div_ceil(chunk_size.max(1))
    }
}

/// Batches in dependency order: every node type before any relationship, and
/// each label partition after the nodes it labels.
#[derive(Debug, Default)]
pub struct LoadPlan {
    batches: Vec<Batch>,
}

impl LoadPlan {
    pub fn new(nodes: &NodeSet, edges: &EdgeSet) -> Self {
        let batches = vec![
            Batch::nodes(&COUNTRY, &nodes.countries),
            Batch::nodes(&INDIVIDUAL, &nodes.individuals),
            Batch::nodes(&ORGANIZATION, &nodes.organizations),
            Batch::nodes(&ADDRESS, &nodes.addresses),
            Batch::nodes(&SSN, &nodes.documents),
            Batch::nodes(&ACCOUNT, &nodes.accounts),
            Batch::labels(&ACCOUNT, INTERNAL_LABEL, nodes.internal_accounts()),
            Batch::labels(&ACCOUNT, EXTERNAL_LABEL, nodes.external_accounts()),
            Batch::labels(&ACCOUNT, SAR_ACCOUNT_LABEL, nodes.flagged_accounts()),
            Batch::nodes(&TRANSACTION, &nodes.transactions),
            Batch::labels(&TRANSACTION, SAR_TRANSACTION_LABEL, nodes.flagged_transactions()),
            Batch::edges(&edges.owns_account),
            Batch::edges(&edges.has_address),
            Batch::edges(&edges.located_in),
            Batch::edges(&edges.hosted_in),
            Batch::edges(&edges.has_nationality),
            Batch::edges(&edges.has_identity_document),
            Batch::edges(&edges.originates),
            Batch::edges(&edges.credits),
        ];
        Self { batches }
    }

    pub fn from_batches(batches: Vec<Batch>) -> Self {
        Self { batches }
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    pub fn total_rows(&self) -> usize {
        self.batches.iter().map(|b| b.rows.len()).sum()
    }

    /// One line per batch, for `--dry-run`.
    pub fn summary(&self, chunk_size: usize) -> Vec<String> {
        self.batches
            .iter()
            .map(|b| {
                format!(
                    "{:<36} {:>10} rows {:>6} chunks",
                    b.operation.describe(),
                    b.rows.len(),
                    b.chunk_count(chunk_size)
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub chunk_size: usize,
    pub max_parallel: usize,
    pub show_progress: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            chunk_size: crate::config::DEFAULT_BATCH_SIZE,
            max_parallel: crate::config::DEFAULT_MAX_PARALLEL_CHUNKS,
            show_progress: false,
        }
    }
}

/// A chunk write that aborted the load.
#[derive(Debug, Error)]
#[error("{operation}: chunk at row offset {offset} failed")]
pub struct ChunkError {
    pub operation: String,
    pub offset: usize,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// Applies every batch of the plan in order. The first failing chunk stops the
/// load; no chunk is retried.
pub async fn apply_plan<S: GraphStore>(
    store: &S,
    plan: &LoadPlan,
    options: &LoadOptions,
    stats: &mut RunStats,
) -> Result<()> {
    let mp = MultiProgress::new();
    for batch in plan.batches() {
        let description = batch.operation.describe();
        if batch.rows.is_empty() {
            debug!(operation = %description, "Nothing to load");
            continue;
        }
        info!(operation = %description, rows = batch.rows.len(), "Loading");

        let pb = if options.show_progress {
            mp.add(make_progress_bar(batch.rows.len() as u64, &description))
        } else {
            ProgressBar::hidden()
        };
        let chunks = load_batch(store, batch, options, &pb).await?;
        stats.add_written(batch.rows.len() as u64, chunks);
    }
    Ok(())
}

async fn write_chunk<'a, S: GraphStore>(
    store: &'a S,
    operation: &'a Operation,
    offset: usize,
    rows: &'a [Row],
) -> (usize, usize, Result<()>) {
    (offset, rows.len(), store.write(operation, rows).await)
}

/// Writes one batch, throttled to `max_parallel` chunks in flight.
async fn load_batch<S: GraphStore>(
    store: &S,
    batch: &Batch,
    options: &LoadOptions,
    pb: &ProgressBar,
) -> Result<u64> {
    let chunk_size = options.chunk_size.max(1);
    let max_parallel = options.max_parallel.max(1);
    let label = batch.operation.describe();

    let mut pending = batch
        .rows
        .chunks(chunk_size)
        .enumerate()
        .map(|(i, rows)| (i * chunk_size, rows));
    let mut in_flight = FuturesUnordered::new();
    let mut failure: Option<(usize, anyhow::Error)> = None;
    let mut completed = 0u64;

    for (offset, rows) in pending.by_ref().take(max_parallel) {
        in_flight.push(write_chunk(store, &batch.operation, offset, rows));
    }

    while let Some((offset, len, result)) = in_flight.next().await {
        match result {
            Ok(()) => {
                completed += 1;
                pb.inc(len as u64);
            }
            Err(e) => {
                warn!(operation = %label, offset, error = %e, "Chunk failed");
                if failure.as_ref().is_none_or(|(first, _)| offset < *first) {
                    failure = Some((offset, e));
                }
            }
        }

        if failure.is_none() {
            if let Some((offset, rows)) = pending.next() {
                in_flight.push(write_chunk(store, &batch.operation, offset, rows));
            }
        }
    }

    if let Some((offset, source)) = failure {
        pb.abandon_with_message(format!("{label}: failed at row {offset}"));
        return Err(ChunkError {
            operation: label,
            offset,
            source: source.into(),
        }
        .into());
    }

    pb.finish_with_message(format!("{label}: {} rows", batch.rows.len()));
    Ok(completed)
}

pub(crate) fn make_spinner(msg: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message(msg.to_string());
    pb
}

fn make_progress_bar(total: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(&format!(
        "    {{spinner:.cyan}} {label:<36} [{{bar:30.cyan/blue}}] {{pos}}/{{len}} rows"
    )) {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
