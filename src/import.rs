use crate::config::LoaderConfig;
use crate::edges::build_edges;
use crate::loader::{apply_plan, make_spinner, LoadOptions, LoadPlan};
use crate::nodes::{build_nodes, BuildSettings};
use crate::schema::{SchemaManager, SchemaOptions};
use crate::source::Sources;
use crate::stats::RunStats;
use crate::store::{GraphStore, Neo4jStore};
use crate::validate::{ValidationReport, Validator};
use anyhow::{bail, Context, Result};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;

/// Everything the `amlgraph` command line can ask for.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub conf_json: PathBuf,
    pub properties: PathBuf,
    pub batch_size: Option<usize>,
    pub primary_bank: Option<String>,
    pub max_parallel_chunks: Option<usize>,
    pub force: bool,
    pub dry_run: bool,
    pub skip_validation: bool,
    pub report: Option<PathBuf>,
}

/// Switches for one pipeline run against an already connected store.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    pub force: bool,
    pub validate: bool,
    pub show_progress: bool,
}

/// Builds every node and relationship batch from the extracts.
pub fn build_plan(config: &LoaderConfig, sources: &Sources, stats: &mut RunStats) -> LoadPlan {
    let settings = BuildSettings::from(config);
    let nodes = build_nodes(sources, &settings, stats);
    let edges = build_edges(sources, &nodes, &settings, stats);
    LoadPlan::new(&nodes, &edges)
}

/// Schema setup, load, then validation. A failed chunk aborts before validation.
pub async fn run_pipeline<S: GraphStore>(
    store: &S,
    config: &LoaderConfig,
    sources: &Sources,
    options: &PipelineOptions,
    stats: &mut RunStats,
) -> Result<Option<ValidationReport>> {
    SchemaManager::new(store)
        .setup(SchemaOptions {
            force: options.force,
            constraints: config.create_constraints,
            indexes: config.create_indexes,
        })
        .await
        .context("Schema setup failed")?;

    let spinner = make_spinner("Building graph records ...", options.show_progress);
    let plan = build_plan(config, sources, stats);
    spinner.finish_and_clear();
    info!(
        batches = plan.batches().len(),
        rows = plan.total_rows(),
        "Load plan ready"
    );

    let load_options = LoadOptions {
        chunk_size: config.batch_size,
        max_parallel: config.max_parallel_chunks,
        show_progress: options.show_progress,
    };
    apply_plan(store, &plan, &load_options, stats)
        .await
        .context("Load aborted")?;

    if !options.validate {
        return Ok(None);
    }
    let report = Validator::new(store).run().await.context("Validation failed")?;
    Ok(Some(report))
}

pub async fn run_import(options: ImportOptions) -> Result<()> {
    let start = Instant::now();
    let show_progress = std::io::stderr().is_terminal();

    let mut config = LoaderConfig::load(
        &options.conf_json,
        &options.properties,
        options.batch_size,
        options.primary_bank.clone(),
    )?;
    if let Some(n) = options.max_parallel_chunks {
        if n == 0 {
            bail!("--max-parallel-chunks must be greater than zero");
        }
        config.max_parallel_chunks = n;
    }
    config.log_summary();

    println!();
    println!(
        "==> Reading extracts for '{}' from {} ...",
        config.sim_name,
        config.output_dir.display()
    );
    let mut stats = RunStats::new();
    let sources = Sources::load(&config, &mut stats)?;
    println!(
        "    {} accounts, {} transactions, {} individuals, {} organizations, {} mappings.",
        sources.accounts.len(),
        sources.transactions.len(),
        sources.individuals.len(),
        sources.organizations.len(),
        sources.mappings.len()
    );

    if options.dry_run {
        println!();
        println!("==> Dry run: building load plan without connecting ...");
        let plan = build_plan(&config, &sources, &mut stats);
        for line in plan.summary(config.batch_size) {
            println!("    {line}");
        }
        print_run_summary(&stats, start.elapsed(), &config, true);
        return Ok(());
    }

    println!();
    println!("==> Connecting to Neo4j at {} ...", config.store.uri);
    let store = Neo4jStore::connect(&config.store).await?;
    println!("    Connected.");

    println!();
    println!("==> Loading graph ...");
    let pipeline = PipelineOptions {
        force: options.force,
        validate: !options.skip_validation,
        show_progress,
    };
    let report = run_pipeline(&store, &config, &sources, &pipeline, &mut stats).await?;

    print_run_summary(&stats, start.elapsed(), &config, false);

    if let Some(report) = report {
        report.print_summary();
        if let Some(path) = &options.report {
            report.write_json(path)?;
            println!();
            println!("Report written to {}", path.display());
        }
    }
    Ok(())
}

fn print_run_summary(stats: &RunStats, elapsed: Duration, config: &LoaderConfig, dry_run: bool) {
    println!();
    println!("============================================");
    if dry_run {
        println!("  DRY RUN: nothing was written");
    } else {
        println!("  SUCCESS: Load complete!");
    }
    println!("============================================");
    println!();
    println!("Total time:         {:.2}s", elapsed.as_secs_f64());
    println!("Simulation:         {}", config.sim_name);
    println!("Rows written:       {}", stats.rows_written());
    println!("Chunks written:     {}", stats.chunks_written());

    println!();
    println!("Nodes:");
    for (label, count) in stats.nodes() {
        println!("  {label:<28} {count}");
    }

    println!();
    println!("Relationships:");
    for (rel_type, count) in stats.relationships() {
        println!("  {rel_type:<28} {count}");
    }

    if !stats.skipped_relationships().is_empty() {
        println!();
        println!("Skipped relationships:");
        for (rel_type, count) in stats.skipped_relationships() {
            println!("  {rel_type:<28} {count}");
        }
    }

    if !stats.skipped_rows().is_empty() {
        println!();
        println!("Skipped rows:");
        for (label, count) in stats.skipped_rows() {
            println!("  {label:<28} {count}");
        }
    }

    if !stats.warnings().is_empty() {
        println!();
        println!("Warnings:           {}", stats.warnings().len());
    }
}
