use amlgraph::config::DEFAULT_PROPERTIES_FILE;
use amlgraph::import::ImportOptions;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "amlgraph")]
#[command(about = "Load AMLSim simulation output into a Neo4j property graph")]
struct Cli {
    /// Simulation configuration file (conf.json)
    conf_json: PathBuf,

    /// Drop all constraints and indexes before recreating them
    #[arg(long)]
    force: bool,

    /// Rows per write transaction (overrides neo4j.batch_size)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Bank id treated as internal (overrides neo4j.primary_bank)
    #[arg(long)]
    primary_bank: Option<String>,

    /// Neo4j connection properties file
    #[arg(long, default_value = DEFAULT_PROPERTIES_FILE)]
    properties: PathBuf,

    /// Chunks of one batch written concurrently (overrides neo4j.max_parallel_chunks)
    #[arg(long)]
    max_parallel_chunks: Option<usize>,

    /// Build the load plan and print it without connecting to Neo4j
    #[arg(long)]
    dry_run: bool,

    /// Skip the post-load integrity checks
    #[arg(long)]
    skip_validation: bool,

    /// Write the validation report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn run(cli: Cli) -> Result<()> {
    let options = ImportOptions {
        conf_json: cli.conf_json,
        properties: cli.properties,
        batch_size: cli.batch_size,
        primary_bank: cli.primary_bank,
        max_parallel_chunks: cli.max_parallel_chunks,
        force: cli.force,
        dry_run: cli.dry_run,
        skip_validation: cli.skip_validation,
        report: cli.report,
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .thread_name("amlgraph-worker")
        .enable_io()
        .enable_time()
        .build()?;
    rt.block_on(amlgraph::import::run_import(options))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
