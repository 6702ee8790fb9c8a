use crate::source::Extract;
use crate::transform::parse_timestamp;
use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Default Neo4j Bolt URI
pub const DEFAULT_BOLT_URI: &str = "bolt://localhost:7687";

pub const DEFAULT_USER: &str = "neo4j";
pub const DEFAULT_PASSWORD: &str = "password";
pub const DEFAULT_DATABASE: &str = "neo4j";

/// Properties file read when `--properties` is not given
pub const DEFAULT_PROPERTIES_FILE: &str = "neo4j.properties";

/// Rows per write transaction
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Bank identifier whose accounts are labelled Internal
pub const DEFAULT_PRIMARY_BANK: &str = "bank";

pub const DEFAULT_CURRENCY: &str = "USD";

/// Chunks of one batch written concurrently (1 = sequential)
pub const DEFAULT_MAX_PARALLEL_CHUNKS: usize = 1;

/// Bolt connection pool size
pub const DEFAULT_MAX_CONNECTIONS: usize = 8;

pub const DEFAULT_SIMULATION_NAME: &str = "sample";
pub const DEFAULT_BASE_DATE: &str = "2017-01-01";
pub const DEFAULT_OUTPUT_DIRECTORY: &str = "outputs";

/// Max connection attempts when probing Neo4j at startup
pub const IMPORT_MAX_RETRIES: u32 = 30;

/// Delay between connection retries
pub const IMPORT_RETRY_DELAY_SECS: u64 = 2;

/// How long to wait for indexes to come online
pub const INDEX_ONLINE_TIMEOUT_SECS: u64 = 300;

pub const INDEX_POLL_INTERVAL_SECS: u64 = 2;

/// Flagged transactions listed in the validation report
pub const SAR_SAMPLE_LIMIT: i64 = 5;

#[derive(Debug, Default, Deserialize)]
struct SimulationFile {
    #[serde(default)]
    general: GeneralSection,
    #[serde(default)]
    output: OutputSection,
}

#[derive(Debug, Deserialize)]
struct GeneralSection {
    #[serde(default = "default_simulation_name")]
    simulation_name: String,
    #[serde(default = "default_base_date")]
    base_date: String,
}

impl Default for GeneralSection {
    fn default() -> Self {
        Self {
            simulation_name: default_simulation_name(),
            base_date: default_base_date(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OutputSection {
    #[serde(default = "default_output_directory")]
    directory: String,
    #[serde(flatten)]
    files: BTreeMap<String, serde_json::Value>,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            files: BTreeMap::new(),
        }
    }
}

fn default_simulation_name() -> String {
    DEFAULT_SIMULATION_NAME.to_string()
}

fn default_base_date() -> String {
    DEFAULT_BASE_DATE.to_string()
}

fn default_output_directory() -> String {
    DEFAULT_OUTPUT_DIRECTORY.to_string()
}

/// Flat `key=value` store read from an INI-style properties file.
///
/// Section headers are ignored, so `[neo4j]\nneo4j.uri=...` and a bare
/// `neo4j.uri=...` are equivalent. Keys are lowercased.
#[derive(Debug, Default, Clone)]
pub struct Properties {
    values: FxHashMap<String, String>,
}

impl Properties {
    pub fn parse(text: &str) -> Self {
        let mut values = FxHashMap::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                continue;
            }
            let split = match (line.find('='), line.find(':')) {
                (Some(eq), Some(colon)) => Some(eq.min(colon)),
                (eq, colon) => eq.or(colon),
            };
            if let Some(idx) = split {
                let key = line[..idx].trim().to_lowercase();
                let value = line[idx + 1..].trim().to_string();
                if !key.is_empty() {
                    values.insert(key, value);
                }
            }
        }
        Self { values }
    }

    /// Reads the file, or returns `None` when it does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read properties file: {}", path.display()))?;
        Ok(Some(Self::parse(&text)))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// True iff the value lowercases to `true`.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) => v.to_lowercase() == "true",
            None => default,
        }
    }

    pub fn get_parsed<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid value for {key}: {raw:?} ({e})")),
            None => Ok(default),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Bolt connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: usize,
}

/// Everything a run needs, resolved from the simulation JSON, the properties
/// overlay and CLI overrides (in increasing precedence).
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub sim_name: String,
    pub base_date_str: String,
    pub base_date: NaiveDateTime,
    pub output_dir: PathBuf,
    output_files: BTreeMap<String, String>,
    pub store: StoreSettings,
    pub batch_size: usize,
    pub primary_bank: String,
    pub default_currency: String,
    pub create_constraints: bool,
    pub create_indexes: bool,
    pub max_parallel_chunks: usize,
}

impl LoaderConfig {
    pub fn load(
        conf_json: &Path,
        properties: &Path,
        batch_size: Option<usize>,
        primary_bank: Option<String>,
    ) -> Result<Self> {
        let text = fs::read_to_string(conf_json)
            .with_context(|| format!("Failed to read simulation config: {}", conf_json.display()))?;
        let sim: SimulationFile = serde_json::from_str(&text)
            .with_context(|| format!("Invalid simulation config: {}", conf_json.display()))?;

        let props = match Properties::load(properties)? {
            Some(props) => {
                info!(path = %properties.display(), keys = props.len(), "Loaded properties");
                props
            }
            None => {
                warn!(
                    "Properties file not found: {}, using defaults",
                    properties.display()
                );
                Properties::default()
            }
        };

        Self::resolve(sim, &props, batch_size, primary_bank)
    }

    fn resolve(
        sim: SimulationFile,
        props: &Properties,
        batch_size: Option<usize>,
        primary_bank: Option<String>,
    ) -> Result<Self> {
        let base_date = parse_timestamp(&sim.general.base_date)
            .with_context(|| format!("Unparseable base_date: {:?}", sim.general.base_date))?;

        let output_dir = Path::new(&sim.output.directory).join(&sim.general.simulation_name);
        let output_files = sim
            .output
            .files
            .into_iter()
            .filter_map(|(key, value)| value.as_str().map(|file| (key, file.to_string())))
            .collect();

        let batch_size = match batch_size {
            Some(n) => n,
            None => props.get_parsed("neo4j.batch_size", DEFAULT_BATCH_SIZE)?,
        };
        if batch_size == 0 {
            bail!("Batch size must be greater than zero");
        }

        let max_parallel_chunks =
            props.get_parsed("neo4j.max_parallel_chunks", DEFAULT_MAX_PARALLEL_CHUNKS)?;
        if max_parallel_chunks == 0 {
            bail!("neo4j.max_parallel_chunks must be greater than zero");
        }

        let store = StoreSettings {
            uri: props.get_or("neo4j.uri", DEFAULT_BOLT_URI).to_string(),
            user: props.get_or("neo4j.user", DEFAULT_USER).to_string(),
            password: props.get_or("neo4j.password", DEFAULT_PASSWORD).to_string(),
            database: props.get_or("neo4j.database", DEFAULT_DATABASE).to_string(),
            max_connections: props
                .get_parsed("neo4j.max_connections", DEFAULT_MAX_CONNECTIONS)?,
        };

        Ok(Self {
            sim_name: sim.general.simulation_name,
            base_date_str: sim.general.base_date,
            base_date,
            output_dir,
            output_files,
            store,
            batch_size,
            primary_bank: primary_bank.unwrap_or_else(|| {
                props
                    .get_or("neo4j.primary_bank", DEFAULT_PRIMARY_BANK)
                    .to_string()
            }),
            default_currency: props
                .get_or("neo4j.default_currency", DEFAULT_CURRENCY)
                .to_string(),
            create_constraints: props.get_bool("neo4j.create_constraints", true),
            create_indexes: props.get_bool("neo4j.create_indexes", true),
            max_parallel_chunks,
        })
    }

    /// Path of an extract, or `None` when the simulation config names no file for it.
    pub fn csv_path(&self, extract: Extract) -> Option<PathBuf> {
        self.output_files
            .get(extract.key())
            .filter(|file| !file.is_empty())
            .map(|file| self.output_dir.join(file))
    }

    pub fn log_summary(&self) {
        info!(
            simulation = %self.sim_name,
            base_date = %self.base_date_str,
            output_dir = %self.output_dir.display(),
            "Simulation"
        );
        info!(
            uri = %self.store.uri,
            database = %self.store.database,
            max_connections = self.store.max_connections,
            "Neo4j"
        );
        info!(
            batch_size = self.batch_size,
            max_parallel_chunks = self.max_parallel_chunks,
            primary_bank = %self.primary_bank,
            currency = %self.default_currency,
            "Loading"
        );
    }
}
