use crate::config::LoaderConfig;
use crate::stats::RunStats;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// The simulator extracts consumed by the loader, keyed as in the simulation config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extract {
    Accounts,
    Transactions,
    PartyIndividuals,
    PartyOrganizations,
    AccountMapping,
}

impl Extract {
    pub const ALL: [Extract; 5] = [
        Extract::Accounts,
        Extract::Transactions,
        Extract::PartyIndividuals,
        Extract::PartyOrganizations,
        Extract::AccountMapping,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Extract::Accounts => "accounts",
            Extract::Transactions => "transactions",
            Extract::PartyIndividuals => "party_individuals",
            Extract::PartyOrganizations => "party_organizations",
            Extract::AccountMapping => "account_mapping",
        }
    }
}

/// A fully materialized CSV extract.
#[derive(Debug, Default)]
pub struct Table {
    columns: FxHashMap<String, usize>,
    rows: Vec<StringRecord>,
}

impl Table {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let columns = reader
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), i))
            .collect();

        let mut rows = Vec::new();
        for (line, result) in reader.records().enumerate() {
            let record = result.with_context(|| format!("Malformed CSV record {}", line + 1))?;
            rows.push(record);
        }

        Ok(Self { columns, rows })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open extract: {}", path.display()))?;
        Self::from_reader(BufReader::with_capacity(256 * 1024, file))
            .with_context(|| format!("Failed to parse extract: {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(move |row| Record { table: self, row })
    }
}

/// One row of a [`Table`], addressed by column name.
#[derive(Clone, Copy)]
pub struct Record<'a> {
    table: &'a Table,
    row: &'a StringRecord,
}

impl<'a> Record<'a> {
    /// Raw cell value; `None` when the column is absent from the extract or the row is short.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let idx = *self.table.columns.get(column)?;
        self.row.get(idx)
    }

    /// Trimmed cell value, empty when absent.
    pub fn field(&self, column: &str) -> &'a str {
        self.get(column).map(str::trim).unwrap_or("")
    }

    /// Trimmed cell value, `default` only when the column itself is absent.
    pub fn field_or(&self, column: &str, default: &'a str) -> &'a str {
        self.get(column).map(str::trim).unwrap_or(default)
    }
}

/// Every extract the pipeline needs, read once per run.
#[derive(Debug, Default)]
pub struct Sources {
    pub accounts: Table,
    pub transactions: Table,
    pub individuals: Table,
    pub organizations: Table,
    pub mappings: Table,
}

impl Sources {
    pub fn load(config: &LoaderConfig, stats: &mut RunStats) -> Result<Self> {
        let mut sources = Sources::default();
        for extract in Extract::ALL {
            let table = match config.csv_path(extract) {
                Some(path) if path.is_file() => {
                    let table = Table::from_path(&path)?;
                    info!(extract = extract.key(), rows = table.len(), "Loaded extract");
                    table
                }
                Some(path) => {
                    stats.warn(format!("CSV file not found: {}", path.display()));
                    Table::empty()
                }
                None => {
                    stats.warn(format!(
                        "No file configured for extract '{}'",
                        extract.key()
                    ));
                    Table::empty()
                }
            };
            *sources.table_mut(extract) = table;
        }
        Ok(sources)
    }

    fn table_mut(&mut self, extract: Extract) -> &mut Table {
        match extract {
            Extract::Accounts => &mut self.accounts,
            Extract::Transactions => &mut self.transactions,
            Extract::PartyIndividuals => &mut self.individuals,
            Extract::PartyOrganizations => &mut self.organizations,
            Extract::AccountMapping => &mut self.mappings,
        }
    }
}
