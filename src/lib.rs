//! amlgraph: AMLSim simulation output to a Neo4j property graph
//!
//! Reads the CSV extracts an AMLSim run writes (accounts, transactions,
//! parties and the account-party mapping) and loads them into Neo4j as a
//! customer/account/transaction graph:
//!
//! 1. **Configuration** -- Simulation JSON plus a `neo4j.properties` overlay and
//!    CLI overrides
//! 2. **Extraction** -- Each CSV extract is read once into memory; a missing file
//!    becomes an empty table and a warning
//! 3. **Build** -- Strongly typed entity and relationship records, deduplicated
//!    by natural key, with unresolved endpoints counted rather than fatal
//! 4. **Load** -- Dependency-ordered batches split into chunks, each chunk one
//!    idempotent `MERGE` transaction; the first failing chunk aborts the run
//! 5. **Validate** -- Read-only integrity checks and an optional JSON report
//!
//! # Key Modules
//!
//! - [`config`] -- Defaults, simulation JSON and properties resolution
//! - [`source`] -- CSV extracts as header-keyed tables
//! - [`transform`] -- Dates, numbers, booleans and address normalization
//! - [`names`] -- Deterministic synthetic company names
//! - [`models`] -- Entity/relationship records and their upsert contracts
//! - [`nodes`] / [`edges`] -- Builders from extracts to record batches
//! - [`loader`] -- Load plan and chunked, fail-fast batch writer
//! - [`store`] -- The `GraphStore` seam and its Neo4j implementation
//! - [`schema`] -- Constraints and indexes
//! - [`validate`] -- Post-load integrity report
//! - [`stats`] -- Counts and warnings collected during a run
//! - [`import`] -- End-to-end orchestration
//!
//! # Example Usage
//!
//! ```bash
//! # Load a simulation with the default neo4j.properties
//! amlgraph paramFiles/conf.json -v
//!
//! # Recreate the schema, write 4 chunks at a time, keep the report
//! amlgraph conf.json --force --max-parallel-chunks 4 --report report.json
//!
//! # Show what would be written without connecting
//! amlgraph conf.json --dry-run
//! ```

pub mod config;
pub mod edges;
pub mod import;
pub mod loader;
pub mod models;
pub mod names;
pub mod nodes;
pub mod schema;
pub mod source;
pub mod stats;
pub mod store;
pub mod transform;
pub mod validate;
