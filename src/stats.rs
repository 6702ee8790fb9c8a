use std::collections::BTreeMap;
use tracing::warn;

/// Counts and warnings collected while building and loading the graph.
///
/// Passed explicitly through the pipeline so a run can be inspected without
/// capturing log output.
#[derive(Debug, Default, Clone)]
pub struct RunStats {
    nodes: BTreeMap<String, u64>,
    relationships: BTreeMap<String, u64>,
    skipped_relationships: BTreeMap<String, u64>,
    skipped_rows: BTreeMap<String, u64>,
    rows_written: u64,
    chunks_written: u64,
    warnings: Vec<String>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_nodes(&mut self, label: &str, count: u64) {
        *self.nodes.entry(label.to_string()).or_default() += count;
    }

    pub fn add_relationships(&mut self, rel_type: &str, count: u64) {
        *self.relationships.entry(rel_type.to_string()).or_default() += count;
    }

    pub fn add_skipped(&mut self, rel_type: &str, count: u64) {
        *self
            .skipped_relationships
            .entry(rel_type.to_string())
            .or_default() += count;
    }

    pub fn inc_skipped_row(&mut self, label: &str) {
        *self.skipped_rows.entry(label.to_string()).or_default() += 1;
    }

    pub fn add_written(&mut self, rows: u64, chunks: u64) {
        self.rows_written += rows;
        self.chunks_written += chunks;
    }

    /// Records a non-fatal problem and logs it.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.warnings.push(message);
    }

    pub fn nodes(&self) -> &BTreeMap<String, u64> {
        &self.nodes
    }

    pub fn relationships(&self) -> &BTreeMap<String, u64> {
        &self.relationships
    }

    pub fn skipped_relationships(&self) -> &BTreeMap<String, u64> {
        &self.skipped_relationships
    }

    pub fn skipped_rows(&self) -> &BTreeMap<String, u64> {
        &self.skipped_rows
    }

    pub fn node_count(&self, label: &str) -> u64 {
        self.nodes.get(label).copied().unwrap_or(0)
    }

    pub fn relationship_count(&self, rel_type: &str) -> u64 {
        self.relationships.get(rel_type).copied().unwrap_or(0)
    }

    pub fn skipped(&self, rel_type: &str) -> u64 {
        self.skipped_relationships
            .get(rel_type)
            .copied()
            .unwrap_or(0)
    }

    pub fn skipped_rows_for(&self, label: &str) -> u64 {
        self.skipped_rows.get(label).copied().unwrap_or(0)
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn chunks_written(&self) -> u64 {
        self.chunks_written
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_zero() {
        let stats = RunStats::new();
        assert_eq!(stats.node_count("Account"), 0);
        assert_eq!(stats.relationship_count("PERFORMS"), 0);
        assert_eq!(stats.skipped("PERFORMS"), 0);
        assert_eq!(stats.skipped_rows_for("Account"), 0);
        assert_eq!(stats.rows_written(), 0);
        assert!(stats.warnings().is_empty());
    }

    #[test]
    fn counts_accumulate_per_key() {
        let mut stats = RunStats::new();
        stats.add_nodes("Account", 5);
        stats.add_nodes("Account", 3);
        stats.add_nodes("Country", 2);
        stats.add_relationships("IS_HOSTED", 8);
        assert_eq!(stats.node_count("Account"), 8);
        assert_eq!(stats.node_count("Country"), 2);
        assert_eq!(stats.relationship_count("IS_HOSTED"), 8);
    }

    #[test]
    fn skips_are_tracked_separately() {
        let mut stats = RunStats::new();
        stats.add_skipped("PERFORMS", 1);
        stats.add_skipped("PERFORMS", 1);
        stats.add_skipped("BENEFITS_TO", 7);
        stats.inc_skipped_row("Transaction");
        assert_eq!(stats.skipped("PERFORMS"), 2);
        assert_eq!(stats.skipped("BENEFITS_TO"), 7);
        assert_eq!(stats.skipped_rows_for("Transaction"), 1);
        assert_eq!(stats.relationship_count("PERFORMS"), 0);
    }

    #[test]
    fn warnings_are_kept_in_order() {
        let mut stats = RunStats::new();
        stats.warn("first");
        stats.warn(String::from("second"));
        assert_eq!(stats.warnings(), &["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn written_totals() {
        let mut stats = RunStats::new();
        stats.add_written(10, 2);
        stats.add_written(5, 1);
        assert_eq!(stats.rows_written(), 15);
        assert_eq!(stats.chunks_written(), 3);
    }

    #[test]
    fn maps_iterate_sorted() {
        let mut stats = RunStats::new();
        stats.add_nodes("Transaction", 1);
        stats.add_nodes("Account", 1);
        let labels: Vec<_> = stats.nodes().keys().cloned().collect();
        assert_eq!(labels, vec!["Account", "Transaction"]);
    }
}
