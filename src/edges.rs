use crate::models::{
    Credits, EdgeRecord, HasAddress, HasIdentityDocument, HasNationality, HostedIn, LocatedIn,
    NodeRecord, Originates, OwnsAccount,
};
use crate::nodes::{address_parts, dedup_by_key, BuildSettings, NodeSet};
use crate::source::Sources;
use crate::stats::RunStats;
use crate::transform::address_key;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::info;

pub const VERIFICATION_METHOD: &str = "SYSTEM_GENERATED";
pub const VERIFICATION_STATUS: &str = "VERIFIED";

/// Every deduplicated relationship batch of one run.
#[derive(Debug, Default)]
pub struct EdgeSet {
    pub owns_account: Vec<OwnsAccount>,
    pub has_address: Vec<HasAddress>,
    pub located_in: Vec<LocatedIn>,
    pub hosted_in: Vec<HostedIn>,
    pub has_nationality: Vec<HasNationality>,
    pub has_identity_document: Vec<HasIdentityDocument>,
    pub originates: Vec<Originates>,
    pub credits: Vec<Credits>,
}

/// Natural keys of every built entity, plus the account -> customer mapping.
struct KeyIndex<'a> {
    customers: FxHashSet<&'a str>,
    accounts: FxHashSet<&'a str>,
    addresses: FxHashSet<&'a str>,
    documents: FxHashSet<&'a str>,
    countries: FxHashSet<&'a str>,
    transactions: FxHashSet<&'a str>,
    customer_of: FxHashMap<&'a str, &'a str>,
}

impl<'a> KeyIndex<'a> {
    fn new(sources: &'a Sources, nodes: &'a NodeSet) -> Self {
        let mut customer_of = FxHashMap::default();
        for row in sources.mappings.records() {
            let acct = row.field("acct_id");
            let cust = row.field("cust_id");
            if !acct.is_empty() && !cust.is_empty() {
                customer_of.insert(acct, cust);
            }
        }
        Self {
            customers: nodes.customers().map(|c| c.key()).collect(),
            accounts: nodes.accounts.iter().map(|a| a.key()).collect(),
            addresses: nodes.addresses.iter().map(|a| a.key()).collect(),
            documents: nodes.documents.iter().map(|d| d.key()).collect(),
            countries: nodes.countries.iter().map(|c| c.key()).collect(),
            transactions: nodes.transactions.iter().map(|t| t.key()).collect(),
            customer_of,
        }
    }

    /// Customer owning `account`, if mapped and built.
    fn owner(&self, account: &str) -> Option<&'a str> {
        self.customer_of
            .get(account)
            .copied()
            .filter(|cust| self.customers.contains(cust))
    }
}

/// Tracks kept edges and skipped rows for one relationship type.
struct Collector<E: EdgeRecord> {
    edges: Vec<E>,
    skipped: u64,
}

impl<E: EdgeRecord> Collector<E> {
    fn new() -> Self {
        Self {
            edges: Vec::new(),
            skipped: 0,
        }
    }

    fn push(&mut self, edge: Option<E>) {
        match edge {
            Some(e) => self.edges.push(e),
            None => self.skipped += 1,
        }
    }

    fn finish(self, stats: &mut RunStats) -> Vec<E> {
        let rel_type = E::SPEC.rel_type;
        let edges = dedup_by_key(
            self.edges,
            |e| (e.from_key().to_string(), e.to_key().to_string()),
            |kept, later| kept.absorb(later),
        );
        stats.add_relationships(rel_type, edges.len() as u64);
        if self.skipped > 0 {
            stats.add_skipped(rel_type, self.skipped);
            stats.warn(format!(
                "Skipped {} {rel_type} relationships with an unresolved endpoint",
                self.skipped
            ));
        }
        edges
    }
}

/// Joins the entity batches into relationship batches. Rows whose endpoint was
/// never built are skipped and counted per relationship type.
pub fn build_edges(
    sources: &Sources,
    nodes: &NodeSet,
    settings: &BuildSettings,
    stats: &mut RunStats,
) -> EdgeSet {
    let index = KeyIndex::new(sources, nodes);
    let base = settings.base_date;

    let mut owns = Collector::new();
    for row in sources.mappings.records() {
        let cust = row.field("cust_id");
        let acct = row.field("acct_id");
        let resolved = index.customers.contains(cust) && index.accounts.contains(acct);
        owns.push(resolved.then(|| OwnsAccount {
            customer_id: cust.to_string(),
            account_number: acct.to_string(),
            role: row.field_or("cust_acct_role", "Primary").to_string(),
            since: base,
        }));
    }

    let mut has_address = Collector::new();
    let mut has_document = Collector::new();
    for row in sources.accounts.records() {
        let acct = row.field("acct_id");
        let owner = index.owner(acct);

        if let Some((street, city, postcode)) = address_parts(&row) {
            let hash = address_key(street, city, postcode);
            let edge = owner
                .filter(|_| index.addresses.contains(hash.as_str()))
                .map(|cust| HasAddress {
                    customer_id: cust.to_string(),
                    address_hash: hash.clone(),
                    added_at: base,
                    last_changed_at: base,
                    is_current: true,
                });
            has_address.push(edge);
        }

        let ssn = row.field("ssn");
        if !ssn.is_empty() {
            let edge = owner
                .filter(|_| index.documents.contains(ssn))
                .map(|cust| HasIdentityDocument {
                    customer_id: cust.to_string(),
                    document_number: ssn.to_string(),
                    verification_date: base,
                    verification_method: VERIFICATION_METHOD,
                    verification_status: VERIFICATION_STATUS,
                });
            has_document.push(edge);
        }
    }

    let mut located_in = Collector::new();
    for address in &nodes.addresses {
        let known = index.countries.contains(address.country.as_str());
        located_in.push(known.then(|| LocatedIn {
            address_hash: address.hash.clone(),
            country_code: address.country.clone(),
        }));
    }

    let mut hosted_in = Collector::new();
    for account in &nodes.accounts {
        let known = index.countries.contains(account.country.as_str());
        hosted_in.push(known.then(|| HostedIn {
            account_number: account.number.clone(),
            country_code: account.country.clone(),
        }));
    }

    let mut nationality = Collector::new();
    for customer in &nodes.individuals {
        let Some(person) = customer.person() else {
            continue;
        };
        let known = index.countries.contains(person.nationality.as_str());
        nationality.push(known.then(|| HasNationality {
            customer_id: customer.id.clone(),
            country_code: person.nationality.clone(),
        }));
    }

    let mut originates = Collector::new();
    let mut credits = Collector::new();
    for row in sources.transactions.records() {
        let tx = row.field("tran_id");
        let tx_known = index.transactions.contains(tx);

        let orig = row.field("orig_acct");
        originates.push((tx_known && index.accounts.contains(orig)).then(|| Originates {
            account_number: orig.to_string(),
            transaction_id: tx.to_string(),
        }));

        let bene = row.field("bene_acct");
        credits.push((tx_known && index.accounts.contains(bene)).then(|| Credits {
            transaction_id: tx.to_string(),
            account_number: bene.to_string(),
        }));
    }

    let edges = EdgeSet {
        owns_account: owns.finish(stats),
        has_address: has_address.finish(stats),
        located_in: located_in.finish(stats),
        hosted_in: hosted_in.finish(stats),
        has_nationality: nationality.finish(stats),
        has_identity_document: has_document.finish(stats),
        originates: originates.finish(stats),
        credits: credits.finish(stats),
    };

    info!(
        owns_account = edges.owns_account.len(),
        originates = edges.originates.len(),
        credits = edges.credits.len(),
        "Relationships built"
    );
    edges
}
