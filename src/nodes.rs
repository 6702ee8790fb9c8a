use crate::config::LoaderConfig;
use crate::models::{
    Account, Address, Company, Country, Customer, IdentityDocument, NodeRecord, Party, Person,
    Transaction,
};
use crate::names::company_name_for;
use crate::source::{Record, Sources};
use crate::stats::RunStats;
use crate::transform::{
    address_key, country_name, parse_bool, parse_float, parse_int, parse_timestamp, Transformer,
    NEVER_OFFSET,
};
use chrono::NaiveDateTime;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::hash::Hash;
use tracing::info;

/// Country assumed when an extract has no country column.
pub const DEFAULT_COUNTRY: &str = "US";

/// Inputs the builders need beyond the extracts themselves.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub base_date: NaiveDateTime,
    pub primary_bank: String,
    pub default_currency: String,
}

impl From<&LoaderConfig> for BuildSettings {
    fn from(config: &LoaderConfig) -> Self {
        Self {
            base_date: config.base_date,
            primary_bank: config.primary_bank.clone(),
            default_currency: config.default_currency.clone(),
        }
    }
}

/// Every deduplicated entity batch of one run.
#[derive(Debug, Default)]
pub struct NodeSet {
    pub countries: Vec<Country>,
    pub individuals: Vec<Customer>,
    pub organizations: Vec<Customer>,
    pub addresses: Vec<Address>,
    pub documents: Vec<IdentityDocument>,
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
}

impl NodeSet {
    pub fn internal_accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter().filter(|a| a.is_internal)
    }

    pub fn external_accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter().filter(|a| !a.is_internal)
    }

    pub fn flagged_accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter().filter(|a| a.flagged)
    }

    pub fn flagged_transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|t| t.flagged)
    }

    pub fn customers(&self) -> impl Iterator<Item = &Customer> {
        self.individuals.iter().chain(&self.organizations)
    }
}

/// Collapses items sharing a key, in first-seen order. `merge` folds each later
/// duplicate into the kept item.
pub(crate) fn dedup_by_key<T, K, F, M>(items: impl IntoIterator<Item = T>, key: F, merge: M) -> Vec<T>
where
    K: Hash + Eq,
    F: Fn(&T) -> K,
    M: Fn(&mut T, T),
{
    let mut kept: Vec<T> = Vec::new();
    let mut index: FxHashMap<K, usize> = FxHashMap::default();
    for item in items {
        let k = key(&item);
        match index.get(&k) {
            Some(&i) => merge(&mut kept[i], item),
            None => {
                index.insert(k, kept.len());
                kept.push(item);
            }
        }
    }
    kept
}

fn dedup_nodes<T: NodeRecord>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    dedup_by_key(items, |n| n.key().to_string(), |kept, later| kept.absorb(later))
}

/// Flag derived from `prior_sar_count`: a count is flagged when non-zero,
/// anything else follows the boolean rule.
pub fn account_flag(raw: Option<&str>) -> bool {
    match raw {
        Some(value) => match parse_int(value) {
            Some(count) => count != 0,
            None => parse_bool(value),
        },
        None => false,
    }
}

/// `alert_id` with the `-1` sentinel (and blanks) mapped to no alert.
pub fn alert_id(raw: &str) -> Option<i64> {
    parse_int(raw).filter(|&id| id != -1)
}

/// Street, city and postcode of a row, when all three are present.
pub(crate) fn address_parts<'a>(row: &Record<'a>) -> Option<(&'a str, &'a str, &'a str)> {
    let street = row.field("street_addr");
    let city = row.field("city");
    let postcode = row.field("zip");
    if street.is_empty() || city.is_empty() || postcode.is_empty() {
        return None;
    }
    Some((street, city, postcode))
}

/// Builds every entity batch from the extracts.
pub fn build_nodes(sources: &Sources, settings: &BuildSettings, stats: &mut RunStats) -> NodeSet {
    let transformer = Transformer::new(settings.base_date);

    let nodes = NodeSet {
        countries: build_countries(sources),
        individuals: build_individuals(sources, stats),
        organizations: build_organizations(sources, stats),
        addresses: build_addresses(sources, &transformer),
        documents: build_documents(sources, &transformer),
        accounts: build_accounts(sources, &transformer, settings, stats),
        transactions: build_transactions(sources, settings, stats),
    };

    stats.add_nodes("Country", nodes.countries.len() as u64);
    stats.add_nodes("Customer:Individual", nodes.individuals.len() as u64);
    stats.add_nodes("Customer:Organization", nodes.organizations.len() as u64);
    stats.add_nodes("Address", nodes.addresses.len() as u64);
    stats.add_nodes("SSN", nodes.documents.len() as u64);
    stats.add_nodes("Account", nodes.accounts.len() as u64);
    stats.add_nodes("Account:Internal", nodes.internal_accounts().count() as u64);
    stats.add_nodes("Account:External", nodes.external_accounts().count() as u64);
    stats.add_nodes("Account:SARAccount", nodes.flagged_accounts().count() as u64);
    stats.add_nodes("Transaction", nodes.transactions.len() as u64);
    stats.add_nodes(
        "Transaction:SARTransaction",
        nodes.flagged_transactions().count() as u64,
    );

    let skipped: Vec<(String, u64)> = stats
        .skipped_rows()
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(label, n)| (label.clone(), *n))
        .collect();
    for (label, n) in skipped {
        stats.warn(format!("Skipped {n} {label} rows without an identifier"));
    }

    info!(
        countries = nodes.countries.len(),
        customers = nodes.individuals.len() + nodes.organizations.len(),
        addresses = nodes.addresses.len(),
        accounts = nodes.accounts.len(),
        transactions = nodes.transactions.len(),
        "Entities built"
    );
    nodes
}

fn build_countries(sources: &Sources) -> Vec<Country> {
    let mut codes = BTreeSet::new();
    for row in sources.accounts.records() {
        let code = row.field_or("country", DEFAULT_COUNTRY);
        if !code.is_empty() {
            codes.insert(code);
        }
    }
    for row in sources.individuals.records() {
        let code = row.field_or("nationality", DEFAULT_COUNTRY);
        if !code.is_empty() {
            codes.insert(code);
        }
    }
    codes
        .into_iter()
        .map(|code| Country {
            code: code.to_string(),
            name: country_name(code),
        })
        .collect()
}

/// Account rows reachable from a customer id through the account mapping.
struct CustomerAccounts<'a> {
    account_of: FxHashMap<&'a str, &'a str>,
    rows: FxHashMap<&'a str, Record<'a>>,
}

impl<'a> CustomerAccounts<'a> {
    fn new(sources: &'a Sources) -> Self {
        let mut account_of = FxHashMap::default();
        for row in sources.mappings.records() {
            let cust = row.field("cust_id");
            let acct = row.field("acct_id");
            if !cust.is_empty() && !acct.is_empty() {
                account_of.insert(cust, acct);
            }
        }
        let mut rows = FxHashMap::default();
        for row in sources.accounts.records() {
            let acct = row.field("acct_id");
            if !acct.is_empty() {
                rows.insert(acct, row);
            }
        }
        Self { account_of, rows }
    }

    fn for_customer(&self, customer_id: &str) -> Option<&Record<'a>> {
        self.account_of
            .get(customer_id)
            .and_then(|acct| self.rows.get(acct))
    }
}

fn build_individuals(sources: &Sources, stats: &mut RunStats) -> Vec<Customer> {
    let lookup = CustomerAccounts::new(sources);
    let mut customers = Vec::with_capacity(sources.individuals.len());

    for row in sources.individuals.records() {
        let party_id = row.field("partyId");
        if party_id.is_empty() {
            stats.inc_skipped_row("Customer:Individual");
            continue;
        }
        let account = lookup.for_customer(party_id);
        let from_account = |column: &str| {
            account
                .map(|r| r.field(column).to_string())
                .unwrap_or_default()
        };

        customers.push(Customer {
            id: party_id.to_string(),
            party: Party::Individual(Person {
                first_name: from_account("first_name"),
                last_name: from_account("last_name"),
                middle_name: String::new(),
                nationality: row.field_or("nationality", DEFAULT_COUNTRY).to_string(),
                gender: from_account("gender"),
                birth_date: account
                    .and_then(|r| parse_timestamp(r.field("birth_date")))
                    .map(|ts| ts.date()),
            }),
        });
    }
    dedup_nodes(customers)
}

fn build_organizations(sources: &Sources, stats: &mut RunStats) -> Vec<Customer> {
    let mut customers = Vec::with_capacity(sources.organizations.len());
    for row in sources.organizations.records() {
        let party_id = row.field("partyId");
        if party_id.is_empty() {
            stats.inc_skipped_row("Customer:Organization");
            continue;
        }
        let name = company_name_for(party_id);
        customers.push(Customer {
            id: party_id.to_string(),
            party: Party::Organization(Company {
                legal_name: name.clone(),
                name,
            }),
        });
    }
    dedup_nodes(customers)
}

fn build_addresses(sources: &Sources, transformer: &Transformer) -> Vec<Address> {
    let addresses = sources.accounts.records().filter_map(|row| {
        let (street, city, postcode) = address_parts(&row)?;
        Some(Address {
            hash: address_key(street, city, postcode),
            line1: street.to_string(),
            town: city.to_string(),
            postcode: postcode.to_string(),
            region: row.field("state").to_string(),
            country: row.field_or("country", DEFAULT_COUNTRY).to_string(),
            latitude: parse_float(row.field("lat")),
            longitude: parse_float(row.field("lon")),
            created_at: transformer.base_date(),
        })
    });
    dedup_nodes(addresses)
}

fn build_documents(sources: &Sources, transformer: &Transformer) -> Vec<IdentityDocument> {
    let documents = sources.accounts.records().filter_map(|row| {
        let ssn = row.field("ssn");
        (!ssn.is_empty()).then(|| IdentityDocument {
            number: ssn.to_string(),
            created_at: transformer.base_date(),
        })
    });
    dedup_nodes(documents)
}

fn build_accounts(
    sources: &Sources,
    transformer: &Transformer,
    settings: &BuildSettings,
    stats: &mut RunStats,
) -> Vec<Account> {
    let never = NEVER_OFFSET.to_string();
    let mut accounts = Vec::with_capacity(sources.accounts.len());

    for row in sources.accounts.records() {
        let number = row.field("acct_id");
        if number.is_empty() {
            stats.inc_skipped_row("Account");
            continue;
        }
        let bank_id = row.field_or("bank_id", &settings.primary_bank);

        accounts.push(Account {
            number: number.to_string(),
            account_type: row.field_or("type", "SAV").to_string(),
            open_date: transformer.days_to_datetime(row.field_or("open_dt", "0")),
            closed_date: transformer.days_to_datetime(row.field_or("close_dt", &never)),
            tx_behavior_id: parse_int(row.field("tx_behavior_id")),
            initial_deposit: parse_float(row.field("initial_deposit")),
            branch_id: parse_int(row.field("branch_id")),
            bank_id: bank_id.to_string(),
            country: row.field_or("country", DEFAULT_COUNTRY).to_string(),
            is_internal: bank_id == settings.primary_bank,
            flagged: account_flag(row.get("prior_sar_count")),
        });
    }
    dedup_nodes(accounts)
}

fn build_transactions(
    sources: &Sources,
    settings: &BuildSettings,
    stats: &mut RunStats,
) -> Vec<Transaction> {
    let mut transactions = Vec::with_capacity(sources.transactions.len());

    for row in sources.transactions.records() {
        let id = row.field("tran_id");
        if id.is_empty() {
            stats.inc_skipped_row("Transaction");
            continue;
        }
        transactions.push(Transaction {
            id: id.to_string(),
            amount: parse_float(row.field("base_amt")),
            currency: settings.default_currency.clone(),
            date: parse_timestamp(row.field("tran_timestamp")),
            tx_type: row.field("tx_type").to_string(),
            flagged: parse_bool(row.field("is_sar")),
            alert_id: alert_id(row.field("alert_id")),
        });
    }
    dedup_nodes(transactions)
}
