use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

/// A property value as sent to the graph store.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Str(v.clone())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Property map for one node or relationship.
pub type Row = BTreeMap<String, Value>;

/// Builds a [`Row`] from `key => value` pairs.
#[macro_export]
macro_rules! row {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut row = $crate::models::Row::new();
        $(row.insert($key.to_string(), $crate::models::Value::from($value));)*
        row
    }};
}

/// Upsert contract for a node type.
///
/// `on_create` fields are written only when the node is first created;
/// `always` fields are overwritten on every load.
#[derive(Debug, PartialEq, Eq)]
pub struct NodeSpec {
    pub label: &'static str,
    pub extra_labels: &'static [&'static str],
    pub key: &'static str,
    pub on_create: &'static [&'static str],
    pub always: &'static [&'static str],
}

/// Upsert contract for a relationship type. Rows carry the endpoint keys in
/// `from` and `to`.
#[derive(Debug, PartialEq, Eq)]
pub struct EdgeSpec {
    pub rel_type: &'static str,
    pub from: &'static NodeSpec,
    pub to: &'static NodeSpec,
    pub on_create: &'static [&'static str],
    pub always: &'static [&'static str],
}

pub const COUNTRY: NodeSpec = NodeSpec {
    label: "Country",
    extra_labels: &[],
    key: "code",
    on_create: &["name"],
    always: &[],
};

pub const INDIVIDUAL: NodeSpec = NodeSpec {
    label: "Customer",
    extra_labels: &["Individual"],
    key: "customerId",
    on_create: &[],
    always: &[
        "partyType",
        "firstName",
        "lastName",
        "middleName",
        "nationality",
        "gender",
        "birthDate",
    ],
};

pub const ORGANIZATION: NodeSpec = NodeSpec {
    label: "Customer",
    extra_labels: &["Organization"],
    key: "customerId",
    on_create: &[],
    always: &["partyType", "name", "legalName"],
};

pub const ADDRESS: NodeSpec = NodeSpec {
    label: "Address",
    extra_labels: &[],
    key: "addressHash",
    on_create: &[
        "addressLine1",
        "postTown",
        "postCode",
        "region",
        "country",
        "latitude",
        "longitude",
        "createdAt",
    ],
    always: &[],
};

pub const SSN: NodeSpec = NodeSpec {
    label: "SSN",
    extra_labels: &[],
    key: "ssnNumber",
    on_create: &["createdAt"],
    always: &[],
};

pub const ACCOUNT: NodeSpec = NodeSpec {
    label: "Account",
    extra_labels: &[],
    key: "accountNumber",
    on_create: &[],
    always: &[
        "accountType",
        "openDate",
        "closedDate",
        "tx_behavior_id",
        "prior_sar_count",
        "initial_deposit",
        "branch_id",
        "bank_id",
        "country",
        "isInternal",
        "isSAR",
    ],
};

pub const TRANSACTION: NodeSpec = NodeSpec {
    label: "Transaction",
    extra_labels: &[],
    key: "transactionId",
    on_create: &[],
    always: &["amount", "currency", "date", "type", "is_sar", "alert_id"],
};

/// Customer endpoint for relationships; matches both customer variants.
pub const CUSTOMER: NodeSpec = NodeSpec {
    label: "Customer",
    extra_labels: &[],
    key: "customerId",
    on_create: &[],
    always: &[],
};

pub const HAS_ACCOUNT: EdgeSpec = EdgeSpec {
    rel_type: "HAS_ACCOUNT",
    from: &CUSTOMER,
    to: &ACCOUNT,
    on_create: &[],
    always: &["role", "since"],
};

pub const HAS_ADDRESS: EdgeSpec = EdgeSpec {
    rel_type: "HAS_ADDRESS",
    from: &CUSTOMER,
    to: &ADDRESS,
    on_create: &[],
    always: &["addedAt", "lastChangedAt", "isCurrent"],
};

pub const LOCATED_IN: EdgeSpec = EdgeSpec {
    rel_type: "LOCATED_IN",
    from: &ADDRESS,
    to: &COUNTRY,
    on_create: &[],
    always: &[],
};

pub const IS_HOSTED: EdgeSpec = EdgeSpec {
    rel_type: "IS_HOSTED",
    from: &ACCOUNT,
    to: &COUNTRY,
    on_create: &[],
    always: &[],
};

pub const HAS_NATIONALITY: EdgeSpec = EdgeSpec {
    rel_type: "HAS_NATIONALITY",
    from: &CUSTOMER,
    to: &COUNTRY,
    on_create: &[],
    always: &[],
};

pub const HAS_SSN: EdgeSpec = EdgeSpec {
    rel_type: "HAS_SSN",
    from: &CUSTOMER,
    to: &SSN,
    on_create: &[],
    always: &["verificationDate", "verificationMethod", "verificationStatus"],
};

pub const PERFORMS: EdgeSpec = EdgeSpec {
    rel_type: "PERFORMS",
    from: &ACCOUNT,
    to: &TRANSACTION,
    on_create: &[],
    always: &[],
};

pub const BENEFITS_TO: EdgeSpec = EdgeSpec {
    rel_type: "BENEFITS_TO",
    from: &TRANSACTION,
    to: &ACCOUNT,
    on_create: &[],
    always: &[],
};

pub const INTERNAL_LABEL: &str = "Internal";
pub const EXTERNAL_LABEL: &str = "External";
pub const SAR_ACCOUNT_LABEL: &str = "SARAccount";
pub const SAR_TRANSACTION_LABEL: &str = "SARTransaction";

/// A typed node ready to be upserted.
pub trait NodeRecord {
    fn spec(&self) -> &'static NodeSpec;

    fn key(&self) -> &str;

    /// Folds a later duplicate into this record: create-only fields keep their
    /// first value, always-set fields take the later one.
    fn absorb(&mut self, later: Self)
    where
        Self: Sized;

    fn to_row(&self) -> Row;
}

/// A typed relationship ready to be upserted.
pub trait EdgeRecord {
    const SPEC: &'static EdgeSpec;

    fn from_key(&self) -> &str;

    fn to_key(&self) -> &str;

    fn properties(&self) -> Row {
        Row::new()
    }

    /// Relationship properties are all always-set, so the later duplicate wins.
    fn absorb(&mut self, later: Self)
    where
        Self: Sized,
    {
        *self = later;
    }

    fn to_row(&self) -> Row {
        let mut row = self.properties();
        row.insert("from".to_string(), Value::from(self.from_key()));
        row.insert("to".to_string(), Value::from(self.to_key()));
        row
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Country {
    pub code: String,
    pub name: String,
}

impl NodeRecord for Country {
    fn spec(&self) -> &'static NodeSpec {
        &COUNTRY
    }

    fn key(&self) -> &str {
        &self.code
    }

    fn absorb(&mut self, _later: Self) {}

    fn to_row(&self) -> Row {
        row! { "code" => &self.code, "name" => &self.name }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub first_name: String,
    pub last_name: String,
    pub middle_name: String,
    pub nationality: String,
    pub gender: String,
    pub birth_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Company {
    pub name: String,
    pub legal_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Party {
    Individual(Person),
    Organization(Company),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: String,
    pub party: Party,
}

impl Customer {
    pub fn party_type(&self) -> &'static str {
        match self.party {
            Party::Individual(_) => "Individual",
            Party::Organization(_) => "Organization",
        }
    }

    pub fn person(&self) -> Option<&Person> {
        match &self.party {
            Party::Individual(p) => Some(p),
            Party::Organization(_) => None,
        }
    }
}

impl NodeRecord for Customer {
    fn spec(&self) -> &'static NodeSpec {
        match self.party {
            Party::Individual(_) => &INDIVIDUAL,
            Party::Organization(_) => &ORGANIZATION,
        }
    }

    fn key(&self) -> &str {
        &self.id
    }

    fn absorb(&mut self, later: Self) {
        *self = later;
    }

    fn to_row(&self) -> Row {
        match &self.party {
            Party::Individual(p) => row! {
                "customerId" => &self.id,
                "partyType" => self.party_type(),
                "firstName" => &p.first_name,
                "lastName" => &p.last_name,
                "middleName" => &p.middle_name,
                "nationality" => &p.nationality,
                "gender" => &p.gender,
                "birthDate" => p.birth_date,
            },
            Party::Organization(c) => row! {
                "customerId" => &self.id,
                "partyType" => self.party_type(),
                "name" => &c.name,
                "legalName" => &c.legal_name,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    pub hash: String,
    pub line1: String,
    pub town: String,
    pub postcode: String,
    pub region: String,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: NaiveDateTime,
}

impl NodeRecord for Address {
    fn spec(&self) -> &'static NodeSpec {
        &ADDRESS
    }

    fn key(&self) -> &str {
        &self.hash
    }

    fn absorb(&mut self, _later: Self) {}

    fn to_row(&self) -> Row {
        row! {
            "addressHash" => &self.hash,
            "addressLine1" => &self.line1,
            "postTown" => &self.town,
            "postCode" => &self.postcode,
            "region" => &self.region,
            "country" => &self.country,
            "latitude" => self.latitude,
            "longitude" => self.longitude,
            "createdAt" => self.created_at,
        }
    }
}

/// Identity document; the simulator only produces SSNs.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityDocument {
    pub number: String,
    pub created_at: NaiveDateTime,
}

impl NodeRecord for IdentityDocument {
    fn spec(&self) -> &'static NodeSpec {
        &SSN
    }

    fn key(&self) -> &str {
        &self.number
    }

    fn absorb(&mut self, _later: Self) {}

    fn to_row(&self) -> Row {
        row! { "ssnNumber" => &self.number, "createdAt" => self.created_at }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub number: String,
    pub account_type: String,
    pub open_date: Option<NaiveDateTime>,
    pub closed_date: Option<NaiveDateTime>,
    pub tx_behavior_id: Option<i64>,
    pub initial_deposit: Option<f64>,
    pub branch_id: Option<i64>,
    pub bank_id: String,
    pub country: String,
    pub is_internal: bool,
    pub flagged: bool,
}

impl NodeRecord for Account {
    fn spec(&self) -> &'static NodeSpec {
        &ACCOUNT
    }

    fn key(&self) -> &str {
        &self.number
    }

    fn absorb(&mut self, later: Self) {
        *self = later;
    }

    fn to_row(&self) -> Row {
        row! {
            "accountNumber" => &self.number,
            "accountType" => &self.account_type,
            "openDate" => self.open_date,
            "closedDate" => self.closed_date,
            "tx_behavior_id" => self.tx_behavior_id,
            "prior_sar_count" => self.flagged,
            "initial_deposit" => self.initial_deposit,
            "branch_id" => self.branch_id,
            "bank_id" => &self.bank_id,
            "country" => &self.country,
            "isInternal" => self.is_internal,
            "isSAR" => self.flagged,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: String,
    pub amount: Option<f64>,
    pub currency: String,
    pub date: Option<NaiveDateTime>,
    pub tx_type: String,
    pub flagged: bool,
    pub alert_id: Option<i64>,
}

impl NodeRecord for Transaction {
    fn spec(&self) -> &'static NodeSpec {
        &TRANSACTION
    }

    fn key(&self) -> &str {
        &self.id
    }

    fn absorb(&mut self, later: Self) {
        *self = later;
    }

    fn to_row(&self) -> Row {
        row! {
            "transactionId" => &self.id,
            "amount" => self.amount,
            "currency" => &self.currency,
            "date" => self.date,
            "type" => &self.tx_type,
            "is_sar" => self.flagged,
            "alert_id" => self.alert_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OwnsAccount {
    pub customer_id: String,
    pub account_number: String,
    pub role: String,
    pub since: NaiveDateTime,
}

impl EdgeRecord for OwnsAccount {
    const SPEC: &'static EdgeSpec = &HAS_ACCOUNT;

    fn from_key(&self) -> &str {
        &self.customer_id
    }

    fn to_key(&self) -> &str {
        &self.account_number
    }

    fn properties(&self) -> Row {
        row! { "role" => &self.role, "since" => self.since }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HasAddress {
    pub customer_id: String,
    pub address_hash: String,
    pub added_at: NaiveDateTime,
    pub last_changed_at: NaiveDateTime,
    pub is_current: bool,
}

impl EdgeRecord for HasAddress {
    const SPEC: &'static EdgeSpec = &HAS_ADDRESS;

    fn from_key(&self) -> &str {
        &self.customer_id
    }

    fn to_key(&self) -> &str {
        &self.address_hash
    }

    fn properties(&self) -> Row {
        row! {
            "addedAt" => self.added_at,
            "lastChangedAt" => self.last_changed_at,
            "isCurrent" => self.is_current,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocatedIn {
    pub address_hash: String,
    pub country_code: String,
}

impl EdgeRecord for LocatedIn {
    const SPEC: &'static EdgeSpec = &LOCATED_IN;

    fn from_key(&self) -> &str {
        &self.address_hash
    }

    fn to_key(&self) -> &str {
        &self.country_code
    }

    fn absorb(&mut self, _later: Self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostedIn {
    pub account_number: String,
    pub country_code: String,
}

impl EdgeRecord for HostedIn {
    const SPEC: &'static EdgeSpec = &IS_HOSTED;

    fn from_key(&self) -> &str {
        &self.account_number
    }

    fn to_key(&self) -> &str {
        &self.country_code
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HasNationality {
    pub customer_id: String,
    pub country_code: String,
}

impl EdgeRecord for HasNationality {
    const SPEC: &'static EdgeSpec = &HAS_NATIONALITY;

    fn from_key(&self) -> &str {
        &self.customer_id
    }

    fn to_key(&self) -> &str {
        &self.country_code
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HasIdentityDocument {
    pub customer_id: String,
    pub document_number: String,
    pub verification_date: NaiveDateTime,
    pub verification_method: &'static str,
    pub verification_status: &'static str,
}

impl EdgeRecord for HasIdentityDocument {
    const SPEC: &'static EdgeSpec = &HAS_SSN;

    fn from_key(&self) -> &str {
        &self.customer_id
    }

    fn to_key(&self) -> &str {
        &self.document_number
    }

    fn properties(&self) -> Row {
        row! {
            "verificationDate" => self.verification_date,
            "verificationMethod" => self.verification_method,
            "verificationStatus" => self.verification_status,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Originates {
    pub account_number: String,
    pub transaction_id: String,
}

impl EdgeRecord for Originates {
    const SPEC: &'static EdgeSpec = &PERFORMS;

    fn from_key(&self) -> &str {
        &self.account_number
    }

    fn to_key(&self) -> &str {
        &self.transaction_id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Credits {
    pub transaction_id: String,
    pub account_number: String,
}

impl EdgeRecord for Credits {
    const SPEC: &'static EdgeSpec = &BENEFITS_TO;

    fn from_key(&self) -> &str {
        &self.transaction_id
    }

    fn to_key(&self) -> &str {
        &self.account_number
    }
}
