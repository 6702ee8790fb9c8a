use chrono::{Duration, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Day offsets at or above this value mean "never" (e.g. an account that never closes).
pub const NEVER_OFFSET: i64 = 1_000_000;

/// Timestamp layouts tried in order; the first one that parses wins.
const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d"];

static NON_ADDRESS_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// ISO 3166-1 alpha-2 codes the simulator is known to emit.
const COUNTRY_NAMES: &[(&str, &str)] = &[
    ("US", "United States"),
    ("GB", "United Kingdom"),
    ("CA", "Canada"),
    ("AU", "Australia"),
    ("DE", "Germany"),
    ("FR", "France"),
    ("JP", "Japan"),
    ("CN", "China"),
    ("IN", "India"),
    ("BR", "Brazil"),
    ("MX", "Mexico"),
    ("IT", "Italy"),
    ("ES", "Spain"),
    ("NL", "Netherlands"),
    ("CH", "Switzerland"),
    ("SG", "Singapore"),
    ("HK", "Hong Kong"),
    ("KR", "South Korea"),
    ("SE", "Sweden"),
    ("NO", "Norway"),
];

/// Converts raw extract fields into typed graph values.
///
/// Every conversion is total: malformed input yields `None` instead of an error,
/// so a single bad cell never aborts a load.
#[derive(Debug, Clone, Copy)]
pub struct Transformer {
    base_date: NaiveDateTime,
}

impl Transformer {
    pub fn new(base_date: NaiveDateTime) -> Self {
        Self { base_date }
    }

    pub fn base_date(&self) -> NaiveDateTime {
        self.base_date
    }

    /// Resolves a simulator day offset against the base date.
    pub fn days_to_datetime(&self, days: &str) -> Option<NaiveDateTime> {
        let days: i64 = days.trim().parse().ok()?;
        if days >= NEVER_OFFSET {
            return None;
        }
        self.base_date.checked_add_signed(Duration::try_days(days)?)
    }
}

/// Parses the timestamp layouts found across simulator versions.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Some(ts);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Truthiness used when coercing extract values into flags.
pub trait Truthy {
    fn truthy(&self) -> bool;
}

impl Truthy for bool {
    fn truthy(&self) -> bool {
        *self
    }
}

impl Truthy for str {
    fn truthy(&self) -> bool {
        self.trim().eq_ignore_ascii_case("true")
    }
}

impl Truthy for String {
    fn truthy(&self) -> bool {
        self.as_str().truthy()
    }
}

impl Truthy for i64 {
    fn truthy(&self) -> bool {
        *self != 0
    }
}

impl Truthy for f64 {
    fn truthy(&self) -> bool {
        *self != 0.0
    }
}

impl<T: Truthy> Truthy for Option<T> {
    fn truthy(&self) -> bool {
        self.as_ref().is_some_and(Truthy::truthy)
    }
}

impl<T: Truthy + ?Sized> Truthy for &T {
    fn truthy(&self) -> bool {
        (**self).truthy()
    }
}

pub fn parse_bool<T: Truthy + ?Sized>(value: &T) -> bool {
    value.truthy()
}

pub fn parse_float(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    value.parse().ok()
}

pub fn parse_int(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    value.parse().ok()
}

/// Lowercases, strips punctuation and collapses whitespace so that spelling
/// variants of the same address compare equal.
pub fn normalize_address(street: &str, city: &str, postcode: &str) -> String {
    let combined = format!("{street} {city} {postcode}").to_lowercase();
    let stripped = NON_ADDRESS_CHARS.replace_all(&combined, "");
    WHITESPACE_RUN.replace_all(stripped.trim(), " ").into_owned()
}

/// SHA-256 (lowercase hex) of the normalized address; the Address natural key.
pub fn address_key(street: &str, city: &str, postcode: &str) -> String {
    let normalized = normalize_address(street, city, postcode);
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}

/// Country name for an alpha-2 code, falling back to the code itself.
pub fn country_name(code: &str) -> String {
    let upper = code.to_uppercase();
    COUNTRY_NAMES
        .iter()
        .find(|(known, _)| *known == upper)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| code.to_string())
}
