//! Synthetic company names for organization parties.
//!
//! The simulator leaves organization names blank, so the loader invents one.
//! Every word is picked from the SHA-256 of the seed, so a name depends only on
//! the party identifier: not on run order, chunk boundaries or crate versions.

use sha2::{Digest, Sha256};

const SURNAMES: &[&str] = &[
    "Adams", "Allen", "Anderson", "Baker", "Barnes", "Bell", "Bennett", "Brooks", "Brown",
    "Butler", "Campbell", "Carter", "Clark", "Collins", "Cook", "Cooper", "Cox", "Davis",
    "Edwards", "Evans", "Fisher", "Foster", "Garcia", "Gonzalez", "Gray", "Green", "Hall",
    "Harris", "Hayes", "Hill", "Howard", "Hughes", "Jackson", "James", "Jenkins", "Johnson",
    "Jones", "Kelly", "King", "Lee", "Lewis", "Long", "Lopez", "Martin", "Miller", "Mitchell",
    "Moore", "Morgan", "Morris", "Murphy", "Nelson", "Parker", "Perry", "Peterson", "Phillips",
    "Powell", "Price", "Reed", "Richardson", "Rivera", "Roberts", "Robinson", "Rogers", "Ross",
    "Russell", "Sanders", "Scott", "Smith", "Stewart", "Sullivan", "Taylor", "Thomas",
    "Thompson", "Turner", "Walker", "Ward", "Watson", "White", "Williams", "Wilson", "Wood",
    "Wright", "Young",
];

const SUFFIXES: &[&str] = &["Inc", "and Sons", "LLC", "Group", "PLC", "Ltd"];

/// Seed for a party identifier: the number itself when numeric, otherwise the
/// leading eight bytes of its SHA-256.
pub fn seed_for(party_id: &str) -> u64 {
    let party_id = party_id.trim();
    if let Ok(n) = party_id.parse::<u64>() {
        return n;
    }
    let digest = Sha256::digest(party_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Deterministic company name for the given seed.
///
/// Byte 0 of the digest picks the pattern; bytes 1-8 index the word lists.
pub fn company_name(seed: u64) -> String {
    let digest = Sha256::digest(seed.to_be_bytes());
    let pick = |at: usize, words: &[&'static str]| -> &'static str {
        let n = u16::from_be_bytes([digest[at], digest[at + 1]]) as usize;
        words[n % words.len()]
    };
    let first = pick(1, SURNAMES);
    let second = pick(3, SURNAMES);
    let third = pick(5, SURNAMES);
    match digest[0] % 3 {
        0 => format!("{first} {}", pick(7, SUFFIXES)),
        1 => format!("{first}-{second}"),
        _ => format!("{first}, {second} and {third}"),
    }
}

pub fn company_name_for(party_id: &str) -> String {
    company_name(seed_for(party_id))
}
