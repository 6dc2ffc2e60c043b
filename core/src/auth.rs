use std::fmt::Write;

use rand::Rng;
use sha2::{Digest, Sha256};

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

#[must_use]
pub fn generate_salt() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    to_hex(&bytes)
}

/// Single salted SHA-256 round. Deliberately minimal; accounts exposed to
/// untrusted networks need a slow KDF such as argon2 instead.
#[must_use]
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    to_hex(&hasher.finalize())
}

/// Compare without short-circuiting on the first differing byte.
#[must_use]
pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    let actual = hash_password(password, salt);
    actual.len() == expected_hash.len()
        && actual
            .bytes()
            .zip(expected_hash.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
