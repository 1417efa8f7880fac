//! Small helpers: randomness, digests, identifier normalization.

use base64::Engine;
use rand::Rng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Generate `n` random bytes from the thread RNG.
#[must_use]
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// Generate a URL-safe token from `n` random bytes (base64url, no padding).
#[must_use]
pub fn random_url_token(n: usize) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes(n))
}

/// Generate `len` random characters drawn from `alphabet`.
#[must_use]
pub fn random_from_alphabet(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(alphabet[rng.gen_range(0..alphabet.len())]))
        .collect()
}

/// Generate `len` random alphanumeric characters.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    random_from_alphabet(ALPHANUMERIC, len)
}

/// Generate a numeric one-time code of `digits` digits.
#[must_use]
pub fn random_digits(digits: usize) -> String {
    random_from_alphabet(b"0123456789", digits)
}

/// Lowercase hex SHA-256 of the input.
#[must_use]
pub fn sha256_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex_encode(&hasher.finalize())
}

/// Raw SHA-256 of the input.
#[must_use]
pub fn sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.finalize().into()
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Encode bytes as base64url without padding.
#[must_use]
pub fn base64url(input: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(input)
}

/// Decode base64url (padding optional).
#[must_use]
pub fn base64url_decode(input: &str) -> Option<Vec<u8>> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(input.trim_end_matches('='))
        .ok()
}

/// Normalize an email identifier: trim and lowercase.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Normalize a phone identifier: keep a leading `+` and digits only.
#[must_use]
pub fn normalize_phone(phone: &str) -> String {
    let trimmed = phone.trim();
    let mut out = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        if c.is_ascii_digit() || (i == 0 && c == '+') {
            out.push(c);
        }
    }
    out
}
