//! Fingerprint computation for events and templates.
//!
//! Both fingerprints are the leading 128 bits of a SHA-256 digest over a
//! length-prefixed, discriminator-tagged byte layout, hex-encoded to 32
//! characters. Length prefixes keep field boundaries unambiguous
//! (`("ab", "c")` and `("a", "bc")` must not collide); the discriminator
//! byte keeps the two hash families disjoint.
//!
//! # Layouts
//!
//! ```text
//! log_hash      = SHA-256(0x00 || ts_micros.to_be_bytes()
//!                              || lp(service) || lp(host) || lp(message))[..16]
//! template_hash = SHA-256(0x01 || canon_version.to_be_bytes()
//!                              || lp(service) || lp(level) || lp(canonical_text))[..16]
//! ```
//!
//! where `lp(s) = (s.len() as u64).to_be_bytes() || s`.
//!
//! The canonicalization version participates in `template_hash` so a rule
//! change can never silently collide templates from different generations.

use sha2::{Digest, Sha256};

const EVENT_TAG: u8 = 0x00;
const TEMPLATE_TAG: u8 = 0x01;

fn push_field(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_be_bytes());
    hasher.update(field.as_bytes());
}

fn finish_128(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

/// Compute the event dedup fingerprint over (timestamp, service, host, message).
///
/// `timestamp_micros` is the event timestamp in microseconds since the Unix
/// epoch, UTC. Returns a 32-character lowercase hex string.
pub fn log_hash(timestamp_micros: i64, service: &str, host: &str, message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update([EVENT_TAG]);
    hasher.update(timestamp_micros.to_be_bytes());
    push_field(&mut hasher, service);
    push_field(&mut hasher, host);
    push_field(&mut hasher, message);
    finish_128(hasher)
}

/// Compute the template identity fingerprint over
/// (service, level, canon_version, canonical_text).
///
/// Returns a 32-character lowercase hex string.
pub fn template_hash(
    service: &str,
    level: &str,
    canon_version: u32,
    canonical_text: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update([TEMPLATE_TAG]);
    hasher.update(canon_version.to_be_bytes());
    push_field(&mut hasher, service);
    push_field(&mut hasher, level);
    push_field(&mut hasher, canonical_text);
    finish_128(hasher)
}
