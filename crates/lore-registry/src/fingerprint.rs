//! BLAKE3 content fingerprints.

/// Length of a hex-encoded fingerprint.
pub const FINGERPRINT_LEN: usize = 64;

/// Compute the fingerprint of raw document bytes.
///
/// Hashes the bytes as-is, with no normalisation, so any byte-level edit
/// yields a new fingerprint. Returns the hex-encoded BLAKE3 digest.
pub fn fingerprint(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// Whether `raw` has the shape of a fingerprint.
pub fn is_fingerprint(raw: &str) -> bool {
    raw.len() == FINGERPRINT_LEN && raw.bytes().all(|b| b.is_ascii_hexdigit())
}
