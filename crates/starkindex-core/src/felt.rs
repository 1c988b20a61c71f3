//! Field-element helpers: address normalisation and event selectors.
//!
//! Nodes are inconsistent about leading zeros and letter case in felts
//! (`0x04a3…` vs `0x4A3…`), so every comparison the engine makes goes through
//! one of the normalisers here.

use tiny_keccak::{Hasher, Keccak};

use crate::error::IndexerError;

/// Number of hex digits in a fully padded felt.
const FELT_HEX_LEN: usize = 64;

/// Strip the `0x` prefix and leading zeros, lowercase the rest.
///
/// Returns `None` if the input is not hex or is wider than 252 bits.
fn trimmed_hex(value: &str) -> Option<String> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let trimmed = digits.trim_start_matches('0').to_ascii_lowercase();
    if trimmed.len() > FELT_HEX_LEN - 1 {
        return None;
    }
    Some(trimmed)
}

/// Canonical short form of a felt: `0x` + lowercase hex without leading zeros.
///
/// Used for event keys. Malformed input is returned lowercased so that it can
/// still be compared, but it will never equal a real selector.
pub fn normalize_felt(value: &str) -> String {
    match trimmed_hex(value) {
        Some(t) if t.is_empty() => "0x0".to_string(),
        Some(t) => format!("0x{t}"),
        None => value.to_ascii_lowercase(),
    }
}

/// Validate a contract address and return its canonical padded form
/// (`0x` + 64 lowercase hex digits).
///
/// Addresses must be below 2^251.
pub fn normalize_address(address: &str) -> Result<String, IndexerError> {
    let trimmed =
        trimmed_hex(address).ok_or_else(|| IndexerError::InvalidAddress(address.to_string()))?;
    // 2^251 is `8` followed by 62 zeros.
    if trimmed.len() == FELT_HEX_LEN - 1 && trimmed.as_bytes()[0] >= b'8' {
        return Err(IndexerError::InvalidAddress(address.to_string()));
    }
    Ok(format!("0x{trimmed:0>width$}", width = FELT_HEX_LEN))
}

/// Compute the selector of an event or function name (`sn_keccak`):
/// keccak-256 of the ASCII name, truncated to its low 250 bits.
pub fn event_selector(name: &str) -> String {
    let mut keccak = Keccak::v256();
    keccak.update(name.as_bytes());
    let mut out = [0u8; 32];
    keccak.finalize(&mut out);
    out[0] &= 0x03;
    normalize_felt(&hex::encode(out))
}
