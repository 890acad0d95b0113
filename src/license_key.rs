//! License key generation.
//!
//! Keys have the format `PREFIX-XXXX-XXXX-...`: random bytes from a
//! cryptographically secure generator, RFC 4648 base32 encoded (uppercase,
//! no padding) and grouped by four characters.
//!
//! The store treats keys as opaque unique identifiers; it obtains them
//! through the [`KeyGenerator`] trait so front ends and tests can plug in
//! their own source.
//!
//! # Example
//!
//! ```rust
//! use licensegate::license_key::{is_well_formed_key, KeyGenerator, LicenseKeyConfig};
//!
//! let config = LicenseKeyConfig::default();
//! let key = config.generate().unwrap();
//! assert!(key.starts_with("LIC-"));
//! assert!(is_well_formed_key(&key, &config));
//! ```

use rand::Rng;

use crate::config::LicenseConfig;
use crate::errors::LicenseResult;

/// RFC 4648 base32 alphabet.
const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Characters per dash-separated group.
const GROUP_LENGTH: usize = 4;

/// Source of fresh license keys.
pub trait KeyGenerator: Send + Sync {
    fn generate(&self) -> LicenseResult<String>;
}

/// Configuration for license key generation.
#[derive(Debug, Clone)]
pub struct LicenseKeyConfig {
    /// Prefix for the license key (e.g., "LIC")
    pub prefix: String,
    /// Number of random bytes encoded into the key
    pub key_bytes: u8,
}

impl Default for LicenseKeyConfig {
    fn default() -> Self {
        Self {
            prefix: "LIC".to_string(),
            key_bytes: 20,
        }
    }
}

impl From<&LicenseConfig> for LicenseKeyConfig {
    fn from(config: &LicenseConfig) -> Self {
        Self {
            prefix: config.key_prefix.clone(),
            key_bytes: config.key_bytes,
        }
    }
}

impl LicenseKeyConfig {
    /// Length of the encoded body (without prefix and dashes).
    fn encoded_len(&self) -> usize {
        (self.key_bytes as usize * 8).div_ceil(5)
    }
}

impl KeyGenerator for LicenseKeyConfig {
    fn generate(&self) -> LicenseResult<String> {
        let mut bytes = vec![0u8; self.key_bytes as usize];
        rand::rng().fill(&mut bytes[..]);
        Ok(format_key(&self.prefix, &bytes))
    }
}

/// Encode `bytes` as unpadded base32.
pub fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }

    out
}

/// Render `bytes` as `PREFIX-XXXX-XXXX-...`. The last group may be shorter.
pub fn format_key(prefix: &str, bytes: &[u8]) -> String {
    let encoded = base32_encode(bytes);
    let groups: Vec<&str> = encoded
        .as_bytes()
        .chunks(GROUP_LENGTH)
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
        .collect();

    format!("{}-{}", prefix, groups.join("-"))
}

/// Check that a key has the shape this generator produces.
///
/// Front ends may use this to reject obvious typos early; the store never
/// parses keys.
pub fn is_well_formed_key(key: &str, config: &LicenseKeyConfig) -> bool {
    let Some(body) = key
        .strip_prefix(config.prefix.as_str())
        .and_then(|rest| rest.strip_prefix('-'))
    else {
        return false;
    };

    let groups: Vec<&str> = body.split('-').collect();
    let (last, full) = match groups.split_last() {
        Some(split) => split,
        None => return false,
    };

    let shape_ok = full.iter().all(|g| g.len() == GROUP_LENGTH)
        && !last.is_empty()
        && last.len() <= GROUP_LENGTH;
    let chars_ok = groups
        .iter()
        .all(|g| g.bytes().all(|b| BASE32_ALPHABET.contains(&b)));
    let total: usize = groups.iter().map(|g| g.len()).sum();

    shape_ok && chars_ok && total == config.encoded_len()
}
