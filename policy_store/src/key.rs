//! # Key Encoder Module
//!
//! Maps a rule to the storage key its record lives under.
//!
//! Two strategies exist and a collection must stay on one for its whole life:
//! - [`DelimitedKeys`]: `ptype::v0::v1...`. Human readable, and the key of a
//!   rule's leading fields is a byte prefix of the full rule's key, which is
//!   what prefix-filtered removal relies on.
//! - [`DigestKeys`]: FNV-1a 64 of `ptype,v0,v1...` as 16 hex digits.
//!   Fixed width with no separator concerns, but no prefix locality, so
//!   filtered operations are unsupported.

use std::fmt;

use policy_model::{check_arity, Rule};
use serde::Deserialize;

use crate::error::{AdapterError, Result};

/// Separator between ptype and fields in delimited keys.
pub const KEY_SEPARATOR: &str = "::";

// ================================================================================================
// STRATEGY INTERFACE
// ================================================================================================

/// Derives storage keys for rules.
pub trait KeyEncoder: Send + Sync + fmt::Debug {
    /// Short strategy name for logs.
    fn name(&self) -> &'static str;

    /// Key for an exact rule. Trailing absent fields contribute nothing.
    fn encode(&self, rule: &Rule) -> Result<String>;

    /// Whether rules sharing leading fields occupy one contiguous key range.
    fn supports_prefix_filter(&self) -> bool;

    /// Key prefix selecting every rule of `ptype` whose leading fields equal
    /// `field_values`.
    fn filter_prefix(&self, ptype: &str, field_values: &[String]) -> Result<String>;
}

/// Strategy selection, fixed when an adapter is constructed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStrategy {
    #[default]
    Delimited,
    Digest,
}

impl KeyStrategy {
    pub fn encoder(&self) -> Box<dyn KeyEncoder> {
        match self {
            KeyStrategy::Delimited => Box::new(DelimitedKeys),
            KeyStrategy::Digest => Box::new(DigestKeys),
        }
    }
}

impl fmt::Display for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyStrategy::Delimited => write!(f, "delimited"),
            KeyStrategy::Digest => write!(f, "digest"),
        }
    }
}

// ================================================================================================
// DELIMITED KEYS
// ================================================================================================

/// `ptype::v0::v1...` keys.
///
/// Values containing `::`, or starting or ending with `:`, are rejected
/// because they would make two different rules share a key or break prefix
/// matching.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelimitedKeys;

impl DelimitedKeys {
    fn check_value(value: &str) -> Result<()> {
        if value.contains(KEY_SEPARATOR) || value.starts_with(':') || value.ends_with(':') {
            return Err(AdapterError::InvalidField {
                value: value.to_string(),
                separator: KEY_SEPARATOR,
            });
        }
        Ok(())
    }
}

impl KeyEncoder for DelimitedKeys {
    fn name(&self) -> &'static str {
        "delimited"
    }

    fn encode(&self, rule: &Rule) -> Result<String> {
        Self::check_value(rule.ptype())?;

        let mut key = rule.ptype().to_string();
        for field in rule.fields() {
            Self::check_value(field)?;
            key.push_str(KEY_SEPARATOR);
            key.push_str(field);
        }
        Ok(key)
    }

    fn supports_prefix_filter(&self) -> bool {
        true
    }

    /// Leading values are consumed in order and stop at the first empty one;
    /// there is no skipping over holes.
    fn filter_prefix(&self, ptype: &str, field_values: &[String]) -> Result<String> {
        check_arity(field_values.len())?;
        Self::check_value(ptype)?;

        let mut prefix = ptype.to_string();
        for value in field_values.iter().take_while(|v| !v.is_empty()) {
            Self::check_value(value)?;
            prefix.push_str(KEY_SEPARATOR);
            prefix.push_str(value);
        }
        Ok(prefix)
    }
}

/// True when `key` holds `prefix` as whole leading fields: it is the prefix
/// itself or continues with the separator right after it.
///
/// Keys that only share bytes (`p::alice` and `p::alicia`) do not match.
pub fn matches_field_prefix(key: &[u8], prefix: &[u8]) -> bool {
    match key.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with(KEY_SEPARATOR.as_bytes()),
        None => false,
    }
}

// ================================================================================================
// DIGEST KEYS
// ================================================================================================

/// Fixed-width FNV-1a 64 keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestKeys;

impl KeyEncoder for DigestKeys {
    fn name(&self) -> &'static str {
        "digest"
    }

    fn encode(&self, rule: &Rule) -> Result<String> {
        let mut joined = rule.ptype().to_string();
        for field in rule.fields() {
            joined.push(',');
            joined.push_str(field);
        }
        Ok(format!("{:016x}", fnv1a64(joined.as_bytes())))
    }

    fn supports_prefix_filter(&self) -> bool {
        false
    }

    fn filter_prefix(&self, _ptype: &str, _field_values: &[String]) -> Result<String> {
        Err(AdapterError::UnsupportedOperation(
            "filtered operations require the delimited key strategy".to_string(),
        ))
    }
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut h = OFFSET;
    for &b in bytes {
        h ^= b as u64;
        h = h.wrapping_mul(PRIME);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(ptype: &str, fields: &[&str]) -> Rule {
        Rule::new(ptype, fields.iter().copied()).unwrap()
    }

    fn values(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_delimited_key() {
        let key = DelimitedKeys
            .encode(&rule("p", &["subject-a", "action-a", "get"]))
            .unwrap();
        assert_eq!(key, "p::subject-a::action-a::get");
    }

    #[test]
    fn test_delimited_key_is_prefix_of_longer_rule() {
        let short = DelimitedKeys.encode(&rule("p", &["alice"])).unwrap();
        let long = DelimitedKeys
            .encode(&rule("p", &["alice", "data1"]))
            .unwrap();
        assert!(long.starts_with(&short));
    }

    #[test]
    fn test_delimited_key_keeps_empty_fields() {
        let key = DelimitedKeys.encode(&rule("p", &["alice", "", "read"])).unwrap();
        assert_eq!(key, "p::alice::::read");
        assert_ne!(key, DelimitedKeys.encode(&rule("p", &["alice", "read"])).unwrap());
    }

    #[test]
    fn test_delimited_key_rejects_separator() {
        for bad in ["a::b", ":a", "a:"] {
            let err = DelimitedKeys.encode(&rule("p", &[bad])).unwrap_err();
            assert!(matches!(err, AdapterError::InvalidField { .. }), "{}", bad);
        }
        assert!(DelimitedKeys.encode(&rule("p", &["urn:a"])).is_ok());
    }

    #[test]
    fn test_filter_prefix_stops_at_first_empty_value() {
        let prefix = DelimitedKeys
            .filter_prefix("p", &values(&["alice", "", "read"]))
            .unwrap();
        assert_eq!(prefix, "p::alice");

        let all = DelimitedKeys.filter_prefix("p", &[]).unwrap();
        assert_eq!(all, "p");
    }

    #[test]
    fn test_filter_prefix_rejects_too_many_values() {
        let err = DelimitedKeys
            .filter_prefix("p", &values(&["1", "2", "3", "4", "5", "6", "7"]))
            .unwrap_err();
        assert!(matches!(err, AdapterError::Model(_)));
    }

    #[test]
    fn test_matches_field_prefix() {
        assert!(matches_field_prefix(b"p::alice", b"p::alice"));
        assert!(matches_field_prefix(b"p::alice::data1", b"p::alice"));
        assert!(!matches_field_prefix(b"p::alicia::data1", b"p::ali"));
        assert!(!matches_field_prefix(b"p::alice-b::data1", b"p::alice"));
        assert!(!matches_field_prefix(b"p2::alice", b"p"));
        assert!(!matches_field_prefix(b"g::alice", b"p"));
    }

    #[test]
    fn test_digest_key_is_fixed_width_and_deterministic() {
        let a = DigestKeys.encode(&rule("p", &["alice", "data1", "read"])).unwrap();
        let b = DigestKeys.encode(&rule("p", &["alice", "data1", "read"])).unwrap();
        let c = DigestKeys.encode(&rule("p", &["alice", "data1", "write"])).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
        assert_eq!(DigestKeys.encode(&rule("g", &["x"])).unwrap().len(), 16);
    }

    #[test]
    fn test_digest_does_not_filter() {
        assert!(!DigestKeys.supports_prefix_filter());
        let err = DigestKeys.filter_prefix("p", &values(&["alice"])).unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_fnv1a64_vectors() {
        assert_eq!(fnv1a64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a64(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn test_strategy_encoder_selection() {
        assert_eq!(KeyStrategy::default(), KeyStrategy::Delimited);
        assert_eq!(KeyStrategy::Delimited.encoder().name(), "delimited");
        assert_eq!(KeyStrategy::Digest.encoder().name(), "digest");
        assert_eq!(KeyStrategy::Digest.to_string(), "digest");
    }
}
