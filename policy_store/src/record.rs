//! # Stored Record Module
//!
//! The flattened, fixed-width projection of a rule that is persisted as the
//! value under the rule's key. Records are JSON so they stay decodable
//! whichever key strategy wrote them.

use policy_model::{Rule, MAX_FIELDS};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One persisted rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub key: String,
    pub p_type: String,
    #[serde(default)]
    pub v0: String,
    #[serde(default)]
    pub v1: String,
    #[serde(default)]
    pub v2: String,
    #[serde(default)]
    pub v3: String,
    #[serde(default)]
    pub v4: String,
    #[serde(default)]
    pub v5: String,
    /// Number of fields the rule had. Absent in records written without it,
    /// in which case trailing empty slots are treated as absent fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arity: Option<usize>,
}

impl StoredRecord {
    /// Projects `rule` onto the six value slots. Absent fields are stored empty.
    pub fn from_rule(rule: &Rule, key: String) -> Self {
        let mut slots: [String; MAX_FIELDS] = Default::default();
        for (slot, field) in slots.iter_mut().zip(rule.fields()) {
            slot.clone_from(field);
        }
        let [v0, v1, v2, v3, v4, v5] = slots;

        Self {
            key,
            p_type: rule.ptype().to_string(),
            v0,
            v1,
            v2,
            v3,
            v4,
            v5,
            arity: Some(rule.fields().len()),
        }
    }

    fn slots(&self) -> [&str; MAX_FIELDS] {
        [
            self.v0.as_str(),
            self.v1.as_str(),
            self.v2.as_str(),
            self.v3.as_str(),
            self.v4.as_str(),
            self.v5.as_str(),
        ]
    }

    /// The rule's fields, trailing empty ones included.
    ///
    /// Records without an arity stop at the last non-empty slot.
    pub fn fields(&self) -> Vec<String> {
        let slots = self.slots();
        let len = match self.arity {
            Some(arity) => arity.min(MAX_FIELDS),
            None => slots
                .iter()
                .rposition(|v| !v.is_empty())
                .map_or(0, |i| i + 1),
        };
        slots[..len].iter().map(|v| v.to_string()).collect()
    }

    pub fn to_rule(&self) -> Result<Rule> {
        Ok(Rule::new(self.p_type.clone(), self.fields())?)
    }

    /// Textual rule line for the model loader: `ptype, v0, v1, ...`.
    ///
    /// Every empty field is left out, including ones followed by non-empty
    /// fields, so `(alice, "", read)` renders as `p, alice, read`. Existing
    /// consumers of the line format depend on this.
    pub fn policy_line(&self) -> String {
        let mut line = self.p_type.clone();
        for value in self.slots().iter().filter(|v| !v.is_empty()) {
            line.push_str(", ");
            line.push_str(value);
        }
        line
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;

    fn record(ptype: &str, fields: &[&str]) -> StoredRecord {
        let rule = Rule::new(ptype, fields.iter().copied()).unwrap();
        StoredRecord::from_rule(&rule, format!("{}::{}", ptype, fields.join("::")))
    }

    #[test]
    fn test_record_from_rule() {
        let r = record("p", &["alice", "data1", "read"]);
        assert_eq!(r.p_type, "p");
        assert_eq!(r.v0, "alice");
        assert_eq!(r.v2, "read");
        assert_eq!(r.v3, "");
        assert_eq!(r.fields(), vec!["alice", "data1", "read"]);
    }

    #[test]
    fn test_record_roundtrip_through_bytes() {
        let r = record("g", &["alice", "admin"]);
        let decoded = StoredRecord::decode(&r.encode().unwrap()).unwrap();
        assert_eq!(decoded, r);
        assert_eq!(
            decoded.to_rule().unwrap(),
            Rule::new("g", ["alice", "admin"]).unwrap()
        );
    }

    #[test]
    fn test_record_json_field_names() {
        let json = String::from_utf8(record("p", &["a"]).encode().unwrap()).unwrap();
        assert!(json.contains(r#""p_type":"p""#));
        assert!(json.contains(r#""v0":"a""#));
        assert!(json.contains(r#""key":"p::a""#));
    }

    #[test]
    fn test_policy_line_omits_every_empty_field() {
        assert_eq!(
            record("p", &["alice", "data1", "read"]).policy_line(),
            "p, alice, data1, read"
        );
        assert_eq!(record("p", &["alice", "", "read"]).policy_line(), "p, alice, read");
        assert_eq!(record("p", &[]).policy_line(), "p");
    }

    #[test]
    fn test_fields_keep_inner_empty_values() {
        let r = record("p", &["alice", "", "read"]);
        assert_eq!(r.fields(), vec!["alice", "", "read"]);
    }

    #[test]
    fn test_fields_keep_trailing_empty_values() {
        let r = record("p", &["alice", "data1", ""]);
        assert_eq!(r.arity, Some(3));
        assert_eq!(r.fields(), vec!["alice", "data1", ""]);

        let decoded = StoredRecord::decode(&r.encode().unwrap()).unwrap();
        assert_eq!(
            decoded.to_rule().unwrap(),
            Rule::new("p", ["alice", "data1", ""]).unwrap()
        );
        assert_eq!(decoded.policy_line(), "p, alice, data1");
    }

    #[test]
    fn test_record_without_arity_trims_trailing_empty_slots() {
        let json = br#"{"key":"p::alice::data1","p_type":"p","v0":"alice","v1":"data1","v2":""}"#;
        let decoded = StoredRecord::decode(json).unwrap();
        assert_eq!(decoded.arity, None);
        assert_eq!(decoded.fields(), vec!["alice", "data1"]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = StoredRecord::decode(b"not json").unwrap_err();
        assert!(matches!(err, AdapterError::Serialization(_)));
    }
}
