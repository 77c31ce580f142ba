//! # Model Bridge Module
//!
//! Translates between stored records and the policy model: records become
//! textual rule lines for the model's loader, and the model's per-ptype rule
//! lists become records for a full save.

use policy_model::{load_policy_line, Model, Rule, Section};

use crate::error::Result;
use crate::key::KeyEncoder;
use crate::record::StoredRecord;

/// Feeds one stored record to the model's line loader.
///
/// Fields containing a comma do not survive this step: the line format has
/// no quoting, so such a field is split into several tokens.
pub fn load_record(record: &StoredRecord, model: &mut Model) -> Result<()> {
    load_policy_line(&record.policy_line(), model)?;
    Ok(())
}

/// Builds the record for `ptype` plus `fields`, keyed by `encoder`.
pub fn record_for(
    encoder: &dyn KeyEncoder,
    ptype: &str,
    fields: &[String],
) -> Result<StoredRecord> {
    let rule = Rule::new(ptype, fields.iter().cloned())?;
    let key = encoder.encode(&rule)?;
    Ok(StoredRecord::from_rule(&rule, key))
}

/// Every rule of `model` as a record: all `p` buckets, then all `g` buckets,
/// each in ascending ptype order and in model order within a bucket.
pub fn records_for_model(model: &Model, encoder: &dyn KeyEncoder) -> Result<Vec<StoredRecord>> {
    let mut records = Vec::with_capacity(model.rule_count());
    for sec in Section::all() {
        for (ptype, assertion) in model.policy_types(sec) {
            for fields in &assertion.policy {
                records.push(record_for(encoder, ptype, fields)?);
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{DelimitedKeys, DigestKeys};

    fn rule(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_load_record_into_model() {
        let mut model = Model::rbac();
        let record = record_for(&DelimitedKeys, "p", &rule(&["alice", "data1", "read"])).unwrap();
        load_record(&record, &mut model).unwrap();
        assert_eq!(
            model.get_policy(Section::Policy, "p"),
            vec![rule(&["alice", "data1", "read"])]
        );
    }

    #[test]
    fn test_load_record_drops_inner_empty_field() {
        let mut model = Model::rbac();
        let record = record_for(&DelimitedKeys, "p", &rule(&["alice", "", "read"])).unwrap();
        load_record(&record, &mut model).unwrap();
        assert_eq!(
            model.get_policy(Section::Policy, "p"),
            vec![rule(&["alice", "read"])]
        );
    }

    #[test]
    fn test_records_for_model_order() {
        let mut model = Model::rbac();
        model.add_policy_type(Section::Policy, "p2");
        model
            .add_policy(Section::Grouping, "g", rule(&["alice", "admin"]))
            .unwrap();
        model
            .add_policy(Section::Policy, "p2", rule(&["bob", "data2"]))
            .unwrap();
        model
            .add_policy(Section::Policy, "p", rule(&["alice", "data1", "read"]))
            .unwrap();

        let keys: Vec<String> = records_for_model(&model, &DelimitedKeys)
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(keys, vec!["p::alice::data1::read", "p2::bob::data2", "g::alice::admin"]);
    }

    #[test]
    fn test_record_for_uses_encoder() {
        let record = record_for(&DigestKeys, "p", &rule(&["alice"])).unwrap();
        assert_eq!(record.key.len(), 16);
        assert_eq!(record.v0, "alice");
    }

    #[test]
    fn test_record_for_rejects_seven_fields() {
        let err = record_for(&DelimitedKeys, "p", &rule(&["1", "2", "3", "4", "5", "6", "7"]));
        assert!(err.is_err());
    }
}
