//! # Policy Adapter Module
//!
//! The rule store: transactional CRUD and prefix-filtered bulk operations
//! for authorization rules kept in one collection of an ordered key-value
//! store.
//!
//! Each rule is one record under a key derived by the configured
//! [`KeyStrategy`]. With delimited keys, rules sharing leading fields sit in
//! one contiguous key range, which is how filtered removal works without a
//! secondary index:
//!
//! ```text
//! p::subject-a::action-a::get
//! p::subject-a::action-a::write     <- remove_filtered_policy(p, 0, ["subject-a"])
//! p::subject-b::action-a::get          seeks to "p::subject-a" and stops at the
//! p::subject-b::action-a::write        first key outside the run
//! ```
//!
//! Only filters starting at field 0 can be served this way; any other field
//! index is rejected.

use log::{debug, info};
use policy_model::{Adapter, Model, Section};

use crate::bootstrap::load_bootstrap;
use crate::config::AdapterConfig;
use crate::error::{AdapterError, Result};
use crate::key::{matches_field_prefix, KeyEncoder, KeyStrategy};
use crate::model_bridge::{load_record, record_for, records_for_model};
use crate::record::StoredRecord;
use crate::storage::{KvStore, WriteTxn};

// ================================================================================================
// ADAPTER STRUCTURE
// ================================================================================================

/// Persists a policy model's rules in one collection of `S`.
///
/// The adapter owns its store handle. Every operation runs inside one
/// transaction, except the filtered operations, which read the matching
/// keys in a read transaction and then mutate them in a write transaction.
/// A write committed between those two steps is not seen by the match.
#[derive(Debug)]
pub struct PolicyAdapter<S: KvStore> {
    store: S,
    collection: String,
    key_strategy: KeyStrategy,
    encoder: Box<dyn KeyEncoder>,
    bootstrap_policy: Option<String>,
}

impl<S: KvStore> PolicyAdapter<S> {
    /// Creates an adapter over an opened store and makes sure its collection
    /// exists.
    pub fn new(store: S, config: AdapterConfig) -> Result<Self> {
        config.validate()?;

        let adapter = PolicyAdapter {
            store,
            encoder: config.key_strategy.encoder(),
            key_strategy: config.key_strategy,
            collection: config.collection,
            bootstrap_policy: config.bootstrap_policy,
        };
        adapter.initialize()?;

        info!(
            "Policy adapter ready: collection={} key_strategy={}",
            adapter.collection, adapter.key_strategy
        );
        Ok(adapter)
    }

    /// Creates the collection if needed. Safe to call repeatedly.
    pub fn initialize(&self) -> Result<()> {
        self.store.create_collection(&self.collection)?;
        Ok(())
    }

    // ============================================================================================
    // ACCESSORS
    // ============================================================================================

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn key_strategy(&self) -> KeyStrategy {
        self.key_strategy
    }

    /// Every stored record in key order.
    pub fn records(&self) -> Result<Vec<StoredRecord>> {
        self.store.view(&self.collection, |txn| -> Result<Vec<StoredRecord>> {
            let mut records = Vec::new();
            let mut cursor = txn.cursor();
            let mut entry = cursor.first()?;
            while let Some((_, value)) = entry {
                records.push(StoredRecord::decode(&value)?);
                entry = cursor.next()?;
            }
            Ok(records)
        })
    }

    /// Number of stored records.
    pub fn record_count(&self) -> Result<usize> {
        self.store.view(&self.collection, |txn| -> Result<usize> {
            let mut count = 0;
            let mut cursor = txn.cursor();
            let mut entry = cursor.first()?;
            while entry.is_some() {
                count += 1;
                entry = cursor.next()?;
            }
            Ok(count)
        })
    }

    // ============================================================================================
    // PRIVATE HELPERS
    // ============================================================================================

    fn record_for(&self, ptype: &str, fields: &[String]) -> Result<StoredRecord> {
        record_for(self.encoder.as_ref(), ptype, fields)
    }

    fn put_rule(&self, txn: &mut dyn WriteTxn, ptype: &str, fields: &[String]) -> Result<()> {
        let record = self.record_for(ptype, fields)?;
        put_record(txn, &record)
    }

    fn delete_rule(&self, txn: &mut dyn WriteTxn, ptype: &str, fields: &[String]) -> Result<()> {
        let record = self.record_for(ptype, fields)?;
        txn.delete(record.key.as_bytes())?;
        Ok(())
    }

    /// Validates a filter and turns it into a key prefix. Runs before any
    /// transaction is opened.
    fn filter_prefix(
        &self,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<String> {
        if field_index != 0 {
            return Err(AdapterError::UnsupportedFilter { field_index });
        }
        if !self.encoder.supports_prefix_filter() {
            return Err(AdapterError::UnsupportedOperation(format!(
                "filtered operations need prefix-ordered keys, {} keys have none",
                self.encoder.name()
            )));
        }
        self.encoder.filter_prefix(ptype, field_values)
    }

    /// Collects every entry whose key holds `prefix` as leading fields.
    ///
    /// Keys starting with `prefix` are contiguous in key order, so the scan
    /// stops at the first key that does not.
    fn scan_prefix<T>(
        &self,
        prefix: &str,
        mut visit: impl FnMut(Vec<u8>, Vec<u8>) -> Result<T>,
    ) -> Result<Vec<T>> {
        let prefix = prefix.as_bytes();

        self.store.view(&self.collection, |txn| -> Result<Vec<T>> {
            let mut matched = Vec::new();
            let mut cursor = txn.cursor();
            let mut entry = cursor.seek(prefix)?;
            while let Some((key, value)) = entry {
                if !key.starts_with(prefix) {
                    break;
                }
                if matches_field_prefix(&key, prefix) {
                    matched.push(visit(key, value)?);
                }
                entry = cursor.next()?;
            }
            Ok(matched)
        })
    }
}

fn put_record(txn: &mut dyn WriteTxn, record: &StoredRecord) -> Result<()> {
    txn.put(record.key.as_bytes(), &record.encode()?)?;
    Ok(())
}

// ================================================================================================
// PERSISTENCE CONTRACT
// ================================================================================================

impl<S: KvStore> Adapter for PolicyAdapter<S> {
    type Error = AdapterError;

    /// Loads the bootstrap policy (if configured), then every stored record
    /// in key order.
    ///
    /// The model is not cleared first. A bootstrap error aborts the load
    /// before any stored record is read.
    fn load_policy(&self, model: &mut Model) -> Result<()> {
        if let Some(policy) = &self.bootstrap_policy {
            load_bootstrap(policy, model)?;
        }

        let loaded = self.store.view(&self.collection, |txn| -> Result<usize> {
            let mut count = 0;
            let mut cursor = txn.cursor();
            let mut entry = cursor.first()?;
            while let Some((_, value)) = entry {
                let record = StoredRecord::decode(&value)?;
                load_record(&record, model)?;
                count += 1;
                entry = cursor.next()?;
            }
            Ok(count)
        })?;

        info!(
            "Loaded {} stored rules from collection {}",
            loaded, self.collection
        );
        Ok(())
    }

    /// Writes one record per model rule, `p` buckets first, in a single
    /// transaction.
    ///
    /// This is an upsert of the model's rules: stored records that are no
    /// longer in the model are left in place.
    fn save_policy(&self, model: &Model) -> Result<()> {
        let records = records_for_model(model, self.encoder.as_ref())?;

        self.store.update(&self.collection, |txn| -> Result<()> {
            for record in &records {
                put_record(txn, record)?;
            }
            Ok(())
        })?;

        debug!("Saved {} rules to collection {}", records.len(), self.collection);
        Ok(())
    }

    /// Inserts a rule, overwriting an identical one.
    fn add_policy(&self, _sec: Section, ptype: &str, rule: &[String]) -> Result<()> {
        self.store.update(&self.collection, |txn| -> Result<()> {
            self.put_rule(txn, ptype, rule)
        })
    }

    /// Inserts every rule in one transaction. The first failure aborts the
    /// transaction and none of the batch is written.
    fn add_policies(&self, _sec: Section, ptype: &str, rules: &[Vec<String>]) -> Result<()> {
        self.store.update(&self.collection, |txn| -> Result<()> {
            for rule in rules {
                self.put_rule(txn, ptype, rule)?;
            }
            Ok(())
        })?;

        debug!("Added {} {} rules", rules.len(), ptype);
        Ok(())
    }

    /// Deletes a rule. Deleting a rule that is not stored succeeds.
    fn remove_policy(&self, _sec: Section, ptype: &str, rule: &[String]) -> Result<()> {
        self.store.update(&self.collection, |txn| -> Result<()> {
            self.delete_rule(txn, ptype, rule)
        })
    }

    fn remove_policies(&self, _sec: Section, ptype: &str, rules: &[Vec<String>]) -> Result<()> {
        self.store.update(&self.collection, |txn| -> Result<()> {
            for rule in rules {
                self.delete_rule(txn, ptype, rule)?;
            }
            Ok(())
        })?;

        debug!("Removed {} {} rules", rules.len(), ptype);
        Ok(())
    }

    /// Removes every rule of `ptype` whose leading fields equal
    /// `field_values`.
    ///
    /// For example, with
    ///
    /// ```text
    /// p, subject-a, action-a, get
    /// p, subject-a, action-a, write
    /// p, subject-b, action-a, get
    /// ```
    ///
    /// `(0, ["subject-a"])` removes the first two rules and
    /// `(0, ["subject-a", "action-a"])` does the same. `(1, ["action-a"])`
    /// fails with [`AdapterError::UnsupportedFilter`]. Values are used up to
    /// the first empty one.
    fn remove_filtered_policy(
        &self,
        _sec: Section,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<()> {
        let prefix = self.filter_prefix(ptype, field_index, field_values)?;

        // The cursor must not be mutated while it walks, so keys are
        // collected first and deleted in a separate write transaction.
        let matched = self.scan_prefix(&prefix, |key, _| Ok(key))?;

        self.store.update(&self.collection, |txn| -> Result<()> {
            for key in &matched {
                txn.delete(key)?;
            }
            Ok(())
        })?;

        debug!("Removed {} rules matching {}", matched.len(), prefix);
        Ok(())
    }

    /// Deletes the old rule and writes the new one in one transaction.
    fn update_policy(
        &self,
        _sec: Section,
        ptype: &str,
        old_rule: &[String],
        new_rule: &[String],
    ) -> Result<()> {
        self.store.update(&self.collection, |txn| -> Result<()> {
            self.delete_rule(txn, ptype, old_rule)?;
            self.put_rule(txn, ptype, new_rule)
        })
    }

    /// Deletes every old rule, then writes every new rule, in one
    /// transaction.
    ///
    /// The lists are not paired up and may differ in length.
    fn update_policies(
        &self,
        _sec: Section,
        ptype: &str,
        old_rules: &[Vec<String>],
        new_rules: &[Vec<String>],
    ) -> Result<()> {
        if old_rules.len() != new_rules.len() {
            debug!(
                "Updating {} {} rules with {} replacements",
                old_rules.len(),
                ptype,
                new_rules.len()
            );
        }

        self.store.update(&self.collection, |txn| -> Result<()> {
            for rule in old_rules {
                self.delete_rule(txn, ptype, rule)?;
            }
            for rule in new_rules {
                self.put_rule(txn, ptype, rule)?;
            }
            Ok(())
        })
    }

    /// Replaces the rules matched by the filter with `new_rules`.
    ///
    /// Matching follows [`Adapter::remove_filtered_policy`]. The removed
    /// rules are returned in key order, rebuilt from their stored fields.
    fn update_filtered_policies(
        &self,
        _sec: Section,
        ptype: &str,
        new_rules: &[Vec<String>],
        field_index: usize,
        field_values: &[String],
    ) -> Result<Vec<Vec<String>>> {
        let prefix = self.filter_prefix(ptype, field_index, field_values)?;

        let matched = self.scan_prefix(&prefix, |key, value| {
            Ok((key, StoredRecord::decode(&value)?))
        })?;

        self.store.update(&self.collection, |txn| -> Result<()> {
            for (key, _) in &matched {
                txn.delete(key)?;
            }
            for rule in new_rules {
                self.put_rule(txn, ptype, rule)?;
            }
            Ok(())
        })?;

        debug!(
            "Replaced {} rules matching {} with {} rules",
            matched.len(),
            prefix,
            new_rules.len()
        );
        Ok(matched
            .into_iter()
            .map(|(_, record)| record.fields())
            .collect())
    }
}
