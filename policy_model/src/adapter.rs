//! Persistence contract between a policy engine and its rule storage.

use crate::model::{Model, Section};

/// Storage backend for a policy [`Model`].
///
/// The engine calls `load_policy` once at startup and then keeps storage in
/// sync through the incremental methods. `sec` is passed through for parity
/// with the model; storage keys derive from `ptype` and the rule fields only.
pub trait Adapter {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Loads every stored rule into `model`.
    fn load_policy(&self, model: &mut Model) -> Result<(), Self::Error>;

    /// Writes every rule of `model` to storage.
    fn save_policy(&self, model: &Model) -> Result<(), Self::Error>;

    fn add_policy(&self, sec: Section, ptype: &str, rule: &[String]) -> Result<(), Self::Error>;

    fn add_policies(
        &self,
        sec: Section,
        ptype: &str,
        rules: &[Vec<String>],
    ) -> Result<(), Self::Error>;

    fn remove_policy(&self, sec: Section, ptype: &str, rule: &[String])
        -> Result<(), Self::Error>;

    fn remove_policies(
        &self,
        sec: Section,
        ptype: &str,
        rules: &[Vec<String>],
    ) -> Result<(), Self::Error>;

    /// Removes every rule whose fields starting at `field_index` match
    /// `field_values`.
    fn remove_filtered_policy(
        &self,
        sec: Section,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<(), Self::Error>;

    fn update_policy(
        &self,
        sec: Section,
        ptype: &str,
        old_rule: &[String],
        new_rule: &[String],
    ) -> Result<(), Self::Error>;

    fn update_policies(
        &self,
        sec: Section,
        ptype: &str,
        old_rules: &[Vec<String>],
        new_rules: &[Vec<String>],
    ) -> Result<(), Self::Error>;

    /// Replaces the rules matched by the filter with `new_rules` and returns
    /// the rules that were removed.
    fn update_filtered_policies(
        &self,
        sec: Section,
        ptype: &str,
        new_rules: &[Vec<String>],
        field_index: usize,
        field_values: &[String],
    ) -> Result<Vec<Vec<String>>, Self::Error>;
}
