//! # Policy Model Module
//!
//! In-memory grouping of rules by section (`p` policy rules, `g` grouping
//! rules) and by ptype within each section.
//!
//! The model only tracks rule tuples. Matching and evaluation live in the
//! policy engine that owns the model.

use std::collections::BTreeMap;
use std::fmt;

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

// ================================================================================================
// SECTIONS
// ================================================================================================

/// Top-level rule section, identified by the first character of a ptype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Section {
    /// `p`: permission rules
    Policy,
    /// `g`: role and grouping rules
    Grouping,
}

impl Section {
    /// Sections in persistence order.
    pub fn all() -> [Section; 2] {
        [Section::Policy, Section::Grouping]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Policy => "p",
            Section::Grouping => "g",
        }
    }

    /// Resolves the section for a ptype such as `p`, `p2` or `g`.
    pub fn from_key(key: &str) -> Result<Section> {
        match key.chars().next() {
            Some('p') => Ok(Section::Policy),
            Some('g') => Ok(Section::Grouping),
            _ => Err(ModelError::UnknownSection(key.to_string())),
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ================================================================================================
// ASSERTION (ONE PTYPE BUCKET)
// ================================================================================================

/// Rules of one ptype, in the order they were loaded or added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assertion {
    pub key: String,
    pub policy: Vec<Vec<String>>,
}

impl Assertion {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            policy: Vec::new(),
        }
    }

    pub fn contains(&self, rule: &[String]) -> bool {
        self.policy.iter().any(|r| r.as_slice() == rule)
    }
}

// ================================================================================================
// MODEL
// ================================================================================================

/// Rules grouped by section, then by ptype.
///
/// Ptype buckets must be declared before rules can be loaded into them.
/// Buckets iterate in ascending ptype order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    policy: BTreeMap<String, Assertion>,
    grouping: BTreeMap<String, Assertion>,
}

impl Model {
    /// Creates a model with no declared ptypes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a model declaring the `p` and `g` ptypes of a basic RBAC setup.
    pub fn rbac() -> Self {
        let mut model = Self::new();
        model.add_policy_type(Section::Policy, "p");
        model.add_policy_type(Section::Grouping, "g");
        model
    }

    /// Declares a ptype bucket. Re-declaring an existing bucket keeps its rules.
    pub fn add_policy_type(&mut self, sec: Section, ptype: impl Into<String>) {
        let ptype = ptype.into();
        self.section_mut(sec)
            .entry(ptype.clone())
            .or_insert_with(|| Assertion::new(ptype));
    }

    pub fn assertion(&self, sec: Section, ptype: &str) -> Option<&Assertion> {
        self.section(sec).get(ptype)
    }

    pub fn assertion_mut(&mut self, sec: Section, ptype: &str) -> Result<&mut Assertion> {
        self.section_mut(sec)
            .get_mut(ptype)
            .ok_or_else(|| ModelError::UnknownPolicyType {
                sec: sec.as_str().to_string(),
                ptype: ptype.to_string(),
            })
    }

    /// Declared ptype buckets of a section, ascending by ptype.
    pub fn policy_types(&self, sec: Section) -> impl Iterator<Item = (&str, &Assertion)> {
        self.section(sec).iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Rules of one ptype; empty when the ptype is undeclared.
    pub fn get_policy(&self, sec: Section, ptype: &str) -> Vec<Vec<String>> {
        self.assertion(sec, ptype)
            .map(|a| a.policy.clone())
            .unwrap_or_default()
    }

    pub fn has_policy(&self, sec: Section, ptype: &str, rule: &[String]) -> bool {
        self.assertion(sec, ptype)
            .map(|a| a.contains(rule))
            .unwrap_or(false)
    }

    /// Appends a rule. Returns `false` when the rule is already present.
    pub fn add_policy(&mut self, sec: Section, ptype: &str, rule: Vec<String>) -> Result<bool> {
        let assertion = self.assertion_mut(sec, ptype)?;
        if assertion.contains(&rule) {
            return Ok(false);
        }
        assertion.policy.push(rule);
        Ok(true)
    }

    /// Removes a rule. Returns `false` when the rule was not present.
    pub fn remove_policy(&mut self, sec: Section, ptype: &str, rule: &[String]) -> Result<bool> {
        let assertion = self.assertion_mut(sec, ptype)?;
        match assertion.policy.iter().position(|r| r.as_slice() == rule) {
            Some(pos) => {
                assertion.policy.remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes every rule whose fields starting at `field_index` equal
    /// `field_values`. An empty filter value matches anything.
    ///
    /// Returns the removed rules in model order.
    pub fn remove_filtered_policy(
        &mut self,
        sec: Section,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<Vec<Vec<String>>> {
        let assertion = self.assertion_mut(sec, ptype)?;

        let (removed, kept): (Vec<_>, Vec<_>) =
            assertion.policy.drain(..).partition(|rule| {
                field_values.iter().enumerate().all(|(i, value)| {
                    value.is_empty() || rule.get(field_index + i) == Some(value)
                })
            });
        assertion.policy = kept;

        Ok(removed)
    }

    /// Drops every loaded rule while keeping the declared ptypes.
    pub fn clear_policy(&mut self) {
        for sec in Section::all() {
            for assertion in self.section_mut(sec).values_mut() {
                assertion.policy.clear();
            }
        }
    }

    /// Total number of rules across all buckets.
    pub fn rule_count(&self) -> usize {
        self.policy
            .values()
            .chain(self.grouping.values())
            .map(|a| a.policy.len())
            .sum()
    }

    fn section(&self, sec: Section) -> &BTreeMap<String, Assertion> {
        match sec {
            Section::Policy => &self.policy,
            Section::Grouping => &self.grouping,
        }
    }

    fn section_mut(&mut self, sec: Section) -> &mut BTreeMap<String, Assertion> {
        match sec {
            Section::Policy => &mut self.policy,
            Section::Grouping => &mut self.grouping,
        }
    }
}

// ================================================================================================
// LINE LOADING
// ================================================================================================

/// Splits one comma-separated policy line into trimmed tokens.
///
/// Returns `None` for blank lines and `#` comments.
pub fn tokenize_line(line: &str) -> Result<Option<Vec<String>>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(trimmed.as_bytes());

    let mut record = StringRecord::new();
    if !reader.read_record(&mut record)? {
        return Err(ModelError::EmptyLine(line.to_string()));
    }

    Ok(Some(record.iter().map(str::to_string).collect()))
}

/// Loads one textual rule line such as `p, alice, data1, read` into the model.
///
/// The first token selects the ptype bucket (its first character selects the
/// section); the remaining tokens become the rule. Blank and `#` lines are
/// ignored, as are rules the bucket already holds.
pub fn load_policy_line(line: &str, model: &mut Model) -> Result<()> {
    let Some(mut tokens) = tokenize_line(line)? else {
        return Ok(());
    };

    let key = tokens.remove(0);
    let sec = Section::from_key(&key)?;
    model.add_policy(sec, &key, tokens)?;

    Ok(())
}
