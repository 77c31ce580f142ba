//! # Bootstrap Loader Module
//!
//! Parses the optional built-in policy text supplied at construction and
//! merges it into a model ahead of the stored rules.
//!
//! Format: one CSV rule per line, `#` comments and blank lines ignored.
//!
//! ```text
//! # built-in roles
//! p, role-a, data1, write
//! g, alice, role-a
//! ```

use csv::{ReaderBuilder, StringRecord, Trim};
use log::debug;
use policy_model::{Model, Section};

use crate::error::{AdapterError, Result};

/// One parsed bootstrap rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapLine {
    /// 1-based line number in the bootstrap text
    pub line_no: usize,
    /// First token: the ptype bucket the rule belongs to
    pub key: String,
    /// Remaining tokens
    pub fields: Vec<String>,
}

/// Parses every rule line of `text`.
pub fn parse_bootstrap(text: &str) -> Result<Vec<BootstrapLine>> {
    let mut lines = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(line.as_bytes());

        let mut record = StringRecord::new();
        let found = reader
            .read_record(&mut record)
            .map_err(|source| AdapterError::Parse { line: line_no, source })?;
        if !found {
            continue;
        }

        let mut tokens = record.iter().map(str::to_string);
        let key = tokens.next().unwrap_or_default();
        lines.push(BootstrapLine {
            line_no,
            key,
            fields: tokens.collect(),
        });
    }

    Ok(lines)
}

/// Appends the bootstrap rules to `model` in the order they appear.
///
/// All lines are parsed and their buckets resolved before the model is
/// touched, so a failed load leaves the model as it was. Returns the number of
/// rules appended.
pub fn load_bootstrap(text: &str, model: &mut Model) -> Result<usize> {
    let lines = parse_bootstrap(text)?;

    let mut resolved = Vec::with_capacity(lines.len());
    for line in lines {
        let sec = Section::from_key(&line.key)?;
        model.assertion_mut(sec, &line.key)?;
        resolved.push((sec, line));
    }

    let count = resolved.len();
    for (sec, line) in resolved {
        model.assertion_mut(sec, &line.key)?.policy.push(line.fields);
    }

    debug!("Loaded {} bootstrap rules", count);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RBAC_POLICY: &str = "\
p, alice, data1, read
p, bob, data2, write

# admins
p, data2_admin, data2, read
p, data2_admin, data2, write
g, alice, data2_admin
";

    fn rule(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_bootstrap_skips_comments_and_blanks() {
        let lines = parse_bootstrap(RBAC_POLICY).unwrap();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0].key, "p");
        assert_eq!(lines[0].fields, rule(&["alice", "data1", "read"]));
        assert_eq!(lines[2].line_no, 5);
        assert_eq!(lines[4].key, "g");
    }

    #[test]
    fn test_load_bootstrap_into_model() {
        let mut model = Model::rbac();
        let count = load_bootstrap(RBAC_POLICY, &mut model).unwrap();
        assert_eq!(count, 5);
        assert_eq!(
            model.get_policy(Section::Policy, "p"),
            vec![
                rule(&["alice", "data1", "read"]),
                rule(&["bob", "data2", "write"]),
                rule(&["data2_admin", "data2", "read"]),
                rule(&["data2_admin", "data2", "write"]),
            ]
        );
        assert_eq!(
            model.get_policy(Section::Grouping, "g"),
            vec![rule(&["alice", "data2_admin"])]
        );
    }

    #[test]
    fn test_load_bootstrap_quoted_field() {
        let mut model = Model::rbac();
        load_bootstrap(r#"p,alice,"data1, data2",read"#, &mut model).unwrap();
        assert_eq!(
            model.get_policy(Section::Policy, "p"),
            vec![rule(&["alice", "data1, data2", "read"])]
        );
    }

    #[test]
    fn test_line_without_ptype_is_rejected() {
        let mut model = Model::rbac();
        let err = load_bootstrap(", alice, data1, read", &mut model).unwrap_err();
        assert!(matches!(err, AdapterError::Model(_)));
    }

    #[test]
    fn test_undeclared_bucket_leaves_model_untouched() {
        let mut model = Model::rbac();
        let err = load_bootstrap("p, alice, data1, read\np3, bob, data2", &mut model).unwrap_err();
        assert!(matches!(err, AdapterError::Model(_)));
        assert_eq!(model.rule_count(), 0);
    }

    #[test]
    fn test_empty_bootstrap() {
        let mut model = Model::rbac();
        assert_eq!(load_bootstrap("", &mut model).unwrap(), 0);
        assert_eq!(load_bootstrap("# only a comment\n\n", &mut model).unwrap(), 0);
    }
}
