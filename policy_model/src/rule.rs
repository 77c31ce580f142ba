//! # Rule Module
//!
//! A rule is a policy type tag plus up to [`MAX_FIELDS`] positional string fields.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::model::Section;

/// Maximum number of positional fields a rule may carry.
pub const MAX_FIELDS: usize = 6;

/// One authorization rule, e.g. `p, alice, data1, read`.
///
/// Fields past the rule's length are absent, which is not the same as an
/// empty-string field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rule {
    ptype: String,
    fields: Vec<String>,
}

impl Rule {
    /// Builds a rule, rejecting an empty ptype or more than six fields.
    pub fn new<P, I, S>(ptype: P, fields: I) -> Result<Self>
    where
        P: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ptype = ptype.into();
        if ptype.is_empty() {
            return Err(ModelError::EmptyPolicyType);
        }

        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        check_arity(fields.len())?;

        Ok(Self { ptype, fields })
    }

    pub fn ptype(&self) -> &str {
        &self.ptype
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<String> {
        self.fields
    }

    /// Section this rule belongs to, taken from the ptype's first character.
    pub fn section(&self) -> Result<Section> {
        Section::from_key(&self.ptype)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ptype)?;
        for field in &self.fields {
            write!(f, ", {}", field)?;
        }
        Ok(())
    }
}

/// Fails with [`ModelError::TooManyFields`] when `count` exceeds [`MAX_FIELDS`].
pub fn check_arity(count: usize) -> Result<()> {
    if count > MAX_FIELDS {
        return Err(ModelError::TooManyFields {
            count,
            max: MAX_FIELDS,
        });
    }
    Ok(())
}
