//! Error types for the policy model.

use thiserror::Error;

/// Errors raised while building rules or loading them into a [`crate::Model`].
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Empty policy type")]
    EmptyPolicyType,

    #[error("Too many fields: {count} given, at most {max} allowed")]
    TooManyFields { count: usize, max: usize },

    #[error("Unknown section: {0}")]
    UnknownSection(String),

    #[error("Unknown policy type: {sec}/{ptype}")]
    UnknownPolicyType { sec: String, ptype: String },

    #[error("Policy line parse error: {0}")]
    Parse(#[from] csv::Error),

    #[error("Policy line has no tokens: {0:?}")]
    EmptyLine(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
