//! # Policy Model Library
//!
//! In-memory authorization policy model, the line-based rule loader and the
//! persistence contract implemented by storage adapters.

pub mod adapter;
pub mod error;
pub mod model;
pub mod rule;

pub use adapter::Adapter;

pub use error::{ModelError, Result};

pub use model::{
    load_policy_line,       // Textual rule line loader
    tokenize_line,          // Comma-separated line tokenizer
    Assertion,              // One ptype bucket
    Model,                  // Rules grouped by section and ptype
    Section,                // `p` / `g`
};

pub use rule::{check_arity, Rule, MAX_FIELDS};
