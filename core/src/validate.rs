//! Catalog validation.
//!
//! Catches mistakes in a declared catalog before any statement reaches the
//! database: unnamed objects, objects with nothing to execute, two objects
//! competing for the same name in `sqlite_master`, and placeholder typos
//! that would otherwise be sent to the engine verbatim.
//!
//! # Examples
//!
//! ```
//! use rdb_core::*;
//!
//! let good = Catalog::new()
//!     .with(SchemaObject::table("t", "CREATE TABLE <TABLENAME>(a)"));
//! assert!(validate_catalog(&good).is_empty());
//!
//! let bad = Catalog::new()
//!     .with(SchemaObject::table("t", "CREATE TABLE <TABLE>(a)"));
//! assert!(matches!(
//!     validate_catalog(&bad)[0],
//!     ValidationError::UnknownPlaceholder { .. }
//! ));
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::{Catalog, MASTER_PLACEHOLDER, SIBLING_PLACEHOLDER, SchemaObject, TABLE_PLACEHOLDER};

/// Catalog validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Object name is empty or whitespace-only.
    #[error("schema object name cannot be empty")]
    EmptyObjectName,
    /// Object has no statements, or only blank ones.
    #[error("schema object '{0}' has no statements")]
    MissingStatements(String),
    /// Two introspectable objects share a name (case-insensitive).
    #[error("duplicate schema object: {0}")]
    DuplicateObject(String),
    /// A `<...>` token that is not one of the supported placeholders.
    #[error("unknown placeholder {placeholder} in schema object '{object}'")]
    UnknownPlaceholder { object: String, placeholder: String },
}

/// Validates every entry of a catalog and returns all problems found.
pub fn validate_catalog(catalog: &Catalog) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    // Tables, views, indexes and triggers share one namespace in the engine.
    let mut seen: HashSet<String> = HashSet::new();

    for object in catalog {
        if object.name.trim().is_empty() {
            errors.push(ValidationError::EmptyObjectName);
            continue;
        }

        if object.statements.iter().all(|sql| sql.trim().is_empty()) {
            errors.push(ValidationError::MissingStatements(object.name.clone()));
        }

        if object.kind.is_introspectable() && !seen.insert(object.name.to_ascii_lowercase()) {
            errors.push(ValidationError::DuplicateObject(object.name.clone()));
        }

        errors.extend(validate_placeholders(object));
    }

    errors
}

fn validate_placeholders(object: &SchemaObject) -> Vec<ValidationError> {
    let known = [TABLE_PLACEHOLDER, MASTER_PLACEHOLDER, SIBLING_PLACEHOLDER];
    let mut errors = Vec::new();

    for sql in &object.statements {
        for token in placeholder_tokens(sql) {
            if !known.contains(&token) {
                errors.push(ValidationError::UnknownPlaceholder {
                    object: object.name.clone(),
                    placeholder: token.to_string(),
                });
            }
        }
    }

    errors
}

/// Yields `<WORD>` tokens where WORD is one or more upper-case letters,
/// skipping anything inside a single-quoted string literal.
///
/// Comparison operators such as `a<b` never match because the token must be
/// upper-case only and closed by `>` with nothing in between.
fn placeholder_tokens(sql: &str) -> impl Iterator<Item = &str> {
    let bytes = sql.as_bytes();
    let mut in_literal = false;
    let mut tokens = Vec::new();
    for (start, &byte) in bytes.iter().enumerate() {
        match byte {
            // A doubled quote inside a literal toggles twice and stays inside.
            b'\'' => in_literal = !in_literal,
            b'<' if !in_literal => {
                let rest = &bytes[start + 1..];
                let len = rest
                    .iter()
                    .take_while(|b| b.is_ascii_uppercase() || **b == b'_')
                    .count();
                if len > 0 && rest.get(len) == Some(&b'>') {
                    tokens.push(&sql[start..start + len + 2]);
                }
            }
            _ => {}
        }
    }
    tokens.into_iter()
}
