/*
 *  Copyright 2025-2026 Trendreel Developers
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Addressing of the Row Store table named by a trigger.
//!
//! Dataset and table names arrive inside untrusted messages and end up spliced
//! into SQL text, so they are validated before any statement is built.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum identifier length (PostgreSQL NAMEDATALEN - 1).
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Names that must never be used as a dataset.
const RESERVED_DATASETS: &[&str] = &["pg_catalog", "information_schema", "pg_temp"];

/// Errors that can occur during identifier validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("Identifier length invalid: '{name}' (must be 1-{max} characters)")]
    InvalidLength { name: String, max: usize },

    #[error("Identifier must start with a letter or underscore: '{0}'")]
    InvalidStart(String),

    #[error(
        "Identifier contains invalid characters (only alphanumeric and underscore allowed): '{0}'"
    )]
    InvalidCharacters(String),

    #[error("Identifier is reserved: '{0}'")]
    ReservedName(String),
}

/// Validates a dataset or table name.
///
/// - Length must be between 1 and 63 characters
/// - Must start with a letter (a-z, A-Z) or underscore
/// - Subsequent characters must be alphanumeric or underscore
///
/// ```
/// use trendreel::models::validate_identifier;
///
/// assert!(validate_identifier("target_trends").is_ok());
/// assert!(validate_identifier("1trends").is_err());
/// assert!(validate_identifier("trends; DROP TABLE x").is_err());
/// ```
pub fn validate_identifier(name: &str) -> Result<&str, IdentifierError> {
    if name.is_empty() || name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(IdentifierError::InvalidLength {
            name: name.to_string(),
            max: MAX_IDENTIFIER_LENGTH,
        });
    }

    let starts_ok = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !starts_ok {
        return Err(IdentifierError::InvalidStart(name.to_string()));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(IdentifierError::InvalidCharacters(name.to_string()));
    }

    Ok(name)
}

/// A `{dataset}.{table}` pair identifying one Row Store table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// Checks both identifiers, returning the first problem found.
    pub fn validate(&self) -> Result<(), IdentifierError> {
        validate_identifier(&self.dataset)?;
        if RESERVED_DATASETS.contains(&self.dataset.to_lowercase().as_str()) {
            return Err(IdentifierError::ReservedName(self.dataset.clone()));
        }
        validate_identifier(&self.table)?;
        Ok(())
    }

    /// Quoted, schema-qualified name (`"dataset"."table"`).
    pub fn qualified(&self) -> Result<String, IdentifierError> {
        self.validate()?;
        Ok(format!("\"{}\".\"{}\"", self.dataset, self.table))
    }

    /// Quoted table name without a schema, for backends that have none.
    pub fn unqualified(&self) -> Result<String, IdentifierError> {
        self.validate()?;
        Ok(format!("\"{}\"", self.table))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}
