//! Repository layer: entity-scoped database operations.
//!
//! Each sub-module owns one table's SQL. Uniqueness and referential
//! invariants live in the schema; write failures are classified with
//! [`DatabaseError::from_write`] so callers can report conflicts.

mod appointment;
mod bed;
mod directory;
mod invoice;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{parse_instant, DatabaseError};

pub use appointment::*;
pub use bed::*;
pub use directory::*;
pub use invoice::*;

/// Helper: builds a dynamic `WHERE` clause with numbered parameters.
pub(crate) struct WhereClause {
    clauses: Vec<String>,
    params: Vec<Box<dyn rusqlite::types::ToSql>>,
}

impl WhereClause {
    pub(crate) fn new() -> Self {
        Self {
            clauses: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Add a condition. `{}` in `template` is replaced with the parameter
    /// placeholder.
    pub(crate) fn push<T: rusqlite::types::ToSql + 'static>(&mut self, template: &str, value: T) {
        self.params.push(Box::new(value));
        let placeholder = format!("?{}", self.params.len());
        self.clauses.push(template.replace("{}", &placeholder));
    }

    pub(crate) fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    /// Placeholder index the next bound parameter will get.
    pub(crate) fn next_index(&self) -> usize {
        self.params.len() + 1
    }

    pub(crate) fn param_refs(&self) -> Vec<&dyn rusqlite::types::ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}

pub(crate) fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|_| DatabaseError::InvalidValue {
        field: field.into(),
        value: raw.into(),
    })
}

pub(crate) fn parse_opt_instant(
    field: &str,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    raw.map(|s| parse_instant(field, &s)).transpose()
}
