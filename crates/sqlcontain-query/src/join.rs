//! JOIN clause types.

use crate::expr::{Expr, quote_identifier};
use serde::{Deserialize, Serialize};
use sqlcontain_core::{Error, Result, Value};
use std::str::FromStr;

/// A JOIN clause.
#[derive(Debug, Clone)]
pub struct Join {
    /// Type of join
    pub join_type: JoinType,
    /// Physical table to join
    pub table: String,
    /// Alias the joined table carries in the query
    pub alias: String,
    /// ON condition
    pub on: Expr,
}

/// Types of SQL joins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    Inner,
    #[default]
    Left,
}

impl JoinType {
    /// Get the SQL keyword for this join type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

impl FromStr for JoinType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inner" => Ok(JoinType::Inner),
            "left" => Ok(JoinType::Left),
            other => Err(Error::config(format!(
                "unknown join type '{}', expected 'left' or 'inner'",
                other
            ))),
        }
    }
}

impl Join {
    /// Create a join of the given type.
    pub fn new(
        join_type: JoinType,
        table: impl Into<String>,
        alias: impl Into<String>,
        on: Expr,
    ) -> Self {
        Self {
            join_type,
            table: table.into(),
            alias: alias.into(),
            on,
        }
    }

    /// Create an INNER JOIN.
    pub fn inner(table: impl Into<String>, alias: impl Into<String>, on: Expr) -> Self {
        Self::new(JoinType::Inner, table, alias, on)
    }

    /// Create a LEFT JOIN.
    pub fn left(table: impl Into<String>, alias: impl Into<String>, on: Expr) -> Self {
        Self::new(JoinType::Left, table, alias, on)
    }

    /// Generate SQL for this JOIN clause, collecting parameters.
    pub fn build(&self, params: &mut Vec<Value>) -> String {
        format!(
            " {} {} AS {} ON {}",
            self.join_type.as_str(),
            quote_identifier(&self.table),
            quote_identifier(&self.alias),
            self.on.build(params)
        )
    }
}
