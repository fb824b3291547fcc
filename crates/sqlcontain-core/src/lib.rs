//! Core types and traits for SQLContain Rust.
//!
//! This crate provides the leaf abstractions the containment pipeline is
//! built on:
//!
//! - `Value` for dynamically typed column values, `ValueKey` for matching them
//! - `Row` and the forward-only `RowSource` cursor contract
//! - `Record` for reshaped, nested per-table output
//! - `SqlType` casts and the `SchemaLookup` collaborator trait
//! - `AssociationKind` relationship metadata

pub mod error;
pub mod record;
pub mod relationship;
pub mod row;
pub mod schema;
pub mod source;
pub mod types;
pub mod value;

pub use error::{
    ConfigError, ContainError, ContainErrorKind, Error, QueryError, QueryErrorKind, Result,
    SchemaError, SchemaErrorKind, TypeError,
};
pub use record::{Entry, Record};
pub use relationship::{AssociationKind, LinkTableInfo, Strategy};
pub use row::{
    ALIAS_SEPARATOR, Attachment, ColumnInfo, Row, RowSource, column_alias, split_column_alias,
};
pub use schema::{FieldInfo, NoSchema, SchemaLookup, TableSchema};
pub use source::{BufferCursor, BufferedRows, MapRows, VecSource};
pub use types::{Caster, SqlType};
pub use value::{Value, ValueKey};
