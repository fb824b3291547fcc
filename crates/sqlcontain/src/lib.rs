//! SQLContain Rust - association containment and eager loading for SQL result streams.
//!
//! SQLContain lets a query name the associations to fetch with its rows
//! and takes care of the rest:
//!
//! - Containment declarations, typed or as loose JSON, validated before any I/O
//! - To-one associations folded into the primary query as joins
//! - Other associations loaded by one batched follow-up query each
//! - Flat rows reshaped into nested, type-cast records, streamed lazily
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlcontain::prelude::*;
//!
//! let registry = TableRegistry::new();
//! registry.register(
//!     "Articles",
//!     TableConfig::new()
//!         .table("articles")
//!         .association(AssociationDef::belongs_to("Author").target("Users"))
//!         .association(AssociationDef::has_many("Comments")),
//! )?;
//! registry.register("Users", TableConfig::new().table("users"))?;
//! registry.register("Comments", TableConfig::new().table("comments"))?;
//!
//! let articles = registry
//!     .select("Articles")?
//!     .contain(["Author", "Comments"])
//!     .all(&conn)?;
//!
//! for article in articles {
//!     let article = article?;
//!     println!("{}", article.to_json());
//! }
//! ```
//!
//! Queries run through a [`Connection`] supplied by the caller; SQLContain
//! itself performs no I/O.

pub use sqlcontain_core::{
    ALIAS_SEPARATOR, AssociationKind, Attachment, BufferedRows, Caster, ColumnInfo,
    ContainError, ContainErrorKind, Entry, Error, FieldInfo, LinkTableInfo, MapRows, NoSchema,
    QueryError, QueryErrorKind, Record, Result, Row, RowSource, SchemaError, SchemaErrorKind,
    SchemaLookup, SqlType, Strategy, TableSchema, TypeError, Value, ValueKey, VecSource,
    column_alias, split_column_alias,
};
pub use sqlcontain_query::{
    Association, AssociationDef, BinaryOp, Connection, Contain, ContainNode, ContainOptions, ContainSpec,
    DeferredLoad, EagerPlan, Expr, ForeignKey, Join, JoinType, KeyFilter, LoaderConfig,
    NormalizedContain, NormalizedNode, OrderBy, OrderDirection, QuerySchema, RegistryStats,
    ResultSet, Select, SelectField, Table, TableConfig, TableRegistry, is_valid_alias, normalize,
};

/// JSON value type accepted by [`Select::contain_json`].
pub use serde_json::Value as JsonValue;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use sqlcontain::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Registry
        AssociationDef,
        // Execution
        Connection,
        // Containment
        ContainNode,
        ContainSpec,
        Entry,
        Error,
        // Query building
        Expr,
        FieldInfo,
        JsonValue,
        LinkTableInfo,
        LoaderConfig,
        OrderBy,
        Record,
        Result,
        ResultSet,
        Row,
        RowSource,
        Select,
        SqlType,
        Strategy,
        TableConfig,
        TableRegistry,
        TableSchema,
        Value,
    };
}
