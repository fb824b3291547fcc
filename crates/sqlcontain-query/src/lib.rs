//! Containment planning and eager loading for SQLContain Rust.
//!
//! `sqlcontain-query` is the **query layer**. It turns a query plus a
//! containment declaration ("also fetch these associations") into one
//! primary query and a set of batched follow-up queries, and streams the
//! results back as nested records.
//!
//! # Role In The Architecture
//!
//! - **Registry**: `TableRegistry` builds and caches `Table` definitions and
//!   their `Association`s by alias.
//! - **Containment**: `ContainSpec` declarations (typed or JSON) are
//!   normalized into a `NormalizedContain` tree.
//! - **Planning**: joinable associations become joins, everything else a
//!   `DeferredLoad`.
//! - **Execution**: the `eager` executor runs the plan through a
//!   `Connection` and hands back a `ResultSet`.
//!
//! Most users access these types via the `sqlcontain` facade crate.

pub mod association;
pub mod clause;
pub mod config;
pub mod connection;
pub mod contain;
pub mod eager;
pub mod expr;
pub mod join;
pub mod plan;
pub mod registry;
pub mod result;
pub mod select;

pub use association::{Association, AssociationDef, KeyFilter};
pub use clause::{Limit, Offset, OrderBy, OrderDirection, Where};
pub use config::LoaderConfig;
pub use connection::Connection;
pub use contain::{
    Contain, ContainNode, ContainOptions, ContainSpec, ForeignKey, NormalizedContain,
    NormalizedNode, OPTION_NAMES, is_option_name, is_valid_alias, normalize, normalize_node,
};
pub use expr::{BinaryOp, Expr, quote_identifier};
pub use join::{Join, JoinType};
pub use plan::{DeferredLoad, EagerPlan, QuerySchema, plan};
pub use registry::{RegistryStats, Table, TableConfig, TableRegistry};
pub use result::ResultSet;
pub use select::{Select, SelectField};
