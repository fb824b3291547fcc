//! Planning contained associations into joins and deferred loads.
//!
//! Planning walks the normalized containment tree depth first. Joinable
//! nodes are folded into the primary query as joins and recursed into;
//! every other node becomes a [`DeferredLoad`] that runs as its own
//! follow-up query once the primary rows are known.

use crate::association::Association;
use crate::contain::{ContainOptions, NormalizedContain, NormalizedNode};
use crate::join::JoinType;
use crate::registry::Table;
use crate::select::{Select, SelectField};
use sqlcontain_core::{Error, Result, SchemaLookup, SqlType, column_alias};
use std::collections::HashMap;
use std::sync::Arc;

/// A contained association loaded by a separate query.
#[derive(Debug, Clone)]
pub struct DeferredLoad {
    pub association: Arc<Association>,
    pub config: ContainOptions,
    /// Containment nested under this association, planned by its own query.
    pub nested: Arc<NormalizedContain>,
    /// Alias of the table in the primary query the loaded data belongs to.
    pub source_alias: String,
}

impl DeferredLoad {
    fn from_node(node: &NormalizedNode, source_alias: &str) -> Self {
        Self {
            association: Arc::clone(&node.instance),
            config: node.config.clone(),
            nested: Arc::clone(&node.associations),
            source_alias: source_alias.to_string(),
        }
    }

    /// The association name, which is also the follow-up query's alias.
    pub fn alias(&self) -> &str {
        self.association.name()
    }

    /// Whether key values must be collected from the primary rows first.
    pub fn requires_keys(&self) -> bool {
        self.association.requires_keys(&self.config)
    }
}

/// Schema of every table alias appearing in a planned query.
#[derive(Debug, Clone, Default)]
pub struct QuerySchema {
    tables: HashMap<String, Arc<Table>>,
}

impl QuerySchema {
    pub fn insert(&mut self, alias: impl Into<String>, table: Arc<Table>) {
        self.tables.insert(alias.into(), table);
    }

    pub fn table(&self, alias: &str) -> Option<&Arc<Table>> {
        self.tables.get(alias)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl SchemaLookup for QuerySchema {
    fn column_type(&self, table_alias: &str, field: &str) -> Option<SqlType> {
        self.tables
            .get(table_alias)?
            .schema()
            .column_type(field)
            .cloned()
    }
}

/// A query ready to execute.
#[derive(Debug)]
pub struct EagerPlan {
    /// The primary query, with joins and projection applied.
    pub query: Select,
    /// Follow-up loads, in tree order.
    pub deferred: Vec<DeferredLoad>,
    pub schema: QuerySchema,
}

impl EagerPlan {
    /// Aliases joined into the primary query, in join order.
    pub fn joined_aliases(&self) -> impl Iterator<Item = &str> {
        self.query.joins().iter().map(|j| j.alias.as_str())
    }

    /// Aliases loaded by follow-up queries.
    pub fn deferred_aliases(&self) -> impl Iterator<Item = &str> {
        self.deferred.iter().map(DeferredLoad::alias)
    }

    /// Whether the primary rows must be buffered before streaming.
    pub fn requires_buffering(&self) -> bool {
        self.deferred.iter().any(DeferredLoad::requires_keys)
    }
}

/// Plan `select`'s containment.
#[tracing::instrument(level = "debug", skip_all, fields(table = %select.alias()))]
pub fn plan(select: &Select) -> Result<EagerPlan> {
    let tree = select.normalized_contain()?;
    let join_type = select.registry().loader_config().default_join_type;
    let explicit = select.has_explicit_fields();

    let mut query = select.clone().clear_contain();
    let mut schema = QuerySchema::default();
    schema.insert(select.alias(), Arc::clone(select.table()));

    if !explicit {
        let mut base = table_fields(select.table(), select.alias(), select.alias());
        for field in std::mem::take(&mut query.fields) {
            if !base.contains(&field) {
                base.push(field);
            }
        }
        query.fields = base;
        query.auto_fields = false;
    }

    let mut planner = Planner {
        query,
        schema,
        deferred: Vec::new(),
        join_type,
        explicit,
    };
    planner.walk(&tree, select.alias())?;

    let Planner {
        mut query,
        schema,
        deferred,
        ..
    } = planner;

    let base_alias = select.alias();
    for load in &deferred {
        let Some(columns) = load.association.source_key(&load.config)? else {
            continue;
        };
        for column in columns {
            let field = SelectField::column(&load.source_alias, &column, base_alias);
            if !query.fields.contains(&field) {
                tracing::trace!(
                    column = %column_alias(&load.source_alias, base_alias, &column),
                    "Projecting key column for deferred load"
                );
                query.push_field(field);
            }
        }
    }

    tracing::debug!(
        joins = query.joins().len(),
        deferred = deferred.len(),
        "Planned containment"
    );

    Ok(EagerPlan {
        query,
        deferred,
        schema,
    })
}

struct Planner {
    query: Select,
    schema: QuerySchema,
    deferred: Vec<DeferredLoad>,
    join_type: JoinType,
    explicit: bool,
}

impl Planner {
    fn walk(&mut self, tree: &NormalizedContain, parent_alias: &str) -> Result<()> {
        for node in tree.nodes() {
            if !node.can_be_joined {
                self.deferred.push(DeferredLoad::from_node(node, parent_alias));
                continue;
            }

            let alias = node.alias.as_str();
            if self.schema.table(alias).is_some() {
                return Err(Error::malformed_containment(
                    parent_alias,
                    alias,
                    "alias is already used in this query",
                ));
            }

            let (join, target) =
                node.instance
                    .attach_join(parent_alias, &node.config, self.join_type)?;
            self.query.joins.push(join);

            if !node.config.fields.is_empty() {
                for field in &node.config.fields {
                    let field = SelectField::column(alias, field, &self.query.alias);
                    self.query.push_field(field);
                }
            } else if !self.explicit {
                for field in table_fields(&target, alias, &self.query.alias) {
                    self.query.push_field(field);
                }
            }

            self.schema.insert(alias, target);
            self.walk(&node.associations, alias)?;
        }
        Ok(())
    }
}

/// Every known column of `table` under `alias`, or `All` for an unknown schema.
fn table_fields(table: &Table, alias: &str, base_alias: &str) -> Vec<SelectField> {
    if table.schema().is_empty() {
        return vec![SelectField::all(alias)];
    }
    table
        .schema()
        .field_names()
        .map(|name| SelectField::column(alias, name, base_alias))
        .collect()
}
