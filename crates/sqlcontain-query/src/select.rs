//! SELECT query builder with association containment.

use crate::clause::{Limit, Offset, OrderBy, Where};
use crate::connection::Connection;
use crate::contain::{Contain, ContainSpec, NormalizedContain, normalize};
use crate::eager;
use crate::expr::{Expr, quote_identifier};
use crate::join::Join;
use crate::plan::{EagerPlan, plan};
use crate::registry::{Table, TableRegistry};
use crate::result::ResultSet;
use serde_json::Value as JsonValue;
use sqlcontain_core::{Record, Result, Value, column_alias};
use std::sync::{Arc, OnceLock};

/// One projected item of a SELECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectField {
    /// `"table"."name" AS "alias"`
    Column {
        table: String,
        name: String,
        alias: String,
    },
    /// Every column of a table whose columns are not known up front.
    All { table: String },
}

impl SelectField {
    /// Project `table.name` under its column alias relative to `base_alias`.
    pub fn column(table: &str, name: &str, base_alias: &str) -> Self {
        SelectField::Column {
            table: table.to_string(),
            name: name.to_string(),
            alias: column_alias(table, base_alias, name),
        }
    }

    /// Project every column of `table`.
    pub fn all(table: &str) -> Self {
        SelectField::All {
            table: table.to_string(),
        }
    }

    /// Table alias the field reads from.
    pub fn table(&self) -> &str {
        match self {
            SelectField::Column { table, .. } | SelectField::All { table } => table,
        }
    }

    /// Check whether this field yields the column alias `column`.
    pub fn provides(&self, column: &str) -> bool {
        matches!(self, SelectField::Column { alias, .. } if alias == column)
    }

    fn to_sql(&self) -> String {
        match self {
            SelectField::Column { table, name, alias } => format!(
                "{}.{} AS {}",
                quote_identifier(table),
                quote_identifier(name),
                quote_identifier(alias)
            ),
            SelectField::All { table } => format!("{}.*", quote_identifier(table)),
        }
    }
}

/// A SELECT query builder.
///
/// A query starts from one registered table (its *base*), addressed by an
/// alias that is usually the registry alias. Contained associations are
/// declared with [`Select::contain`] and turned into joins and follow-up
/// queries when the query runs.
#[derive(Debug, Clone)]
pub struct Select {
    pub(crate) registry: TableRegistry,
    pub(crate) table: Arc<Table>,
    pub(crate) alias: String,
    /// Columns to select (empty = every base column)
    pub(crate) fields: Vec<SelectField>,
    /// Add the base table's columns even when fields were given
    pub(crate) auto_fields: bool,
    pub(crate) where_clause: Option<Where>,
    pub(crate) order_by: Vec<OrderBy>,
    pub(crate) joins: Vec<Join>,
    pub(crate) limit: Option<Limit>,
    pub(crate) offset: Option<Offset>,
    pub(crate) contain: Contain,
    /// Normalized form of `contain`, reset whenever it changes
    normalized: OnceLock<Arc<NormalizedContain>>,
}

impl Select {
    /// Create a query on the table registered under `alias`.
    pub fn new(registry: &TableRegistry, alias: &str) -> Result<Self> {
        let table = registry.get(alias)?;
        Ok(Self::for_table(registry.clone(), table, alias))
    }

    /// Create a query on an already resolved table under a custom alias.
    pub fn for_table(registry: TableRegistry, table: Arc<Table>, alias: impl Into<String>) -> Self {
        Self {
            registry,
            table,
            alias: alias.into(),
            fields: Vec::new(),
            auto_fields: false,
            where_clause: None,
            order_by: Vec::new(),
            joins: Vec::new(),
            limit: None,
            offset: None,
            contain: Contain::default(),
            normalized: OnceLock::new(),
        }
    }

    /// Select specific columns.
    ///
    /// A bare name reads from the base table; `"Alias.column"` reads from a
    /// joined table and is returned as `Alias__column`.
    pub fn fields(mut self, cols: &[&str]) -> Self {
        for col in cols {
            let field = match col.split_once('.') {
                Some((table, name)) => SelectField::column(table, name, &self.alias),
                None => SelectField::column(&self.alias, col, &self.alias),
            };
            self.push_field(field);
        }
        self
    }

    /// Add one projected field.
    pub fn field(mut self, field: SelectField) -> Self {
        self.push_field(field);
        self
    }

    pub(crate) fn push_field(&mut self, field: SelectField) {
        if !self.fields.contains(&field) {
            self.fields.push(field);
        }
    }

    /// Also select every base column when explicit fields are given.
    pub fn auto_fields(mut self, enabled: bool) -> Self {
        self.auto_fields = enabled;
        self
    }

    /// Add a WHERE condition.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(match self.where_clause {
            Some(existing) => existing.and(expr),
            None => Where::new(expr),
        });
        self
    }

    /// Add an OR WHERE condition.
    pub fn or_filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(match self.where_clause {
            Some(existing) => existing.or(expr),
            None => Where::new(expr),
        });
        self
    }

    /// Add ORDER BY clause.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Add a JOIN clause.
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Set LIMIT.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(Limit(n));
        self
    }

    /// Set OFFSET.
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(Offset(n));
        self
    }

    /// Contain associations, merging with earlier declarations.
    ///
    /// Accepts anything convertible to a [`ContainSpec`]: a dotted path
    /// (`"Comments.Author"`), a list of paths, or a built spec.
    pub fn contain(mut self, spec: impl Into<ContainSpec>) -> Self {
        let spec = spec.into();
        self.contain = match std::mem::take(&mut self.contain) {
            Contain::Raw(mut existing) => {
                existing.merge(spec);
                Contain::Raw(existing)
            }
            Contain::Normalized(_) => Contain::Raw(spec),
        };
        self.normalized = OnceLock::new();
        self
    }

    /// Contain associations declared as JSON.
    pub fn contain_json(self, value: &JsonValue) -> Result<Self> {
        let spec = ContainSpec::from_json(value)?;
        Ok(self.contain(spec))
    }

    /// Replace the containment with an already normalized tree.
    pub fn contain_normalized(mut self, tree: Arc<NormalizedContain>) -> Self {
        self.contain = Contain::Normalized(tree);
        self.normalized = OnceLock::new();
        self
    }

    /// Remove every contained association.
    pub fn clear_contain(mut self) -> Self {
        self.contain = Contain::default();
        self.normalized = OnceLock::new();
        self
    }

    /// The containment as currently declared.
    pub fn get_contain(&self) -> &Contain {
        &self.contain
    }

    /// Resolve the containment against the registry.
    ///
    /// The result is memoized until the containment changes.
    pub fn normalized_contain(&self) -> Result<Arc<NormalizedContain>> {
        if let Some(tree) = self.normalized.get() {
            return Ok(Arc::clone(tree));
        }
        let tree = normalize(&self.table, &self.contain)?;
        Ok(Arc::clone(self.normalized.get_or_init(|| tree)))
    }

    /// Check the containment without running any query.
    pub fn validate_contain(&self) -> Result<()> {
        self.normalized_contain().map(|_| ())
    }

    /// Plan joins and follow-up loads for this query.
    pub fn plan(&self) -> Result<EagerPlan> {
        plan(self)
    }

    /// The registry this query resolves aliases against.
    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    /// The base table.
    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    /// Physical name of the base table.
    pub fn table_name(&self) -> &str {
        self.table.table_name()
    }

    /// Alias of the base table in this query.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Projected fields; empty selects every base column.
    pub fn projection(&self) -> &[SelectField] {
        &self.fields
    }

    pub fn where_expr(&self) -> Option<&Expr> {
        self.where_clause.as_ref().map(Where::expr)
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn order(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit.map(|Limit(n)| n)
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset.map(|Offset(n)| n)
    }

    /// Whether the projection was chosen explicitly (no base columns added).
    pub fn has_explicit_fields(&self) -> bool {
        !self.fields.is_empty() && !self.auto_fields
    }

    /// Build the SQL query and parameters.
    ///
    /// Contained associations are not part of the SQL; run
    /// [`Select::plan`] first to see the joined query.
    #[tracing::instrument(level = "trace", skip(self), fields(table = %self.alias))]
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = self.build_into(&mut params);
        (sql, params)
    }

    /// Build the SQL, appending parameters to `params`.
    pub(crate) fn build_into(&self, params: &mut Vec<Value>) -> String {
        let mut sql = String::from("SELECT ");

        if self.fields.is_empty() {
            sql.push_str(&format!("{}.*", quote_identifier(&self.alias)));
        } else {
            let fields: Vec<_> = self.fields.iter().map(SelectField::to_sql).collect();
            sql.push_str(&fields.join(", "));
        }

        sql.push_str(&format!(
            " FROM {} AS {}",
            quote_identifier(self.table.table_name()),
            quote_identifier(&self.alias)
        ));

        for join in &self.joins {
            sql.push_str(&join.build(params));
        }

        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause.expr().build(params));
        }

        if !self.order_by.is_empty() {
            let orders: Vec<_> = self.order_by.iter().map(OrderBy::to_sql).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));
        }

        if let Some(Limit(n)) = self.limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }

        if let Some(Offset(n)) = self.offset {
            sql.push_str(&format!(" OFFSET {}", n));
        }

        sql
    }

    /// Execute the query and stream reshaped records.
    #[tracing::instrument(level = "debug", skip_all, fields(table = %self.alias))]
    pub fn all<'c>(&self, conn: &'c dyn Connection) -> Result<ResultSet<'c>> {
        let plan = self.plan()?;
        eager::execute(plan, conn, self.registry.loader_config())
    }

    /// Execute the query and return the first reshaped record.
    pub fn first(&self, conn: &dyn Connection) -> Result<Option<Record>> {
        self.clone().limit(1).all(conn)?.first()
    }
}
