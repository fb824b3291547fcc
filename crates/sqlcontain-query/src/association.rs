//! Associations between registered tables.
//!
//! An [`Association`] is created once per (source table, name) pair when the
//! registry builds the source [`Table`]. It knows how to fold itself into a
//! query as a join and how to build the follow-up query that loads it
//! separately.

use crate::clause::OrderBy;
use crate::contain::{ContainOptions, ForeignKey, NormalizedContain, is_valid_alias};
use crate::expr::Expr;
use crate::join::{Join, JoinType};
use crate::registry::{RegistryInner, Table, TableRegistry};
use crate::select::{Select, SelectField};
use sqlcontain_core::{
    AssociationKind, Entry, Error, LinkTableInfo, Record, Result, Strategy, Value,
};
use std::sync::{Arc, Mutex, Weak};

/// Declaration of an association, registered with its source table.
#[derive(Debug, Clone)]
pub struct AssociationDef {
    name: String,
    kind: AssociationKind,
    target: Option<String>,
    foreign_key: Option<Vec<String>>,
    binding_key: Option<Vec<String>>,
    conditions: Option<Expr>,
    sort: Vec<OrderBy>,
    strategy: Option<Strategy>,
    dependent: bool,
    property: Option<String>,
}

impl AssociationDef {
    fn new(name: impl Into<String>, kind: AssociationKind) -> Self {
        Self {
            name: name.into(),
            kind,
            target: None,
            foreign_key: None,
            binding_key: None,
            conditions: None,
            sort: Vec::new(),
            strategy: None,
            dependent: false,
            property: None,
        }
    }

    /// Many-to-one: the source row holds the foreign key.
    pub fn belongs_to(name: impl Into<String>) -> Self {
        Self::new(name, AssociationKind::BelongsTo)
    }

    /// One-to-one: the target row holds the foreign key.
    pub fn has_one(name: impl Into<String>) -> Self {
        Self::new(name, AssociationKind::HasOne)
    }

    /// One-to-many: target rows hold the foreign key.
    pub fn has_many(name: impl Into<String>) -> Self {
        Self::new(name, AssociationKind::HasMany)
    }

    /// Many-to-many through `through`.
    pub fn belongs_to_many(name: impl Into<String>, through: LinkTableInfo) -> Self {
        Self::new(name, AssociationKind::belongs_to_many(through))
    }

    /// Registry alias of the target table (defaults to the association name).
    pub fn target(mut self, alias: impl Into<String>) -> Self {
        self.target = Some(alias.into());
        self
    }

    /// Foreign key column.
    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(vec![column.into()]);
        self
    }

    /// Composite foreign key columns.
    pub fn foreign_keys(mut self, columns: &[&str]) -> Self {
        self.foreign_key = Some(columns.iter().map(|&c| c.to_string()).collect());
        self
    }

    /// Column(s) the foreign key references (defaults to a primary key).
    pub fn binding_key(mut self, column: impl Into<String>) -> Self {
        self.binding_key = Some(vec![column.into()]);
        self
    }

    /// Composite binding key columns.
    pub fn binding_keys(mut self, columns: &[&str]) -> Self {
        self.binding_key = Some(columns.iter().map(|&c| c.to_string()).collect());
        self
    }

    /// Default condition merged into every join or follow-up query.
    pub fn conditions(mut self, expr: Expr) -> Self {
        self.conditions = Some(expr);
        self
    }

    /// Default sort of follow-up queries.
    pub fn sort(mut self, order: OrderBy) -> Self {
        self.sort.push(order);
        self
    }

    /// Fetch strategy (defaults by kind).
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Whether deleting the source cascades to the target.
    pub fn dependent(mut self, dependent: bool) -> Self {
        self.dependent = dependent;
        self
    }

    /// Key the loaded data is attached under (defaults to the name).
    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    /// The association name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key loaded data is attached under.
    pub(crate) fn attached_as(&self) -> &str {
        self.property.as_deref().unwrap_or(&self.name)
    }

    /// Reject definitions that could never be planned.
    pub(crate) fn validate(&self, source_alias: &str) -> Result<()> {
        if !is_valid_alias(&self.name) {
            return Err(Error::invalid_definition(format!(
                "association '{}' on '{}' is not a valid alias",
                self.name, source_alias
            )));
        }
        if self.strategy == Some(Strategy::Join) && !self.kind.is_joinable() {
            return Err(Error::invalid_definition(format!(
                "{} association '{}' on '{}' cannot use the join strategy",
                self.kind.name(),
                self.name,
                source_alias
            )));
        }
        if let Some(through) = self.kind.link_table() {
            if !is_valid_alias(&through.table) {
                return Err(Error::invalid_definition(format!(
                    "link table '{}' of '{}' is not a valid alias",
                    through.table, self.name
                )));
            }
        }
        for key in [&self.foreign_key, &self.binding_key].into_iter().flatten() {
            if key.is_empty() {
                return Err(Error::invalid_definition(format!(
                    "association '{}' on '{}' declares an empty key",
                    self.name, source_alias
                )));
            }
        }
        Ok(())
    }
}

/// A named relationship from a source table to a target table.
#[derive(Debug)]
pub struct Association {
    name: String,
    source_alias: String,
    target_alias: String,
    kind: AssociationKind,
    foreign_key: Vec<String>,
    binding_key: Option<Vec<String>>,
    conditions: Option<Expr>,
    sort: Vec<OrderBy>,
    strategy: Strategy,
    dependent: bool,
    property: String,
    source_primary_key: Vec<String>,
    registry: Weak<RegistryInner>,
    /// Non-owning; the registry owns live tables.
    target: Mutex<Weak<Table>>,
}

impl Association {
    pub(crate) fn build(
        source_alias: &str,
        source_primary_key: &[String],
        def: &AssociationDef,
        registry: Weak<RegistryInner>,
    ) -> Result<Self> {
        def.validate(source_alias)?;

        let foreign_key = match (&def.foreign_key, &def.kind) {
            (Some(fk), _) => fk.clone(),
            (None, AssociationKind::BelongsTo) => vec![format!("{}_id", snake_case(&def.name))],
            (None, AssociationKind::HasOne | AssociationKind::HasMany) => {
                vec![format!("{}_id", singular(&snake_case(source_alias)))]
            }
            (None, AssociationKind::BelongsToMany { through }) => {
                vec![through.source_column.clone()]
            }
        };

        Ok(Self {
            target_alias: def.target.clone().unwrap_or_else(|| def.name.clone()),
            property: def.property.clone().unwrap_or_else(|| def.name.clone()),
            name: def.name.clone(),
            source_alias: source_alias.to_string(),
            kind: def.kind.clone(),
            foreign_key,
            binding_key: def.binding_key.clone(),
            conditions: def.conditions.clone(),
            sort: def.sort.clone(),
            strategy: def.strategy.unwrap_or_else(|| def.kind.default_strategy()),
            dependent: def.dependent,
            source_primary_key: source_primary_key.to_vec(),
            registry,
            target: Mutex::new(Weak::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry alias of the source table.
    pub fn source_alias(&self) -> &str {
        &self.source_alias
    }

    /// Registry alias of the target table.
    pub fn target_alias(&self) -> &str {
        &self.target_alias
    }

    pub fn kind(&self) -> &AssociationKind {
        &self.kind
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn dependent(&self) -> bool {
        self.dependent
    }

    /// Key the loaded data is attached under.
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Declared foreign key columns.
    pub fn foreign_key(&self) -> &[String] {
        &self.foreign_key
    }

    pub fn conditions(&self) -> Option<&Expr> {
        self.conditions.as_ref()
    }

    /// Resolve the target table, re-resolving after a registry clear.
    pub fn target(&self) -> Result<Arc<Table>> {
        let mut slot = self.target.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(table) = slot.upgrade() {
            return Ok(table);
        }
        let table = self.registry()?.get(&self.target_alias)?;
        *slot = Arc::downgrade(&table);
        Ok(table)
    }

    fn registry(&self) -> Result<TableRegistry> {
        self.registry
            .upgrade()
            .map(TableRegistry::from_inner)
            .ok_or_else(|| {
                Error::invalid_definition(format!(
                    "the registry owning '{}' was dropped",
                    self.source_alias
                ))
            })
    }

    /// Whether this containment can be folded into the parent query.
    ///
    /// Only joinable kinds with the join strategy qualify, and disabling the
    /// foreign key removes the join condition, so it defers instead.
    pub fn can_be_joined(&self, options: &ContainOptions) -> bool {
        self.kind.is_joinable()
            && self.strategy == Strategy::Join
            && !options.foreign_key_disabled()
    }

    /// Whether a deferred load needs the parent key values collected first.
    pub fn requires_keys(&self, options: &ContainOptions) -> bool {
        !self.can_be_joined(options)
            && !options.foreign_key_disabled()
            && self.strategy != Strategy::Subquery
    }

    /// Check per-containment options against this association.
    pub fn validate_options(&self, options: &ContainOptions) -> Result<()> {
        if let Some(ForeignKey::Columns(columns)) = &options.foreign_key {
            if columns.is_empty() {
                return Err(Error::malformed_containment(
                    &self.source_alias,
                    &self.name,
                    "foreignKey needs at least one column",
                ));
            }
            if self.kind.link_table().is_some() && columns.len() != 1 {
                return Err(Error::malformed_containment(
                    &self.source_alias,
                    &self.name,
                    "a link table foreignKey is a single column",
                ));
            }
        }
        Ok(())
    }

    fn foreign_key_for<'a>(&'a self, options: &'a ContainOptions) -> Option<&'a [String]> {
        match &options.foreign_key {
            Some(ForeignKey::Disabled) => None,
            Some(ForeignKey::Columns(columns)) => Some(columns),
            None => Some(&self.foreign_key),
        }
    }

    /// Columns the foreign key references.
    ///
    /// Defaults to the target's primary key for `BelongsTo` and to the
    /// source's primary key otherwise.
    pub fn binding_key(&self) -> Result<Vec<String>> {
        if let Some(key) = &self.binding_key {
            return Ok(key.clone());
        }
        match self.kind {
            AssociationKind::BelongsTo => Ok(self.target()?.primary_key().to_vec()),
            _ => Ok(self.source_primary_key.clone()),
        }
    }

    /// Columns on the source table that identify related rows.
    ///
    /// `None` when the foreign key is disabled.
    pub fn source_key(&self, options: &ContainOptions) -> Result<Option<Vec<String>>> {
        let Some(foreign_key) = self.foreign_key_for(options) else {
            return Ok(None);
        };
        match self.kind {
            AssociationKind::BelongsTo => Ok(Some(foreign_key.to_vec())),
            _ => self.binding_key().map(Some),
        }
    }

    /// Table alias and columns that hold the matching key in a loaded row.
    ///
    /// The alias is the association name, or the link table for
    /// many-to-many. `None` when the foreign key is disabled.
    pub fn target_key(&self, options: &ContainOptions) -> Result<Option<(String, Vec<String>)>> {
        let Some(foreign_key) = self.foreign_key_for(options) else {
            return Ok(None);
        };
        let located = match &self.kind {
            AssociationKind::BelongsTo => (self.name.clone(), self.binding_key()?),
            AssociationKind::HasOne | AssociationKind::HasMany => {
                (self.name.clone(), foreign_key.to_vec())
            }
            AssociationKind::BelongsToMany { through } => {
                (through.table.clone(), foreign_key.to_vec())
            }
        };
        Ok(Some(located))
    }

    /// Pair foreign key columns with binding key columns.
    fn key_pairs(&self, options: &ContainOptions) -> Result<Vec<(String, String)>> {
        let foreign_key = self.foreign_key_for(options).ok_or_else(|| {
            Error::invalid_definition(format!(
                "association '{}' has no foreign key to join on",
                self.name
            ))
        })?;
        let binding_key = self.binding_key()?;
        if foreign_key.len() != binding_key.len() {
            return Err(Error::invalid_definition(format!(
                "association '{}' pairs {} foreign key column(s) with {} binding column(s)",
                self.name,
                foreign_key.len(),
                binding_key.len()
            )));
        }
        Ok(foreign_key.iter().cloned().zip(binding_key).collect())
    }

    /// Build the join that folds this association into a query.
    ///
    /// `parent_alias` is the alias already present in the query that this
    /// association hangs off; the joined table takes the association name
    /// as its alias.
    pub fn attach_join(
        &self,
        parent_alias: &str,
        options: &ContainOptions,
        join_type: JoinType,
    ) -> Result<(Join, Arc<Table>)> {
        let target = self.target()?;
        let pairs = self.key_pairs(options)?;
        let key_condition = match self.kind {
            AssociationKind::BelongsTo => Expr::all(pairs.iter().map(|(fk, bk)| {
                Expr::qualified(&self.name, bk).eq(Expr::qualified(parent_alias, fk))
            })),
            AssociationKind::HasOne => Expr::all(pairs.iter().map(|(fk, bk)| {
                Expr::qualified(&self.name, fk).eq(Expr::qualified(parent_alias, bk))
            })),
            _ => {
                return Err(Error::invalid_definition(format!(
                    "{} association '{}' cannot be joined",
                    self.kind.name(),
                    self.name
                )));
            }
        };

        let on = Expr::all(
            key_condition
                .into_iter()
                .chain(self.extra_conditions(options)),
        )
        .unwrap_or_else(|| Expr::raw("1 = 1"));

        let join_type = if options.matching {
            JoinType::Inner
        } else {
            join_type
        };
        Ok((
            Join::new(join_type, target.table_name(), &self.name, on),
            target,
        ))
    }

    /// Association and containment conditions, qualified with the name.
    fn extra_conditions(&self, options: &ContainOptions) -> impl Iterator<Item = Expr> + '_ {
        self.conditions
            .clone()
            .into_iter()
            .chain(options.conditions.clone())
            .map(|c| c.qualify(&self.name))
    }

    /// Build the follow-up query that loads this association on its own.
    ///
    /// The query's base alias is the association name, so `nested`
    /// (resolved against the target) plans against it unchanged. Key
    /// columns are always projected so loaded rows can be matched back.
    pub fn loader_query(
        &self,
        options: &ContainOptions,
        nested: Arc<NormalizedContain>,
        filter: KeyFilter,
    ) -> Result<Select> {
        let target = self.target()?;
        let registry = self.registry()?;
        let mut query =
            Select::for_table(registry, Arc::clone(&target), &self.name).contain_normalized(nested);

        for condition in self.extra_conditions(options) {
            query = query.filter(condition);
        }
        for order in self.sort.iter().chain(&options.sort) {
            query = query.order_by(order.clone().qualify(&self.name));
        }

        let target_key = self.target_key(options)?;

        if !options.fields.is_empty() {
            let mut fields: Vec<&str> = options.fields.iter().map(String::as_str).collect();
            if let Some((table, columns)) = &target_key {
                if *table == self.name {
                    for column in columns {
                        if !fields.contains(&column.as_str()) {
                            fields.push(column);
                        }
                    }
                }
            }
            query = query.fields(&fields);
        }

        if let AssociationKind::BelongsToMany { through } = &self.kind {
            if let Some((_, columns)) = &target_key {
                let target_pk = target.primary_key();
                if target_pk.len() != 1 {
                    return Err(Error::invalid_definition(format!(
                        "link table '{}' needs a single-column primary key on '{}'",
                        through.table, self.target_alias
                    )));
                }
                query = query.join(Join::inner(
                    &through.table,
                    &through.table,
                    Expr::qualified(&through.table, &through.target_column)
                        .eq(Expr::qualified(&self.name, &target_pk[0])),
                ));
                for column in columns {
                    query = query.field(SelectField::column(&through.table, column, &self.name));
                }
                if options.fields.is_empty() {
                    query = query.auto_fields(true);
                }
            }
        }

        match (filter, target_key) {
            (KeyFilter::Keys(keys), Some((table, columns))) => {
                let literals: Vec<Expr> = keys.into_iter().map(key_literal).collect();
                query = query.filter(key_columns(&table, &columns).in_list(literals));
            }
            (KeyFilter::Subquery(sub), Some((table, columns))) => {
                query = query.filter(key_columns(&table, &columns).in_subquery(sub));
            }
            _ => {}
        }

        Ok(query)
    }

    /// Wrap loaded records in the entry shape of this association.
    ///
    /// `None` for no records: nothing is attached.
    pub fn entry_for(&self, records: &[Record]) -> Option<Entry> {
        if self.kind.is_single() {
            records.first().cloned().map(Entry::One)
        } else if records.is_empty() {
            None
        } else {
            Some(Entry::Many(records.to_vec()))
        }
    }
}

/// How a follow-up query selects the rows related to the primary rows.
#[derive(Debug, Clone)]
pub enum KeyFilter {
    /// `key IN (...)` over collected parent key values.
    Keys(Vec<Value>),
    /// `key IN (SELECT ...)` correlated through the primary query.
    Subquery(Select),
    /// No key filter; every row matching the conditions relates to every parent.
    Unfiltered,
}

fn key_columns(table: &str, columns: &[String]) -> Expr {
    match columns {
        [single] => Expr::qualified(table, single),
        _ => Expr::tuple(columns.iter().map(|c| Expr::qualified(table, c)).collect()),
    }
}

/// A composite key value is carried as an array and compared as a tuple.
fn key_literal(value: Value) -> Expr {
    match value {
        Value::Array(parts) => Expr::tuple(parts.into_iter().map(Expr::Literal).collect()),
        other => Expr::Literal(other),
    }
}

/// `ParentCategory` -> `parent_category`.
pub(crate) fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Naive English singular for table aliases (`articles` -> `article`).
fn singular(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies") {
        format!("{}y", stem)
    } else if name.ends_with("ss") {
        name.to_string()
    } else if let Some(stem) = name.strip_suffix('s') {
        stem.to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naming_conventions() {
        assert_eq!(snake_case("ParentCategory"), "parent_category");
        assert_eq!(snake_case("Author"), "author");
        assert_eq!(singular("articles"), "article");
        assert_eq!(singular("categories"), "category");
        assert_eq!(singular("address"), "address");
    }

    #[test]
    fn test_def_validation() {
        assert!(AssociationDef::has_many("Comments").validate("Articles").is_ok());
        assert!(
            AssociationDef::has_many("Comments")
                .strategy(Strategy::Join)
                .validate("Articles")
                .is_err()
        );
        assert!(AssociationDef::belongs_to("Bad__Name").validate("Articles").is_err());
        assert!(
            AssociationDef::belongs_to("Author")
                .foreign_keys(&[])
                .validate("Articles")
                .is_err()
        );
    }

    #[test]
    fn test_key_literal_composite() {
        match key_literal(Value::Array(vec![Value::Int(1), Value::Int(2)])) {
            Expr::Tuple(items) => assert_eq!(items.len(), 2),
            other => panic!("expected tuple, got {other:?}"),
        }
    }
}
