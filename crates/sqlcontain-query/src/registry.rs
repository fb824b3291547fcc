//! Registry of table definitions keyed by alias.
//!
//! A [`TableRegistry`] owns every live [`Table`]. Tables are built lazily
//! from their registered [`TableConfig`] on first lookup and cached until
//! [`TableRegistry::clear`]. Associations refer back to the registry and to
//! their target tables without owning them, so a cleared registry simply
//! rebuilds tables on the next lookup.

use crate::association::{Association, AssociationDef, snake_case};
use crate::config::LoaderConfig;
use crate::contain::is_valid_alias;
use crate::select::Select;
use sqlcontain_core::{Error, Result, TableSchema};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// How to build the table registered under an alias.
#[derive(Debug, Clone, Default)]
pub struct TableConfig {
    table: Option<String>,
    schema: TableSchema,
    primary_key: Vec<String>,
    associations: Vec<AssociationDef>,
}

impl TableConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Physical table name (defaults to the snake-cased alias).
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = Some(name.into());
        self
    }

    /// Column metadata used for projection and result casting.
    pub fn schema(mut self, schema: TableSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Primary key columns (defaults to the schema's, then `id`).
    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|&c| c.to_string()).collect();
        self
    }

    /// Declare an association.
    pub fn association(mut self, def: AssociationDef) -> Self {
        self.associations.push(def);
        self
    }

    fn validate(&self, alias: &str) -> Result<()> {
        let mut seen = Vec::with_capacity(self.associations.len());
        for def in &self.associations {
            def.validate(alias)?;
            if seen.contains(&def.name()) {
                return Err(Error::invalid_definition(format!(
                    "association '{}' is declared twice on '{}'",
                    def.name(),
                    alias
                )));
            }
            seen.push(def.name());
        }

        // Loaded data shares the reshaped row with table aliases.
        for (i, def) in self.associations.iter().enumerate() {
            let property = def.attached_as();
            let clashes = property == alias
                || self.associations.iter().enumerate().any(|(j, other)| {
                    i != j && (other.name() == property || other.attached_as() == property)
                });
            if clashes {
                return Err(Error::invalid_definition(format!(
                    "association '{}' on '{}' attaches as '{}', which is already in use",
                    def.name(),
                    alias,
                    property
                )));
            }
        }
        Ok(())
    }
}

/// A built table definition: physical name, schema and associations.
#[derive(Debug)]
pub struct Table {
    alias: String,
    table: String,
    schema: TableSchema,
    primary_key: Vec<String>,
    associations: Vec<Arc<Association>>,
}

impl Table {
    fn build(alias: &str, config: &TableConfig, registry: Weak<RegistryInner>) -> Result<Self> {
        let primary_key = if !config.primary_key.is_empty() {
            config.primary_key.clone()
        } else {
            let from_schema = config.schema.primary_key();
            if from_schema.is_empty() {
                vec!["id".to_string()]
            } else {
                from_schema
            }
        };

        let associations = config
            .associations
            .iter()
            .map(|def| {
                Association::build(alias, &primary_key, def, Weak::clone(&registry)).map(Arc::new)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            alias: alias.to_string(),
            table: config
                .table
                .clone()
                .unwrap_or_else(|| snake_case(alias)),
            schema: config.schema.clone(),
            primary_key,
            associations,
        })
    }

    /// Alias the table is registered under.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Physical table name.
    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// Find an association by name.
    pub fn association(&self, name: &str) -> Option<Arc<Association>> {
        self.associations.iter().find(|a| a.name() == name).cloned()
    }

    /// All associations in declaration order.
    pub fn associations(&self) -> &[Arc<Association>] {
        &self.associations
    }
}

/// Lookup counters of a registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Lookups answered by a live table.
    pub hits: u64,
    /// Lookups that had to build a table.
    pub misses: u64,
    /// Tables built (equal to misses unless builds raced).
    pub builds: u64,
}

#[derive(Debug)]
pub(crate) struct RegistryInner {
    configs: RwLock<HashMap<String, TableConfig>>,
    tables: RwLock<HashMap<String, Arc<Table>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    builds: AtomicU64,
    loader: LoaderConfig,
}

/// Shared, cheaply clonable handle to a set of table definitions.
#[derive(Debug, Clone)]
pub struct TableRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for TableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TableRegistry {
    /// Create an empty registry with the default loader configuration.
    pub fn new() -> Self {
        Self::with_config(LoaderConfig::default())
    }

    /// Create an empty registry with a loader configuration.
    pub fn with_config(loader: LoaderConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                configs: RwLock::new(HashMap::new()),
                tables: RwLock::new(HashMap::new()),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                builds: AtomicU64::new(0),
                loader,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<RegistryInner>) -> Self {
        Self { inner }
    }

    /// Configuration used by queries built from this registry.
    pub fn loader_config(&self) -> &LoaderConfig {
        &self.inner.loader
    }

    /// Register (or replace) the table under `alias`.
    ///
    /// Replacing drops the live table, so the next lookup rebuilds it.
    pub fn register(&self, alias: impl Into<String>, config: TableConfig) -> Result<()> {
        let alias = alias.into();
        if !is_valid_alias(&alias) {
            return Err(Error::invalid_definition(format!(
                "'{}' is not a valid table alias",
                alias
            )));
        }
        config.validate(&alias)?;

        self.inner
            .tables
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&alias);
        let replaced = self
            .inner
            .configs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(alias.clone(), config)
            .is_some();
        tracing::debug!(alias = %alias, replaced, "Registered table");
        Ok(())
    }

    /// Check whether an alias is registered.
    pub fn contains(&self, alias: &str) -> bool {
        self.inner
            .configs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(alias)
    }

    /// Get the live table for `alias`, building it on first use.
    pub fn get(&self, alias: &str) -> Result<Arc<Table>> {
        if let Some(table) = self
            .inner
            .tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(alias)
        {
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(table));
        }
        self.inner.misses.fetch_add(1, Ordering::Relaxed);

        let config = self
            .inner
            .configs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(alias)
            .cloned()
            .ok_or_else(|| Error::table_not_found(alias))?;

        let built = Arc::new(Table::build(alias, &config, Arc::downgrade(&self.inner))?);
        self.inner.builds.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            alias = alias,
            table = built.table_name(),
            associations = built.associations().len(),
            "Built table"
        );

        // A concurrent build may have won; keep the first instance.
        let mut tables = self.inner.tables.write().unwrap_or_else(|e| e.into_inner());
        let table = tables.entry(alias.to_string()).or_insert(built);
        Ok(Arc::clone(table))
    }

    /// Drop every live table; registrations are kept.
    pub fn clear(&self) {
        let mut tables = self.inner.tables.write().unwrap_or_else(|e| e.into_inner());
        let dropped = tables.len();
        tables.clear();
        tracing::debug!(dropped, "Cleared live tables");
    }

    /// Remove a registration and its live table.
    pub fn remove(&self, alias: &str) -> bool {
        self.inner
            .tables
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(alias);
        self.inner
            .configs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(alias)
            .is_some()
    }

    /// Number of tables currently built.
    pub fn live_tables(&self) -> usize {
        self.inner
            .tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            builds: self.inner.builds.load(Ordering::Relaxed),
        }
    }

    /// Start a query on the table registered under `alias`.
    pub fn select(&self, alias: &str) -> Result<Select> {
        Select::new(self, alias)
    }
}
