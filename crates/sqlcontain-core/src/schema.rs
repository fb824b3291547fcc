//! Table schemas and the column type lookup contract.

use crate::types::SqlType;

/// Metadata about a table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Column name
    pub name: String,
    /// SQL type for this column
    pub sql_type: SqlType,
    /// Whether this column is nullable
    pub nullable: bool,
    /// Whether this column is part of the primary key
    pub primary_key: bool,
}

impl FieldInfo {
    /// Create a new, non-nullable, non-key column.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: false,
            primary_key: false,
        }
    }

    /// Set whether this column is nullable.
    pub fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Set whether this column is part of the primary key.
    pub fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }
}

/// The ordered column list of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    fields: Vec<FieldInfo>,
}

impl TableSchema {
    /// Create a schema from columns.
    pub fn new(fields: Vec<FieldInfo>) -> Self {
        Self { fields }
    }

    /// Builder-style column append.
    #[must_use]
    pub fn field(mut self, field: FieldInfo) -> Self {
        self.fields.push(field);
        self
    }

    /// All columns in declaration order.
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Column names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Find a column by name.
    pub fn get(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Declared type of a column.
    pub fn column_type(&self, name: &str) -> Option<&SqlType> {
        self.get(name).map(|f| &f.sql_type)
    }

    /// Columns flagged as primary key, in declaration order.
    pub fn primary_key(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.name.clone())
            .collect()
    }

    /// Check if the schema declares no columns.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Resolve the declared type of a column as seen by one query.
///
/// `table_alias` is the alias the table carries inside the query, not the
/// physical table name. `None` means the value passes through uncast.
pub trait SchemaLookup {
    fn column_type(&self, table_alias: &str, field: &str) -> Option<SqlType>;
}

impl<T: SchemaLookup + ?Sized> SchemaLookup for &T {
    fn column_type(&self, table_alias: &str, field: &str) -> Option<SqlType> {
        (**self).column_type(table_alias, field)
    }
}

impl<T: SchemaLookup + ?Sized> SchemaLookup for std::sync::Arc<T> {
    fn column_type(&self, table_alias: &str, field: &str) -> Option<SqlType> {
        (**self).column_type(table_alias, field)
    }
}

/// A lookup that knows no columns; every value passes through.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSchema;

impl SchemaLookup for NoSchema {
    fn column_type(&self, _table_alias: &str, _field: &str) -> Option<SqlType> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn articles() -> TableSchema {
        TableSchema::default()
            .field(FieldInfo::new("id", SqlType::Integer).primary_key(true))
            .field(FieldInfo::new("title", SqlType::Text))
            .field(FieldInfo::new("author_id", SqlType::Integer).nullable(true))
    }

    #[test]
    fn test_primary_key_from_flags() {
        assert_eq!(articles().primary_key(), vec!["id".to_string()]);
    }

    #[test]
    fn test_column_type_lookup() {
        let schema = articles();
        assert_eq!(schema.column_type("title"), Some(&SqlType::Text));
        assert_eq!(schema.column_type("missing"), None);
        assert_eq!(
            schema.field_names().collect::<Vec<_>>(),
            vec!["id", "title", "author_id"]
        );
    }

    #[test]
    fn test_no_schema_passes_through() {
        assert!(NoSchema.column_type("Articles", "id").is_none());
    }
}
