//! Flat database rows and the forward-only row source contract.

use crate::Result;
use crate::record::Entry;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Separator between a table alias and a field name in a column alias.
pub const ALIAS_SEPARATOR: &str = "__";

/// Build the column alias a field is selected under.
///
/// Fields of the base table keep their bare name; every other table uses
/// `Alias__field`.
pub fn column_alias(table_alias: &str, base_alias: &str, field: &str) -> String {
    if table_alias == base_alias {
        field.to_string()
    } else {
        format!("{}{}{}", table_alias, ALIAS_SEPARATOR, field)
    }
}

/// Split a column alias into `(table, field)`; `None` for a bare field.
pub fn split_column_alias(column: &str) -> Option<(&str, &str)> {
    column
        .split_once(ALIAS_SEPARATOR)
        .filter(|(table, field)| !table.is_empty() && !field.is_empty())
}

/// Column metadata shared across all rows in a result set.
///
/// This struct is wrapped in `Arc` so all rows from the same query share
/// the same column information.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    /// Column names in order
    names: Vec<String>,
    /// Name -> index mapping for O(1) lookup
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create new column info from a list of column names.
    pub fn new(names: Vec<String>) -> Self {
        let name_to_index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            names,
            name_to_index,
        }
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the index of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Get all column names.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Related data attached to a row by a deferred association.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    /// Table alias whose record the data belongs to.
    pub owner: String,
    /// Key the data is stored under.
    pub property: String,
    pub entry: Entry,
}

/// A single flat row returned from a query.
///
/// Column values are addressed by their column alias (`field` for the
/// base table, `Alias__field` for joined tables). Deferred associations
/// add [`Attachment`]s without touching the shared column metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Column values in order
    values: Vec<Value>,
    /// Shared column metadata
    columns: Arc<ColumnInfo>,
    attachments: Vec<Attachment>,
}

impl Row {
    /// Create a new row with the given columns and values.
    ///
    /// For multiple rows from the same result set, prefer `with_columns`
    /// to share the column metadata.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        let columns = Arc::new(ColumnInfo::new(column_names));
        Self::with_columns(columns, values)
    }

    /// Create a new row with shared column metadata.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self {
            values,
            columns,
            attachments: Vec::new(),
        }
    }

    /// Create a row from `(column, value)` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let (names, values) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self::new(names, values)
    }

    /// Get the shared column metadata.
    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    /// Get the number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if this row is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Check if a column exists by name.
    pub fn contains_column(&self, name: &str) -> bool {
        self.columns.index_of(name).is_some()
    }

    /// Get all column names.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.names().iter().map(String::as_str)
    }

    /// Iterate over (column_name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Consume the row into `(column_name, value)` pairs and attachments.
    pub fn into_parts(self) -> (Vec<(String, Value)>, Vec<Attachment>) {
        let names = self.columns.names().to_vec();
        (names.into_iter().zip(self.values).collect(), self.attachments)
    }

    /// Attach related data under `owner.property`.
    pub fn attach(&mut self, owner: impl Into<String>, property: impl Into<String>, entry: Entry) {
        let owner = owner.into();
        let property = property.into();
        self.attachments
            .retain(|a| !(a.owner == owner && a.property == property));
        self.attachments.push(Attachment {
            owner,
            property,
            entry,
        });
    }

    /// Find the data attached under `owner.property`.
    pub fn attachment(&self, owner: &str, property: &str) -> Option<&Entry> {
        self.attachments
            .iter()
            .find(|a| a.owner == owner && a.property == property)
            .map(|a| &a.entry)
    }

    /// All attachments, in attach order.
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }
}

/// A forward-only stream of flat rows.
///
/// This is the cursor contract between query execution and everything
/// downstream: `Ok(None)` marks the end of the stream, and once returned
/// the source stays exhausted.
pub trait RowSource {
    /// Fetch the next row.
    fn next_row(&mut self) -> Result<Option<Row>>;
}

impl<S: RowSource + ?Sized> RowSource for Box<S> {
    fn next_row(&mut self) -> Result<Option<Row>> {
        (**self).next_row()
    }
}

impl<S: RowSource + ?Sized> RowSource for &mut S {
    fn next_row(&mut self) -> Result<Option<Row>> {
        (**self).next_row()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    #[test]
    fn test_column_alias_for_base_and_joined() {
        assert_eq!(column_alias("Articles", "Articles", "id"), "id");
        assert_eq!(column_alias("Author", "Articles", "id"), "Author__id");
    }

    #[test]
    fn test_split_column_alias() {
        assert_eq!(split_column_alias("Author__name"), Some(("Author", "name")));
        assert_eq!(split_column_alias("name"), None);
        assert_eq!(split_column_alias("__name"), None);
        assert_eq!(
            split_column_alias("Author__first__name"),
            Some(("Author", "first__name"))
        );
    }

    #[test]
    fn test_row_from_pairs_lookup() {
        let row = Row::from_pairs([("id", Value::Int(1)), ("Author__id", Value::Int(5))]);
        assert_eq!(row.len(), 2);
        assert_eq!(row.get_by_name("Author__id"), Some(&Value::Int(5)));
        assert!(row.contains_column("id"));
        assert!(!row.contains_column("title"));
    }

    #[test]
    fn test_attach_replaces_same_slot() {
        let mut row = Row::from_pairs([("id", 1)]);
        row.attach("Articles", "Comments", Entry::Many(vec![]));
        row.attach(
            "Articles",
            "Comments",
            Entry::Many(vec![Record::new().with("id", 3)]),
        );
        assert_eq!(row.attachments().len(), 1);
        assert_eq!(
            row.attachment("Articles", "Comments")
                .and_then(Entry::as_many)
                .map(<[Record]>::len),
            Some(1)
        );
    }

    #[test]
    fn test_shared_column_info() {
        let first = Row::from_pairs([("id", 1)]);
        let second = Row::with_columns(first.column_info(), vec![Value::Int(2)]);
        assert!(Arc::ptr_eq(&first.column_info(), &second.column_info()));
        assert_eq!(second.get_by_name("id"), Some(&Value::Int(2)));
    }
}
