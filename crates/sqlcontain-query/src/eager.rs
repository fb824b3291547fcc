//! Eager loading of contained associations.
//!
//! The primary query runs once. Joined associations arrive in its rows;
//! every deferred association is loaded by one batched follow-up query and
//! attached to the primary rows as they stream past.
//!
//! When a deferred load filters by key values, the primary cursor is
//! drained into a buffer first so the keys of every row are known before
//! the follow-up query runs. Otherwise rows stream straight through and
//! the follow-up query runs when the first row is pulled.

use crate::association::KeyFilter;
use crate::config::LoaderConfig;
use crate::connection::Connection;
use crate::plan::{DeferredLoad, EagerPlan};
use crate::result::ResultSet;
use crate::select::{Select, SelectField};
use sqlcontain_core::{
    BufferedRows, Caster, Error, MapRows, Record, Result, Row, SchemaLookup, Value, ValueKey,
    column_alias,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Execute a planned query.
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(table = %plan.query.alias(), deferred = plan.deferred.len())
)]
pub fn execute<'c>(
    plan: EagerPlan,
    conn: &'c dyn Connection,
    config: &LoaderConfig,
) -> Result<ResultSet<'c>> {
    let EagerPlan {
        query,
        deferred,
        schema,
    } = plan;
    let base_alias = query.alias().to_string();

    let mut loaders: Vec<DeferredLoader<'c>> = deferred
        .into_iter()
        .map(|load| DeferredLoader::new(load, &query, &schema, conn, config.strict_keys))
        .collect::<Result<_>>()?;

    let mut source = conn.execute(&query)?;

    if loaders.iter().any(|l| l.filter.is_none()) {
        let buffered = BufferedRows::drain(&mut *source)?;
        drop(source);
        if buffered.len() > config.buffer_warn_rows {
            tracing::warn!(
                rows = buffered.len(),
                threshold = config.buffer_warn_rows,
                "Buffered a large primary result to collect association keys"
            );
        }
        for loader in &mut loaders {
            if loader.filter.is_none() {
                let keys = collect_keys(&buffered, &loader.columns, config.strict_keys)?;
                tracing::debug!(
                    association = loader.load.alias(),
                    keys = keys.len(),
                    "Collected association keys"
                );
                loader.filter = Some(KeyFilter::Keys(keys));
            }
        }
        source = Box::new(buffered.into_source());
    } else if !loaders.is_empty() {
        tracing::trace!("Streaming primary rows without buffering");
    }

    for mut loader in loaders {
        source = Box::new(MapRows::new(source, move |row| loader.attach(row)));
    }

    Ok(ResultSet::new(source, base_alias, schema))
}

/// Loaded rows of one deferred association, ready for matching.
enum Fetched {
    ByKey(HashMap<ValueKey, Vec<Record>>),
    /// The foreign key is disabled: every row gets the same records.
    Shared(Vec<Record>),
}

/// One source key column as it appears in the primary rows.
struct KeyColumn {
    alias: String,
    /// Declared type of the column, so keys match whatever the driver returned.
    cast: Option<Caster>,
}

struct DeferredLoader<'c> {
    load: DeferredLoad,
    columns: Vec<KeyColumn>,
    /// `None` until keys are collected; taken when the fetch runs.
    filter: Option<KeyFilter>,
    fetched: Option<Fetched>,
    conn: &'c dyn Connection,
    strict_keys: bool,
    skipped_rows: usize,
}

impl<'c> DeferredLoader<'c> {
    fn new(
        load: DeferredLoad,
        primary: &Select,
        schema: &dyn SchemaLookup,
        conn: &'c dyn Connection,
        strict_keys: bool,
    ) -> Result<Self> {
        let source_key = load.association.source_key(&load.config)?;
        let columns: Vec<KeyColumn> = source_key
            .iter()
            .flatten()
            .map(|c| KeyColumn {
                alias: column_alias(&load.source_alias, primary.alias(), c),
                cast: schema
                    .column_type(&load.source_alias, c)
                    .map(|ty| ty.caster()),
            })
            .collect();

        let filter = match &source_key {
            None => Some(KeyFilter::Unfiltered),
            Some(_) if load.requires_keys() => None,
            Some(key) => Some(KeyFilter::Subquery(key_subquery(
                primary,
                &load.source_alias,
                key,
            ))),
        };

        Ok(Self {
            load,
            columns,
            filter,
            fetched: None,
            conn,
            strict_keys,
            skipped_rows: 0,
        })
    }

    fn attach(&mut self, mut row: Row) -> Result<Row> {
        if self.fetched.is_none() {
            self.fetched = Some(self.fetch()?);
        }

        let association = &self.load.association;
        let entry = match &self.fetched {
            Some(Fetched::Shared(records)) => association.entry_for(records),
            Some(Fetched::ByKey(groups)) => match read_key(&row, &self.columns)? {
                KeyRead::Values(values) => ValueKey::composite(&values)
                    .and_then(|key| groups.get(&key))
                    .and_then(|r| association.entry_for(r)),
                KeyRead::Missing(column) => {
                    if self.strict_keys {
                        return Err(Error::missing_key(column));
                    }
                    if self.skipped_rows == 0 {
                        tracing::warn!(
                            association = association.name(),
                            column = column,
                            "Row lacks an association key column, leaving it unloaded"
                        );
                    }
                    self.skipped_rows += 1;
                    None
                }
            },
            None => None,
        };

        if let Some(entry) = entry {
            row.attach(&self.load.source_alias, association.property(), entry);
        }
        Ok(row)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(association = %self.load.alias()))]
    fn fetch(&mut self) -> Result<Fetched> {
        let filter = self.filter.take().unwrap_or(KeyFilter::Unfiltered);
        let association = &self.load.association;

        if let KeyFilter::Keys(keys) = &filter {
            if keys.is_empty() {
                tracing::debug!("No parent keys, skipping association query");
                return Ok(Fetched::ByKey(HashMap::new()));
            }
        }

        let target_key = association.target_key(&self.load.config)?;
        let query =
            association.loader_query(&self.load.config, Arc::clone(&self.load.nested), filter)?;
        let alias = query.alias().to_string();
        let results = query.all(self.conn)?;

        let Some((key_table, key_columns)) = target_key else {
            let records = results
                .map(|r| r.map(|record| record.into_entity(&alias)))
                .collect::<Result<Vec<_>>>()?;
            tracing::debug!(rows = records.len(), "Loaded shared association rows");
            return Ok(Fetched::Shared(records));
        };

        let mut groups: HashMap<ValueKey, Vec<Record>> = HashMap::new();
        let mut loaded = 0usize;
        for record in results {
            let record = record?;
            loaded += 1;
            let Some(key) = record_key(&record, &key_table, &key_columns) else {
                continue;
            };
            groups
                .entry(key)
                .or_default()
                .push(record.into_entity(&alias));
        }
        tracing::debug!(
            rows = loaded,
            parents = groups.len(),
            "Loaded association rows"
        );
        Ok(Fetched::ByKey(groups))
    }
}

/// The primary query reduced to the source key columns.
fn key_subquery(primary: &Select, source_alias: &str, key: &[String]) -> Select {
    let mut sub = primary.clone();
    sub.fields = key
        .iter()
        .map(|c| SelectField::column(source_alias, c, primary.alias()))
        .collect();
    sub.auto_fields = false;
    // Order only matters when it decides which rows a page keeps.
    if sub.limit.is_none() && sub.offset.is_none() {
        sub.order_by.clear();
    }
    sub
}

enum KeyRead<'a> {
    Values(Vec<Value>),
    /// The row has no column with this alias.
    Missing(&'a str),
}

/// Read the key values of `row`, cast by their declared types.
fn read_key<'a>(row: &Row, columns: &'a [KeyColumn]) -> Result<KeyRead<'a>> {
    let mut values = Vec::with_capacity(columns.len());
    for column in columns {
        let Some(value) = row.get_by_name(&column.alias) else {
            return Ok(KeyRead::Missing(&column.alias));
        };
        values.push(match column.cast {
            Some(cast) => cast(value.clone()).map_err(|e| with_column(e, &column.alias))?,
            None => value.clone(),
        });
    }
    Ok(KeyRead::Values(values))
}

fn with_column(err: Error, column: &str) -> Error {
    match err {
        Error::Type(mut e) => {
            e.column.get_or_insert_with(|| column.to_string());
            Error::Type(e)
        }
        other => other,
    }
}

fn record_key(record: &Record, table: &str, columns: &[String]) -> Option<ValueKey> {
    let values = record.record(table)?;
    let values = columns
        .iter()
        .map(|c| values.value(c))
        .collect::<Option<Vec<&Value>>>()?;
    ValueKey::composite(values)
}

/// Distinct non-NULL keys of every buffered row, in first-seen order.
///
/// The returned values are cast like the keys `attach` matches on.
fn collect_keys(rows: &BufferedRows, columns: &[KeyColumn], strict: bool) -> Result<Vec<Value>> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    let mut missing = 0usize;

    for row in rows.cursor() {
        let mut values = match read_key(row, columns)? {
            KeyRead::Values(values) => values,
            KeyRead::Missing(column) if strict => return Err(Error::missing_key(column)),
            KeyRead::Missing(_) => {
                missing += 1;
                continue;
            }
        };
        let Some(key) = ValueKey::composite(&values) else {
            continue;
        };
        if seen.insert(key) {
            keys.push(match values.len() {
                1 => values.swap_remove(0),
                _ => Value::Array(values),
            });
        }
    }

    if missing > 0 {
        tracing::warn!(rows = missing, "Rows lacked association key columns");
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlcontain_core::SqlType;

    fn buffered(rows: Vec<Row>) -> BufferedRows {
        let mut source = sqlcontain_core::VecSource::new(rows);
        BufferedRows::drain(&mut source).unwrap()
    }

    fn key(alias: &str) -> KeyColumn {
        KeyColumn {
            alias: alias.to_string(),
            cast: None,
        }
    }

    fn typed_key(alias: &str, ty: SqlType) -> KeyColumn {
        KeyColumn {
            alias: alias.to_string(),
            cast: Some(ty.caster()),
        }
    }

    #[test]
    fn test_collect_keys_distinct_in_order() {
        let rows = buffered(vec![
            Row::from_pairs([("id", Value::Int(2))]),
            Row::from_pairs([("id", Value::Int(1))]),
            Row::from_pairs([("id", Value::BigInt(2))]),
            Row::from_pairs([("id", Value::Null)]),
        ]);
        let keys = collect_keys(&rows, &[key("id")], false).unwrap();
        assert_eq!(keys, vec![Value::Int(2), Value::Int(1)]);
    }

    #[test]
    fn test_collect_composite_keys() {
        let rows = buffered(vec![Row::from_pairs([
            ("a", Value::Int(1)),
            ("b", Value::Text("x".into())),
        ])]);
        let keys = collect_keys(&rows, &[key("a"), key("b")], false).unwrap();
        assert_eq!(
            keys,
            vec![Value::Array(vec![Value::Int(1), Value::Text("x".into())])]
        );
    }

    #[test]
    fn test_collect_keys_missing_column() {
        let rows = buffered(vec![Row::from_pairs([("title", Value::Text("t".into()))])]);
        let columns = [key("id")];
        assert!(collect_keys(&rows, &columns, false).unwrap().is_empty());
        let err = collect_keys(&rows, &columns, true).unwrap_err();
        assert!(matches!(
            err,
            Error::Query(ref q) if q.kind == sqlcontain_core::QueryErrorKind::MissingKey
        ));
    }

    #[test]
    fn test_read_key() {
        let row = Row::from_pairs([("Author__id", Value::Int(5)), ("x", Value::Null)]);
        let columns = [key("Author__id"), key("x"), key("y")];
        assert!(matches!(
            read_key(&row, &columns[..1]).unwrap(),
            KeyRead::Values(ref v) if v == &[Value::Int(5)]
        ));
        assert!(matches!(
            read_key(&row, &columns[1..2]).unwrap(),
            KeyRead::Values(ref v) if ValueKey::composite(v).is_none()
        ));
        assert!(matches!(
            read_key(&row, &columns[2..]).unwrap(),
            KeyRead::Missing("y")
        ));
    }

    #[test]
    fn test_keys_cast_by_declared_type() {
        let rows = buffered(vec![
            Row::from_pairs([("id", Value::Text("7".into()))]),
            Row::from_pairs([("id", Value::Int(7))]),
            Row::from_pairs([("id", Value::Text(" 8".into()))]),
        ]);
        let columns = [typed_key("id", SqlType::BigInt)];
        let keys = collect_keys(&rows, &columns, false).unwrap();
        assert_eq!(keys, vec![Value::BigInt(7), Value::BigInt(8)]);

        let row = Row::from_pairs([("id", Value::Text("7".into()))]);
        let KeyRead::Values(values) = read_key(&row, &columns).unwrap() else {
            panic!("key column should be present");
        };
        assert_eq!(ValueKey::composite(&values), Some(ValueKey::Int(7)));
    }

    #[test]
    fn test_uncastable_key_is_a_type_error() {
        let rows = buffered(vec![Row::from_pairs([("Author__id", Value::Text("ada".into()))])]);
        let err = collect_keys(&rows, &[typed_key("Author__id", SqlType::BigInt)], false)
            .unwrap_err();
        match err {
            Error::Type(e) => assert_eq!(e.column.as_deref(), Some("Author__id")),
            other => panic!("expected a type error, got {other:?}"),
        }
    }

    #[test]
    fn test_record_key_reads_nested_table() {
        let record = Record::new().with(
            "ArticlesTags",
            Record::new().with("article_id", Value::Int(3)),
        );
        assert_eq!(
            record_key(&record, "ArticlesTags", &["article_id".to_string()]),
            Some(ValueKey::Int(3))
        );
        assert_eq!(record_key(&record, "Tags", &["id".to_string()]), None);
    }
}
