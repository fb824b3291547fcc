//! Streaming reshaped query results.

use sqlcontain_core::{
    Caster, Error, Record, Result, Row, RowSource, SchemaLookup, split_column_alias,
};
use std::collections::HashMap;
use std::fmt;

enum State {
    /// The next row has not been read yet.
    Unread,
    /// The next row is read, reshaped and waiting.
    Ready(Record),
    Exhausted,
}

/// A forward-only stream of reshaped records.
///
/// Every flat row is split by column alias into one nested record per
/// table alias: `Alias__field` goes under `Alias`, a bare `field` under the
/// base alias. Values are cast by the declared column type, with the cast
/// resolved once per column for the whole stream. Data attached by
/// deferred associations is placed under its owning alias, or at the top
/// level when the owner is the base table.
///
/// Rows are read one at a time: peeking with [`ResultSet::has_next`] reads
/// at most one row ahead, and stopping early never reads the rest.
pub struct ResultSet<'a> {
    source: Box<dyn RowSource + 'a>,
    default_alias: String,
    schema: Box<dyn SchemaLookup + 'a>,
    /// table alias -> field -> caster (`None` passes values through)
    casters: HashMap<String, HashMap<String, Option<Caster>>>,
    state: State,
    position: usize,
}

impl<'a> ResultSet<'a> {
    /// Stream `source`, reshaping against `default_alias` and `schema`.
    pub fn new(
        source: Box<dyn RowSource + 'a>,
        default_alias: impl Into<String>,
        schema: impl SchemaLookup + 'a,
    ) -> Self {
        Self {
            source,
            default_alias: default_alias.into(),
            schema: Box::new(schema),
            casters: HashMap::new(),
            state: State::Unread,
            position: 0,
        }
    }

    /// Alias bare column names are filed under.
    pub fn default_alias(&self) -> &str {
        &self.default_alias
    }

    /// Number of records consumed so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Check whether another record is available, reading at most one row.
    pub fn has_next(&mut self) -> Result<bool> {
        self.read_ahead()
    }

    /// Peek at the next record without consuming it.
    pub fn current(&mut self) -> Result<Option<&Record>> {
        self.read_ahead()?;
        match &self.state {
            State::Ready(record) => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    /// Skip the next record.
    pub fn advance(&mut self) -> Result<()> {
        if self.read_ahead()? {
            self.state = State::Unread;
            self.position += 1;
        }
        Ok(())
    }

    /// Consume the first remaining record.
    pub fn first(mut self) -> Result<Option<Record>> {
        self.next().transpose()
    }

    /// Collect every remaining record.
    pub fn collect_all(self) -> Result<Vec<Record>> {
        self.collect()
    }

    /// Stream records flattened to entities of the base table.
    ///
    /// See [`Record::into_entity`].
    pub fn into_entities(self) -> impl Iterator<Item = Result<Record>> + 'a {
        let alias = self.default_alias.clone();
        self.map(move |r| r.map(|record| record.into_entity(&alias)))
    }

    fn read_ahead(&mut self) -> Result<bool> {
        match self.state {
            State::Ready(_) => return Ok(true),
            State::Exhausted => return Ok(false),
            State::Unread => {}
        }
        let next = self.source.next_row().and_then(|row| match row {
            Some(row) => self.reshape(row).map(Some),
            None => Ok(None),
        });
        match next {
            Ok(Some(record)) => {
                self.state = State::Ready(record);
                Ok(true)
            }
            Ok(None) => {
                tracing::trace!(rows = self.position, "Result stream exhausted");
                self.state = State::Exhausted;
                Ok(false)
            }
            Err(e) => {
                self.state = State::Exhausted;
                Err(e)
            }
        }
    }

    fn reshape(&mut self, row: Row) -> Result<Record> {
        let (columns, attachments) = row.into_parts();
        let mut record = Record::new();

        for (column, value) in columns {
            let (table, field) = match split_column_alias(&column) {
                Some((table, field)) => (table, field),
                None => (self.default_alias.as_str(), column.as_str()),
            };
            let value = match resolve_caster(&mut self.casters, &*self.schema, table, field) {
                Some(cast) => cast(value).map_err(|e| with_column(e, table, field))?,
                None => value,
            };
            record
                .record_mut(table)
                .ok_or_else(|| collision(&self.default_alias, table))?
                .insert(field, value);
        }

        for attachment in attachments {
            let target = if attachment.owner == self.default_alias {
                &mut record
            } else {
                record
                    .record_mut(&attachment.owner)
                    .ok_or_else(|| collision(&self.default_alias, &attachment.owner))?
            };
            if target.contains_key(&attachment.property) {
                return Err(collision(&attachment.owner, &attachment.property));
            }
            target.insert(attachment.property, attachment.entry);
        }

        Ok(record)
    }
}

/// Two pieces of a row claimed the same key.
fn collision(owner: &str, key: &str) -> Error {
    Error::malformed_containment(
        owner,
        key,
        format!("'{}' is already taken in the reshaped row", key),
    )
}

/// Resolve (once) the cast for one column.
fn resolve_caster(
    casters: &mut HashMap<String, HashMap<String, Option<Caster>>>,
    schema: &dyn SchemaLookup,
    table: &str,
    field: &str,
) -> Option<Caster> {
    if let Some(cached) = casters.get(table).and_then(|f| f.get(field)) {
        return *cached;
    }
    let resolved = schema.column_type(table, field).map(|ty| ty.caster());
    casters
        .entry(table.to_string())
        .or_default()
        .insert(field.to_string(), resolved);
    resolved
}

fn with_column(err: Error, table: &str, field: &str) -> Error {
    match err {
        Error::Type(mut e) => {
            e.column = Some(format!("{}.{}", table, field));
            Error::Type(e)
        }
        other => other,
    }
}

impl Iterator for ResultSet<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_ahead() {
            Ok(true) => match std::mem::replace(&mut self.state, State::Unread) {
                State::Ready(record) => {
                    self.position += 1;
                    Some(Ok(record))
                }
                _ => None,
            },
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl fmt::Debug for ResultSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Unread => "unread",
            State::Ready(_) => "ready",
            State::Exhausted => "exhausted",
        };
        f.debug_struct("ResultSet")
            .field("default_alias", &self.default_alias)
            .field("position", &self.position)
            .field("state", &state)
            .finish_non_exhaustive()
    }
}
