//! Row source building blocks: owned buffers and row-mapping decorators.

use crate::Result;
use crate::row::{Row, RowSource};

/// Rows fully drained from a source and owned in memory.
///
/// The buffer is an arena indexed `0..len`. It exists so a forward-only
/// cursor can be read twice: once to collect keys, once to stream rows.
#[derive(Debug, Clone, Default)]
pub struct BufferedRows {
    rows: Vec<Row>,
}

impl BufferedRows {
    /// Drain `source` to completion.
    ///
    /// An error aborts the drain and drops every row read so far.
    pub fn drain(source: &mut dyn RowSource) -> Result<Self> {
        let mut rows = Vec::new();
        while let Some(row) = source.next_row()? {
            rows.push(row);
        }
        tracing::trace!(rows = rows.len(), "Drained row source");
        Ok(Self { rows })
    }

    /// Number of buffered rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if nothing was buffered.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Borrow the buffered rows.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Stream the buffered rows from the start, by reference.
    pub fn cursor(&self) -> BufferCursor<'_> {
        BufferCursor {
            rows: &self.rows,
            position: 0,
        }
    }

    /// Turn the buffer into an owning row source.
    pub fn into_source(self) -> VecSource {
        VecSource::new(self.rows)
    }
}

/// A restartable read-only cursor over [`BufferedRows`].
#[derive(Debug, Clone)]
pub struct BufferCursor<'a> {
    rows: &'a [Row],
    position: usize,
}

impl<'a> BufferCursor<'a> {
    /// Return to the first row.
    pub fn rewind(&mut self) {
        self.position = 0;
    }
}

impl<'a> Iterator for BufferCursor<'a> {
    type Item = &'a Row;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.get(self.position)?;
        self.position += 1;
        Some(row)
    }
}

/// A row source over an owned vector of rows.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    rows: std::vec::IntoIter<Row>,
}

impl VecSource {
    /// Create a source yielding `rows` in order.
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }
}

impl RowSource for VecSource {
    fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.next())
    }
}

/// A decorator that passes every row of an inner source through a callback.
///
/// Pulling from the decorator pulls exactly one row from the inner source;
/// an exhausted inner source never invokes the callback.
pub struct MapRows<S, F> {
    inner: S,
    callback: F,
}

impl<S, F> MapRows<S, F>
where
    S: RowSource,
    F: FnMut(Row) -> Result<Row>,
{
    /// Wrap `inner`, transforming each row with `callback`.
    pub fn new(inner: S, callback: F) -> Self {
        Self { inner, callback }
    }
}

impl<S, F> RowSource for MapRows<S, F>
where
    S: RowSource,
    F: FnMut(Row) -> Result<Row>,
{
    fn next_row(&mut self) -> Result<Option<Row>> {
        match self.inner.next_row()? {
            Some(row) => (self.callback)(row).map(Some),
            None => Ok(None),
        }
    }
}

impl<S, F> std::fmt::Debug for MapRows<S, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapRows").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::record::Entry;
    use crate::value::Value;

    struct CountingSource {
        remaining: Vec<Row>,
        fetches: usize,
        fail_at: Option<usize>,
    }

    impl CountingSource {
        fn new(n: i32) -> Self {
            Self {
                remaining: (1..=n).rev().map(|i| Row::from_pairs([("id", i)])).collect(),
                fetches: 0,
                fail_at: None,
            }
        }
    }

    impl RowSource for CountingSource {
        fn next_row(&mut self) -> Result<Option<Row>> {
            self.fetches += 1;
            if self.fail_at == Some(self.fetches) {
                return Err(Error::execution("connection reset"));
            }
            Ok(self.remaining.pop())
        }
    }

    #[test]
    fn test_drain_reads_to_end() {
        let mut source = CountingSource::new(3);
        let buffer = BufferedRows::drain(&mut source).unwrap();
        assert_eq!(buffer.len(), 3);
        assert_eq!(source.fetches, 4);
    }

    #[test]
    fn test_drain_error_propagates() {
        let mut source = CountingSource::new(3);
        source.fail_at = Some(2);
        assert!(BufferedRows::drain(&mut source).is_err());
    }

    #[test]
    fn test_buffer_cursor_rewinds() {
        let mut source = CountingSource::new(2);
        let buffer = BufferedRows::drain(&mut source).unwrap();
        let mut cursor = buffer.cursor();
        assert_eq!(cursor.by_ref().count(), 2);
        assert!(cursor.next().is_none());
        cursor.rewind();
        let first = cursor.next().unwrap();
        assert_eq!(first.get_by_name("id"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_into_source_preserves_order() {
        let mut source = CountingSource::new(3);
        let mut rows = BufferedRows::drain(&mut source).unwrap().into_source();
        let mut ids = Vec::new();
        while let Some(row) = rows.next_row().unwrap() {
            ids.push(row.get_by_name("id").cloned().unwrap());
        }
        assert_eq!(ids, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn test_map_rows_pulls_lazily() {
        let mut calls = 0;
        let mut source = CountingSource::new(5);
        {
            let mut mapped = MapRows::new(&mut source, |mut row: Row| {
                calls += 1;
                row.attach("Articles", "seen", Entry::Value(Value::Bool(true)));
                Ok(row)
            });
            let row = mapped.next_row().unwrap().unwrap();
            assert!(row.attachment("Articles", "seen").is_some());
        }
        assert_eq!(calls, 1);
        assert_eq!(source.fetches, 1);
    }

    #[test]
    fn test_map_rows_skips_callback_on_empty_source() {
        let mut calls = 0;
        let mut mapped = MapRows::new(CountingSource::new(0), |row: Row| {
            calls += 1;
            Ok(row)
        });
        assert!(mapped.next_row().unwrap().is_none());
        drop(mapped);
        assert_eq!(calls, 0);
    }
}
