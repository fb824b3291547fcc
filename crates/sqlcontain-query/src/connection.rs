//! The query execution collaborator.

use crate::select::Select;
use sqlcontain_core::{Result, RowSource};
use std::sync::Arc;

/// Runs planned queries and hands back forward-only row cursors.
///
/// Implementations receive a fully planned [`Select`]: joins and the
/// projection are applied and no containment remains. Rows must be keyed by
/// the projected column aliases (`field` for the base table,
/// `Alias__field` otherwise). They can render SQL with [`Select::build`]
/// or interpret the query structure directly.
///
/// # Example
///
/// ```rust,ignore
/// struct Driver { /* ... */ }
///
/// impl Connection for Driver {
///     fn execute(&self, query: &Select) -> Result<Box<dyn RowSource + '_>> {
///         let (sql, params) = query.build();
///         Ok(Box::new(self.run(&sql, &params)?))
///     }
/// }
/// ```
pub trait Connection {
    /// Execute `query` and return a cursor over its rows.
    fn execute(&self, query: &Select) -> Result<Box<dyn RowSource + '_>>;
}

impl<C: Connection + ?Sized> Connection for &C {
    fn execute(&self, query: &Select) -> Result<Box<dyn RowSource + '_>> {
        (**self).execute(query)
    }
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn execute(&self, query: &Select) -> Result<Box<dyn RowSource + '_>> {
        (**self).execute(query)
    }
}

impl<C: Connection + ?Sized> Connection for Arc<C> {
    fn execute(&self, query: &Select) -> Result<Box<dyn RowSource + '_>> {
        (**self).execute(query)
    }
}
