//! SQL clause types (WHERE, ORDER BY, LIMIT, OFFSET).

use crate::expr::{Expr, quote_identifier};
use sqlcontain_core::Value;

/// WHERE clause.
#[derive(Debug, Clone)]
pub struct Where {
    expr: Expr,
}

impl Where {
    /// Create a new WHERE clause with the given expression.
    pub fn new(expr: Expr) -> Self {
        Self { expr }
    }

    /// Add an AND condition.
    pub fn and(self, expr: Expr) -> Self {
        Self {
            expr: self.expr.and(expr),
        }
    }

    /// Add an OR condition.
    pub fn or(self, expr: Expr) -> Self {
        Self {
            expr: self.expr.or(expr),
        }
    }

    /// The condition expression.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Build the WHERE clause SQL and parameters.
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = self.expr.build(&mut params);
        (sql, params)
    }
}

/// ORDER BY clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    table: Option<String>,
    column: String,
    direction: OrderDirection,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    /// Parse `ASC`/`DESC`, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Some(OrderDirection::Asc),
            "DESC" => Some(OrderDirection::Desc),
            _ => None,
        }
    }
}

impl OrderBy {
    fn with_direction(column: impl Into<String>, direction: OrderDirection) -> Self {
        let column = column.into();
        let (table, column) = match column.split_once('.') {
            Some((t, c)) if !t.is_empty() && !c.is_empty() => (Some(t.to_string()), c.to_string()),
            _ => (None, column),
        };
        Self {
            table,
            column,
            direction,
        }
    }

    /// Create an ascending order by clause. `"Alias.column"` is qualified.
    pub fn asc(column: impl Into<String>) -> Self {
        Self::with_direction(column, OrderDirection::Asc)
    }

    /// Create a descending order by clause. `"Alias.column"` is qualified.
    pub fn desc(column: impl Into<String>) -> Self {
        Self::with_direction(column, OrderDirection::Desc)
    }

    /// Parse `"column"`, `"Alias.column"` or `"column DESC"`.
    pub fn parse(spec: &str) -> Option<Self> {
        let mut parts = spec.split_whitespace();
        let column = parts.next()?;
        let direction = match parts.next() {
            Some(dir) => OrderDirection::parse(dir)?,
            None => OrderDirection::Asc,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self::with_direction(column, direction))
    }

    /// Qualify an unqualified column with `table`.
    #[must_use]
    pub fn qualify(mut self, table: &str) -> Self {
        if self.table.is_none() {
            self.table = Some(table.to_string());
        }
        self
    }

    /// Table qualifier, if any.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Column name.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Sort direction.
    pub fn direction(&self) -> OrderDirection {
        self.direction
    }

    /// Generate SQL for this ORDER BY clause.
    pub fn to_sql(&self) -> String {
        let mut sql = match &self.table {
            Some(t) => format!("{}.{}", quote_identifier(t), quote_identifier(&self.column)),
            None => quote_identifier(&self.column),
        };

        sql.push_str(match self.direction {
            OrderDirection::Asc => " ASC",
            OrderDirection::Desc => " DESC",
        });

        sql
    }
}

/// LIMIT clause.
#[derive(Debug, Clone, Copy)]
pub struct Limit(pub u64);

/// OFFSET clause.
#[derive(Debug, Clone, Copy)]
pub struct Offset(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_by_parse() {
        let order = OrderBy::parse("Comments.created DESC").unwrap();
        assert_eq!(order.table(), Some("Comments"));
        assert_eq!(order.column(), "created");
        assert_eq!(order.direction(), OrderDirection::Desc);
        assert_eq!(order.to_sql(), "\"Comments\".\"created\" DESC");

        assert!(OrderBy::parse("id sideways").is_none());
        assert!(OrderBy::parse("").is_none());
    }

    #[test]
    fn test_order_by_qualify_keeps_existing() {
        assert_eq!(OrderBy::asc("id").qualify("Tags").table(), Some("Tags"));
        assert_eq!(OrderBy::asc("Users.id").qualify("Tags").table(), Some("Users"));
    }

    #[test]
    fn test_where_and() {
        let clause = Where::new(Expr::col("a").eq(1)).and(Expr::col("b").eq(2));
        let (sql, params) = clause.build();
        assert_eq!(sql, "(\"a\" = $1 AND \"b\" = $2)");
        assert_eq!(params.len(), 2);
    }
}
