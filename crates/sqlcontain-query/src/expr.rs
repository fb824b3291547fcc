//! SQL expressions for query building.
//!
//! The expression tree covers what containment planning emits: qualified
//! column comparisons for join conditions, key filters (`IN` lists and
//! `IN` sub-queries) for deferred loads, and user supplied conditions.

use crate::select::Select;
use sqlcontain_core::Value;

/// A SQL expression that can be used in WHERE and ON clauses.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Column reference with optional table qualifier
    Column {
        /// Optional table alias
        table: Option<String>,
        /// Column name
        name: String,
    },

    /// Literal value
    Literal(Value),

    /// Row value constructor, `(a, b)`, for composite keys
    Tuple(Vec<Expr>),

    /// Binary operation (e.g., a = b, a AND b)
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// NOT expr
    Not(Box<Expr>),

    /// IN expression
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    /// IN (SELECT ...) expression
    InSubquery {
        expr: Box<Expr>,
        query: Box<Select>,
    },

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// Raw SQL fragment (escape hatch)
    Raw(String),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,
    /// Logical AND
    And,
    /// Logical OR
    Or,
}

impl BinaryOp {
    /// Get the SQL representation of this operator.
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }

    /// Check if this is a logical connective.
    pub const fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

impl Expr {
    /// Create an unqualified column reference.
    ///
    /// A dotted name (`"Author.name"`) is split into table and column.
    pub fn col(name: impl Into<String>) -> Self {
        let name = name.into();
        match name.split_once('.') {
            Some((table, column)) if !table.is_empty() && !column.is_empty() => Expr::Column {
                table: Some(table.to_string()),
                name: column.to_string(),
            },
            _ => Expr::Column { table: None, name },
        }
    }

    /// Create a table-qualified column reference.
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column {
            table: Some(table.into()),
            name: column.into(),
        }
    }

    /// Create a literal value expression.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Create a raw SQL expression.
    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    /// Create a row value constructor.
    pub fn tuple(items: Vec<Expr>) -> Self {
        Expr::Tuple(items)
    }

    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other.into()),
        }
    }

    /// Equal to (=)
    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    /// Not equal to (<>)
    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, other)
    }

    /// Less than (<)
    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    /// Less than or equal to (<=)
    pub fn le(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, other)
    }

    /// Greater than (>)
    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    /// Greater than or equal to (>=)
    pub fn ge(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, other)
    }

    /// Logical AND
    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// Logical OR
    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    /// Logical NOT
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// IS NULL
    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    /// IS NOT NULL
    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    /// IN list of values
    pub fn in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    /// NOT IN list of values
    pub fn not_in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    /// IN (SELECT ...)
    pub fn in_subquery(self, query: Select) -> Self {
        Expr::InSubquery {
            expr: Box::new(self),
            query: Box::new(query),
        }
    }

    /// Join expressions with AND; `None` for an empty input.
    pub fn all(exprs: impl IntoIterator<Item = Expr>) -> Option<Self> {
        exprs.into_iter().reduce(Expr::and)
    }

    /// Qualify every unqualified column with `table`.
    ///
    /// Sub-queries are left untouched; they carry their own aliases.
    #[must_use]
    pub fn qualify(self, table: &str) -> Self {
        match self {
            Expr::Column { table: None, name } => Expr::Column {
                table: Some(table.to_string()),
                name,
            },
            Expr::Tuple(items) => {
                Expr::Tuple(items.into_iter().map(|e| e.qualify(table)).collect())
            }
            Expr::Binary { left, op, right } => Expr::Binary {
                left: Box::new(left.qualify(table)),
                op,
                right: Box::new(right.qualify(table)),
            },
            Expr::Not(inner) => Expr::Not(Box::new(inner.qualify(table))),
            Expr::In {
                expr,
                values,
                negated,
            } => Expr::In {
                expr: Box::new(expr.qualify(table)),
                values: values.into_iter().map(|e| e.qualify(table)).collect(),
                negated,
            },
            Expr::InSubquery { expr, query } => Expr::InSubquery {
                expr: Box::new(expr.qualify(table)),
                query,
            },
            Expr::IsNull { expr, negated } => Expr::IsNull {
                expr: Box::new(expr.qualify(table)),
                negated,
            },
            other => other,
        }
    }

    /// Build SQL string and collect parameters.
    pub fn build(&self, params: &mut Vec<Value>) -> String {
        match self {
            Expr::Column { table, name } => match table {
                Some(t) => format!("{}.{}", quote_identifier(t), quote_identifier(name)),
                None => quote_identifier(name),
            },

            Expr::Literal(value) => {
                params.push(value.clone());
                format!("${}", params.len())
            }

            Expr::Tuple(items) => {
                let parts: Vec<_> = items.iter().map(|e| e.build(params)).collect();
                format!("({})", parts.join(", "))
            }

            Expr::Binary { left, op, right } => {
                let left_sql = left.build(params);
                let right_sql = right.build(params);
                if op.is_logical() {
                    format!("({left_sql} {} {right_sql})", op.as_str())
                } else {
                    format!("{left_sql} {} {right_sql}", op.as_str())
                }
            }

            Expr::Not(inner) => format!("NOT ({})", inner.build(params)),

            Expr::In {
                expr,
                values,
                negated,
            } => {
                let expr_sql = expr.build(params);
                let not_str = if *negated { "NOT " } else { "" };
                if values.is_empty() {
                    // An empty IN list matches nothing.
                    return if *negated { "1 = 1" } else { "1 = 0" }.to_string();
                }
                let value_sqls: Vec<_> = values.iter().map(|v| v.build(params)).collect();
                format!("{expr_sql} {not_str}IN ({})", value_sqls.join(", "))
            }

            Expr::InSubquery { expr, query } => {
                let expr_sql = expr.build(params);
                let sub_sql = query.build_into(params);
                format!("{expr_sql} IN ({sub_sql})")
            }

            Expr::IsNull { expr, negated } => {
                let expr_sql = expr.build(params);
                let not_str = if *negated { " NOT" } else { "" };
                format!("{expr_sql} IS{not_str} NULL")
            }

            Expr::Raw(sql) => sql.clone(),
        }
    }
}

/// Quote an identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Literal(Value::Text(s.to_string()))
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Literal(Value::Text(s))
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::Literal(Value::Int(n))
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Literal(Value::BigInt(n))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Literal(Value::Bool(b))
    }
}

impl From<f64> for Expr {
    fn from(n: f64) -> Self {
        Expr::Literal(Value::Double(n))
    }
}
