//! In-memory `Connection` and a small blog schema shared by the integration tests.

#![allow(dead_code)]

use sqlcontain::prelude::*;
use sqlcontain::{BinaryOp, JoinType, SelectField, column_alias};
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

type TableRow = Rc<HashMap<String, Value>>;

struct MemTable {
    columns: Vec<String>,
    rows: Vec<TableRow>,
}

/// One candidate result row: a table row (or NULLs) per alias.
#[derive(Clone)]
struct Binding {
    base: String,
    tables: HashMap<String, Option<TableRow>>,
}

impl Binding {
    fn value(&self, table: &str, column: &str) -> Value {
        self.tables
            .get(table)
            .and_then(Option::as_ref)
            .and_then(|row| row.get(column))
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn with(&self, alias: &str, row: Option<TableRow>) -> Self {
        let mut next = self.clone();
        next.tables.insert(alias.to_string(), row);
        next
    }
}

/// Interprets planned `Select`s against in-memory tables.
///
/// Counts executed queries and rows pulled per table so tests can assert
/// on batching and laziness.
#[derive(Default)]
pub struct MemoryDb {
    tables: HashMap<String, MemTable>,
    executions: Cell<usize>,
    executed: RefCell<Vec<String>>,
    fetched: Rc<RefCell<HashMap<String, usize>>>,
    failing: RefCell<Option<String>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a physical table.
    pub fn table(mut self, name: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        let columns: Vec<String> = columns.iter().map(|&c| c.to_string()).collect();
        let rows = rows
            .into_iter()
            .map(|values| {
                assert_eq!(values.len(), columns.len(), "row width for {name}");
                Rc::new(columns.iter().cloned().zip(values).collect())
            })
            .collect();
        self.tables
            .insert(name.to_string(), MemTable { columns, rows });
        self
    }

    /// Number of queries executed.
    pub fn executions(&self) -> usize {
        self.executions.get()
    }

    /// Physical tables of executed queries, in order.
    pub fn executed_tables(&self) -> Vec<String> {
        self.executed.borrow().clone()
    }

    /// Rows pulled from cursors over `table`.
    pub fn fetched(&self, table: &str) -> usize {
        self.fetched.borrow().get(table).copied().unwrap_or(0)
    }

    /// Make every query on `table` fail.
    pub fn fail_on(&self, table: &str) {
        *self.failing.borrow_mut() = Some(table.to_string());
    }

    pub fn reset_counters(&self) {
        self.executions.set(0);
        self.executed.borrow_mut().clear();
        self.fetched.borrow_mut().clear();
    }

    fn rows(&self, table: &str) -> Vec<TableRow> {
        self.tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn run(&self, query: &Select) -> Vec<Row> {
        let base = query.alias().to_string();
        let mut physical: HashMap<String, String> = HashMap::new();
        physical.insert(base.clone(), query.table_name().to_string());

        let mut bindings: Vec<Binding> = self
            .rows(query.table_name())
            .into_iter()
            .map(|row| Binding {
                base: base.clone(),
                tables: HashMap::from([(base.clone(), Some(row))]),
            })
            .collect();

        for join in query.joins() {
            physical.insert(join.alias.clone(), join.table.clone());
            let candidates = self.rows(&join.table);
            let mut next = Vec::new();
            for binding in bindings {
                let mut matched = false;
                for candidate in &candidates {
                    let trial = binding.with(&join.alias, Some(Rc::clone(candidate)));
                    if truthy(&self.eval(&join.on, &trial)) {
                        next.push(trial);
                        matched = true;
                    }
                }
                if !matched && join.join_type == JoinType::Left {
                    next.push(binding.with(&join.alias, None));
                }
            }
            bindings = next;
        }

        if let Some(condition) = query.where_expr() {
            bindings.retain(|b| truthy(&self.eval(condition, b)));
        }

        if !query.order().is_empty() {
            bindings.sort_by(|a, b| {
                for order in query.order() {
                    let table = order.table().unwrap_or(&base);
                    let left = a.value(table, order.column()).key();
                    let right = b.value(table, order.column()).key();
                    let ordering = match order.direction() {
                        sqlcontain::OrderDirection::Asc => left.cmp(&right),
                        sqlcontain::OrderDirection::Desc => right.cmp(&left),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = query
            .offset_value()
            .map_or(0, |n| usize::try_from(n).unwrap());
        let limit = query
            .limit_value()
            .map_or(usize::MAX, |n| usize::try_from(n).unwrap());

        bindings
            .iter()
            .skip(offset)
            .take(limit)
            .map(|b| self.project(query, &physical, b))
            .collect()
    }

    fn project(&self, query: &Select, physical: &HashMap<String, String>, b: &Binding) -> Row {
        let base = query.alias();
        let all_base = [SelectField::all(base)];
        let fields = if query.projection().is_empty() {
            &all_base[..]
        } else {
            query.projection()
        };

        let mut pairs: Vec<(String, Value)> = Vec::new();
        for field in fields {
            match field {
                SelectField::Column { table, name, alias } => {
                    pairs.push((alias.clone(), b.value(table, name)));
                }
                SelectField::All { table } => {
                    let columns = physical
                        .get(table)
                        .and_then(|p| self.tables.get(p))
                        .map(|t| t.columns.clone())
                        .unwrap_or_default();
                    for column in columns {
                        pairs.push((column_alias(table, base, &column), b.value(table, &column)));
                    }
                }
            }
        }
        Row::from_pairs(pairs)
    }

    fn eval(&self, expr: &Expr, b: &Binding) -> Value {
        match expr {
            Expr::Column { table, name } => b.value(table.as_deref().unwrap_or(&b.base), name),
            Expr::Literal(value) => value.clone(),
            Expr::Tuple(items) => Value::Array(items.iter().map(|e| self.eval(e, b)).collect()),
            Expr::Binary { left, op, right } => {
                let left = self.eval(left, b);
                let right = self.eval(right, b);
                match op {
                    BinaryOp::And => Value::Bool(truthy(&left) && truthy(&right)),
                    BinaryOp::Or => Value::Bool(truthy(&left) || truthy(&right)),
                    cmp => match (left.key(), right.key()) {
                        (Some(l), Some(r)) => Value::Bool(compare(*cmp, l.cmp(&r))),
                        _ => Value::Null,
                    },
                }
            }
            Expr::Not(inner) => Value::Bool(!truthy(&self.eval(inner, b))),
            Expr::In {
                expr,
                values,
                negated,
            } => {
                let Some(key) = self.eval(expr, b).key() else {
                    return Value::Null;
                };
                let found = values
                    .iter()
                    .any(|v| self.eval(v, b).key().as_ref() == Some(&key));
                Value::Bool(found != *negated)
            }
            Expr::InSubquery { expr, query } => {
                let Some(key) = self.eval(expr, b).key() else {
                    return Value::Null;
                };
                let found = self.run(query).iter().any(|row| {
                    let values: Vec<Value> = row.iter().map(|(_, v)| v.clone()).collect();
                    let row_key = if values.len() == 1 {
                        values[0].key()
                    } else {
                        Value::Array(values).key()
                    };
                    row_key.as_ref() == Some(&key)
                });
                Value::Bool(found)
            }
            Expr::IsNull { expr, negated } => {
                Value::Bool(self.eval(expr, b).is_null() != *negated)
            }
            Expr::Raw(sql) => match sql.as_str() {
                "1 = 1" => Value::Bool(true),
                "1 = 0" => Value::Bool(false),
                other => panic!("unsupported raw SQL in memory db: {other}"),
            },
        }
    }
}

fn truthy(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}

fn compare(op: BinaryOp, ordering: Ordering) -> bool {
    match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::Ne => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        BinaryOp::And | BinaryOp::Or => false,
    }
}

struct CountingSource {
    table: String,
    rows: std::vec::IntoIter<Row>,
    fetched: Rc<RefCell<HashMap<String, usize>>>,
}

impl RowSource for CountingSource {
    fn next_row(&mut self) -> Result<Option<Row>> {
        let row = self.rows.next();
        if row.is_some() {
            *self
                .fetched
                .borrow_mut()
                .entry(self.table.clone())
                .or_default() += 1;
        }
        Ok(row)
    }
}

impl Connection for MemoryDb {
    fn execute(&self, query: &Select) -> Result<Box<dyn RowSource + '_>> {
        let table = query.table_name().to_string();
        self.executions.set(self.executions.get() + 1);
        self.executed.borrow_mut().push(table.clone());

        if self.failing.borrow().as_deref() == Some(table.as_str()) {
            return Err(Error::execution(format!("table {table} is unavailable")));
        }

        let rows = self.run(query);
        Ok(Box::new(CountingSource {
            table,
            rows: rows.into_iter(),
            fetched: Rc::clone(&self.fetched),
        }))
    }
}

fn ids(fields: &[(&str, SqlType)]) -> TableSchema {
    TableSchema::new(
        fields
            .iter()
            .map(|(name, ty)| FieldInfo::new(*name, ty.clone()).primary_key(*name == "id"))
            .collect(),
    )
}

/// Register the blog tables.
///
/// ```text
/// Articles  belongsTo Author (Users), hasMany Comments, belongsToMany Tags,
///           hasOne Summary (Summaries), hasMany Revisions (subquery strategy)
/// Users     belongsTo Country (Countries), hasMany Posts (Articles)
/// Comments  belongsTo User (Users)
/// ```
pub fn blog_registry(config: LoaderConfig) -> TableRegistry {
    let registry = TableRegistry::with_config(config);
    registry
        .register(
            "Articles",
            TableConfig::new()
                .table("articles")
                .schema(ids(&[
                    ("id", SqlType::BigInt),
                    ("author_id", SqlType::BigInt),
                    ("title", SqlType::Text),
                    ("published", SqlType::Boolean),
                ]))
                .association(AssociationDef::belongs_to("Author").target("Users"))
                .association(AssociationDef::has_many("Comments").sort(OrderBy::asc("id")))
                .association(AssociationDef::belongs_to_many(
                    "Tags",
                    LinkTableInfo::new("articles_tags", "article_id", "tag_id"),
                ))
                .association(AssociationDef::has_one("Summary").target("Summaries"))
                .association(
                    AssociationDef::has_many("Revisions").strategy(Strategy::Subquery),
                ),
        )
        .unwrap();
    registry
        .register(
            "Users",
            TableConfig::new()
                .table("users")
                .schema(ids(&[
                    ("id", SqlType::BigInt),
                    ("name", SqlType::Text),
                    ("country_id", SqlType::BigInt),
                ]))
                .association(AssociationDef::belongs_to("Country").target("Countries"))
                .association(
                    AssociationDef::has_many("Posts")
                        .target("Articles")
                        .foreign_key("author_id"),
                ),
        )
        .unwrap();
    registry
        .register(
            "Countries",
            TableConfig::new()
                .table("countries")
                .schema(ids(&[("id", SqlType::BigInt), ("name", SqlType::Text)])),
        )
        .unwrap();
    registry
        .register(
            "Comments",
            TableConfig::new()
                .table("comments")
                .schema(ids(&[
                    ("id", SqlType::BigInt),
                    ("article_id", SqlType::BigInt),
                    ("user_id", SqlType::BigInt),
                    ("body", SqlType::Text),
                ]))
                .association(AssociationDef::belongs_to("User").target("Users")),
        )
        .unwrap();
    registry
        .register(
            "Tags",
            TableConfig::new()
                .table("tags")
                .schema(ids(&[("id", SqlType::BigInt), ("name", SqlType::Text)])),
        )
        .unwrap();
    registry
        .register(
            "Summaries",
            TableConfig::new().table("summaries").schema(ids(&[
                ("id", SqlType::BigInt),
                ("article_id", SqlType::BigInt),
                ("text", SqlType::Text),
            ])),
        )
        .unwrap();
    registry
        .register("Revisions", TableConfig::new().table("revisions"))
        .unwrap();
    registry
}

fn int(n: i32) -> Value {
    Value::Int(n)
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

/// Blog rows. Article 4 has no author; article 3 has no comments.
pub fn blog_db() -> MemoryDb {
    MemoryDb::new()
        .table(
            "articles",
            &["id", "author_id", "title", "published"],
            vec![
                vec![int(1), int(1), text("First"), Value::Bool(true)],
                vec![int(2), int(2), text("Second"), Value::Bool(true)],
                vec![int(3), int(1), text("Third"), Value::Bool(false)],
                vec![int(4), Value::Null, text("Orphan"), Value::Bool(true)],
            ],
        )
        .table(
            "users",
            &["id", "name", "country_id"],
            vec![
                vec![int(1), text("Ada"), int(1)],
                vec![int(2), text("Linus"), int(2)],
            ],
        )
        .table(
            "countries",
            &["id", "name"],
            vec![vec![int(1), text("UK")], vec![int(2), text("FI")]],
        )
        .table(
            "comments",
            &["id", "article_id", "user_id", "body"],
            vec![
                vec![int(1), int(1), int(2), text("Nice")],
                vec![int(2), int(1), int(1), text("Thanks")],
                vec![int(3), int(2), int(1), text("Hmm")],
            ],
        )
        .table(
            "tags",
            &["id", "name"],
            vec![vec![int(1), text("rust")], vec![int(2), text("sql")]],
        )
        .table(
            "articles_tags",
            &["article_id", "tag_id"],
            vec![
                vec![int(1), int(1)],
                vec![int(1), int(2)],
                vec![int(2), int(2)],
            ],
        )
        .table(
            "summaries",
            &["id", "article_id", "text"],
            vec![vec![int(1), int(1), text("Intro")]],
        )
        .table(
            "revisions",
            &["id", "article_id", "note"],
            vec![
                vec![int(1), int(1), text("typo")],
                vec![int(2), int(2), text("title")],
                vec![int(3), int(1), text("links")],
            ],
        )
}

/// Collect a query's entities, panicking on error.
pub fn entities(query: &Select, db: &MemoryDb) -> Vec<Record> {
    query
        .all(db)
        .unwrap()
        .into_entities()
        .collect::<Result<Vec<_>>>()
        .unwrap()
}
