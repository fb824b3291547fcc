mod support;

use serde_json::json;
use sqlcontain::prelude::*;
use sqlcontain::{NoSchema, SchemaLookup, VecSource};
use std::cell::Cell;
use support::{MemoryDb, blog_db, blog_registry};

#[test]
fn rows_reshape_into_one_record_per_alias() {
    let registry = blog_registry(LoaderConfig::default());
    let db = blog_db();
    let record = registry
        .select("Articles")
        .unwrap()
        .contain("Author")
        .first(&db)
        .unwrap()
        .unwrap();

    assert_eq!(
        record.to_json(),
        json!({
            "Articles": {"id": 1, "author_id": 1, "title": "First", "published": true},
            "Author": {"id": 1, "name": "Ada", "country_id": 1}
        })
    );
}

#[test]
fn stopping_early_reads_one_row() {
    let registry = blog_registry(LoaderConfig::default());
    let db = blog_db();

    let joined = registry.select("Articles").unwrap().contain("Author.Country");
    let mut results = joined.all(&db).unwrap();
    assert!(results.next().unwrap().is_ok());
    assert_eq!(db.fetched("articles"), 1);
    drop(results);

    db.reset_counters();
    let subquery = registry.select("Articles").unwrap().contain("Revisions");
    assert!(subquery.first(&db).unwrap().is_some());
    assert_eq!(db.fetched("articles"), 1);
}

#[test]
fn buffering_reads_everything_up_front() {
    let registry = blog_registry(LoaderConfig::default().buffer_warn_rows(2));
    let db = blog_db();
    let query = registry.select("Articles").unwrap().contain("Comments");

    let _results = query.all(&db).unwrap();
    assert_eq!(db.fetched("articles"), 4);
    assert_eq!(db.fetched("comments"), 0);
}

#[test]
fn peeking_does_not_consume() {
    let registry = blog_registry(LoaderConfig::default());
    let db = blog_db();
    let mut results = registry.select("Articles").unwrap().all(&db).unwrap();

    assert!(results.has_next().unwrap());
    assert!(results.has_next().unwrap());
    assert_eq!(db.fetched("articles"), 1);
    assert_eq!(results.position(), 0);

    let peeked = results.current().unwrap().cloned().unwrap();
    let taken = results.next().unwrap().unwrap();
    assert_eq!(peeked, taken);

    results.advance().unwrap();
    assert_eq!(results.position(), 2);
    let remaining = results.collect_all().unwrap();
    assert_eq!(remaining.len(), 2);
}

#[test]
fn entities_flatten_the_base_alias() {
    let registry = blog_registry(LoaderConfig::default());
    let db = blog_db();
    let entity = registry
        .select("Articles")
        .unwrap()
        .contain("Author")
        .all(&db)
        .unwrap()
        .into_entities()
        .next()
        .unwrap()
        .unwrap();

    assert_eq!(entity.value("title"), Some(&Value::Text("First".into())));
    assert!(entity.record("Author").is_some());
    assert!(!entity.contains_key("Articles"));
}

#[test]
fn cast_failure_names_the_column_and_ends_the_stream() {
    let registry = blog_registry(LoaderConfig::default());
    let db = MemoryDb::new().table(
        "articles",
        &["id", "author_id", "title", "published"],
        vec![
            vec![Value::Int(1), Value::Text("one".into()), Value::Null, Value::Null],
            vec![Value::Int(2), Value::Int(2), Value::Null, Value::Null],
        ],
    );

    let mut results = registry.select("Articles").unwrap().all(&db).unwrap();
    match results.next() {
        Some(Err(Error::Type(e))) => {
            assert_eq!(e.column.as_deref(), Some("Articles.author_id"));
        }
        other => panic!("expected a type error, got {other:?}"),
    }
    assert!(results.next().is_none());
}

struct CountingLookup {
    calls: Cell<usize>,
}

impl SchemaLookup for CountingLookup {
    fn column_type(&self, table_alias: &str, field: &str) -> Option<SqlType> {
        self.calls.set(self.calls.get() + 1);
        match (table_alias, field) {
            ("Users", "id") => Some(SqlType::BigInt),
            ("Users", "active") => Some(SqlType::Boolean),
            _ => None,
        }
    }
}

#[test]
fn column_casts_resolve_once_per_stream() {
    let lookup = CountingLookup {
        calls: Cell::new(0),
    };
    let rows = (1..=5)
        .map(|i| {
            Row::from_pairs([
                ("id", Value::Text(i.to_string())),
                ("active", Value::Int(i % 2)),
                ("Team__name", Value::Text("core".into())),
            ])
        })
        .collect();

    let records = ResultSet::new(Box::new(VecSource::new(rows)), "Users", &lookup)
        .collect_all()
        .unwrap();
    assert_eq!(lookup.calls.get(), 3);

    let last = records[4].record("Users").unwrap();
    assert_eq!(last.value("id"), Some(&Value::BigInt(5)));
    assert_eq!(last.value("active"), Some(&Value::Bool(true)));
    assert_eq!(
        records[4].record("Team").unwrap().value("name"),
        Some(&Value::Text("core".into()))
    );
}

#[test]
fn unknown_schema_passes_values_through() {
    let rows = vec![Row::from_pairs([("id", Value::Text("7".into()))])];
    let record = ResultSet::new(Box::new(VecSource::new(rows)), "Things", NoSchema)
        .first()
        .unwrap()
        .unwrap();
    assert_eq!(
        record.record("Things").unwrap().value("id"),
        Some(&Value::Text("7".into()))
    );
}
