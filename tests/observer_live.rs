//! Live query behaviour
//!
//! Observed queries deliver structured diffs: the first execution primes
//! the result set, later commits touching the query's tables re-run it and
//! notify subscribers exactly when the results changed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use lumadb::{
    col, AggregateFn, Column, ColumnType, Database, DatabaseSchema, ErrorCode, IndexDef,
    MemoryStore, Operand, Predicate, Projection, TableSchema, Value,
};

fn movie_schema() -> DatabaseSchema {
    DatabaseSchema::new(
        "media",
        1,
        vec![TableSchema::new(
            "movie",
            vec![
                Column::new("id", ColumnType::Integer),
                Column::new("title", ColumnType::Text),
                Column::new("year", ColumnType::Integer),
            ],
        )
        .with_primary_key(vec!["id"])
        .with_index(IndexDef::on("idx_year", "year"))],
    )
}

fn open_db() -> Database {
    Database::open(movie_schema(), Box::new(MemoryStore::new()), None).unwrap()
}

fn movie(id: i64, title: &str, year: i64) -> HashMap<String, Value> {
    let mut payload = HashMap::new();
    payload.insert("id".to_string(), Value::Integer(id));
    payload.insert("title".to_string(), Value::Text(title.into()));
    payload.insert("year".to_string(), Value::Integer(year));
    payload
}

fn count_between_template(db: &mut Database) -> lumadb::QueryContext {
    db.select(vec![Projection::Aggregate(
        AggregateFn::Count,
        Some(col("movie", "id")),
    )])
    .from("movie")
    .where_(Predicate::between(
        col("movie", "year"),
        Operand::Slot(0),
        Operand::Slot(1),
    ))
    .into_context()
    .unwrap()
}

fn observed_count(event: &lumadb::ChangeEvent) -> i64 {
    match event.current[0].get("count(movie.id)") {
        Some(Value::Integer(n)) => *n,
        other => panic!("expected integer count, got {:?}", other),
    }
}

#[test]
fn test_bound_count_query_notifies_on_relevant_insert_only() {
    let mut db = open_db();
    db.insert()
        .into("movie")
        .values(vec![movie(1, "a", 1993), movie(2, "b", 1970)])
        .exec()
        .unwrap();

    let template = count_between_template(&mut db);
    let counts: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = counts.clone();
    db.observe(
        &template,
        Box::new(move |event| sink.lock().unwrap().push(observed_count(event))),
    )
    .unwrap();

    // First execution primes the observer with N = 1
    let rows = db
        .select(vec![Projection::Aggregate(
            AggregateFn::Count,
            Some(col("movie", "id")),
        )])
        .from("movie")
        .where_(Predicate::between(
            col("movie", "year"),
            Operand::Slot(0),
            Operand::Slot(1),
        ))
        .bind(&[Value::Integer(1992), Value::Integer(2003)])
        .unwrap()
        .exec()
        .unwrap();
    assert_eq!(
        rows[0].get("count(movie.id)"),
        Some(&Value::Integer(1))
    );
    assert_eq!(counts.lock().unwrap().as_slice(), &[1]);

    // A movie inside the window: notified with N + 1
    db.insert()
        .into("movie")
        .values(vec![movie(3, "c", 1995)])
        .exec()
        .unwrap();
    assert_eq!(counts.lock().unwrap().as_slice(), &[1, 2]);

    // A movie outside the window changes nothing: no notification
    db.insert()
        .into("movie")
        .values(vec![movie(4, "d", 1980)])
        .exec()
        .unwrap();
    assert_eq!(counts.lock().unwrap().as_slice(), &[1, 2]);
}

#[test]
fn test_diff_reports_added_removed_modified() {
    let mut db = open_db();
    db.insert()
        .into("movie")
        .values(vec![movie(1, "a", 1995), movie(2, "b", 1999)])
        .exec()
        .unwrap();

    let template = db
        .select(vec![])
        .from("movie")
        .where_(Predicate::gte(
            col("movie", "year"),
            Operand::Literal(Value::Integer(1990)),
        ))
        .into_context()
        .unwrap();

    let events: Arc<Mutex<Vec<(usize, usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    db.observe(
        &template,
        Box::new(move |event| {
            sink.lock().unwrap().push((
                event.added.len(),
                event.removed.len(),
                event.modified.len(),
            ))
        }),
    )
    .unwrap();

    // Prime: both rows arrive as additions
    db.select(vec![])
        .from("movie")
        .where_(Predicate::gte(
            col("movie", "year"),
            Operand::Literal(Value::Integer(1990)),
        ))
        .exec()
        .unwrap();
    assert_eq!(events.lock().unwrap().last(), Some(&(2, 0, 0)));

    // An update inside the result set is a modification
    db.update("movie")
        .set("title", Value::Text("a2".into()))
        .where_(Predicate::eq(
            col("movie", "id"),
            Operand::Literal(Value::Integer(1)),
        ))
        .exec()
        .unwrap();
    assert_eq!(events.lock().unwrap().last(), Some(&(0, 0, 1)));

    // A delete is a removal
    db.delete()
        .from("movie")
        .where_(Predicate::eq(
            col("movie", "id"),
            Operand::Literal(Value::Integer(2)),
        ))
        .exec()
        .unwrap();
    assert_eq!(events.lock().unwrap().last(), Some(&(0, 1, 0)));
}

#[test]
fn test_unobserve_stops_notifications() {
    let mut db = open_db();
    let template = db
        .select(vec![])
        .from("movie")
        .into_context()
        .unwrap();

    let hits: Arc<Mutex<usize>> = Arc::new(Mutex::new(0));
    let sink = hits.clone();
    let id = db
        .observe(&template, Box::new(move |_| *sink.lock().unwrap() += 1))
        .unwrap();

    db.select(vec![]).from("movie").exec().unwrap();
    // Priming an empty result set produces no change event
    assert_eq!(*hits.lock().unwrap(), 0);

    db.insert()
        .into("movie")
        .values(vec![movie(1, "a", 1990)])
        .exec()
        .unwrap();
    assert_eq!(*hits.lock().unwrap(), 1);

    assert!(db.unobserve(&template, &id));
    db.insert()
        .into("movie")
        .values(vec![movie(2, "b", 1991)])
        .exec()
        .unwrap();
    assert_eq!(*hits.lock().unwrap(), 1);
}

#[test]
fn test_commit_on_unrelated_table_does_not_requery() {
    let schema = DatabaseSchema::new(
        "db",
        1,
        vec![
            TableSchema::new(
                "movie",
                vec![
                    Column::new("id", ColumnType::Integer),
                    Column::new("title", ColumnType::Text),
                    Column::new("year", ColumnType::Integer),
                ],
            )
            .with_primary_key(vec!["id"]),
            TableSchema::new(
                "genre",
                vec![Column::new("id", ColumnType::Integer)],
            )
            .with_primary_key(vec!["id"]),
        ],
    );
    let mut db = Database::open(schema, Box::new(MemoryStore::new()), None).unwrap();

    let template = db.select(vec![]).from("movie").into_context().unwrap();
    let hits: Arc<Mutex<usize>> = Arc::new(Mutex::new(0));
    let sink = hits.clone();
    db.observe(&template, Box::new(move |_| *sink.lock().unwrap() += 1))
        .unwrap();
    db.select(vec![]).from("movie").exec().unwrap();

    let mut payload = HashMap::new();
    payload.insert("id".to_string(), Value::Integer(1));
    db.insert().into("genre").values(vec![payload]).exec().unwrap();

    assert_eq!(*hits.lock().unwrap(), 0);
}

#[test]
fn test_observe_rejects_writes() {
    let mut db = open_db();
    let ctx = db
        .insert()
        .into("movie")
        .values(vec![movie(1, "a", 1990)])
        .into_context()
        .unwrap();
    let err = db.observe(&ctx, Box::new(|_| {})).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Syntax);
}
