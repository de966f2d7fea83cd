use anyhow::Result;
use sqlite_statement::{
    Connection, ConnectionConfig, Error, FetchMode, Fetched, KeyedMap, Macros,
    Materialized, Outcome, Params, Record, SqliteStatement, Statement, StatementHandle, Value,
};
use std::{sync::Arc, time::Duration};
use tempfile::NamedTempFile;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// Helper function to create an in-memory database for testing
fn create_test_db() -> Result<Connection> {
    init_logging();
    let conn = Connection::open_in_memory()?;
    initialize_schema(&conn)?;
    Ok(conn)
}

// Helper function to create a temporary file-based database
fn create_temp_db() -> Result<(Connection, NamedTempFile)> {
    init_logging();
    let temp_file = NamedTempFile::new()?;
    let path = temp_file.path().to_string_lossy().into_owned();
    let conn = Connection::open(ConnectionConfig::new(path))?;
    initialize_schema(&conn)?;
    Ok((conn, temp_file))
}

fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT UNIQUE NOT NULL,
            age INTEGER
        );
        INSERT INTO users (name, email, age) VALUES
            ('John Doe', 'john@example.com', 30),
            ('Jane Doe', 'jane@example.com', 30),
            ('Max Roe', 'max@example.com', NULL);
        "#,
    )?;
    Ok(())
}

fn executed<'c>(conn: &'c Connection, sql: &str) -> Result<Statement<SqliteStatement<'c>>> {
    let mut stmt = conn.prepare(sql)?;
    stmt.execute()?;
    Ok(stmt)
}

fn count_rows(
    stmt: &mut Statement<SqliteStatement<'_>>,
    _: &[Value],
) -> sqlite_statement::Result<Outcome> {
    let rows = stmt.fetch_all(&FetchMode::default())?;
    Ok(Outcome::Count(rows.len()))
}

fn always_fails(
    _: &mut Statement<SqliteStatement<'_>>,
    _: &[Value],
) -> sqlite_statement::Result<Outcome> {
    Err(Error::InvalidArgument("registered under a native name".to_string()))
}

#[test]
fn test_fetch_column_and_value_alias() -> Result<()> {
    let conn = create_test_db()?;
    let mut stmt = executed(&conn, "SELECT name, email FROM users ORDER BY id")?;
    assert_eq!(
        stmt.fetch(&FetchMode::column())?,
        Some(Fetched::Value(Value::from("John Doe")))
    );
    assert_eq!(
        stmt.fetch(&FetchMode::value())?,
        Some(Fetched::Value(Value::from("Jane Doe")))
    );
    assert_eq!(
        stmt.fetch_all(&FetchMode::column_at(1))?,
        Materialized::Values(vec![Value::from("max@example.com")])
    );
    assert_eq!(stmt.fetch(&FetchMode::column())?, None);
    Ok(())
}

#[test]
fn test_fetch_all_key_value_overwrites_duplicates() -> Result<()> {
    let conn = create_test_db()?;
    let mut stmt = executed(&conn, "SELECT age, name FROM users ORDER BY id")?;
    let pairs = stmt.fetch_all(&FetchMode::key_value())?;
    let expected: KeyedMap<Value> = [
        (Value::Integer(30), Value::from("Jane Doe")),
        (Value::Null, Value::from("Max Roe")),
    ]
    .into_iter()
    .collect();
    assert_eq!(pairs, Materialized::Pairs(expected));
    Ok(())
}

#[test]
fn test_fetch_all_keyed_by_first_column() -> Result<()> {
    let conn = create_test_db()?;
    let mut stmt = executed(&conn, "SELECT id, name, age FROM users ORDER BY id")?;
    let keyed = stmt
        .fetch_all(&FetchMode::keyed_by_first_column())?
        .into_keyed()
        .unwrap();
    assert_eq!(keyed.len(), 3);
    let expected: Record = [("name", Value::from("Max Roe")), ("age", Value::Null)]
        .into_iter()
        .collect();
    assert_eq!(keyed.get(&Value::Integer(3)), Some(&expected));
    assert_eq!(
        keyed.keys().cloned().collect::<Vec<_>>(),
        [Value::Integer(1), Value::Integer(2), Value::Integer(3)]
    );
    Ok(())
}

#[test]
fn test_fetch_records_and_lists() -> Result<()> {
    let conn = create_test_db()?;
    let mut stmt = executed(&conn, "SELECT id, name FROM users ORDER BY id")?;
    let record = stmt
        .fetch(&FetchMode::associative())?
        .and_then(Fetched::into_record)
        .unwrap();
    assert_eq!(record.get("name"), Some(&Value::from("John Doe")));
    assert_eq!(
        stmt.fetch(&FetchMode::list())?,
        Some(Fetched::List(vec![Value::Integer(2), Value::from("Jane Doe")]))
    );
    let rest = stmt.fetch_all(&FetchMode::default())?.into_records().unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].get("id"), Some(&Value::Integer(3)));
    Ok(())
}

#[test]
fn test_fetch_all_lists() -> Result<()> {
    let conn = create_test_db()?;
    let mut stmt = executed(&conn, "SELECT name, age FROM users ORDER BY id DESC")?;
    let lists = stmt.fetch_all(&FetchMode::list())?.into_lists().unwrap();
    assert_eq!(
        lists,
        [
            vec![Value::from("Max Roe"), Value::Null],
            vec![Value::from("Jane Doe"), Value::Integer(30)],
            vec![Value::from("John Doe"), Value::Integer(30)],
        ]
    );
    assert_eq!(stmt.fetch_all(&FetchMode::column())?.into_lists(), None);
    Ok(())
}

#[test]
fn test_key_value_on_single_column_fails_at_use() -> Result<()> {
    let conn = create_test_db()?;
    let mut stmt = executed(&conn, "SELECT name FROM users")?;
    assert!(matches!(
        stmt.fetch_all(&FetchMode::key_value()),
        Err(Error::ColumnOutOfRange { index: 1, count: 1 })
    ));
    Ok(())
}

#[test]
fn test_forwarded_operations() -> Result<()> {
    let conn = create_test_db()?;
    let mut stmt = conn.prepare("UPDATE users SET age = ?1 WHERE age = :old")?;
    stmt.bind(1, 31)?
        .bind_params(&Params::new().with_value("old", 30))?;
    assert_eq!(stmt.execute()?, 2);
    assert_eq!(stmt.row_count(), stmt.statement().row_count());
    assert_eq!(stmt.column_count(), 0);
    stmt.close()?;

    let mut stmt = conn.prepare("SELECT id, email FROM users WHERE age = ?")?;
    stmt.bind_values([31])?.execute()?;
    assert_eq!(stmt.row_count(), 2);
    assert_eq!(stmt.column_names(), ["id", "email"]);
    assert!(stmt.statement().is_readonly());
    assert_eq!(stmt.statement().parameter_count(), 1);
    Ok(())
}

#[test]
fn test_driver_errors_pass_through() -> Result<()> {
    let conn = create_test_db()?;
    let mut stmt = conn.prepare("INSERT INTO users (name, email) VALUES (?, ?)")?;
    stmt.bind_values(["Copy", "john@example.com"])?;
    let err = stmt.execute().unwrap_err();
    match err {
        Error::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
            assert_eq!(e.code, rusqlite::ErrorCode::ConstraintViolation)
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(matches!(
        conn.prepare("SELEC nothing"),
        Err(Error::Sqlite(_))
    ));
    Ok(())
}

#[test]
fn test_macros_with_sqlite_statement() -> Result<()> {
    let conn = create_test_db()?;
    let macros = Arc::new(
        Macros::new()
            .register("count_rows", count_rows)
            .register("row_count", always_fails),
    );
    let mut stmt = conn
        .prepare("SELECT id FROM users WHERE age IS NOT NULL")?
        .with_macros(macros);
    assert_eq!(stmt.call("execute", &[])?, Outcome::Count(2));
    assert_eq!(stmt.call("row_count", &[])?, Outcome::Count(2));
    assert_eq!(stmt.call("count_rows", &[])?, Outcome::Count(2));
    assert_eq!(stmt.call("fetch", &[])?, Outcome::Row(None));
    Ok(())
}

#[test]
fn test_file_database_persists() -> Result<()> {
    let (conn, temp_file) = create_temp_db()?;
    conn.statement(
        "INSERT INTO users (name, email, age) VALUES (?, ?, ?)",
        &["Ann Poe".into(), "ann@example.com".into(), 41.into()],
    )?;
    drop(conn);

    let path = temp_file.path().to_string_lossy().into_owned();
    let conn = Connection::open(ConnectionConfig::new(path))?;
    assert_eq!(
        conn.scalar("SELECT COUNT(*) FROM users", &[])?,
        Some(Value::Integer(4))
    );
    assert_eq!(
        conn.scalar("SELECT age FROM users WHERE email = ?", &["ann@example.com".into()])?,
        Some(Value::Integer(41))
    );
    Ok(())
}

#[test]
fn test_connection_config_applies_pragmas() -> Result<()> {
    init_logging();
    let temp_file = NamedTempFile::new()?;
    let path = temp_file.path().to_string_lossy().into_owned();
    let conn = Connection::open(
        ConnectionConfig::new(path)
            .with_busy_timeout(Duration::from_millis(1500))
            .with_foreign_keys(true),
    )?;
    assert_eq!(
        conn.scalar("PRAGMA busy_timeout", &[])?,
        Some(Value::Integer(1500))
    );
    assert_eq!(
        conn.scalar("PRAGMA foreign_keys", &[])?,
        Some(Value::Integer(1))
    );
    assert!(conn.raw().is_autocommit());
    Ok(())
}
