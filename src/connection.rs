use crate::{
    handle::{KeyedMap, Materialized},
    query::{quote_identifier, Query},
    sqlite::SqliteStatement,
    Error, FetchMode, Record, Result, Statement, Value,
};
use serde::{Deserialize, Serialize};
use std::{
    cell::{Cell, RefCell},
    time::{Duration, Instant},
};

/// Connection configuration
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Path to the SQLite database file, in-memory when absent
    #[serde(default)]
    pub db_path: Option<String>,
    /// Record every executed statement in the query log
    #[serde(default)]
    pub log_queries: bool,
    #[serde(default)]
    pub foreign_keys: bool,
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
}

impl ConnectionConfig {
    /// Create a config for a database file
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: Some(db_path.into()),
            ..Default::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_query_log(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }
}

/// One executed statement, as kept by the query log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub query: String,
    pub bindings: Vec<Value>,
    pub time: Duration,
}

/// One page of records returned by [`Connection::paginate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub items: Vec<Record>,
    /// Rows in the whole result, not just this page
    pub total: usize,
    pub per_page: usize,
    pub current_page: usize,
}

impl Page {
    pub fn last_page(&self) -> usize {
        self.total.div_ceil(self.per_page).max(1)
    }
}

/// SQLite connection handing out [`Statement`]s and common result helpers.
///
/// Not meant to be shared across threads; the query log uses interior
/// mutability without locking.
#[derive(Debug)]
pub struct Connection {
    connection: rusqlite::Connection,
    logging_queries: Cell<bool>,
    query_log: RefCell<Vec<QueryLogEntry>>,
}

impl Connection {
    pub fn open(config: ConnectionConfig) -> Result<Self> {
        let connection = match &config.db_path {
            Some(path) => {
                log::debug!("Opening sqlite database at path: {}", path);
                rusqlite::Connection::open(path)?
            }
            None => {
                log::debug!("Opening in-memory sqlite database");
                rusqlite::Connection::open_in_memory()?
            }
        };
        if config.foreign_keys {
            connection.pragma_update(None, "foreign_keys", true)?;
        }
        if let Some(ms) = config.busy_timeout_ms {
            connection.busy_timeout(Duration::from_millis(ms))?;
        }
        Ok(Self {
            connection,
            logging_queries: Cell::new(config.log_queries),
            query_log: RefCell::new(Vec::new()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(ConnectionConfig::in_memory())
    }

    /// The underlying rusqlite connection.
    pub fn raw(&self) -> &rusqlite::Connection {
        &self.connection
    }

    /// Run several `;`-separated statements without bindings or logging.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.connection.execute_batch(sql).map_err(|e| {
            log::error!("Batch failed: {}", e);
            Error::from(e)
        })
    }

    pub fn prepare(&self, sql: &str) -> Result<Statement<SqliteStatement<'_>>> {
        log::debug!("Preparing: {}", sql);
        let statement = self.connection.prepare(sql).map_err(|e| {
            log::error!("Cannot prepare query:\n{}\n{}", sql, e);
            Error::from(e)
        })?;
        Ok(Statement::new(SqliteStatement::new(statement)))
    }

    /// Prepare, bind and execute `sql`, then hand the statement to `consume`.
    pub fn run<T, F>(&self, sql: &str, bindings: &[Value], consume: F) -> Result<T>
    where
        F: FnOnce(&mut Statement<SqliteStatement<'_>>) -> Result<T>,
    {
        let start = Instant::now();
        let mut statement = self.prepare(sql)?;
        let executed = statement
            .bind_values(bindings.iter().cloned())
            .and_then(|s| s.execute());
        if let Err(e) = executed {
            log::error!("Query failed:\n{}\n{}", sql, e);
            return Err(e);
        }
        let result = consume(&mut statement)?;
        self.log_query(sql, bindings, start.elapsed());
        Ok(result)
    }

    /// Execute a statement, discarding any rows.
    pub fn statement(&self, sql: &str, bindings: &[Value]) -> Result<()> {
        self.run(sql, bindings, |_| Ok(()))
    }

    /// Execute a statement, returning the number of changed rows.
    pub fn affecting_statement(&self, sql: &str, bindings: &[Value]) -> Result<usize> {
        self.run(sql, bindings, |s| Ok(s.row_count()))
    }

    pub fn select(&self, sql: &str, bindings: &[Value], mode: &FetchMode) -> Result<Materialized> {
        self.run(sql, bindings, |s| s.fetch_all(mode))
    }

    /// First row of the result, if any.
    pub fn select_one(&self, sql: &str, bindings: &[Value]) -> Result<Option<Record>> {
        self.run(sql, bindings, |s| {
            Ok(s.fetch(&FetchMode::associative())?
                .and_then(|row| row.into_record()))
        })
    }

    /// First column of the first row, if any.
    pub fn scalar(&self, sql: &str, bindings: &[Value]) -> Result<Option<Value>> {
        self.run(sql, bindings, |s| {
            Ok(s.fetch(&FetchMode::column())?.and_then(|row| row.into_value()))
        })
    }

    /// First column of every row.
    pub fn pluck(&self, sql: &str, bindings: &[Value]) -> Result<Vec<Value>> {
        self.select(sql, bindings, &FetchMode::column())
            .map(|rows| rows.into_values().unwrap_or_default())
    }

    /// Second column of every row keyed by the first. A repeated key keeps
    /// its first position and takes the last row's value.
    pub fn pluck_keyed(&self, sql: &str, bindings: &[Value]) -> Result<KeyedMap<Value>> {
        self.select(sql, bindings, &FetchMode::key_value())
            .map(|rows| rows.into_pairs().unwrap_or_default())
    }

    /// The only row of the result.
    pub fn sole(&self, sql: &str, bindings: &[Value]) -> Result<Record> {
        let mut records = self
            .select(sql, bindings, &FetchMode::associative())?
            .into_records()
            .unwrap_or_default();
        match records.len() {
            0 => Err(Error::RecordsNotFound),
            1 => Ok(records.remove(0)),
            count => Err(Error::MultipleRecordsFound(count)),
        }
    }

    /// Add each increment to its column and assign each `extra` column, on
    /// every row matching `query`, in a single `UPDATE`.
    ///
    /// A column present in both lists is assigned its `extra` value.
    /// Every increment must be a finite number, even one overridden by
    /// `extra`; numeric text is accepted.
    pub fn increment_each(
        &self,
        table: &str,
        increments: &[(&str, Value)],
        extra: &[(&str, Value)],
        query: &Query,
    ) -> Result<usize> {
        let amounts = increments
            .iter()
            .map(|(column, amount)| numeric(column, amount).map(|number| (*column, number)))
            .collect::<Result<Vec<_>>>()?;
        let mut assignments = Vec::new();
        let mut bindings = Vec::new();
        for (column, amount) in amounts {
            if extra.iter().any(|(c, _)| *c == column) {
                continue;
            }
            let quoted = quote_identifier(column);
            assignments.push(format!("{quoted} = {quoted} + ?"));
            bindings.push(amount);
        }
        for (column, value) in extra {
            assignments.push(format!("{} = ?", quote_identifier(column)));
            bindings.push(value.clone());
        }
        if assignments.is_empty() {
            return Err(Error::InvalidArgument(
                "increment_each needs at least one column".to_string(),
            ));
        }
        let (filter, filter_bindings) = query.compile();
        bindings.extend(filter_bindings);
        let sql = format!(
            "UPDATE {} SET {}{}",
            quote_identifier(table),
            assignments.join(", "),
            filter
        );
        self.affecting_statement(&sql, &bindings)
    }

    /// One page of `sql` as records, with the total row count of the whole
    /// result. Pages start at 1.
    pub fn paginate(
        &self,
        sql: &str,
        bindings: &[Value],
        per_page: usize,
        page: usize,
    ) -> Result<Page> {
        if per_page == 0 || page == 0 {
            return Err(Error::InvalidArgument(format!(
                "Cannot paginate page {} with {} per page",
                page, per_page
            )));
        }
        let total = self
            .scalar(&format!("SELECT COUNT(*) FROM ({sql})"), bindings)?
            .and_then(|count| count.as_i64())
            .unwrap_or(0) as usize;
        let items = if total == 0 {
            Vec::new()
        } else {
            self.page_of(sql, bindings, per_page, page)?
        };
        Ok(Page {
            items,
            total,
            per_page,
            current_page: page,
        })
    }

    /// Map every row of `sql` through `f`, reading `size` rows per query.
    ///
    /// Stops after the first chunk shorter than `size`, so a result that
    /// divides evenly costs one extra empty query. `sql` must not carry its
    /// own `LIMIT`.
    pub fn chunk_map<T, F>(
        &self,
        sql: &str,
        bindings: &[Value],
        size: usize,
        mut f: F,
    ) -> Result<Vec<T>>
    where
        F: FnMut(Record) -> T,
    {
        if size == 0 {
            return Err(Error::InvalidArgument(
                "chunk size must be at least 1".to_string(),
            ));
        }
        let mut mapped = Vec::new();
        for page in 1.. {
            let records = self.page_of(sql, bindings, size, page)?;
            let count = records.len();
            log::trace!("Chunk {} of {} rows", page, count);
            mapped.extend(records.into_iter().map(&mut f));
            if count < size {
                break;
            }
        }
        Ok(mapped)
    }

    fn page_of(
        &self,
        sql: &str,
        bindings: &[Value],
        size: usize,
        page: usize,
    ) -> Result<Vec<Record>> {
        let mut bindings = bindings.to_vec();
        bindings.push(Value::Integer(size as i64));
        bindings.push(Value::Integer(((page - 1) * size) as i64));
        self.select(
            &format!("{sql} LIMIT ? OFFSET ?"),
            &bindings,
            &FetchMode::associative(),
        )
        .map(|rows| rows.into_records().unwrap_or_default())
    }

    pub fn enable_query_log(&self) {
        self.logging_queries.set(true);
    }

    pub fn disable_query_log(&self) {
        self.logging_queries.set(false);
    }

    pub fn logging_queries(&self) -> bool {
        self.logging_queries.get()
    }

    pub fn query_log(&self) -> Vec<QueryLogEntry> {
        self.query_log.borrow().clone()
    }

    pub fn flush_query_log(&self) {
        self.query_log.borrow_mut().clear();
    }

    fn log_query(&self, sql: &str, bindings: &[Value], time: Duration) {
        log::debug!("Executed in {:?}: {}", time, sql);
        if self.logging_queries.get() {
            self.query_log.borrow_mut().push(QueryLogEntry {
                query: sql.to_string(),
                bindings: bindings.to_vec(),
                time,
            });
        }
    }
}

fn numeric(column: &str, amount: &Value) -> Result<Value> {
    let number = match amount {
        Value::Integer(_) | Value::Real(_) => amount.clone(),
        Value::Text(text) => match (text.trim().parse::<i64>(), text.trim().parse::<f64>()) {
            (Ok(v), _) => Value::Integer(v),
            (_, Ok(v)) => Value::Real(v),
            _ => return Err(non_numeric(column, amount)),
        },
        _ => return Err(non_numeric(column, amount)),
    };
    // f64 parsing also accepts "NaN" and "inf"
    match number.as_f64() {
        Some(v) if v.is_finite() => Ok(number),
        _ => Err(non_numeric(column, amount)),
    }
}

fn non_numeric(column: &str, amount: &Value) -> Error {
    Error::InvalidArgument(format!(
        "Non-numeric {} value {} passed to increment column '{}'",
        amount.type_name(),
        amount,
        column
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_accepts_numeric_text() {
        assert_eq!(numeric("c", &Value::from("-32.5")).unwrap(), Value::Real(-32.5));
        assert_eq!(numeric("c", &Value::from(" 7 ")).unwrap(), Value::Integer(7));
        assert_eq!(numeric("c", &Value::Integer(3)).unwrap(), Value::Integer(3));
        assert!(matches!(
            numeric("c", &Value::from("abc")),
            Err(Error::InvalidArgument(_))
        ));
        assert!(numeric("c", &Value::Null).is_err());
    }

    #[test]
    fn numeric_rejects_non_finite() {
        for amount in [
            Value::from("NaN"),
            Value::from("inf"),
            Value::from("-infinity"),
            Value::Real(f64::NAN),
            Value::Real(f64::INFINITY),
        ] {
            assert!(
                matches!(numeric("c", &amount), Err(Error::InvalidArgument(_))),
                "{amount:?} accepted"
            );
        }
        let Err(Error::InvalidArgument(message)) = numeric("votes", &Value::Blob(vec![1])) else {
            panic!("blob accepted");
        };
        assert_eq!(
            message,
            "Non-numeric blob value X'01' passed to increment column 'votes'"
        );
    }

    #[test]
    fn page_counts_last_page() {
        let page = Page {
            items: Vec::new(),
            total: 11,
            per_page: 5,
            current_page: 1,
        };
        assert_eq!(page.last_page(), 3);
        assert_eq!(Page { total: 0, ..page }.last_page(), 1);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{"db_path": "app.db", "log_queries": true}"#).unwrap();
        assert_eq!(
            config,
            ConnectionConfig::new("app.db").with_query_log(true)
        );
        let config: ConnectionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ConnectionConfig::in_memory());
    }
}
