use crate::{
    handle::{Fetched, Materialized, Shape, StatementHandle},
    Error, FetchArgument, Result, Value,
};
use std::collections::VecDeque;

/// [`StatementHandle`] over a prepared `rusqlite` statement.
///
/// Executing a statement that yields columns buffers its rows; fetches then
/// drain that buffer front to back.
#[derive(Debug)]
pub struct SqliteStatement<'conn> {
    statement: rusqlite::Statement<'conn>,
    columns: Vec<String>,
    cursor: Option<VecDeque<Vec<Value>>>,
    row_count: usize,
}

impl<'conn> SqliteStatement<'conn> {
    pub fn new(statement: rusqlite::Statement<'conn>) -> Self {
        let columns = statement
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        Self {
            statement,
            columns,
            cursor: None,
            row_count: 0,
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.statement.parameter_count()
    }

    pub fn is_readonly(&self) -> bool {
        self.statement.readonly()
    }

    pub fn inner(&self) -> &rusqlite::Statement<'conn> {
        &self.statement
    }

    fn buffer_rows(&mut self) -> Result<VecDeque<Vec<Value>>> {
        let count = self.columns.len();
        let mut rows = self.statement.raw_query();
        let mut buffered = VecDeque::new();
        while let Some(row) = rows.next()? {
            let values = (0..count)
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            buffered.push_back(values);
        }
        Ok(buffered)
    }
}

impl StatementHandle for SqliteStatement<'_> {
    fn bind(&mut self, position: usize, value: &Value) -> Result<()> {
        if position == 0 {
            return Err(Error::InvalidArgument(
                "parameter positions start at 1".to_string(),
            ));
        }
        self.statement.raw_bind_parameter(position, value)?;
        Ok(())
    }

    fn bind_named(&mut self, name: &str, value: &Value) -> Result<()> {
        let position = self
            .statement
            .parameter_index(name)?
            .ok_or_else(|| Error::InvalidArgument(format!("no parameter named '{name}'")))?;
        self.bind(position, value)
    }

    fn execute(&mut self) -> Result<usize> {
        let buffered = if self.columns.is_empty() {
            self.row_count = self.statement.raw_execute()?;
            VecDeque::new()
        } else {
            let buffered = self.buffer_rows()?;
            self.row_count = buffered.len();
            buffered
        };
        self.cursor = Some(buffered);
        Ok(self.row_count)
    }

    fn fetch(&mut self, arguments: &[FetchArgument]) -> Result<Option<Fetched>> {
        let shape = Shape::resolve(arguments)?;
        let cursor = self.cursor.as_mut().ok_or(Error::NotExecuted)?;
        match cursor.pop_front() {
            Some(row) => shape.row(&self.columns, row).map(Some),
            None => Ok(None),
        }
    }

    fn fetch_all(&mut self, arguments: &[FetchArgument]) -> Result<Materialized> {
        let shape = Shape::resolve(arguments)?;
        let cursor = self.cursor.as_mut().ok_or(Error::NotExecuted)?;
        shape.rows(&self.columns, cursor.drain(..))
    }

    /// Changed rows for writes, produced rows for queries.
    fn row_count(&self) -> usize {
        self.row_count
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn close(&mut self) -> Result<()> {
        self.statement.clear_bindings();
        self.cursor = None;
        self.row_count = 0;
        Ok(())
    }
}
