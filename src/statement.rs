use crate::{
    handle::{Fetched, Materialized, StatementHandle},
    Error, FetchMode, Params, Result, Value,
};
use std::{collections::HashMap, fmt, sync::Arc};

/// A named statement operation supplied by the caller.
pub type Macro<H> = fn(&mut Statement<H>, &[Value]) -> Result<Outcome>;

/// Operations [`Statement::call`] always resolves natively.
pub const NATIVE_OPERATIONS: &[&str] = &[
    "fetch",
    "fetch_all",
    "bind",
    "execute",
    "row_count",
    "column_count",
    "close",
];

/// Result of a dynamically dispatched [`Statement::call`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Unit,
    Count(usize),
    Value(Value),
    Row(Option<Fetched>),
    Rows(Materialized),
}

/// Registry of named operations consulted by [`Statement::call`].
///
/// Names shadowed by a native operation are accepted but never invoked.
pub struct Macros<H> {
    entries: HashMap<String, Macro<H>>,
}

impl<H> Macros<H> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register(mut self, name: impl Into<String>, operation: Macro<H>) -> Self {
        let name = name.into();
        if NATIVE_OPERATIONS.contains(&name.as_str()) {
            log::warn!("Macro '{}' is shadowed by a native statement operation", name);
        }
        self.entries.insert(name, operation);
        self
    }

    pub fn get(&self, name: &str) -> Option<Macro<H>> {
        self.entries.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

impl<H> Default for Macros<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> fmt::Debug for Macros<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// Executes a prepared statement and shapes its rows through [`FetchMode`]s.
///
/// Everything other than fetching is forwarded to the wrapped handle, whose
/// results and errors are returned unchanged.
#[derive(Debug)]
pub struct Statement<H> {
    statement: H,
    macros: Option<Arc<Macros<H>>>,
}

impl<H: StatementHandle> Statement<H> {
    pub fn new(statement: H) -> Self {
        Self {
            statement,
            macros: None,
        }
    }

    pub fn with_macros(mut self, macros: Arc<Macros<H>>) -> Self {
        self.macros = Some(macros);
        self
    }

    pub fn statement(&self) -> &H {
        &self.statement
    }

    pub fn statement_mut(&mut self) -> &mut H {
        &mut self.statement
    }

    pub fn into_inner(self) -> H {
        self.statement
    }

    pub fn fetch(&mut self, mode: &FetchMode) -> Result<Option<Fetched>> {
        self.statement.fetch(mode.arguments())
    }

    pub fn fetch_all(&mut self, mode: &FetchMode) -> Result<Materialized> {
        self.statement.fetch_all(mode.arguments())
    }

    /// Bind one value at a 1-based position.
    pub fn bind(&mut self, position: usize, value: impl Into<Value>) -> Result<&mut Self> {
        self.statement.bind(position, &value.into())?;
        Ok(self)
    }

    /// Bind values to consecutive positions starting at 1.
    pub fn bind_values<I>(&mut self, values: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        for (i, value) in values.into_iter().enumerate() {
            self.statement.bind(i + 1, &value.into())?;
        }
        Ok(self)
    }

    pub fn bind_params(&mut self, params: &Params) -> Result<&mut Self> {
        for (name, value) in params.iter() {
            self.statement.bind_named(name, value)?;
        }
        Ok(self)
    }

    pub fn execute(&mut self) -> Result<usize> {
        self.statement.execute()
    }

    pub fn row_count(&self) -> usize {
        self.statement.row_count()
    }

    pub fn column_count(&self) -> usize {
        self.statement.column_count()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.statement.column_names()
    }

    pub fn close(&mut self) -> Result<()> {
        self.statement.close()
    }

    pub fn has_macro(&self, name: &str) -> bool {
        self.macros.as_ref().is_some_and(|m| m.contains(name))
    }

    /// Invoke an operation by name.
    ///
    /// Native operations win over registered macros. `fetch` and `fetch_all`
    /// use the default mode; `execute` binds `args` positionally first.
    pub fn call(&mut self, name: &str, args: &[Value]) -> Result<Outcome> {
        match name {
            "fetch" => return Ok(Outcome::Row(self.fetch(&FetchMode::default())?)),
            "fetch_all" => return Ok(Outcome::Rows(self.fetch_all(&FetchMode::default())?)),
            "bind" => {
                let [Value::Integer(position), value] = args else {
                    return Err(Error::InvalidArgument(
                        "bind expects a position and a value".to_string(),
                    ));
                };
                let position = usize::try_from(*position)
                    .map_err(|_| Error::InvalidArgument(format!("invalid position {position}")))?;
                self.statement.bind(position, value)?;
                return Ok(Outcome::Unit);
            }
            "execute" => {
                self.bind_values(args.iter().cloned())?;
                return Ok(Outcome::Count(self.execute()?));
            }
            "row_count" => return Ok(Outcome::Count(self.row_count())),
            "column_count" => return Ok(Outcome::Count(self.column_count())),
            "close" => {
                self.close()?;
                return Ok(Outcome::Unit);
            }
            _ => {}
        }
        match self.macros.as_ref().and_then(|m| m.get(name)) {
            Some(operation) => {
                log::trace!("Calling statement macro '{}'", name);
                operation(self, args)
            }
            None => Err(Error::UnknownOperation(name.to_string())),
        }
    }
}
