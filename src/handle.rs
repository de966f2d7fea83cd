//! The boundary between [`Statement`](crate::Statement) and the driver's
//! prepared statement, and the result shapes that cross it.

use crate::{Error, FetchArgument, FetchFlags, FetchMode, Record, Result, Value};
use std::collections::HashMap;

/// Capabilities a prepared-statement handle exposes to [`Statement`](crate::Statement).
///
/// Positions are 1-based, as in SQL placeholders. Fetch arguments come
/// straight from a [`FetchMode`]; implementations decide which
/// combinations they support, usually through [`Shape::resolve`].
pub trait StatementHandle {
    fn bind(&mut self, position: usize, value: &Value) -> Result<()>;
    fn bind_named(&mut self, name: &str, value: &Value) -> Result<()>;
    /// Run the statement, returning the number of affected rows.
    fn execute(&mut self) -> Result<usize>;
    /// Next row of the cursor, `None` once exhausted.
    fn fetch(&mut self, arguments: &[FetchArgument]) -> Result<Option<Fetched>>;
    /// Every remaining row of the cursor.
    fn fetch_all(&mut self, arguments: &[FetchArgument]) -> Result<Materialized>;
    fn row_count(&self) -> usize;
    fn column_count(&self) -> usize;
    fn column_names(&self) -> Vec<String>;
    fn close(&mut self) -> Result<()>;
}

/// A single row shaped by a fetch mode.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Value(Value),
    Pair(Value, Value),
    Keyed(Value, Record),
    Record(Record),
    List(Vec<Value>),
}

impl Fetched {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Fetched::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            Fetched::Record(v) => Some(v),
            _ => None,
        }
    }
}

/// All remaining rows shaped by a fetch mode.
#[derive(Debug, Clone, PartialEq)]
pub enum Materialized {
    Values(Vec<Value>),
    Records(Vec<Record>),
    Lists(Vec<Vec<Value>>),
    Pairs(KeyedMap<Value>),
    Keyed(KeyedMap<Record>),
}

impl Materialized {
    pub fn len(&self) -> usize {
        match self {
            Materialized::Values(v) => v.len(),
            Materialized::Records(v) => v.len(),
            Materialized::Lists(v) => v.len(),
            Materialized::Pairs(v) => v.len(),
            Materialized::Keyed(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_values(self) -> Option<Vec<Value>> {
        match self {
            Materialized::Values(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_records(self) -> Option<Vec<Record>> {
        match self {
            Materialized::Records(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_lists(self) -> Option<Vec<Vec<Value>>> {
        match self {
            Materialized::Lists(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_pairs(self) -> Option<KeyedMap<Value>> {
        match self {
            Materialized::Pairs(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_keyed(self) -> Option<KeyedMap<Record>> {
        match self {
            Materialized::Keyed(v) => Some(v),
            _ => None,
        }
    }
}

/// Insertion-ordered map keyed by [`Value`].
///
/// Inserting an existing key replaces its value but keeps the position the
/// key was first seen at.
#[derive(Debug, Clone)]
pub struct KeyedMap<V> {
    entries: Vec<(Value, V)>,
    index: HashMap<Value, usize>,
}

impl<V> KeyedMap<V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Returns the replaced value, if the key was already present.
    pub fn insert(&mut self, key: Value, value: V) -> Option<V> {
        match self.index.get(&key) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &Value) -> Option<&V> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl<V> Default for KeyedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: PartialEq> PartialEq for KeyedMap<V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<K: Into<Value>, V> FromIterator<(K, V)> for KeyedMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k.into(), v);
        }
        map
    }
}

impl<V> IntoIterator for KeyedMap<V> {
    type Item = (Value, V);
    type IntoIter = std::vec::IntoIter<(Value, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Row shape decoded from a fetch argument bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Record,
    List,
    Column(usize),
    Pair,
    Keyed,
}

impl Shape {
    pub fn resolve(arguments: &[FetchArgument]) -> Result<Self> {
        let mut flags = FetchFlags::empty();
        let mut column = None;
        for argument in arguments {
            match *argument {
                FetchArgument::Flags(f) => flags = flags | f,
                FetchArgument::ColumnIndex(i) if column.is_none() => column = Some(i),
                FetchArgument::ColumnIndex(_) => return Err(unsupported(arguments)),
            }
        }
        let shape = match flags {
            f if f.is_empty() || f == FetchFlags::ASSOC => Shape::Record,
            f if f == FetchFlags::NUM => Shape::List,
            f if f == FetchFlags::COLUMN => Shape::Column(column.unwrap_or(0)),
            f if f == FetchFlags::COLUMN | FetchFlags::UNIQUE => Shape::Pair,
            f if f == FetchFlags::UNIQUE || f == FetchFlags::UNIQUE | FetchFlags::ASSOC => {
                Shape::Keyed
            }
            _ => return Err(unsupported(arguments)),
        };
        if column.is_some() && !matches!(shape, Shape::Column(_)) {
            return Err(unsupported(arguments));
        }
        Ok(shape)
    }

    /// Shape one raw row.
    pub fn row(&self, columns: &[String], mut row: Vec<Value>) -> Result<Fetched> {
        let count = row.len();
        Ok(match *self {
            Shape::Record => Fetched::Record(Record::new(columns.to_vec(), row)),
            Shape::List => Fetched::List(row),
            Shape::Column(index) => {
                if index >= count {
                    return Err(Error::ColumnOutOfRange { index, count });
                }
                Fetched::Value(row.swap_remove(index))
            }
            Shape::Pair => {
                if count < 2 {
                    return Err(Error::ColumnOutOfRange { index: 1, count });
                }
                row.truncate(2);
                let value = row.pop().unwrap_or(Value::Null);
                let key = row.pop().unwrap_or(Value::Null);
                Fetched::Pair(key, value)
            }
            Shape::Keyed => {
                if count < 1 {
                    return Err(Error::ColumnOutOfRange { index: 0, count });
                }
                let rest = row.split_off(1);
                let key = row.pop().unwrap_or(Value::Null);
                Fetched::Keyed(key, Record::new(columns[1..].to_vec(), rest))
            }
        })
    }

    /// Shape every raw row. Later duplicate keys overwrite earlier ones.
    pub fn rows<I>(&self, columns: &[String], rows: I) -> Result<Materialized>
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        let mut result = match self {
            Shape::Record => Materialized::Records(Vec::new()),
            Shape::List => Materialized::Lists(Vec::new()),
            Shape::Column(_) => Materialized::Values(Vec::new()),
            Shape::Pair => Materialized::Pairs(KeyedMap::new()),
            Shape::Keyed => Materialized::Keyed(KeyedMap::new()),
        };
        for row in rows {
            match (&mut result, self.row(columns, row)?) {
                (Materialized::Records(all), Fetched::Record(r)) => all.push(r),
                (Materialized::Lists(all), Fetched::List(r)) => all.push(r),
                (Materialized::Values(all), Fetched::Value(v)) => all.push(v),
                (Materialized::Pairs(all), Fetched::Pair(k, v)) => {
                    all.insert(k, v);
                }
                (Materialized::Keyed(all), Fetched::Keyed(k, r)) => {
                    all.insert(k, r);
                }
                _ => unreachable!("row shape always matches its collection"),
            }
        }
        Ok(result)
    }
}

fn unsupported(arguments: &[FetchArgument]) -> Error {
    Error::UnsupportedFetchMode(FetchMode::new(arguments.to_vec()))
}
