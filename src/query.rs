//! Filters compiled into `WHERE` clauses, and identifier quoting.

use crate::Value;

/// Query operators for building filter conditions
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperator {
    /// `Equal(Value::Null)` compiles to `IS NULL`.
    Equal(Value),
    NotEqual(Value),
    GreaterThan(Value),
    GreaterThanOrEqual(Value),
    LessThan(Value),
    LessThanOrEqual(Value),
    Like(String),
    In(Vec<Value>),
}

/// Conjunction of conditions, compiled in insertion order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Query {
    pub conditions: Vec<(String, QueryOperator)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition(mut self, field: &str, op: QueryOperator) -> Self {
        self.conditions.push((field.to_string(), op));
        self
    }

    /// Shorthand for an `Equal` condition.
    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.with_condition(field, QueryOperator::Equal(value.into()))
    }

    /// The `WHERE` clause (with leading space) and its positional bindings.
    /// Empty when there are no conditions.
    pub fn compile(&self) -> (String, Vec<Value>) {
        if self.conditions.is_empty() {
            return (String::new(), Vec::new());
        }
        let mut bindings = Vec::new();
        let clauses: Vec<String> = self
            .conditions
            .iter()
            .map(|(field, op)| {
                let column = quote_identifier(field);
                let mut bind = |value: &Value| {
                    bindings.push(value.clone());
                    "?"
                };
                match op {
                    QueryOperator::Equal(Value::Null) => format!("{column} IS NULL"),
                    QueryOperator::NotEqual(Value::Null) => format!("{column} IS NOT NULL"),
                    QueryOperator::Equal(v) => format!("{column} = {}", bind(v)),
                    QueryOperator::NotEqual(v) => format!("{column} <> {}", bind(v)),
                    QueryOperator::GreaterThan(v) => format!("{column} > {}", bind(v)),
                    QueryOperator::GreaterThanOrEqual(v) => format!("{column} >= {}", bind(v)),
                    QueryOperator::LessThan(v) => format!("{column} < {}", bind(v)),
                    QueryOperator::LessThanOrEqual(v) => format!("{column} <= {}", bind(v)),
                    QueryOperator::Like(pattern) => {
                        format!("{column} LIKE {}", bind(&Value::Text(pattern.clone())))
                    }
                    QueryOperator::In(values) if values.is_empty() => "0 = 1".to_string(),
                    QueryOperator::In(values) => {
                        let placeholders: Vec<&str> = values.iter().map(&mut bind).collect();
                        format!("{column} IN ({})", placeholders.join(", "))
                    }
                }
            })
            .collect();
        (format!(" WHERE {}", clauses.join(" AND ")), bindings)
    }
}

/// Double-quote an identifier, quoting each part of a dotted name separately.
pub fn quote_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}
