//! Fetch-mode parameterized statement execution over SQLite.
//!
//! # Intention
//!
//! - Decouple running a prepared statement from shaping its rows: a
//!   [`Statement`] executes, a [`FetchMode`] decides whether rows come back
//!   as scalars, key/value pairs, keyed records or plain records.
//! - Keep the driver behind the narrow [`StatementHandle`] trait.
//!
//! # Architectural Boundaries
//!
//! - Driver errors are passed through as they are; nothing is retried.
//! - No query building beyond the small filter used by
//!   [`Connection::increment_each`].

mod connection;
mod error;
mod fetch_mode;
pub mod handle;
pub mod query;
mod sqlite;
mod statement;
mod value;

pub use connection::{Connection, ConnectionConfig, Page, QueryLogEntry};
pub use error::{Error, Result};
pub use fetch_mode::{FetchArgument, FetchFlags, FetchMode};
pub use handle::{Fetched, KeyedMap, Materialized, StatementHandle};
pub use query::{Query, QueryOperator};
pub use sqlite::SqliteStatement;
pub use statement::{Macro, Macros, Outcome, Statement, NATIVE_OPERATIONS};
pub use value::{Params, Record, Value};
