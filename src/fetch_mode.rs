//! Result-shape descriptors passed to [`Statement::fetch`](crate::Statement::fetch)
//! and [`Statement::fetch_all`](crate::Statement::fetch_all).

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Execution-strategy flags understood by
    /// [`StatementHandle`](crate::StatementHandle) implementations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FetchFlags: u32 {
        /// Row as a column name → value record.
        const ASSOC = 1;
        /// Row as a positional list of values.
        const NUM = 1 << 1;
        /// A single scalar per row.
        const COLUMN = 1 << 2;
        /// First column becomes the key of the row.
        const UNIQUE = 1 << 3;
    }
}

impl fmt::Display for FetchFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("DEFAULT");
        }
        for (i, (name, _)) in self.iter_names().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            f.write_str(name)?;
        }
        Ok(())
    }
}

/// One entry of the argument bag a [`FetchMode`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchArgument {
    Flags(FetchFlags),
    /// Zero-based column used by `COLUMN` fetches.
    ColumnIndex(usize),
}

/// Immutable description of how rows are materialized.
///
/// A mode is only a carrier: the arguments are handed to the statement
/// handle verbatim, and combinations the handle does not recognize are
/// rejected when the mode is used, never when it is built.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct FetchMode {
    arguments: Vec<FetchArgument>,
}

impl FetchMode {
    pub fn new(arguments: Vec<FetchArgument>) -> Self {
        Self { arguments }
    }

    pub fn arguments(&self) -> &[FetchArgument] {
        &self.arguments
    }

    /// First column of every row as a scalar.
    pub fn column() -> Self {
        Self::new(vec![FetchArgument::Flags(FetchFlags::COLUMN)])
    }

    /// Alias of [`FetchMode::column`].
    pub fn value() -> Self {
        Self::column()
    }

    /// The given column of every row as a scalar.
    pub fn column_at(index: usize) -> Self {
        Self::new(vec![
            FetchArgument::Flags(FetchFlags::COLUMN),
            FetchArgument::ColumnIndex(index),
        ])
    }

    /// Rows collapsed to `first column => second column`.
    pub fn key_value() -> Self {
        Self::new(vec![FetchArgument::Flags(
            FetchFlags::COLUMN | FetchFlags::UNIQUE,
        )])
    }

    /// Rows keyed by their first column, the remaining columns as value.
    pub fn keyed_by_first_column() -> Self {
        Self::new(vec![FetchArgument::Flags(FetchFlags::UNIQUE)])
    }

    pub fn associative() -> Self {
        Self::new(vec![FetchArgument::Flags(FetchFlags::ASSOC)])
    }

    pub fn list() -> Self {
        Self::new(vec![FetchArgument::Flags(FetchFlags::NUM)])
    }
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, argument) in self.arguments.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match argument {
                FetchArgument::Flags(flags) => write!(f, "{flags}")?,
                FetchArgument::ColumnIndex(index) => write!(f, "{index}")?,
            }
        }
        f.write_str("]")
    }
}
