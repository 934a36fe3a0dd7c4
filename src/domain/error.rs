//! Domain-level errors (no external dependencies)

use thiserror::Error;

/// Domain errors represent violated preconditions of the tree-table engine.
/// These are independent of infrastructure concerns.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("column {column} out of range for {count} columns")]
    ColumnOutOfRange { column: usize, count: usize },

    #[error("invalid range: end {to} is before start {from}")]
    InvalidRange { from: usize, to: usize },

    #[error("capacity exhausted: requested {requested} elements, maximum is {max}")]
    CapacityExhausted { requested: usize, max: usize },

    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("node is not visible: {0}")]
    NotVisible(String),

    #[error("column {0} appears more than once in the sort keys")]
    DuplicateSortColumn(usize),

    #[error("column {0} is read-only")]
    ReadOnlyColumn(usize),

    #[error("invalid value for column {column}: {message}")]
    InvalidValue { column: usize, message: String },

    #[error("expansion listener failed: {0}")]
    Listener(String),

    #[error("row projection out of sync with tree: {0}")]
    Inconsistent(String),
}

impl DomainError {
    /// Shorthand for an out-of-range row or element index.
    pub fn index(index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { index, len }
    }

    pub fn unknown_node(node: impl std::fmt::Debug) -> Self {
        Self::UnknownNode(format!("{node:?}"))
    }

    pub fn not_visible(node: impl std::fmt::Debug) -> Self {
        Self::NotVisible(format!("{node:?}"))
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
