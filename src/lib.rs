//! treegrid: a tree-table engine.
//!
//! A tree is shown as a flat list of rows. Expanding or collapsing a node inserts or
//! removes the contiguous block of rows below it, and a multi-column sort reorders
//! siblings without ever separating a child from its parent.
//!
//! Layers, innermost first: [`domain`] (tree model, row projection, sorter),
//! [`application`] (the [`TreeTable`] facade), [`infrastructure`] (directory trees
//! read from disk) and [`cli`] (the `treegrid` terminal host).

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod tree_traits;
pub mod util;

pub use application::{TableOptions, TreeTable};
pub use domain::{
    BlockArray, CellValue, ColumnModel, Direction, DomainError, DomainResult, ExpansionEvent, ExpansionListener,
    HierarchicalSorter, RowChange, RowChangeListener, RowProjection, SortKey, SortOrder, SortPolicy, ToggleOutcome,
    TreeArena, TreeModel, VisibleRow,
};
