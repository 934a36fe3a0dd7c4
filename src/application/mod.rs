//! Application layer: the tree-table facade
//!
//! This layer wires the projection, the sorter and the listeners together and turns
//! model-row changes into view-row notifications.

pub mod error;
pub mod tree_table;

pub use error::{ApplicationError, ApplicationResult};
pub use tree_table::{TableOptions, TreeTable};
