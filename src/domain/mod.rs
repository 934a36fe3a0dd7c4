//! Domain layer: tree model, row projection and sorting
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod block_array;
pub mod change;
pub mod column;
pub mod error;
pub mod listener;
pub mod node;
pub mod projection;
pub mod sort_key;
pub mod sorter;
pub mod value;

pub use block_array::BlockArray;
pub use change::{RowChange, RowChangeListener};
pub use column::ColumnModel;
pub use error::{DomainError, DomainResult};
pub use listener::{Direction, ExpansionEvent, ExpansionListener, ToggleOutcome};
pub use node::{TreeArena, TreeModel, TreeNode};
pub use projection::{BlockReplacement, RowProjection, VisibleRow};
pub use sort_key::{NewColumnPlacement, ReclickBehavior, SortKey, SortOrder, SortPolicy, UnsortedRemoval};
pub use sorter::{containers_first, HierarchicalSorter, RowUpdate, SortContext};
pub use value::CellValue;
