//! Column model: per-column value accessors supplied by the host.

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::node::TreeModel;
use crate::domain::value::CellValue;

/// Maps (node, column) to cell values for one kind of tree.
pub trait ColumnModel<M: TreeModel> {
    fn column_count(&self) -> usize;

    fn column_name(&self, column: usize) -> &str;

    fn value(&self, model: &M, node: M::Id, column: usize) -> CellValue;

    fn is_editable(&self, _model: &M, _node: M::Id, _column: usize) -> bool {
        false
    }

    /// Writes a cell value back into the tree. Read-only by default.
    fn set_value(&self, _model: &mut M, _node: M::Id, column: usize, _value: CellValue) -> DomainResult<()> {
        Err(DomainError::ReadOnlyColumn(column))
    }

    fn check_column(&self, column: usize) -> DomainResult<()> {
        let count = self.column_count();
        if column < count {
            Ok(())
        } else {
            Err(DomainError::ColumnOutOfRange { column, count })
        }
    }
}
