//! Row change notifications delivered to the host.

use std::ops::Range;

/// A change to the rows a host displays.
///
/// Ranges are half-open. The facade reports them in view coordinates; the projection
/// produces them in model coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowChange {
    Inserted(Range<usize>),
    Deleted(Range<usize>),
    Updated(Range<usize>),
    /// Everything may have changed; re-query row count and all values.
    ModelChanged,
}

impl RowChange {
    /// Number of rows added (positive) or removed (negative) by this change.
    pub fn row_delta(&self) -> isize {
        match self {
            RowChange::Inserted(range) => range.len() as isize,
            RowChange::Deleted(range) => -(range.len() as isize),
            RowChange::Updated(_) | RowChange::ModelChanged => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RowChange::Inserted(range) | RowChange::Deleted(range) | RowChange::Updated(range) => {
                range.is_empty()
            }
            RowChange::ModelChanged => false,
        }
    }
}

/// Receives row change notifications. Implemented for closures.
pub trait RowChangeListener {
    fn row_change(&mut self, change: &RowChange);
}

impl<F: FnMut(&RowChange)> RowChangeListener for F {
    fn row_change(&mut self, change: &RowChange) {
        self(change)
    }
}
