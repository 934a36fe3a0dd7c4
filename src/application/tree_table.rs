//! Tree-table facade.
//!
//! Owns the tree, the column model, the row projection and the sorter, and speaks to
//! the host in view rows. Every mutation goes through here so the projection, the
//! sort permutation and the subscribers stay in step.

use std::fmt;
use std::ops::Range;

use generational_arena::Index;
use tracing::{debug, info, instrument};

use crate::domain::change::{RowChange, RowChangeListener};
use crate::domain::column::ColumnModel;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::listener::{ask_all, notify_all, Direction, ExpansionEvent, ExpansionListener, ToggleOutcome};
use crate::domain::node::{TreeArena, TreeModel};
use crate::domain::projection::RowProjection;
use crate::domain::sort_key::{SortKey, SortPolicy};
use crate::domain::sorter::{
    containers_first, GroupingComparator, HierarchicalSorter, RowUpdate, SortContext, ValueComparator,
    DEFAULT_MAX_REPOSITION,
};
use crate::domain::value::CellValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableOptions {
    pub show_root: bool,
    pub policy: SortPolicy,
    pub max_reposition: usize,
    /// Install the containers-first grouping comparator
    pub containers_first: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            show_root: false,
            policy: SortPolicy::default(),
            max_reposition: DEFAULT_MAX_REPOSITION,
            containers_first: false,
        }
    }
}

pub struct TreeTable<M: TreeModel, C: ColumnModel<M>> {
    model: M,
    columns: C,
    projection: RowProjection<M::Id>,
    sorter: HierarchicalSorter<M>,
    expansion_listeners: Vec<Box<dyn ExpansionListener<M>>>,
    subscribers: Vec<Box<dyn RowChangeListener>>,
}

impl<M: TreeModel, C: ColumnModel<M>> fmt::Debug for TreeTable<M, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeTable")
            .field("rows", &self.projection.row_count())
            .field("columns", &self.columns.column_count())
            .field("sort_keys", &self.sorter.keys())
            .field("expansion_listeners", &self.expansion_listeners.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl<M: TreeModel, C: ColumnModel<M>> TreeTable<M, C> {
    pub fn new(model: M, columns: C) -> Self {
        Self::with_options(model, columns, TableOptions::default())
    }

    pub fn with_options(model: M, columns: C, options: TableOptions) -> Self {
        let mut projection = RowProjection::new(options.show_root);
        projection.initialize(&model);
        let mut sorter = HierarchicalSorter::new(options.policy).with_max_reposition(options.max_reposition);
        if options.containers_first {
            sorter.set_grouping(Some(containers_first()));
        }
        Self {
            model,
            columns,
            projection,
            sorter,
            expansion_listeners: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn columns(&self) -> &C {
        &self.columns
    }

    pub fn projection(&self) -> &RowProjection<M::Id> {
        &self.projection
    }

    pub fn add_expansion_listener(&mut self, listener: impl ExpansionListener<M> + 'static) {
        self.expansion_listeners.push(Box::new(listener));
    }

    pub fn subscribe(&mut self, listener: impl RowChangeListener + 'static) {
        self.subscribers.push(Box::new(listener));
    }

    fn emit(&mut self, change: RowChange) {
        if change.is_empty() {
            return;
        }
        debug!(?change, "row change");
        for subscriber in self.subscribers.iter_mut() {
            subscriber.row_change(&change);
        }
    }

    fn sort_context(&self) -> SortContext<'_, M, C> {
        SortContext {
            model: &self.model,
            columns: &self.columns,
            rows: self.projection.rows(),
        }
    }

    // ---------------------------------------------------------------------------------
    // Row and column access
    // ---------------------------------------------------------------------------------

    pub fn row_count(&self) -> usize {
        self.projection.row_count()
    }

    pub fn column_count(&self) -> usize {
        self.columns.column_count()
    }

    pub fn column_name(&self, column: usize) -> DomainResult<&str> {
        self.columns.check_column(column)?;
        Ok(self.columns.column_name(column))
    }

    pub fn model_row_of(&self, view_row: usize) -> DomainResult<usize> {
        self.sorter.view_to_model(&self.sort_context(), view_row)
    }

    pub fn view_row_of(&self, model_row: usize) -> DomainResult<usize> {
        self.sorter.model_to_view(&self.sort_context(), model_row)
    }

    /// View row for `model_row` without rebuilding the permutation.
    ///
    /// None when the permutation is stale; the tree may already be out of step with
    /// the row list at that point.
    fn cached_view_row(&self, model_row: usize) -> DomainResult<Option<usize>> {
        if self.sorter.is_active() && !self.sorter.is_current() {
            return Ok(None);
        }
        self.view_row_of(model_row).map(Some)
    }

    pub fn node_at_model_row(&self, model_row: usize) -> DomainResult<M::Id> {
        self.projection.node_at(model_row)
    }

    pub fn node_at_view_row(&self, view_row: usize) -> DomainResult<M::Id> {
        self.projection.node_at(self.model_row_of(view_row)?)
    }

    /// View row currently showing `node`, None when it is not displayed.
    pub fn view_row_of_node(&self, node: M::Id) -> DomainResult<Option<usize>> {
        match self.projection.row_of(node) {
            Some(row) => self.view_row_of(row).map(Some),
            None => Ok(None),
        }
    }

    pub fn value_at(&self, view_row: usize, column: usize) -> DomainResult<CellValue> {
        self.columns.check_column(column)?;
        let node = self.node_at_view_row(view_row)?;
        Ok(self.columns.value(&self.model, node, column))
    }

    pub fn depth_at(&self, view_row: usize) -> DomainResult<usize> {
        self.projection.depth_at(self.model_row_of(view_row)?)
    }

    /// Leaves can never be expanded, whatever their current child count.
    pub fn is_leaf(&self, node: M::Id) -> bool {
        !self.model.allows_children(node)
    }

    pub fn is_cell_editable(&self, view_row: usize, column: usize) -> DomainResult<bool> {
        self.columns.check_column(column)?;
        let node = self.node_at_view_row(view_row)?;
        Ok(self.columns.is_editable(&self.model, node, column))
    }

    // ---------------------------------------------------------------------------------
    // Expansion
    // ---------------------------------------------------------------------------------

    pub fn is_expanded(&self, node: M::Id) -> bool {
        self.projection.is_expanded(node)
    }

    pub fn is_visible(&self, node: M::Id) -> bool {
        self.projection.is_visible(&self.model, node)
    }

    fn check_node(&self, node: M::Id) -> DomainResult<()> {
        if self.model.contains(node) {
            Ok(())
        } else {
            Err(DomainError::unknown_node(node))
        }
    }

    fn is_hidden_root(&self, node: M::Id) -> bool {
        !self.projection.show_root() && self.projection.root() == Some(node)
    }

    fn visible_row(&self, node: M::Id) -> DomainResult<usize> {
        self.projection
            .row_of(node)
            .ok_or_else(|| DomainError::not_visible(node))
    }

    pub fn expand(&mut self, node: M::Id) -> DomainResult<ToggleOutcome> {
        self.transition(node, Direction::Expanding)
    }

    pub fn collapse(&mut self, node: M::Id) -> DomainResult<ToggleOutcome> {
        self.transition(node, Direction::Collapsing)
    }

    pub fn toggle(&mut self, node: M::Id) -> DomainResult<ToggleOutcome> {
        let direction = if self.projection.is_expanded(node) {
            Direction::Collapsing
        } else {
            Direction::Expanding
        };
        self.transition(node, direction)
    }

    /// Approval pass, projection change, notification, action pass.
    #[instrument(level = "debug", skip(self))]
    fn transition(&mut self, node: M::Id, direction: Direction) -> DomainResult<ToggleOutcome> {
        self.check_node(node)?;
        if self.is_hidden_root(node) {
            return Ok(ToggleOutcome::Unchanged);
        }
        let row = self.visible_row(node)?;
        let wanted = direction == Direction::Expanding;
        if self.projection.is_expanded(node) == wanted || !self.model.allows_children(node) {
            return Ok(ToggleOutcome::Unchanged);
        }
        // listeners may edit the tree, so the extent comes from the list as it is now
        let captured = match direction {
            Direction::Collapsing => self.projection.subtree_extent(row)?,
            Direction::Expanding => 0,
        };

        let event = ExpansionEvent { node, direction };
        if let Some(listener) = ask_all(&mut self.expansion_listeners, &self.model, &event)? {
            info!(?node, ?direction, listener, "transition vetoed");
            return Ok(ToggleOutcome::Rejected { listener });
        }

        let view = self.view_row_of(row)?;
        let mut rows = match direction {
            Direction::Expanding => {
                let inserted = self.projection.expand(&self.model, node, row)?;
                self.sorter.invalidate();
                self.emit(RowChange::Inserted(view + 1..view + 1 + inserted.len()));
                inserted.len()
            }
            Direction::Collapsing => {
                let removed = self.projection.collapse_captured(node, row, captured)?;
                self.sorter.invalidate();
                self.emit(RowChange::Deleted(view + 1..view + 1 + removed.len()));
                removed.len()
            }
        };

        notify_all(&mut self.expansion_listeners, &mut self.model, &event)?;
        if direction == Direction::Expanding && !self.expansion_listeners.is_empty() {
            rows = self.resync_after_action(node)?;
        }
        Ok(ToggleOutcome::Applied { direction, rows })
    }

    /// Picks up children loaded (or dropped) by the action pass.
    fn resync_after_action(&mut self, node: M::Id) -> DomainResult<usize> {
        let Some(row) = self.projection.row_of(node) else {
            return Ok(0);
        };
        let before = self.projection.subtree_extent(row)?;
        let view = self.view_row_of(row)?;
        let replacement = self.projection.resync_block(&self.model, node, row)?;
        self.sorter.invalidate();
        if replacement.removed == replacement.inserted {
            self.emit(RowChange::Updated(view + 1..view + 1 + replacement.inserted));
        } else {
            debug!(before, after = replacement.inserted, "block changed during action pass");
            self.emit(RowChange::Deleted(view + 1..view + 1 + replacement.removed));
            self.emit(RowChange::Inserted(view + 1..view + 1 + replacement.inserted));
        }
        Ok(replacement.inserted)
    }

    /// Expands `node` and its whole subtree.
    ///
    /// Without expansion listeners the subtree opens in one step. With listeners,
    /// `node` is approved once and then every nested container goes through the
    /// full protocol level by level, so lazy loaders see each node they fill.
    #[instrument(level = "debug", skip(self))]
    pub fn expand_all(&mut self, node: M::Id) -> DomainResult<ToggleOutcome> {
        self.subtree_transition(node, Direction::Expanding)
    }

    /// Collapses `node` and clears the expansion state of its whole subtree.
    #[instrument(level = "debug", skip(self))]
    pub fn collapse_all(&mut self, node: M::Id) -> DomainResult<ToggleOutcome> {
        self.subtree_transition(node, Direction::Collapsing)
    }

    fn subtree_transition(&mut self, node: M::Id, direction: Direction) -> DomainResult<ToggleOutcome> {
        self.check_node(node)?;
        if !self.model.allows_children(node) {
            return Ok(ToggleOutcome::Unchanged);
        }
        let hidden_root = self.is_hidden_root(node);
        let row = if hidden_root {
            None
        } else {
            Some(self.visible_row(node)?)
        };

        let event = ExpansionEvent { node, direction };
        if let Some(listener) = ask_all(&mut self.expansion_listeners, &self.model, &event)? {
            info!(?node, ?direction, listener, "subtree transition vetoed");
            return Ok(ToggleOutcome::Rejected { listener });
        }

        let wanted = direction == Direction::Expanding;
        if wanted && !self.expansion_listeners.is_empty() {
            return self.expand_levels(node, row, &event);
        }
        let rows = match row {
            None => {
                self.projection.set_subtree_expanded(&self.model, node, wanted);
                self.projection.initialize(&self.model);
                self.sorter.invalidate();
                self.emit(RowChange::ModelChanged);
                self.projection.row_count()
            }
            Some(row) => {
                let view = self.view_row_of(row)?;
                let (removed, inserted) = if wanted {
                    let replacement = self.projection.expand_all(&self.model, node, row)?;
                    (replacement.removed, replacement.inserted)
                } else {
                    (self.projection.collapse_all(&self.model, node, row)?.len(), 0)
                };
                self.sorter.invalidate();
                self.emit(RowChange::Deleted(view + 1..view + 1 + removed));
                self.emit(RowChange::Inserted(view + 1..view + 1 + inserted));
                if wanted {
                    inserted
                } else {
                    removed
                }
            }
        };

        notify_all(&mut self.expansion_listeners, &mut self.model, &event)?;
        Ok(ToggleOutcome::Applied { direction, rows })
    }

    /// Expands an approved `node`, then its nested containers one level at a time.
    ///
    /// A vetoed container stays collapsed and its subtree is skipped.
    fn expand_levels(
        &mut self,
        node: M::Id,
        row: Option<usize>,
        event: &ExpansionEvent<M::Id>,
    ) -> DomainResult<ToggleOutcome> {
        let before = self.projection.row_count();
        match row {
            None => {
                notify_all(&mut self.expansion_listeners, &mut self.model, event)?;
                self.projection.initialize(&self.model);
                self.sorter.invalidate();
                self.emit(RowChange::ModelChanged);
            }
            Some(row) => {
                if !self.projection.is_expanded(node) {
                    let view = self.view_row_of(row)?;
                    let inserted = self.projection.expand(&self.model, node, row)?;
                    self.sorter.invalidate();
                    self.emit(RowChange::Inserted(view + 1..view + 1 + inserted.len()));
                }
                notify_all(&mut self.expansion_listeners, &mut self.model, event)?;
                self.resync_after_action(node)?;
            }
        }

        let mut frontier = self.model.children(node).to_vec();
        let mut vetoed = 0;
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for child in frontier {
                if !self.model.contains(child) || !self.model.allows_children(child) {
                    continue;
                }
                if let ToggleOutcome::Rejected { .. } = self.transition(child, Direction::Expanding)? {
                    vetoed += 1;
                }
                if self.projection.is_expanded(child) {
                    next.extend_from_slice(self.model.children(child));
                }
            }
            frontier = next;
        }
        debug!(?node, vetoed, "subtree expanded level by level");
        Ok(ToggleOutcome::Applied {
            direction: Direction::Expanding,
            rows: self.projection.row_count().saturating_sub(before),
        })
    }

    /// Expands every collapsed ancestor of `node`, top down, so it becomes visible.
    ///
    /// Stops at the first vetoed ancestor.
    #[instrument(level = "debug", skip(self))]
    pub fn reveal(&mut self, node: M::Id) -> DomainResult<ToggleOutcome> {
        self.check_node(node)?;
        let mut ancestors = Vec::new();
        let mut current = self.model.parent(node);
        while let Some(ancestor) = current {
            if !self.projection.is_expanded(ancestor) {
                ancestors.push(ancestor);
            }
            current = self.model.parent(ancestor);
        }
        if ancestors.is_empty() {
            return Ok(ToggleOutcome::Unchanged);
        }

        let mut rows = 0;
        for ancestor in ancestors.into_iter().rev() {
            match self.expand(ancestor)? {
                ToggleOutcome::Applied { rows: inserted, .. } => rows += inserted,
                ToggleOutcome::Unchanged => {}
                rejected @ ToggleOutcome::Rejected { .. } => return Ok(rejected),
            }
        }
        Ok(ToggleOutcome::Applied {
            direction: Direction::Expanding,
            rows,
        })
    }

    pub fn show_root(&self) -> bool {
        self.projection.show_root()
    }

    pub fn set_show_root(&mut self, show_root: bool) {
        if self.projection.show_root() == show_root {
            return;
        }
        self.projection.set_show_root(&self.model, show_root);
        self.sorter.invalidate();
        self.emit(RowChange::ModelChanged);
    }

    /// Rebuilds all rows from the tree, keeping expansion state.
    pub fn reload(&mut self) {
        self.projection.initialize(&self.model);
        self.sorter.invalidate();
        self.emit(RowChange::ModelChanged);
    }

    // ---------------------------------------------------------------------------------
    // Sorting
    // ---------------------------------------------------------------------------------

    pub fn sort_keys(&self) -> &[SortKey] {
        self.sorter.keys()
    }

    pub fn set_sort_keys(&mut self, keys: Vec<SortKey>) -> DomainResult<()> {
        self.sorter.set_keys(keys, self.columns.column_count())?;
        self.emit(RowChange::ModelChanged);
        Ok(())
    }

    /// A header click on `column`.
    pub fn toggle_sort_order(&mut self, column: usize) -> DomainResult<()> {
        self.sorter.toggle(column, self.columns.column_count())?;
        self.emit(RowChange::ModelChanged);
        Ok(())
    }

    pub fn sort_policy(&self) -> &SortPolicy {
        self.sorter.policy()
    }

    pub fn set_sort_policy(&mut self, policy: SortPolicy) {
        self.sorter.set_policy(policy);
    }

    pub fn set_grouping(&mut self, grouping: Option<GroupingComparator<M>>) {
        self.sorter.set_grouping(grouping);
        if self.sorter.is_active() {
            self.emit(RowChange::ModelChanged);
        }
    }

    pub fn set_column_comparator(&mut self, column: usize, comparator: Option<ValueComparator>) -> DomainResult<()> {
        self.columns.check_column(column)?;
        self.sorter.set_column_comparator(column, comparator);
        if self.sorter.is_active() {
            self.emit(RowChange::ModelChanged);
        }
        Ok(())
    }

    // ---------------------------------------------------------------------------------
    // Edits and tree-model notifications
    // ---------------------------------------------------------------------------------

    /// Writes a cell through the column model and moves the row if the sort requires.
    #[instrument(level = "debug", skip(self, value))]
    pub fn set_value_at(&mut self, view_row: usize, column: usize, value: CellValue) -> DomainResult<()> {
        self.columns.check_column(column)?;
        let model_row = self.model_row_of(view_row)?;
        let node = self.projection.node_at(model_row)?;
        if !self.columns.is_editable(&self.model, node, column) {
            return Err(DomainError::ReadOnlyColumn(column));
        }
        self.columns.set_value(&mut self.model, node, column, value)?;
        self.row_values_changed(model_row)
    }

    fn row_values_changed(&mut self, model_row: usize) -> DomainResult<()> {
        let ctx = SortContext {
            model: &self.model,
            columns: &self.columns,
            rows: self.projection.rows(),
        };
        let change = match self.sorter.row_updated(&ctx, model_row)? {
            RowUpdate::Unsorted => RowChange::Updated(model_row..model_row + 1),
            RowUpdate::Repositioned { from, to } => RowChange::Updated(from.min(to)..from.max(to) + 1),
            RowUpdate::Invalidated => RowChange::ModelChanged,
        };
        self.emit(change);
        Ok(())
    }

    /// The values of `nodes` changed; their position in the tree did not.
    pub fn nodes_changed(&mut self, nodes: &[M::Id]) -> DomainResult<()> {
        for &node in nodes {
            if let Some(row) = self.projection.row_of(node) {
                self.row_values_changed(row)?;
            }
        }
        Ok(())
    }

    /// Children at `child_indices` were added to `parent`.
    #[instrument(level = "debug", skip(self))]
    pub fn nodes_inserted(&mut self, parent: M::Id, child_indices: &[usize]) -> DomainResult<()> {
        let ranges = self.projection.nodes_inserted(&self.model, parent, child_indices)?;
        if ranges.is_empty() {
            return Ok(());
        }
        self.sorter.invalidate();
        let mut views = ranges
            .into_iter()
            .map(|r| self.view_row_of(r.start).map(|v| v..v + r.len()))
            .collect::<DomainResult<Vec<_>>>()?;
        views.sort_by_key(|r| r.start);
        for range in views {
            self.emit(RowChange::Inserted(range));
        }
        Ok(())
    }

    /// Children `removed` were (or are about to be) detached from `parent`.
    #[instrument(level = "debug", skip(self))]
    pub fn nodes_removed(&mut self, parent: M::Id, removed: &[M::Id]) -> DomainResult<()> {
        let ranges = self.projection.locate_children(parent, removed)?;
        if ranges.is_empty() {
            return Ok(());
        }
        let views = self.deleted_view_ranges(&ranges)?;
        self.projection.remove_ranges(&ranges)?;
        self.sorter.invalidate();
        self.emit_deletions(views);
        Ok(())
    }

    /// View ranges for model ranges about to be removed; None if they cannot be
    /// resolved without rebuilding the permutation.
    fn deleted_view_ranges(&self, ranges: &[Range<usize>]) -> DomainResult<Option<Vec<Range<usize>>>> {
        let mut views = Vec::with_capacity(ranges.len());
        for range in ranges {
            match self.cached_view_row(range.start)? {
                Some(v) => views.push(v..v + range.len()),
                None => return Ok(None),
            }
        }
        views.sort_by(|a, b| b.start.cmp(&a.start));
        Ok(Some(views))
    }

    fn emit_deletions(&mut self, views: Option<Vec<Range<usize>>>) {
        match views {
            Some(views) => {
                for range in views {
                    self.emit(RowChange::Deleted(range));
                }
            }
            None => self.emit(RowChange::ModelChanged),
        }
    }

    /// Arbitrary changes below `node`; its block is rebuilt from the tree.
    #[instrument(level = "debug", skip(self))]
    pub fn structure_changed(&mut self, node: M::Id) -> DomainResult<()> {
        let root_replaced = self.model.root() != self.projection.root();
        if root_replaced || self.projection.root() == Some(node) {
            self.reload();
            return Ok(());
        }
        let Some(row) = self.projection.row_of(node) else {
            return Ok(());
        };
        let old_view = self.cached_view_row(row)?;
        let replacement = self.projection.resync_block(&self.model, node, row)?;
        self.sorter.invalidate();
        match old_view {
            Some(view) => {
                self.emit(RowChange::Deleted(view + 1..view + 1 + replacement.removed));
                let view = self.view_row_of(row)?;
                self.emit(RowChange::Inserted(view + 1..view + 1 + replacement.inserted));
            }
            None => self.emit(RowChange::ModelChanged),
        }
        Ok(())
    }
}

/// Edit helpers for the arena-backed tree: mutate and notify in one call.
impl<T: fmt::Debug, C: ColumnModel<TreeArena<T>>> TreeTable<TreeArena<T>, C> {
    pub fn insert_child(&mut self, parent: Index, position: usize, data: T, allows_children: bool) -> DomainResult<Index> {
        let child = self.model.insert_child(parent, position, data, allows_children)?;
        self.nodes_inserted(parent, &[position])?;
        Ok(child)
    }

    pub fn append_child(&mut self, parent: Index, data: T, allows_children: bool) -> DomainResult<Index> {
        let position = self.model.child_count(parent);
        self.insert_child(parent, position, data, allows_children)
    }

    /// Removes `node` and its subtree from the tree and the rows.
    pub fn remove_node(&mut self, node: Index) -> DomainResult<()> {
        self.check_node(node)?;
        let Some(parent) = self.model.parent(node) else {
            self.model.remove_subtree(node)?;
            self.reload();
            return Ok(());
        };
        // resolve view rows while the tree still holds the subtree
        let ranges = self.projection.locate_children(parent, &[node])?;
        let mut views = ranges
            .iter()
            .map(|r| self.view_row_of(r.start).map(|v| v..v + r.len()))
            .collect::<DomainResult<Vec<_>>>()?;
        views.sort_by(|a, b| b.start.cmp(&a.start));
        self.model.remove_subtree(node)?;
        if !ranges.is_empty() {
            self.projection.remove_ranges(&ranges)?;
            self.sorter.invalidate();
            self.emit_deletions(Some(views));
        }
        Ok(())
    }

    pub fn data(&self, node: Index) -> Option<&T> {
        self.model.data(node)
    }

    /// Mutable payload access; follow up with `nodes_changed` for displayed values.
    pub fn data_mut(&mut self, node: Index) -> Option<&mut T> {
        self.model.data_mut(node)
    }
}
