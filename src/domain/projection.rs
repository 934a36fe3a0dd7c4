//! Visible row projection: the pre-order flattening of a tree, truncated at every
//! collapsed node, kept up to date block by block.
//!
//! Rows are stored with their tree depth so the extent of a subtree's block can be
//! measured from the list alone: it is the run of following rows that are deeper.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::ops::Range;

use tracing::{debug, instrument, trace};

use crate::domain::block_array::BlockArray;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::node::TreeModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleRow<Id> {
    pub node: Id,
    /// Edges between the node and the tree root
    pub depth: usize,
}

/// Outcome of replacing a node's block of descendant rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockReplacement {
    /// Model row of the node whose descendants were replaced
    pub row: usize,
    pub removed: usize,
    pub inserted: usize,
}

#[derive(Debug)]
pub struct RowProjection<Id> {
    rows: BlockArray<VisibleRow<Id>>,
    expanded: HashSet<Id>,
    root: Option<Id>,
    show_root: bool,
}

impl<Id: Copy + Eq + Hash + fmt::Debug> RowProjection<Id> {
    pub fn new(show_root: bool) -> Self {
        Self {
            rows: BlockArray::new(),
            expanded: HashSet::new(),
            root: None,
            show_root,
        }
    }

    /// Full O(n) build from the model's current root.
    #[instrument(level = "debug", skip(self, model))]
    pub fn initialize<M: TreeModel<Id = Id>>(&mut self, model: &M) {
        self.root = model.root();
        let mut rows = Vec::new();
        if let Some(root) = self.root {
            if self.show_root {
                rows.push(VisibleRow { node: root, depth: 0 });
                if self.is_expanded(root) {
                    rows.extend(self.visible_block(model, root, 0));
                }
            } else {
                rows.extend(self.visible_block(model, root, 0));
            }
        }
        self.rows = rows.into();
        debug!(rows = self.rows.len(), show_root = self.show_root, "projection built");
    }

    pub fn show_root(&self) -> bool {
        self.show_root
    }

    pub fn set_show_root<M: TreeModel<Id = Id>>(&mut self, model: &M, show_root: bool) {
        self.show_root = show_root;
        self.initialize(model);
    }

    pub fn root(&self) -> Option<Id> {
        self.root
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[VisibleRow<Id>] {
        self.rows.as_slice()
    }

    pub fn node_at(&self, row: usize) -> DomainResult<Id> {
        self.rows.get(row).map(|r| r.node)
    }

    pub fn depth_at(&self, row: usize) -> DomainResult<usize> {
        self.rows.get(row).map(|r| r.depth)
    }

    /// Model row currently holding `node`. O(n).
    pub fn row_of(&self, node: Id) -> Option<usize> {
        self.rows.iter().position(|r| r.node == node)
    }

    pub fn is_expanded(&self, node: Id) -> bool {
        self.expanded.contains(&node) || self.is_hidden_root(node)
    }

    fn is_hidden_root(&self, node: Id) -> bool {
        !self.show_root && self.root == Some(node)
    }

    /// True when every ancestor is expanded and the node itself is displayable.
    pub fn is_visible<M: TreeModel<Id = Id>>(&self, model: &M, node: Id) -> bool {
        if self.root == Some(node) {
            return self.show_root;
        }
        let mut current = node;
        while let Some(parent) = model.parent(current) {
            if !self.is_expanded(parent) {
                return false;
            }
            if self.root == Some(parent) {
                return true;
            }
            current = parent;
        }
        false
    }

    /// Number of rows directly below `row` that belong to its subtree.
    pub fn subtree_extent(&self, row: usize) -> DomainResult<usize> {
        let depth = self.rows.get(row)?.depth;
        Ok(self.rows.as_slice()[row + 1..]
            .iter()
            .take_while(|r| r.depth > depth)
            .count())
    }

    /// Rows the node's descendants would occupy right now, computed from the tree.
    pub fn visible_descendant_count<M: TreeModel<Id = Id>>(&self, model: &M, node: Id) -> usize {
        if !self.is_expanded(node) {
            return 0;
        }
        self.visible_block(model, node, model.depth(node)).len()
    }

    /// Pre-order rows below `node`, descending only into expanded nodes.
    fn visible_block<M: TreeModel<Id = Id>>(&self, model: &M, node: Id, depth: usize) -> Vec<VisibleRow<Id>> {
        let mut block = Vec::new();
        let mut stack: Vec<(Id, usize)> = model
            .children(node)
            .iter()
            .rev()
            .map(|&c| (c, depth + 1))
            .collect();
        while let Some((current, current_depth)) = stack.pop() {
            block.push(VisibleRow {
                node: current,
                depth: current_depth,
            });
            if self.expanded.contains(&current) {
                stack.extend(
                    model
                        .children(current)
                        .iter()
                        .rev()
                        .map(|&c| (c, current_depth + 1)),
                );
            }
        }
        block
    }

    fn check_row(&self, node: Id, row: usize) -> DomainResult<VisibleRow<Id>> {
        let entry = *self.rows.get(row)?;
        if entry.node != node {
            return Err(DomainError::Inconsistent(format!(
                "row {row} holds {:?}, not {node:?}",
                entry.node
            )));
        }
        Ok(entry)
    }

    /// Marks `node` expanded and inserts its visible descendants after `row`.
    ///
    /// Returns the inserted model range; empty when the node has no children or is
    /// already expanded.
    #[instrument(level = "debug", skip(self, model))]
    pub fn expand<M: TreeModel<Id = Id>>(&mut self, model: &M, node: Id, row: usize) -> DomainResult<Range<usize>> {
        let entry = self.check_row(node, row)?;
        if self.expanded.contains(&node) {
            return Ok(row + 1..row + 1);
        }
        let block = self.visible_block(model, node, entry.depth);
        let inserted = self.rows.insert_block(row + 1, block)?;
        self.expanded.insert(node);
        debug!(?inserted, "expanded");
        Ok(inserted)
    }

    /// Marks `node` collapsed and removes its block of descendant rows.
    #[instrument(level = "debug", skip(self))]
    pub fn collapse(&mut self, node: Id, row: usize) -> DomainResult<Range<usize>> {
        self.check_row(node, row)?;
        let count = self.subtree_extent(row)?;
        self.collapse_captured(node, row, count)
    }

    /// Collapse with a descendant count captured earlier, before listeners ran.
    pub fn collapse_captured(&mut self, node: Id, row: usize, count: usize) -> DomainResult<Range<usize>> {
        self.check_row(node, row)?;
        self.rows.remove_block(row + 1, row + 1 + count)?;
        self.expanded.remove(&node);
        debug!(count, "collapsed");
        Ok(row + 1..row + 1 + count)
    }

    /// Expands `node` and every descendant that allows children.
    #[instrument(level = "debug", skip(self, model))]
    pub fn expand_all<M: TreeModel<Id = Id>>(&mut self, model: &M, node: Id, row: usize) -> DomainResult<BlockReplacement> {
        self.check_row(node, row)?;
        self.set_subtree_expanded(model, node, true);
        self.resync_block(model, node, row)
    }

    /// Collapses `node` and forgets the expansion state of its whole subtree.
    #[instrument(level = "debug", skip(self, model))]
    pub fn collapse_all<M: TreeModel<Id = Id>>(&mut self, model: &M, node: Id, row: usize) -> DomainResult<Range<usize>> {
        let removed = self.collapse(node, row)?;
        self.set_subtree_expanded(model, node, false);
        Ok(removed)
    }

    /// Sets the expansion flag of `node` and all its descendants without touching the
    /// row list. Callers rebuild the affected block afterwards.
    pub fn set_subtree_expanded<M: TreeModel<Id = Id>>(&mut self, model: &M, node: Id, expanded: bool) {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if expanded && model.allows_children(current) {
                self.expanded.insert(current);
            } else if !expanded {
                self.expanded.remove(&current);
            }
            stack.extend_from_slice(model.children(current));
        }
    }

    /// Re-reads the subtree of `node` from the tree and swaps its block in place.
    pub fn resync_block<M: TreeModel<Id = Id>>(&mut self, model: &M, node: Id, row: usize) -> DomainResult<BlockReplacement> {
        let entry = self.check_row(node, row)?;
        let removed = self.subtree_extent(row)?;
        self.rows.remove_block(row + 1, row + 1 + removed)?;
        let inserted = if self.is_expanded(node) {
            let block = self.visible_block(model, node, entry.depth);
            self.rows.insert_block(row + 1, block)?.len()
        } else {
            0
        };
        trace!(row, removed, inserted, "block replaced");
        Ok(BlockReplacement { row, removed, inserted })
    }

    /// Model row range that holds the children of `parent`, plus the children's depth.
    ///
    /// None when the children are not displayed.
    fn child_region(&self, parent: Id) -> DomainResult<Option<(usize, usize, usize)>> {
        if !self.is_expanded(parent) {
            return Ok(None);
        }
        if self.is_hidden_root(parent) {
            return Ok(Some((0, self.rows.len(), 1)));
        }
        match self.row_of(parent) {
            Some(row) => {
                let depth = self.rows.get(row)?.depth;
                let end = row + 1 + self.subtree_extent(row)?;
                Ok(Some((row + 1, end, depth + 1)))
            }
            None => Ok(None),
        }
    }

    /// Inserts rows for children newly added to `parent` at `child_indices`.
    ///
    /// Returns, per inserted child in ascending order, the model range of the child's
    /// row and its visible descendants, in final coordinates.
    #[instrument(level = "debug", skip(self, model))]
    pub fn nodes_inserted<M: TreeModel<Id = Id>>(
        &mut self,
        model: &M,
        parent: Id,
        child_indices: &[usize],
    ) -> DomainResult<Vec<Range<usize>>> {
        let Some((start, _, depth)) = self.child_region(parent)? else {
            return Ok(Vec::new());
        };
        let children = model.children(parent);
        let mut indices = child_indices.to_vec();
        indices.sort_unstable();
        indices.dedup();

        let mut inserted = Vec::with_capacity(indices.len());
        for index in indices {
            let child = *children
                .get(index)
                .ok_or_else(|| DomainError::index(index, children.len()))?;
            // skip the blocks of the preceding siblings
            let mut position = start;
            for &sibling in &children[..index] {
                let entry = self.rows.get(position)?;
                if entry.node != sibling {
                    return Err(DomainError::Inconsistent(format!(
                        "expected sibling {sibling:?} at row {position}"
                    )));
                }
                position += 1 + self.subtree_extent(position)?;
            }
            let mut block = vec![VisibleRow { node: child, depth }];
            if self.expanded.contains(&child) {
                block.extend(self.visible_block(model, child, depth));
            }
            inserted.push(self.rows.insert_block(position, block)?);
        }
        debug!(?inserted, "nodes inserted");
        Ok(inserted)
    }

    /// Locates the blocks of `nodes` among the displayed children of `parent`.
    ///
    /// Ranges are sorted by descending start so they can be removed one after another.
    pub fn locate_children(&self, parent: Id, nodes: &[Id]) -> DomainResult<Vec<Range<usize>>> {
        let Some((start, end, depth)) = self.child_region(parent)? else {
            return Ok(Vec::new());
        };
        let wanted: HashSet<Id> = nodes.iter().copied().collect();
        let mut ranges = Vec::new();
        let mut position = start;
        while position < end {
            let entry = *self.rows.get(position)?;
            let extent = self.subtree_extent(position)?;
            if entry.depth == depth && wanted.contains(&entry.node) {
                ranges.push(position..position + 1 + extent);
            }
            position += 1 + extent;
        }
        ranges.reverse();
        Ok(ranges)
    }

    /// Removes row ranges, given in descending order of start.
    pub fn remove_ranges(&mut self, ranges: &[Range<usize>]) -> DomainResult<()> {
        for range in ranges {
            for row in self.rows.remove_block(range.start, range.end)? {
                self.expanded.remove(&row.node);
            }
        }
        Ok(())
    }

    /// Removes the rows of children that were (or are about to be) detached from `parent`.
    #[instrument(level = "debug", skip(self))]
    pub fn nodes_removed(&mut self, parent: Id, removed: &[Id]) -> DomainResult<Vec<Range<usize>>> {
        let ranges = self.locate_children(parent, removed)?;
        self.remove_ranges(&ranges)?;
        debug!(?ranges, "nodes removed");
        Ok(ranges)
    }

    /// Rebuilds the block below `node` after arbitrary changes to its subtree.
    ///
    /// Returns None when the whole projection was rebuilt (root) or when the node is
    /// not displayed.
    #[instrument(level = "debug", skip(self, model))]
    pub fn structure_changed<M: TreeModel<Id = Id>>(
        &mut self,
        model: &M,
        node: Id,
    ) -> DomainResult<Option<BlockReplacement>> {
        if self.root == Some(node) || model.root() != self.root {
            self.initialize(model);
            return Ok(None);
        }
        match self.row_of(node) {
            Some(row) => self.resync_block(model, node, row).map(Some),
            None => Ok(None),
        }
    }
}
