//! Hierarchical row sorter.
//!
//! Keeps a permutation between model rows (projection order) and view rows (sorted
//! order). Rows are compared as subtrees: two rows under different parents are ordered
//! by their ancestors that share a parent, so children always stay directly below
//! their own parent.
//!
//! The permutation is a cache tagged with the sorter version it was built for. Any
//! structural change bumps the version; the next read rebuilds.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::{debug, trace};

use crate::domain::column::ColumnModel;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::node::TreeModel;
use crate::domain::projection::VisibleRow;
use crate::domain::sort_key::{any_active, validate_keys, SortKey, SortOrder, SortPolicy};
use crate::domain::value::CellValue;

/// Per-column comparator overriding the natural value ordering.
pub type ValueComparator = Box<dyn Fn(&CellValue, &CellValue) -> Ordering>;

/// Comparator applied to sibling nodes before any sort key.
pub type GroupingComparator<M> = Box<dyn Fn(&M, <M as TreeModel>::Id, <M as TreeModel>::Id) -> Ordering>;

/// Nodes that may have children sort before leaves.
pub fn containers_first<M: TreeModel>() -> GroupingComparator<M> {
    Box::new(|model: &M, a, b| model.allows_children(b).cmp(&model.allows_children(a)))
}

/// Default bound on the number of neighbour swaps for a single-row update.
pub const DEFAULT_MAX_REPOSITION: usize = 64;

/// Everything the sorter reads when it (re)builds its permutation.
pub struct SortContext<'a, M: TreeModel, C> {
    pub model: &'a M,
    pub columns: &'a C,
    pub rows: &'a [VisibleRow<M::Id>],
}

/// What happened to the permutation after a single-row value change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowUpdate {
    /// No sort is active; model and view rows coincide.
    Unsorted,
    Repositioned { from: usize, to: usize },
    /// The permutation will be rebuilt on the next read.
    Invalidated,
}

#[derive(Debug, Clone)]
struct RowContext<Id> {
    node: Id,
    depth: usize,
    parent_row: Option<usize>,
    /// One value per sort key; Null for unsorted keys
    values: Vec<CellValue>,
}

#[derive(Debug)]
struct IndexMaps<Id> {
    version: u64,
    contexts: Vec<RowContext<Id>>,
    view_to_model: Vec<usize>,
    model_to_view: Vec<usize>,
}

pub struct HierarchicalSorter<M: TreeModel> {
    keys: Vec<SortKey>,
    policy: SortPolicy,
    grouping: Option<GroupingComparator<M>>,
    comparators: HashMap<usize, ValueComparator>,
    max_reposition: usize,
    version: u64,
    cache: RefCell<Option<IndexMaps<M::Id>>>,
}

impl<M: TreeModel> HierarchicalSorter<M> {
    pub fn new(policy: SortPolicy) -> Self {
        Self {
            keys: Vec::new(),
            policy,
            grouping: None,
            comparators: HashMap::new(),
            max_reposition: DEFAULT_MAX_REPOSITION,
            version: 0,
            cache: RefCell::new(None),
        }
    }

    pub fn with_max_reposition(mut self, max_reposition: usize) -> Self {
        self.max_reposition = max_reposition;
        self
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn policy(&self) -> &SortPolicy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: SortPolicy) {
        self.policy = policy;
    }

    pub fn is_active(&self) -> bool {
        any_active(&self.keys)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Replaces the key list after validating it against `column_count`.
    pub fn set_keys(&mut self, keys: Vec<SortKey>, column_count: usize) -> DomainResult<()> {
        validate_keys(&keys, column_count)?;
        debug!(?keys, "sort keys set");
        self.keys = keys;
        self.invalidate();
        Ok(())
    }

    /// One header click on `column`, following the configured policy.
    pub fn toggle(&mut self, column: usize, column_count: usize) -> DomainResult<()> {
        if column >= column_count {
            return Err(DomainError::ColumnOutOfRange {
                column,
                count: column_count,
            });
        }
        self.policy.toggle(&mut self.keys, column);
        self.invalidate();
        Ok(())
    }

    pub fn set_grouping(&mut self, grouping: Option<GroupingComparator<M>>) {
        self.grouping = grouping;
        self.invalidate();
    }

    pub fn set_column_comparator(&mut self, column: usize, comparator: Option<ValueComparator>) {
        match comparator {
            Some(c) => self.comparators.insert(column, c),
            None => self.comparators.remove(&column),
        };
        self.invalidate();
    }

    /// Marks the permutation stale; dropped entirely while no key is active.
    pub fn invalidate(&mut self) {
        self.version += 1;
        if !self.is_active() {
            *self.cache.get_mut() = None;
        }
        trace!(version = self.version, "sort cache invalidated");
    }

    /// True when a permutation for the current version is cached.
    pub fn is_current(&self) -> bool {
        self.cache
            .borrow()
            .as_ref()
            .is_some_and(|maps| maps.version == self.version)
    }

    fn ensure<C: ColumnModel<M>>(&self, ctx: &SortContext<'_, M, C>) -> DomainResult<()> {
        if !self.is_current() {
            let maps = self.build(ctx)?;
            *self.cache.borrow_mut() = Some(maps);
        }
        Ok(())
    }

    pub fn view_to_model<C: ColumnModel<M>>(&self, ctx: &SortContext<'_, M, C>, view_row: usize) -> DomainResult<usize> {
        if view_row >= ctx.rows.len() {
            return Err(DomainError::index(view_row, ctx.rows.len()));
        }
        if !self.is_active() {
            return Ok(view_row);
        }
        self.ensure(ctx)?;
        let cache = self.cache.borrow();
        cache
            .as_ref()
            .and_then(|maps| maps.view_to_model.get(view_row).copied())
            .ok_or_else(|| DomainError::Inconsistent(format!("no view row {view_row} in sort cache")))
    }

    pub fn model_to_view<C: ColumnModel<M>>(&self, ctx: &SortContext<'_, M, C>, model_row: usize) -> DomainResult<usize> {
        if model_row >= ctx.rows.len() {
            return Err(DomainError::index(model_row, ctx.rows.len()));
        }
        if !self.is_active() {
            return Ok(model_row);
        }
        self.ensure(ctx)?;
        let cache = self.cache.borrow();
        cache
            .as_ref()
            .and_then(|maps| maps.model_to_view.get(model_row).copied())
            .ok_or_else(|| DomainError::Inconsistent(format!("no model row {model_row} in sort cache")))
    }

    /// Model rows in view order.
    pub fn view_order<C: ColumnModel<M>>(&self, ctx: &SortContext<'_, M, C>) -> DomainResult<Vec<usize>> {
        if !self.is_active() {
            return Ok((0..ctx.rows.len()).collect());
        }
        self.ensure(ctx)?;
        Ok(self
            .cache
            .borrow()
            .as_ref()
            .map(|maps| maps.view_to_model.clone())
            .unwrap_or_default())
    }

    fn key_values<C: ColumnModel<M>>(&self, model: &M, columns: &C, node: M::Id) -> Vec<CellValue> {
        self.keys
            .iter()
            .map(|key| match key.order {
                SortOrder::Unsorted => CellValue::Null,
                _ => columns.value(model, node, key.column),
            })
            .collect()
    }

    fn build<C: ColumnModel<M>>(&self, ctx: &SortContext<'_, M, C>) -> DomainResult<IndexMaps<M::Id>> {
        let rows = ctx.rows;
        let row_of: HashMap<M::Id, usize> = rows.iter().enumerate().map(|(i, r)| (r.node, i)).collect();
        let top_depth = rows.iter().map(|r| r.depth).min().unwrap_or(0);

        let mut contexts = Vec::with_capacity(rows.len());
        for row in rows {
            let parent_row = ctx.model.parent(row.node).and_then(|p| row_of.get(&p).copied());
            if parent_row.is_none() && row.depth > top_depth {
                return Err(DomainError::Inconsistent(format!(
                    "parent of {:?} is not displayed",
                    row.node
                )));
            }
            contexts.push(RowContext {
                node: row.node,
                depth: row.depth,
                parent_row,
                values: self.key_values(ctx.model, ctx.columns, row.node),
            });
        }

        let mut view_to_model: Vec<usize> = (0..rows.len()).collect();
        view_to_model.sort_by(|&a, &b| self.compare_rows(ctx.model, &contexts, a, b));
        let mut model_to_view = vec![0; rows.len()];
        for (view, &model_row) in view_to_model.iter().enumerate() {
            model_to_view[model_row] = view;
        }
        debug!(rows = rows.len(), keys = ?self.keys, version = self.version, "sort cache rebuilt");
        Ok(IndexMaps {
            version: self.version,
            contexts,
            view_to_model,
            model_to_view,
        })
    }

    /// Orders two model rows as subtrees.
    fn compare_rows(&self, model: &M, contexts: &[RowContext<M::Id>], a: usize, b: usize) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let up = |row: usize| contexts[row].parent_row.unwrap_or(row);
        let (mut x, mut y) = (a, b);
        if contexts[x].parent_row != contexts[y].parent_row {
            while contexts[x].depth > contexts[y].depth {
                x = up(x);
            }
            while contexts[y].depth > contexts[x].depth {
                y = up(y);
            }
            if x == y {
                // one is an ancestor of the other
                return contexts[a].depth.cmp(&contexts[b].depth);
            }
            while contexts[x].parent_row != contexts[y].parent_row {
                x = up(x);
                y = up(y);
            }
        }
        self.compare_siblings(model, contexts, x, y)
    }

    fn compare_siblings(&self, model: &M, contexts: &[RowContext<M::Id>], x: usize, y: usize) -> Ordering {
        let (cx, cy) = (&contexts[x], &contexts[y]);
        if let Some(grouping) = &self.grouping {
            let ordering = grouping(model, cx.node, cy.node);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        for (i, key) in self.keys.iter().enumerate() {
            if key.order == SortOrder::Unsorted {
                return x.cmp(&y);
            }
            let ordering = self.compare_values(key, &cx.values[i], &cy.values[i]);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        x.cmp(&y)
    }

    /// Nulls sort last in both directions.
    fn compare_values(&self, key: &SortKey, a: &CellValue, b: &CellValue) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ordering = match self.comparators.get(&key.column) {
                    Some(comparator) => comparator(a, b),
                    None => a.compare(b),
                };
                if key.order == SortOrder::Descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
        }
    }

    /// Moves one model row to its new rank after its values changed.
    ///
    /// Only rows without displayed descendants are moved in place, by at most
    /// `max_reposition` neighbour swaps; anything else invalidates the permutation.
    pub fn row_updated<C: ColumnModel<M>>(&mut self, ctx: &SortContext<'_, M, C>, model_row: usize) -> DomainResult<RowUpdate> {
        if model_row >= ctx.rows.len() {
            return Err(DomainError::index(model_row, ctx.rows.len()));
        }
        if !self.is_active() {
            return Ok(RowUpdate::Unsorted);
        }
        let current = self.version;
        let Some(mut maps) = self.cache.get_mut().take().filter(|m| m.version == current) else {
            return Ok(RowUpdate::Invalidated);
        };
        let depth = ctx.rows[model_row].depth;
        let has_block = ctx.rows.get(model_row + 1).is_some_and(|r| r.depth > depth);
        if has_block || maps.contexts.len() != ctx.rows.len() {
            self.invalidate();
            return Ok(RowUpdate::Invalidated);
        }

        let node = maps.contexts[model_row].node;
        maps.contexts[model_row].values = self.key_values(ctx.model, ctx.columns, node);

        let from = maps.model_to_view[model_row];
        let mut to = from;
        let mut steps = 0;
        while to > 0
            && self.compare_rows(ctx.model, &maps.contexts, maps.view_to_model[to - 1], model_row) == Ordering::Greater
        {
            maps.view_to_model.swap(to - 1, to);
            maps.model_to_view[maps.view_to_model[to]] = to;
            to -= 1;
            steps += 1;
            if steps > self.max_reposition {
                self.invalidate();
                return Ok(RowUpdate::Invalidated);
            }
        }
        if to == from {
            while to + 1 < maps.view_to_model.len()
                && self.compare_rows(ctx.model, &maps.contexts, model_row, maps.view_to_model[to + 1]) == Ordering::Greater
            {
                maps.view_to_model.swap(to, to + 1);
                maps.model_to_view[maps.view_to_model[to]] = to;
                to += 1;
                steps += 1;
                if steps > self.max_reposition {
                    self.invalidate();
                    return Ok(RowUpdate::Invalidated);
                }
            }
        }
        maps.model_to_view[model_row] = to;
        *self.cache.get_mut() = Some(maps);
        trace!(model_row, from, to, "row repositioned");
        Ok(RowUpdate::Repositioned { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::TreeArena;
    use crate::domain::projection::RowProjection;
    use generational_arena::Index;

    type Tree = TreeArena<(&'static str, u64)>;

    struct SizeColumns;

    impl ColumnModel<Tree> for SizeColumns {
        fn column_count(&self) -> usize {
            2
        }

        fn column_name(&self, column: usize) -> &str {
            ["name", "size"][column]
        }

        fn value(&self, model: &Tree, node: Index, column: usize) -> CellValue {
            match (model.data(node), column) {
                (Some((name, _)), 0) => CellValue::from(*name),
                (Some((_, size)), 1) => CellValue::UInt(*size),
                _ => CellValue::Null,
            }
        }
    }

    fn fixture() -> (Tree, RowProjection<Index>) {
        let (mut tree, root) = Tree::with_root(("root", 0));
        tree.insert_node(("child0", 100), root, false).unwrap();
        let child1 = tree.insert_node(("child1", 101), root, true).unwrap();
        tree.insert_node(("sub0", 1000), child1, false).unwrap();
        tree.insert_node(("sub1", 1001), child1, false).unwrap();
        tree.insert_node(("child2", 102), root, false).unwrap();
        let mut projection = RowProjection::new(true);
        projection.initialize(&tree);
        projection.expand_all(&tree, root, 0).unwrap();
        (tree, projection)
    }

    fn view_names(sorter: &HierarchicalSorter<Tree>, tree: &Tree, projection: &RowProjection<Index>) -> Vec<&'static str> {
        let ctx = SortContext {
            model: tree,
            columns: &SizeColumns,
            rows: projection.rows(),
        };
        sorter
            .view_order(&ctx)
            .unwrap()
            .into_iter()
            .map(|m| tree.data(projection.rows()[m].node).unwrap().0)
            .collect()
    }

    #[test]
    fn given_no_keys_when_reading_then_identity() {
        let (tree, projection) = fixture();
        let sorter = HierarchicalSorter::new(SortPolicy::default());
        assert_eq!(
            view_names(&sorter, &tree, &projection),
            vec!["root", "child0", "child1", "sub0", "sub1", "child2"]
        );
        assert!(!sorter.is_current());
    }

    #[test]
    fn given_size_descending_when_sorting_then_children_stay_nested() {
        let (tree, projection) = fixture();
        let mut sorter = HierarchicalSorter::new(SortPolicy::default());
        sorter.set_keys(vec![SortKey::descending(1)], 2).unwrap();
        assert_eq!(
            view_names(&sorter, &tree, &projection),
            vec!["root", "child2", "child1", "sub1", "sub0", "child0"]
        );
        assert!(sorter.is_current());
    }

    #[test]
    fn given_grouping_when_sorting_then_containers_come_first() {
        let (tree, projection) = fixture();
        let mut sorter = HierarchicalSorter::new(SortPolicy::default());
        sorter.set_grouping(Some(containers_first()));
        sorter.set_keys(vec![SortKey::ascending(0)], 2).unwrap();
        assert_eq!(
            view_names(&sorter, &tree, &projection),
            vec!["root", "child1", "sub0", "sub1", "child0", "child2"]
        );
    }

    #[test]
    fn given_column_comparator_when_sorting_then_override_is_used() {
        let (tree, projection) = fixture();
        let mut sorter = HierarchicalSorter::new(SortPolicy::default());
        // order by the last character of the name, reversed
        sorter.set_column_comparator(
            0,
            Some(Box::new(|a: &CellValue, b: &CellValue| {
                let last = |v: &CellValue| v.to_string().chars().last();
                last(b).cmp(&last(a))
            })),
        );
        sorter.set_keys(vec![SortKey::ascending(0)], 2).unwrap();
        assert_eq!(
            view_names(&sorter, &tree, &projection),
            vec!["root", "child2", "child1", "sub1", "sub0", "child0"]
        );
    }

    #[test]
    fn given_unsorted_primary_key_when_sorting_then_model_order() {
        let (tree, projection) = fixture();
        let mut sorter = HierarchicalSorter::new(SortPolicy::default());
        sorter
            .set_keys(
                vec![SortKey::new(0, SortOrder::Unsorted), SortKey::descending(1)],
                2,
            )
            .unwrap();
        assert_eq!(
            view_names(&sorter, &tree, &projection),
            vec!["root", "child0", "child1", "sub0", "sub1", "child2"]
        );
    }

    #[test]
    fn given_cached_permutation_when_leaf_value_changes_then_repositions_locally() {
        let (mut tree, projection) = fixture();
        let mut sorter = HierarchicalSorter::new(SortPolicy::default());
        sorter.set_keys(vec![SortKey::ascending(1)], 2).unwrap();
        let child0 = projection.node_at(1).unwrap();
        {
            let ctx = SortContext {
                model: &tree,
                columns: &SizeColumns,
                rows: projection.rows(),
            };
            assert_eq!(sorter.model_to_view(&ctx, 1).unwrap(), 1);
        }
        tree.data_mut(child0).unwrap().1 = 500;
        let ctx = SortContext {
            model: &tree,
            columns: &SizeColumns,
            rows: projection.rows(),
        };
        let update = sorter.row_updated(&ctx, 1).unwrap();
        assert_eq!(update, RowUpdate::Repositioned { from: 1, to: 5 });
        assert_eq!(sorter.view_to_model(&ctx, 5).unwrap(), 1);
        assert_eq!(sorter.model_to_view(&ctx, 2).unwrap(), 1);
        assert!(sorter.is_current());
    }

    #[test]
    fn given_row_with_children_when_value_changes_then_invalidates() {
        let (tree, projection) = fixture();
        let mut sorter = HierarchicalSorter::new(SortPolicy::default());
        sorter.set_keys(vec![SortKey::ascending(1)], 2).unwrap();
        let ctx = SortContext {
            model: &tree,
            columns: &SizeColumns,
            rows: projection.rows(),
        };
        sorter.view_order(&ctx).unwrap();
        let version = sorter.version();
        assert_eq!(sorter.row_updated(&ctx, 2).unwrap(), RowUpdate::Invalidated);
        assert!(sorter.version() > version);
        assert!(!sorter.is_current());
    }

    #[test]
    fn given_tight_bound_when_row_moves_far_then_invalidates() {
        let (mut tree, projection) = fixture();
        let mut sorter = HierarchicalSorter::new(SortPolicy::default()).with_max_reposition(1);
        sorter.set_keys(vec![SortKey::ascending(1)], 2).unwrap();
        {
            let ctx = SortContext {
                model: &tree,
                columns: &SizeColumns,
                rows: projection.rows(),
            };
            sorter.view_order(&ctx).unwrap();
        }
        let child0 = projection.node_at(1).unwrap();
        tree.data_mut(child0).unwrap().1 = 5000;
        let ctx = SortContext {
            model: &tree,
            columns: &SizeColumns,
            rows: projection.rows(),
        };
        assert_eq!(sorter.row_updated(&ctx, 1).unwrap(), RowUpdate::Invalidated);
        assert_eq!(
            view_names(&sorter, &tree, &projection),
            vec!["root", "child1", "sub0", "sub1", "child2", "child0"]
        );
    }

    #[test]
    fn given_toggle_on_unknown_column_when_clicking_then_column_error() {
        let mut sorter: HierarchicalSorter<Tree> = HierarchicalSorter::new(SortPolicy::default());
        assert_eq!(
            sorter.toggle(5, 2),
            Err(DomainError::ColumnOutOfRange { column: 5, count: 2 })
        );
        sorter.toggle(1, 2).unwrap();
        assert_eq!(sorter.keys(), &[SortKey::ascending(1)]);
    }
}
