//! Tree node capability and the arena-backed default tree.

use std::fmt;
use std::hash::Hash;

use generational_arena::{Arena, Index};
use tracing::instrument;

use crate::domain::error::{DomainError, DomainResult};

/// Read access to a tree, as needed by the row projection and the sorter.
///
/// Ownership of the tree stays with the implementor. Parent links are advisory and
/// only used for upward traversal.
pub trait TreeModel {
    type Id: Copy + Eq + Hash + fmt::Debug;

    fn root(&self) -> Option<Self::Id>;

    fn contains(&self, node: Self::Id) -> bool;

    fn parent(&self, node: Self::Id) -> Option<Self::Id>;

    /// Children in display order. Unknown nodes have none.
    fn children(&self, node: Self::Id) -> &[Self::Id];

    /// Whether the node may ever have children, independent of how many it has now.
    fn allows_children(&self, node: Self::Id) -> bool;

    fn child_count(&self, node: Self::Id) -> usize {
        self.children(node).len()
    }

    /// Number of edges between `node` and the root.
    fn depth(&self, node: Self::Id) -> usize {
        let mut depth = 0;
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            depth += 1;
            current = parent;
        }
        depth
    }

    fn is_ancestor(&self, ancestor: Self::Id, node: Self::Id) -> bool {
        let mut current = self.parent(node);
        while let Some(candidate) = current {
            if candidate == ancestor {
                return true;
            }
            current = self.parent(candidate);
        }
        false
    }
}

/// Tree node in the arena-based hierarchy.
#[derive(Debug)]
pub struct TreeNode<T> {
    pub data: T,
    /// Index of parent node in the arena, None for the root
    pub parent: Option<Index>,
    /// Indices of child nodes in the arena
    pub children: Vec<Index>,
    pub allows_children: bool,
}

/// Arena-based tree: nodes own their children through indices, parents are back-links.
///
/// Uses a generational arena so indices of removed nodes never alias new ones.
#[derive(Debug)]
pub struct TreeArena<T> {
    arena: Arena<TreeNode<T>>,
    root: Option<Index>,
}

impl<T: fmt::Debug> Default for TreeArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> TreeArena<T> {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            root: None,
        }
    }

    /// Creates a tree with a single root node that allows children.
    pub fn with_root(data: T) -> (Self, Index) {
        let mut tree = Self::new();
        let root = tree.set_root(data);
        (tree, root)
    }

    /// Replaces the whole tree by a fresh root node.
    #[instrument(level = "trace", skip(self))]
    pub fn set_root(&mut self, data: T) -> Index {
        self.arena.clear();
        let root = self.arena.insert(TreeNode {
            data,
            parent: None,
            children: Vec::new(),
            allows_children: true,
        });
        self.root = Some(root);
        root
    }

    /// Appends a child to `parent`.
    #[instrument(level = "trace", skip(self))]
    pub fn insert_node(&mut self, data: T, parent: Index, allows_children: bool) -> DomainResult<Index> {
        let position = self.get_node(parent)?.children.len();
        self.insert_child(parent, position, data, allows_children)
    }

    /// Inserts a child at `position` among the children of `parent`.
    #[instrument(level = "trace", skip(self))]
    pub fn insert_child(
        &mut self,
        parent: Index,
        position: usize,
        data: T,
        allows_children: bool,
    ) -> DomainResult<Index> {
        let child_count = self.get_node(parent)?.children.len();
        if position > child_count {
            return Err(DomainError::index(position, child_count));
        }
        let node_idx = self.arena.insert(TreeNode {
            data,
            parent: Some(parent),
            children: Vec::new(),
            allows_children,
        });
        self.get_node_mut(parent)?.children.insert(position, node_idx);
        Ok(node_idx)
    }

    /// Detaches `node` from its parent and drops its whole subtree.
    ///
    /// Returns the child position it occupied under its parent, None for the root.
    #[instrument(level = "trace", skip(self))]
    pub fn remove_subtree(&mut self, node: Index) -> DomainResult<Option<usize>> {
        let parent = self.get_node(node)?.parent;
        let position = match parent {
            Some(parent_idx) => {
                let siblings = &mut self.get_node_mut(parent_idx)?.children;
                let position = siblings
                    .iter()
                    .position(|&c| c == node)
                    .ok_or_else(|| DomainError::unknown_node(node))?;
                siblings.remove(position);
                Some(position)
            }
            None => {
                self.root = None;
                None
            }
        };

        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some(removed) = self.arena.remove(current) {
                stack.extend(removed.children);
            }
        }
        Ok(position)
    }

    pub fn get_node(&self, idx: Index) -> DomainResult<&TreeNode<T>> {
        self.arena.get(idx).ok_or_else(|| DomainError::unknown_node(idx))
    }

    pub fn get_node_mut(&mut self, idx: Index) -> DomainResult<&mut TreeNode<T>> {
        self.arena
            .get_mut(idx)
            .ok_or_else(|| DomainError::unknown_node(idx))
    }

    pub fn data(&self, idx: Index) -> Option<&T> {
        self.arena.get(idx).map(|n| &n.data)
    }

    pub fn data_mut(&mut self, idx: Index) -> Option<&mut T> {
        self.arena.get_mut(idx).map(|n| &mut n.data)
    }

    pub fn set_allows_children(&mut self, idx: Index, allows: bool) -> DomainResult<()> {
        self.get_node_mut(idx)?.allows_children = allows;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Pre-order traversal from the root.
    pub fn iter(&self) -> TreeIterator<'_, T> {
        TreeIterator::new(self)
    }

    /// Post-order traversal from the root, children before their parent.
    pub fn iter_postorder(&self) -> PostOrderIterator<'_, T> {
        PostOrderIterator::new(self)
    }

    /// Number of levels in the tree, 0 when empty.
    pub fn height(&self) -> usize {
        self.iter()
            .map(|(idx, _)| self.depth(idx) + 1)
            .max()
            .unwrap_or(0)
    }
}

impl<T> TreeModel for TreeArena<T> {
    type Id = Index;

    fn root(&self) -> Option<Index> {
        self.root
    }

    fn contains(&self, node: Index) -> bool {
        self.arena.contains(node)
    }

    fn parent(&self, node: Index) -> Option<Index> {
        self.arena.get(node).and_then(|n| n.parent)
    }

    fn children(&self, node: Index) -> &[Index] {
        self.arena
            .get(node)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    fn allows_children(&self, node: Index) -> bool {
        self.arena.get(node).is_some_and(|n| n.allows_children)
    }
}

pub struct TreeIterator<'a, T> {
    tree: &'a TreeArena<T>,
    stack: Vec<Index>,
}

impl<'a, T> TreeIterator<'a, T> {
    fn new(tree: &'a TreeArena<T>) -> Self {
        Self {
            tree,
            stack: tree.root.into_iter().collect(),
        }
    }
}

impl<'a, T> Iterator for TreeIterator<'a, T> {
    type Item = (Index, &'a TreeNode<T>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current_idx) = self.stack.pop() {
            if let Some(node) = self.tree.arena.get(current_idx) {
                // Push children in reverse order for left-to-right traversal
                self.stack.extend(node.children.iter().rev().copied());
                return Some((current_idx, node));
            }
        }
        None
    }
}

pub struct PostOrderIterator<'a, T> {
    tree: &'a TreeArena<T>,
    stack: Vec<(Index, bool)>,
}

impl<'a, T> PostOrderIterator<'a, T> {
    fn new(tree: &'a TreeArena<T>) -> Self {
        Self {
            tree,
            stack: tree.root.map(|r| (r, false)).into_iter().collect(),
        }
    }
}

impl<'a, T> Iterator for PostOrderIterator<'a, T> {
    type Item = (Index, &'a TreeNode<T>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.tree.arena.get(current_idx) {
                if visited {
                    return Some((current_idx, node));
                }
                self.stack.push((current_idx, true));
                for &child in node.children.iter().rev() {
                    self.stack.push((child, false));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    //      root
    //     /  |  \
    //    a   b   c
    //        |
    //        d
    fn sample() -> (TreeArena<&'static str>, [Index; 5]) {
        let (mut tree, root) = TreeArena::with_root("root");
        let a = tree.insert_node("a", root, false).unwrap();
        let b = tree.insert_node("b", root, true).unwrap();
        let c = tree.insert_node("c", root, false).unwrap();
        let d = tree.insert_node("d", b, false).unwrap();
        (tree, [root, a, b, c, d])
    }

    #[test]
    fn given_tree_when_iterating_then_preorder() {
        let (tree, _) = sample();
        let names: Vec<_> = tree.iter().map(|(_, n)| n.data).collect();
        assert_eq!(names, vec!["root", "a", "b", "d", "c"]);
    }

    #[test]
    fn given_tree_when_iterating_postorder_then_children_first() {
        let (tree, _) = sample();
        let names: Vec<_> = tree.iter_postorder().map(|(_, n)| n.data).collect();
        assert_eq!(names, vec!["a", "d", "b", "c", "root"]);
    }

    #[test]
    fn given_tree_when_querying_depth_then_counts_edges() {
        let (tree, [root, a, b, _, d]) = sample();
        assert_eq!(tree.depth(root), 0);
        assert_eq!(tree.depth(a), 1);
        assert_eq!(tree.depth(d), 2);
        assert_eq!(tree.height(), 3);
        assert!(tree.is_ancestor(root, d));
        assert!(tree.is_ancestor(b, d));
        assert!(!tree.is_ancestor(a, d));
        assert!(!tree.is_ancestor(d, d));
    }

    #[test]
    fn given_position_when_inserting_child_then_keeps_order() {
        let (mut tree, [root, a, ..]) = sample();
        let first = tree.insert_child(root, 0, "first", false).unwrap();
        assert_eq!(tree.children(root)[0], first);
        assert_eq!(tree.children(root)[1], a);
        assert!(tree.insert_child(root, 9, "bad", false).is_err());
    }

    #[test]
    fn given_subtree_when_removing_then_descendants_are_gone() {
        let (mut tree, [root, _, b, c, d]) = sample();
        assert_eq!(tree.remove_subtree(b).unwrap(), Some(1));
        assert!(!tree.contains(b));
        assert!(!tree.contains(d));
        assert_eq!(tree.children(root).len(), 2);
        assert_eq!(tree.children(root)[1], c);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn given_removed_node_when_accessing_then_unknown_node() {
        let (mut tree, [_, a, ..]) = sample();
        tree.remove_subtree(a).unwrap();
        assert!(matches!(tree.get_node(a), Err(DomainError::UnknownNode(_))));
        assert!(tree.children(a).is_empty());
        assert!(!tree.allows_children(a));
    }
}
