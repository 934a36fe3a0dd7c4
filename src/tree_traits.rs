/*
Termtree rendering for arena trees.

`Tree<String>` comes from another crate, so conversion goes through a local trait
instead of an inherent impl (E0116).
 */
use std::fmt;

use generational_arena::Index;
use termtree::Tree;
use tracing::instrument;

use crate::domain::node::{TreeArena, TreeModel};

pub trait TreeNodeConvert {
    fn to_tree_string(&self) -> Tree<String>;
}

impl<T: fmt::Display + fmt::Debug> TreeNodeConvert for TreeArena<T> {
    #[instrument(level = "debug", skip(self))]
    fn to_tree_string(&self) -> Tree<String> {
        fn build_tree<T: fmt::Display + fmt::Debug>(arena: &TreeArena<T>, node_idx: Index) -> Tree<String> {
            let label = arena.data(node_idx).map(|d| d.to_string()).unwrap_or_default();
            let leaves: Vec<_> = arena
                .children(node_idx)
                .iter()
                .map(|&child| build_tree(arena, child))
                .collect();
            Tree::new(label).with_leaves(leaves)
        }

        match self.root() {
            Some(root_idx) => build_tree(self, root_idx),
            None => Tree::new("Empty tree".to_string()),
        }
    }
}
