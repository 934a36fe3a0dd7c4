//! Integration tests for the tree-table facade: the two-pass expansion protocol,
//! row change notifications and structural edits.

use std::cell::RefCell;
use std::rc::Rc;

use generational_arena::Index;
use proptest::prelude::*;
use rstest::{fixture, rstest};

use treegrid::domain::{
    CellValue, ColumnModel, Direction, DomainError, DomainResult, ExpansionEvent, ExpansionListener, RowChange,
    ToggleOutcome, TreeArena, TreeModel,
};
use treegrid::util::testing;
use treegrid::{TableOptions, TreeTable};

type Tree = TreeArena<&'static str>;
type Table = TreeTable<Tree, NameColumn>;
type Log = Rc<RefCell<Vec<RowChange>>>;
type Calls = Rc<RefCell<Vec<String>>>;

struct NameColumn;

impl ColumnModel<Tree> for NameColumn {
    fn column_count(&self) -> usize {
        1
    }

    fn column_name(&self, _column: usize) -> &str {
        "name"
    }

    fn value(&self, model: &Tree, node: Index, _column: usize) -> CellValue {
        model.data(node).map(|name| CellValue::from(*name)).unwrap_or(CellValue::Null)
    }
}

/// Records both passes as "approve:<node>:<direction>" and "act:<node>:<direction>".
struct Recorder {
    calls: Calls,
}

impl Recorder {
    fn record(&self, pass: &str, model: &Tree, event: &ExpansionEvent<Index>) {
        let name = model.data(event.node).copied().unwrap_or("?");
        self.calls
            .borrow_mut()
            .push(format!("{pass}:{name}:{:?}", event.direction));
    }
}

impl ExpansionListener<Tree> for Recorder {
    fn approve(&mut self, model: &Tree, event: &ExpansionEvent<Index>) -> DomainResult<bool> {
        self.record("approve", model, event);
        Ok(true)
    }

    fn on_expansion(&mut self, model: &mut Tree, event: &ExpansionEvent<Index>) -> DomainResult<()> {
        self.record("act", model, event);
        Ok(())
    }
}

/// Vetoes every transition of one node.
struct Veto {
    node: Index,
}

impl ExpansionListener<Tree> for Veto {
    fn approve(&mut self, _model: &Tree, event: &ExpansionEvent<Index>) -> DomainResult<bool> {
        Ok(event.node != self.node)
    }
}

/// Fills childless containers on first expansion; "empty" stays empty and becomes a leaf.
struct Loader;

impl ExpansionListener<Tree> for Loader {
    fn on_expansion(&mut self, model: &mut Tree, event: &ExpansionEvent<Index>) -> DomainResult<()> {
        if event.direction != Direction::Expanding || model.child_count(event.node) > 0 {
            return Ok(());
        }
        if model.data(event.node) == Some(&"empty") {
            return model.set_allows_children(event.node, false);
        }
        model.insert_node("loaded0", event.node, false)?;
        model.insert_node("loaded1", event.node, false)?;
        Ok(())
    }
}

/// Loads one level per expansion: "lazy" gets the container "inner", "inner" gets "leaf".
struct NestedLoader;

impl ExpansionListener<Tree> for NestedLoader {
    fn on_expansion(&mut self, model: &mut Tree, event: &ExpansionEvent<Index>) -> DomainResult<()> {
        if event.direction != Direction::Expanding || model.child_count(event.node) > 0 {
            return Ok(());
        }
        match model.data(event.node).copied() {
            Some("lazy") => model.insert_node("inner", event.node, true).map(|_| ()),
            Some("inner") => model.insert_node("leaf", event.node, false).map(|_| ()),
            _ => Ok(()),
        }
    }
}

struct Failing;

impl ExpansionListener<Tree> for Failing {
    fn approve(&mut self, _model: &Tree, _event: &ExpansionEvent<Index>) -> DomainResult<bool> {
        Err(DomainError::Listener("backend unavailable".to_string()))
    }
}

struct Fixture {
    table: Table,
    log: Log,
    root: Index,
    dir: Index,
    nested: Index,
    deep: Index,
    file: Index,
}

// root{dir{a, nested{deep}}, file}, root hidden
#[fixture]
fn fixture() -> Fixture {
    testing::init_test_setup();
    let (mut tree, root) = Tree::with_root("root");
    let dir = tree.insert_node("dir", root, true).unwrap();
    tree.insert_node("a", dir, false).unwrap();
    let nested = tree.insert_node("nested", dir, true).unwrap();
    let deep = tree.insert_node("deep", nested, false).unwrap();
    let file = tree.insert_node("file", root, false).unwrap();
    let mut table = TreeTable::new(tree, NameColumn);
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    table.subscribe(move |change: &RowChange| sink.borrow_mut().push(change.clone()));
    Fixture {
        table,
        log,
        root,
        dir,
        nested,
        deep,
        file,
    }
}

fn names(table: &Table) -> Vec<String> {
    (0..table.row_count())
        .map(|row| table.value_at(row, 0).unwrap().to_string())
        .collect()
}

// ============================================================
// Two-pass expansion protocol
// ============================================================

#[rstest]
fn given_listeners_when_expanding_then_approval_precedes_action(mut fixture: Fixture) {
    let calls: Calls = Rc::new(RefCell::new(Vec::new()));
    fixture.table.add_expansion_listener(Recorder {
        calls: Rc::clone(&calls),
    });
    fixture.table.add_expansion_listener(Recorder {
        calls: Rc::clone(&calls),
    });

    fixture.table.expand(fixture.dir).unwrap();

    assert_eq!(
        *calls.borrow(),
        vec![
            "approve:dir:Expanding",
            "approve:dir:Expanding",
            "act:dir:Expanding",
            "act:dir:Expanding"
        ]
    );
}

#[rstest]
fn given_veto_when_expanding_then_rejected_and_nothing_changes(mut fixture: Fixture) {
    let calls: Calls = Rc::new(RefCell::new(Vec::new()));
    fixture.table.add_expansion_listener(Recorder {
        calls: Rc::clone(&calls),
    });
    fixture.table.add_expansion_listener(Veto { node: fixture.dir });

    let outcome = fixture.table.expand(fixture.dir).unwrap();

    assert_eq!(outcome, ToggleOutcome::Rejected { listener: 1 });
    assert!(!fixture.table.is_expanded(fixture.dir));
    assert_eq!(names(&fixture.table), vec!["dir", "file"]);
    assert!(fixture.log.borrow().is_empty());
    assert_eq!(*calls.borrow(), vec!["approve:dir:Expanding"]);
}

#[rstest]
fn given_veto_when_collapsing_then_rows_stay(mut fixture: Fixture) {
    fixture.table.expand(fixture.dir).unwrap();
    fixture.table.add_expansion_listener(Veto { node: fixture.dir });
    fixture.log.borrow_mut().clear();

    let outcome = fixture.table.toggle(fixture.dir).unwrap();

    assert_eq!(outcome, ToggleOutcome::Rejected { listener: 0 });
    assert_eq!(names(&fixture.table), vec!["dir", "a", "nested", "file"]);
    assert!(fixture.log.borrow().is_empty());
}

#[rstest]
fn given_failing_listener_when_expanding_then_error_propagates(mut fixture: Fixture) {
    fixture.table.add_expansion_listener(Failing);

    let result = fixture.table.expand(fixture.dir);

    assert!(matches!(result, Err(DomainError::Listener(_))));
    assert!(!fixture.table.is_expanded(fixture.dir));
}

#[rstest]
fn given_childless_container_when_loader_fills_it_then_new_rows_shown(mut fixture: Fixture) {
    let lazy = fixture.table.append_child(fixture.root, "lazy", true).unwrap();
    fixture.table.add_expansion_listener(Loader);
    fixture.log.borrow_mut().clear();

    let outcome = fixture.table.expand(lazy).unwrap();

    assert_eq!(
        outcome,
        ToggleOutcome::Applied {
            direction: Direction::Expanding,
            rows: 2
        }
    );
    assert_eq!(names(&fixture.table), vec!["dir", "file", "lazy", "loaded0", "loaded1"]);
    assert_eq!(*fixture.log.borrow(), vec![RowChange::Inserted(3..5)]);
}

#[rstest]
fn given_empty_container_when_expanded_then_becomes_leaf(mut fixture: Fixture) {
    let empty = fixture.table.append_child(fixture.root, "empty", true).unwrap();
    fixture.table.add_expansion_listener(Loader);
    assert!(!fixture.table.is_leaf(empty));

    fixture.table.expand(empty).unwrap();

    assert!(fixture.table.is_leaf(empty));
    assert_eq!(fixture.table.row_count(), 3);
    assert_eq!(fixture.table.toggle(empty).unwrap(), ToggleOutcome::Unchanged);
}

#[rstest]
fn given_leaf_or_hidden_node_when_expanding_then_unchanged_or_error(mut fixture: Fixture) {
    assert_eq!(fixture.table.expand(fixture.file).unwrap(), ToggleOutcome::Unchanged);
    assert_eq!(fixture.table.expand(fixture.root).unwrap(), ToggleOutcome::Unchanged);
    assert!(matches!(
        fixture.table.expand(fixture.nested),
        Err(DomainError::NotVisible(_))
    ));
}

#[rstest]
fn given_removed_node_when_expanding_then_unknown_node(mut fixture: Fixture) {
    fixture.table.remove_node(fixture.nested).unwrap();
    assert!(matches!(
        fixture.table.expand(fixture.nested),
        Err(DomainError::UnknownNode(_))
    ));
}

// ============================================================
// Subtree expansion and reveal
// ============================================================

#[rstest]
fn given_visible_dir_when_expanding_all_then_whole_subtree_shown(mut fixture: Fixture) {
    let outcome = fixture.table.expand_all(fixture.dir).unwrap();

    assert_eq!(
        outcome,
        ToggleOutcome::Applied {
            direction: Direction::Expanding,
            rows: 3
        }
    );
    assert_eq!(names(&fixture.table), vec!["dir", "a", "nested", "deep", "file"]);
    assert_eq!(*fixture.log.borrow(), vec![RowChange::Inserted(1..4)]);
}

#[rstest]
fn given_expanded_subtree_when_collapsing_all_then_nested_state_forgotten(mut fixture: Fixture) {
    fixture.table.expand_all(fixture.dir).unwrap();
    fixture.log.borrow_mut().clear();

    fixture.table.collapse_all(fixture.dir).unwrap();
    assert_eq!(*fixture.log.borrow(), vec![RowChange::Deleted(1..4)]);

    fixture.table.expand(fixture.dir).unwrap();
    assert_eq!(names(&fixture.table), vec!["dir", "a", "nested", "file"]);
    assert!(!fixture.table.is_expanded(fixture.nested));
}

#[rstest]
fn given_hidden_root_when_expanding_all_then_model_changed(mut fixture: Fixture) {
    fixture.table.expand_all(fixture.root).unwrap();

    assert_eq!(fixture.table.row_count(), 5);
    assert_eq!(*fixture.log.borrow(), vec![RowChange::ModelChanged]);
}

#[rstest]
fn given_childless_container_when_expanding_all_with_loader_then_loaded_rows_shown(mut fixture: Fixture) {
    let lazy = fixture.table.append_child(fixture.root, "lazy", true).unwrap();
    fixture.table.add_expansion_listener(Loader);
    fixture.log.borrow_mut().clear();

    let outcome = fixture.table.expand_all(lazy).unwrap();

    assert_eq!(
        outcome,
        ToggleOutcome::Applied {
            direction: Direction::Expanding,
            rows: 2
        }
    );
    assert_eq!(names(&fixture.table), vec!["dir", "file", "lazy", "loaded0", "loaded1"]);
    let loaded = fixture.table.model().children(lazy)[0];
    assert_eq!(fixture.table.view_row_of_node(loaded).unwrap(), Some(3));
    assert_eq!(*fixture.log.borrow(), vec![RowChange::Inserted(3..5)]);
}

#[rstest]
fn given_nested_lazy_containers_when_expanding_all_then_each_level_loaded(mut fixture: Fixture) {
    let lazy = fixture.table.append_child(fixture.root, "lazy", true).unwrap();
    fixture.table.add_expansion_listener(NestedLoader);
    fixture.log.borrow_mut().clear();

    fixture.table.expand_all(lazy).unwrap();

    let inner = fixture.table.model().children(lazy)[0];
    assert!(fixture.table.is_expanded(inner));
    assert_eq!(names(&fixture.table), vec!["dir", "file", "lazy", "inner", "leaf"]);
    assert_eq!(
        *fixture.log.borrow(),
        vec![RowChange::Inserted(3..4), RowChange::Inserted(4..5)]
    );
}

#[rstest]
fn given_listener_when_expanding_all_then_nested_containers_pass_protocol(mut fixture: Fixture) {
    let calls: Calls = Rc::new(RefCell::new(Vec::new()));
    fixture.table.add_expansion_listener(Recorder {
        calls: Rc::clone(&calls),
    });

    fixture.table.expand_all(fixture.dir).unwrap();

    assert_eq!(
        *calls.borrow(),
        vec![
            "approve:dir:Expanding",
            "act:dir:Expanding",
            "approve:nested:Expanding",
            "act:nested:Expanding"
        ]
    );
    assert_eq!(names(&fixture.table), vec!["dir", "a", "nested", "deep", "file"]);
}

#[rstest]
fn given_vetoed_nested_container_when_expanding_all_then_it_stays_collapsed(mut fixture: Fixture) {
    fixture.table.add_expansion_listener(Veto { node: fixture.nested });

    let outcome = fixture.table.expand_all(fixture.dir).unwrap();

    assert_eq!(
        outcome,
        ToggleOutcome::Applied {
            direction: Direction::Expanding,
            rows: 2
        }
    );
    assert!(!fixture.table.is_expanded(fixture.nested));
    assert_eq!(names(&fixture.table), vec!["dir", "a", "nested", "file"]);
}

#[rstest]
fn given_hidden_node_when_revealing_then_ancestors_expand_top_down(mut fixture: Fixture) {
    let outcome = fixture.table.reveal(fixture.deep).unwrap();

    assert!(outcome.is_applied());
    assert!(fixture.table.is_visible(fixture.deep));
    assert_eq!(
        *fixture.log.borrow(),
        vec![RowChange::Inserted(1..3), RowChange::Inserted(3..4)]
    );
    assert_eq!(fixture.table.view_row_of_node(fixture.deep).unwrap(), Some(3));
}

#[rstest]
fn given_vetoed_ancestor_when_revealing_then_stops_there(mut fixture: Fixture) {
    fixture.table.add_expansion_listener(Veto { node: fixture.nested });

    let outcome = fixture.table.reveal(fixture.deep).unwrap();

    assert_eq!(outcome, ToggleOutcome::Rejected { listener: 0 });
    assert!(fixture.table.is_expanded(fixture.dir));
    assert!(!fixture.table.is_visible(fixture.deep));
}

#[rstest]
fn given_visible_node_when_revealing_then_unchanged(mut fixture: Fixture) {
    assert_eq!(fixture.table.reveal(fixture.file).unwrap(), ToggleOutcome::Unchanged);
}

// ============================================================
// Root visibility and structural edits
// ============================================================

#[rstest]
fn given_hidden_root_when_showing_it_then_single_collapsed_row(mut fixture: Fixture) {
    fixture.table.set_show_root(true);

    assert_eq!(fixture.table.row_count(), 1);
    assert_eq!(fixture.table.depth_at(0).unwrap(), 0);
    assert_eq!(*fixture.log.borrow(), vec![RowChange::ModelChanged]);

    fixture.table.expand(fixture.root).unwrap();
    assert_eq!(names(&fixture.table), vec!["root", "dir", "file"]);
}

#[rstest]
fn given_root_shown_option_when_created_then_root_is_first_row() {
    testing::init_test_setup();
    let (tree, _) = Tree::with_root("root");
    let options = TableOptions {
        show_root: true,
        ..TableOptions::default()
    };
    let table = TreeTable::with_options(tree, NameColumn, options);
    assert_eq!(names(&table), vec!["root"]);
}

#[rstest]
fn given_expanded_parent_when_child_inserted_then_inserted_notification(mut fixture: Fixture) {
    fixture.table.expand(fixture.dir).unwrap();
    fixture.log.borrow_mut().clear();

    let child = fixture.table.insert_child(fixture.dir, 0, "first", false).unwrap();

    assert_eq!(*fixture.log.borrow(), vec![RowChange::Inserted(1..2)]);
    assert_eq!(fixture.table.view_row_of_node(child).unwrap(), Some(1));
}

#[rstest]
fn given_collapsed_parent_when_child_inserted_then_silent(mut fixture: Fixture) {
    fixture.table.insert_child(fixture.dir, 0, "first", false).unwrap();
    assert!(fixture.log.borrow().is_empty());
    assert_eq!(fixture.table.row_count(), 2);
}

#[rstest]
fn given_expanded_subtree_when_removed_then_block_deleted(mut fixture: Fixture) {
    fixture.table.expand_all(fixture.dir).unwrap();
    fixture.log.borrow_mut().clear();

    fixture.table.remove_node(fixture.dir).unwrap();

    assert_eq!(*fixture.log.borrow(), vec![RowChange::Deleted(0..4)]);
    assert_eq!(names(&fixture.table), vec!["file"]);
    assert!(!fixture.table.model().contains(fixture.deep));
}

#[rstest]
fn given_host_removed_children_when_notified_then_rows_deleted(mut fixture: Fixture) {
    fixture.table.nodes_removed(fixture.root, &[fixture.file]).unwrap();

    assert_eq!(*fixture.log.borrow(), vec![RowChange::Deleted(1..2)]);
    assert_eq!(names(&fixture.table), vec!["dir"]);
}

#[rstest]
fn given_root_removed_when_notified_then_table_empty(mut fixture: Fixture) {
    fixture.table.remove_node(fixture.root).unwrap();

    assert_eq!(fixture.table.row_count(), 0);
    assert_eq!(*fixture.log.borrow(), vec![RowChange::ModelChanged]);
}

#[rstest]
fn given_structure_changed_when_notified_then_block_replaced(mut fixture: Fixture) {
    fixture.table.expand(fixture.dir).unwrap();
    fixture.table.expand(fixture.nested).unwrap();
    fixture.log.borrow_mut().clear();

    fixture.table.structure_changed(fixture.dir).unwrap();

    assert_eq!(
        *fixture.log.borrow(),
        vec![RowChange::Deleted(1..4), RowChange::Inserted(1..4)]
    );
    assert_eq!(names(&fixture.table), vec!["dir", "a", "nested", "deep", "file"]);
}

#[rstest]
fn given_expansion_state_when_reloading_then_kept(mut fixture: Fixture) {
    fixture.table.expand(fixture.dir).unwrap();
    fixture.log.borrow_mut().clear();

    fixture.table.reload();

    assert_eq!(names(&fixture.table), vec!["dir", "a", "nested", "file"]);
    assert_eq!(*fixture.log.borrow(), vec![RowChange::ModelChanged]);
}

// ============================================================
// Cells
// ============================================================

#[rstest]
fn given_read_only_column_when_editing_then_rejected(mut fixture: Fixture) {
    assert!(!fixture.table.is_cell_editable(0, 0).unwrap());
    assert!(matches!(
        fixture.table.set_value_at(0, 0, CellValue::from("x")),
        Err(DomainError::ReadOnlyColumn(0))
    ));
    assert!(fixture.table.column_name(1).is_err());
    assert_eq!(fixture.table.column_name(0).unwrap(), "name");
}

// ============================================================
// Property: rows follow the tree under lazy loading
// ============================================================

/// Fills childless containers with a container and a leaf; at depth 3 they become leaves.
struct Grower;

impl ExpansionListener<Tree> for Grower {
    fn on_expansion(&mut self, model: &mut Tree, event: &ExpansionEvent<Index>) -> DomainResult<()> {
        if event.direction != Direction::Expanding || model.child_count(event.node) > 0 {
            return Ok(());
        }
        if model.depth(event.node) >= 3 {
            return model.set_allows_children(event.node, false);
        }
        model.insert_node("grown", event.node, true)?;
        model.insert_node("leaf", event.node, false)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Op {
    Toggle(usize),
    ExpandAll(usize),
    CollapseAll(usize),
    Append { parent: usize, container: bool },
    Remove(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0usize..64).prop_map(Op::Toggle),
        2 => (0usize..64).prop_map(Op::ExpandAll),
        1 => (0usize..64).prop_map(Op::CollapseAll),
        2 => (0usize..64, any::<bool>()).prop_map(|(parent, container)| Op::Append { parent, container }),
        1 => (0usize..64).prop_map(Op::Remove),
    ]
}

fn pick(table: &Table, n: usize) -> Option<Index> {
    let nodes: Vec<Index> = table.model().iter().map(|(idx, _)| idx).collect();
    if nodes.is_empty() {
        None
    } else {
        Some(nodes[n % nodes.len()])
    }
}

/// Pre-order walk of the tree, descending only into expanded nodes.
fn expected_nodes(table: &Table, show_root: bool) -> Vec<Index> {
    fn walk(table: &Table, node: Index, out: &mut Vec<Index>) {
        for &child in table.model().children(node) {
            out.push(child);
            if table.is_expanded(child) {
                walk(table, child, out);
            }
        }
    }
    let mut out = Vec::new();
    if let Some(root) = table.model().root() {
        if show_root {
            out.push(root);
            if table.is_expanded(root) {
                walk(table, root, &mut out);
            }
        } else {
            walk(table, root, &mut out);
        }
    }
    out
}

/// Applies `changes` to a row count the way a host would; `None` after a full reset.
fn mirrored_count(mut count: usize, changes: &[RowChange]) -> Option<usize> {
    for change in changes {
        match change {
            RowChange::Inserted(range) => count += range.len(),
            RowChange::Deleted(range) => count = count.checked_sub(range.len())?,
            RowChange::Updated(_) => {}
            RowChange::ModelChanged => return None,
        }
    }
    Some(count)
}

proptest! {
    #[test]
    fn rows_follow_tree_with_lazy_loader(show_root in any::<bool>(), ops in prop::collection::vec(op_strategy(), 1..40)) {
        let (mut tree, root) = Tree::with_root("root");
        tree.insert_node("top", root, true).unwrap();
        let options = TableOptions {
            show_root,
            ..TableOptions::default()
        };
        let mut table = TreeTable::with_options(tree, NameColumn, options);
        table.add_expansion_listener(Grower);
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        table.subscribe(move |change: &RowChange| sink.borrow_mut().push(change.clone()));

        for op in ops {
            let before = table.row_count();
            log.borrow_mut().clear();
            let reachable = |table: &Table, node: Index| {
                (!show_root && table.model().root() == Some(node)) || table.view_row_of_node(node).unwrap().is_some()
            };
            match op {
                Op::Toggle(n) => {
                    let Some(node) = pick(&table, n) else { continue };
                    if !reachable(&table, node) {
                        continue;
                    }
                    table.toggle(node).unwrap();
                }
                Op::ExpandAll(n) => {
                    let Some(node) = pick(&table, n) else { continue };
                    if !reachable(&table, node) {
                        continue;
                    }
                    table.expand_all(node).unwrap();
                }
                Op::CollapseAll(n) => {
                    let Some(node) = pick(&table, n) else { continue };
                    if !reachable(&table, node) {
                        continue;
                    }
                    table.collapse_all(node).unwrap();
                }
                Op::Append { parent, container } => {
                    let Some(parent) = pick(&table, parent) else { continue };
                    if !table.model().allows_children(parent) {
                        continue;
                    }
                    table.append_child(parent, "node", container).unwrap();
                }
                Op::Remove(n) => {
                    let Some(node) = pick(&table, n) else { continue };
                    table.remove_node(node).unwrap();
                }
            }

            let actual: Vec<Index> = (0..table.row_count())
                .map(|view| table.node_at_view_row(view).unwrap())
                .collect();
            prop_assert_eq!(actual, expected_nodes(&table, show_root));
            if let Some(count) = mirrored_count(before, &log.borrow()) {
                prop_assert_eq!(count, table.row_count());
            }
        }
    }
}
