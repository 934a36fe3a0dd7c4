//! Directory hierarchies as tree-table models.
//!
//! `load_tree` reads a directory with walkdir into a `TreeArena<FileEntry>`, down to
//! an optional depth. Directories below that depth stay unloaded but expandable;
//! `LazyDirLoader` reads them one level at a time when they are expanded.

use std::collections::HashMap;
use std::fmt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use generational_arena::Index;
use tracing::{debug, instrument, warn};
use walkdir::{DirEntry, WalkDir};

use crate::domain::column::ColumnModel;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::listener::{Direction, ExpansionEvent, ExpansionListener};
use crate::domain::node::{TreeArena, TreeModel};
use crate::domain::value::CellValue;
use crate::infrastructure::error::{InfraError, InfraResult};
use crate::util::path::display_name;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub path: PathBuf,
    /// Bytes; for directories the total of everything below
    pub size: u64,
    pub is_dir: bool,
    pub modified: Option<DateTime<Utc>>,
    /// Directory entries have been read into the tree
    pub loaded: bool,
}

impl FileEntry {
    fn new(path: &Path, metadata: &Metadata) -> Self {
        Self {
            name: display_name(path),
            path: path.to_path_buf(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            is_dir: metadata.is_dir(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            loaded: false,
        }
    }

    /// Extension for files, "dir" for directories.
    pub fn kind(&self) -> String {
        if self.is_dir {
            return "dir".to_string();
        }
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "file".to_string())
    }
}

impl fmt::Display for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dir {
            write!(f, "{}/", self.name.trim_end_matches('/'))
        } else {
            f.write_str(&self.name)
        }
    }
}

pub type FileTree = TreeArena<FileEntry>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanOptions {
    /// Levels read below the root; None reads everything
    pub max_depth: Option<usize>,
    pub include_hidden: bool,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_str().is_some_and(|s| s.starts_with('.'))
}

/// Sum of file sizes below `dir`. Unreadable entries are skipped.
fn disk_usage(dir: &Path, include_hidden: bool) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| include_hidden || !is_hidden(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Reads `root` into a tree of file entries.
#[instrument(level = "debug")]
pub fn load_tree(root: &Path, options: &ScanOptions) -> InfraResult<FileTree> {
    let metadata =
        std::fs::metadata(root).map_err(|e| InfraError::io(format!("read {}", root.display()), e))?;
    if !metadata.is_dir() {
        return Err(InfraError::walk(root, "not a directory"));
    }

    let (mut tree, root_idx) = FileTree::with_root(FileEntry::new(root, &metadata));
    let mut dirs: HashMap<PathBuf, Index> = HashMap::new();
    dirs.insert(root.to_path_buf(), root_idx);

    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name();
    if let Some(depth) = options.max_depth {
        walker = walker.max_depth(depth);
    }
    for entry in walker
        .into_iter()
        .filter_entry(|e| options.include_hidden || !is_hidden(e))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() > 0 => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
            Err(e) => return Err(InfraError::walk(root, e)),
        };
        let parent_path = entry
            .path()
            .parent()
            .ok_or_else(|| InfraError::walk(entry.path(), "entry without parent"))?;
        let parent = *dirs
            .get(parent_path)
            .ok_or_else(|| InfraError::walk(entry.path(), "parent directory not loaded"))?;
        let metadata = entry
            .metadata()
            .map_err(|e| InfraError::walk(entry.path(), e))?;

        let mut data = FileEntry::new(entry.path(), &metadata);
        if data.is_dir && options.max_depth.is_some_and(|d| entry.depth() >= d) {
            data.size = disk_usage(entry.path(), options.include_hidden);
        }
        let is_dir = data.is_dir;
        let idx = tree.insert_node(data, parent, is_dir)?;
        if is_dir {
            dirs.insert(entry.path().to_path_buf(), idx);
        }
    }

    mark_loaded(&mut tree, options.max_depth);
    recompute_sizes(&mut tree);
    debug!(nodes = tree.len(), root = %root.display(), "tree loaded");
    Ok(tree)
}

fn mark_loaded(tree: &mut FileTree, max_depth: Option<usize>) {
    let dirs: Vec<(Index, usize)> = tree
        .iter()
        .filter(|(_, node)| node.data.is_dir)
        .map(|(idx, _)| (idx, tree.depth(idx)))
        .collect();
    for (idx, depth) in dirs {
        if let Some(entry) = tree.data_mut(idx) {
            entry.loaded = max_depth.map_or(true, |d| depth < d);
        }
    }
}

/// Bottom-up: every loaded directory's size becomes the total of its children.
pub fn recompute_sizes(tree: &mut FileTree) {
    let order: Vec<Index> = tree.iter_postorder().map(|(idx, _)| idx).collect();
    for idx in order {
        let total: u64 = tree
            .children(idx)
            .iter()
            .filter_map(|&child| tree.data(child))
            .map(|entry| entry.size)
            .sum();
        if let Some(entry) = tree.data_mut(idx) {
            if entry.is_dir && entry.loaded {
                entry.size = total;
            }
        }
    }
}

/// Reads one level of a directory into the tree.
fn load_children(tree: &mut FileTree, node: Index, include_hidden: bool) -> InfraResult<usize> {
    let path = tree
        .data(node)
        .map(|entry| entry.path.clone())
        .ok_or_else(|| DomainError::unknown_node(node))?;
    let mut count = 0;
    for entry in WalkDir::new(&path)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| include_hidden || !is_hidden(e))
    {
        let entry = entry.map_err(|e| InfraError::walk(&path, e))?;
        let metadata = entry
            .metadata()
            .map_err(|e| InfraError::walk(entry.path(), e))?;
        let mut data = FileEntry::new(entry.path(), &metadata);
        if data.is_dir {
            data.size = disk_usage(entry.path(), include_hidden);
        }
        let is_dir = data.is_dir;
        tree.insert_node(data, node, is_dir)?;
        count += 1;
    }
    if let Some(entry) = tree.data_mut(node) {
        entry.loaded = true;
    }
    Ok(count)
}

/// Loads unread directories when they are expanded; empty ones become leaves.
#[derive(Debug, Default)]
pub struct LazyDirLoader {
    pub include_hidden: bool,
}

impl ExpansionListener<FileTree> for LazyDirLoader {
    fn on_expansion(&mut self, model: &mut FileTree, event: &ExpansionEvent<Index>) -> DomainResult<()> {
        if event.direction != Direction::Expanding {
            return Ok(());
        }
        let unloaded = model.data(event.node).is_some_and(|e| e.is_dir && !e.loaded);
        if !unloaded {
            return Ok(());
        }
        let count = load_children(model, event.node, self.include_hidden).map_err(|e| {
            warn!(node = ?event.node, error = ?e, "directory load failed");
            DomainError::Listener(e.to_string())
        })?;
        debug!(node = ?event.node, count, "directory loaded");
        if count == 0 {
            model.set_allows_children(event.node, false)?;
        }
        Ok(())
    }
}

/// Name, size, kind and modification time of file entries.
///
/// Names can be edited in memory; nothing is written to disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileColumns;

impl FileColumns {
    pub const NAME: usize = 0;
    pub const SIZE: usize = 1;
    pub const KIND: usize = 2;
    pub const MODIFIED: usize = 3;

    const NAMES: [&'static str; 4] = ["Name", "Size", "Kind", "Modified"];

    /// Column index for a header name, case-insensitive.
    pub fn column_index(name: &str) -> Option<usize> {
        Self::NAMES.iter().position(|n| n.eq_ignore_ascii_case(name))
    }
}

impl ColumnModel<FileTree> for FileColumns {
    fn column_count(&self) -> usize {
        Self::NAMES.len()
    }

    fn column_name(&self, column: usize) -> &str {
        Self::NAMES.get(column).copied().unwrap_or("")
    }

    fn value(&self, model: &FileTree, node: Index, column: usize) -> CellValue {
        let Some(entry) = model.data(node) else {
            return CellValue::Null;
        };
        match column {
            Self::NAME => CellValue::Text(entry.name.clone()),
            Self::SIZE => CellValue::UInt(entry.size),
            Self::KIND => CellValue::Text(entry.kind()),
            Self::MODIFIED => entry.modified.map(CellValue::Time).unwrap_or(CellValue::Null),
            _ => CellValue::Null,
        }
    }

    fn is_editable(&self, _model: &FileTree, _node: Index, column: usize) -> bool {
        column == Self::NAME
    }

    fn set_value(&self, model: &mut FileTree, node: Index, column: usize, value: CellValue) -> DomainResult<()> {
        if column != Self::NAME {
            return Err(DomainError::ReadOnlyColumn(column));
        }
        let name = match value {
            CellValue::Text(name) if !name.trim().is_empty() => name,
            other => {
                return Err(DomainError::InvalidValue {
                    column,
                    message: format!("expected a non-empty name, got {other:?}"),
                })
            }
        };
        let entry = model
            .data_mut(node)
            .ok_or_else(|| DomainError::unknown_node(node))?;
        entry.name = name;
        Ok(())
    }
}
