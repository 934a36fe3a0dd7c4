//! Command dispatch and the terminal host for the tree table

use std::io;
use std::path::Path;

use clap::CommandFactory;
use clap_complete::generate;
use colored::Colorize;
use generational_arena::Index;
use itertools::Itertools;
use tracing::{debug, instrument};

use crate::application::TreeTable;
use crate::cli::args::{Cli, Commands, ConfigCommands, ShowArgs};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{global_config_path, Settings};
use crate::domain::{RowChange, SortKey, SortOrder, TreeModel};
use crate::infrastructure::{load_tree, FileColumns, FileTree, InfraError, LazyDirLoader, ScanOptions};
use crate::tree_traits::TreeNodeConvert;
use crate::util::path::expand_path;

pub type FileTable = TreeTable<FileTree, FileColumns>;

pub fn execute(cli: Cli) -> CliResult<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    debug!(?settings, "settings loaded");
    match cli.command {
        Some(Commands::Show(args)) => cmd_show(&settings, &args),
        Some(Commands::Tree { dir, all }) => cmd_tree(&dir, all),
        Some(Commands::Config { command }) => cmd_config(&settings, cli.config.as_deref(), &command),
        Some(Commands::Completion { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        None => {
            Cli::command()
                .print_help()
                .map_err(|e| InfraError::io("print help", e))?;
            Ok(())
        }
    }
}

fn resolve_column(name: &str) -> CliResult<usize> {
    FileColumns::column_index(name).ok_or_else(|| CliError::InvalidArgs(format!("unknown column: {name}")))
}

/// Loads the directory and applies expansion, collapses and sort keys from `args`.
#[instrument(level = "debug", skip(settings))]
pub fn build_table(settings: &Settings, args: &ShowArgs) -> CliResult<FileTable> {
    if args.scan_depth == Some(0) {
        return Err(CliError::InvalidArgs("--scan-depth must be at least 1".to_string()));
    }
    let dir = expand_path(&args.dir);
    let scan = ScanOptions {
        max_depth: args.scan_depth,
        include_hidden: args.all,
    };
    let tree = load_tree(&dir, &scan)?;

    let mut options = settings.table_options();
    if args.show_root {
        options.show_root = true;
    }
    if args.hide_root {
        options.show_root = false;
    }
    if args.dirs_first {
        options.containers_first = true;
    }
    let mut table = TreeTable::with_options(tree, FileColumns, options);
    table.add_expansion_listener(LazyDirLoader {
        include_hidden: args.all,
    });
    table.subscribe(|change: &RowChange| debug!(delta = change.row_delta(), ?change, "host notified"));

    expand_to_depth(&mut table, args.depth.unwrap_or(settings.view.expand_depth))?;
    for name in &args.collapse {
        collapse_named(&mut table, name)?;
    }

    let keys = args
        .sort
        .iter()
        .map(|arg| resolve_column(&arg.column).map(|column| SortKey::new(column, arg.order)))
        .collect::<CliResult<Vec<_>>>()?;
    if !keys.is_empty() {
        table.set_sort_keys(keys)?;
    }
    for column in &args.click {
        table.toggle_sort_order(resolve_column(column)?)?;
    }
    Ok(table)
}

/// Expands `depth` levels below the top rows, level by level.
///
/// A hidden root is always expanded and does not count as a level.
fn expand_to_depth(table: &mut FileTable, depth: usize) -> CliResult<()> {
    let mut frontier: Vec<Index> = match table.model().root() {
        Some(root) if !table.show_root() => table.model().children(root).to_vec(),
        Some(root) => vec![root],
        None => Vec::new(),
    };
    for _ in 0..depth {
        let mut next = Vec::new();
        for node in frontier {
            if !table.model().allows_children(node) {
                continue;
            }
            table.expand(node)?;
            next.extend_from_slice(table.model().children(node));
        }
        frontier = next;
    }
    Ok(())
}

/// Collapses displayed entries called `name`; returns how many were collapsed.
fn collapse_named(table: &mut FileTable, name: &str) -> CliResult<usize> {
    let targets = table
        .model()
        .iter()
        .filter(|(_, node)| node.data.name == name)
        .map(|(idx, _)| idx)
        .collect_vec();
    let mut collapsed = 0;
    for node in targets {
        // an earlier collapse may have hidden this one
        if table.is_visible(node) && table.collapse(node)?.is_applied() {
            collapsed += 1;
        }
    }
    if collapsed == 0 {
        output::warning(&format!("no expanded entry named {name}"));
    }
    Ok(collapsed)
}

/// One printed row: name (indented, with expansion marker), size, kind, modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRow {
    pub cells: [String; 4],
    pub is_dir: bool,
}

/// Column headers with sort indicators; the key priority is shown for multi-key sorts.
pub fn header_cells(table: &FileTable) -> CliResult<Vec<String>> {
    let keys = table.sort_keys();
    (0..table.column_count())
        .map(|column| -> CliResult<String> {
            let name = table.column_name(column)?;
            let indicator = keys
                .iter()
                .find_position(|k| k.column == column && k.order != SortOrder::Unsorted)
                .map(|(priority, key)| {
                    let arrow = if key.order == SortOrder::Ascending { "▲" } else { "▼" };
                    if keys.len() > 1 {
                        format!(" {arrow}{}", priority + 1)
                    } else {
                        format!(" {arrow}")
                    }
                })
                .unwrap_or_default();
            Ok(format!("{name}{indicator}"))
        })
        .collect()
}

/// Rows in view order, as plain text.
pub fn render_rows(table: &FileTable) -> CliResult<Vec<RenderedRow>> {
    let base_depth = if table.show_root() { 0 } else { 1 };
    (0..table.row_count())
        .map(|view_row| -> CliResult<RenderedRow> {
            let node = table.node_at_view_row(view_row)?;
            let depth = table.depth_at(view_row)?.saturating_sub(base_depth);
            let marker = if table.is_leaf(node) {
                "  "
            } else if table.is_expanded(node) {
                "▾ "
            } else {
                "▸ "
            };
            let entry = table
                .model()
                .data(node)
                .ok_or_else(|| CliError::Usage(format!("row {view_row} has no entry")))?;
            let modified = table.value_at(view_row, FileColumns::MODIFIED)?;
            Ok(RenderedRow {
                cells: [
                    format!("{}{marker}{}", "  ".repeat(depth), entry.name),
                    output::format_size(entry.size),
                    table.value_at(view_row, FileColumns::KIND)?.to_string(),
                    modified.to_string(),
                ],
                is_dir: entry.is_dir,
            })
        })
        .collect()
}

#[instrument(level = "debug", skip(settings))]
fn cmd_show(settings: &Settings, args: &ShowArgs) -> CliResult<()> {
    let table = build_table(settings, args)?;
    let header = header_cells(&table)?;
    let rows = render_rows(&table)?;

    let mut widths = header.iter().map(|h| h.chars().count()).collect_vec();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.cells.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }
    let pad = |cell: &str, width: usize, right: bool| {
        let fill = " ".repeat(width.saturating_sub(cell.chars().count()));
        if right {
            format!("{fill}{cell}")
        } else {
            format!("{cell}{fill}")
        }
    };

    output::header(
        &header
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(i, (h, &w))| pad(h, w, i == FileColumns::SIZE))
            .join("  "),
    );
    for row in &rows {
        let name = pad(&row.cells[0], widths[0], false);
        let name = if row.is_dir {
            name.blue().bold().to_string()
        } else {
            name
        };
        let rest = row.cells[1..]
            .iter()
            .zip(&widths[1..])
            .enumerate()
            .map(|(i, (cell, &w))| pad(cell, w, i + 1 == FileColumns::SIZE))
            .join("  ");
        output::info(&format!("{name}  {rest}"));
    }
    Ok(())
}

#[instrument(level = "debug")]
fn cmd_tree(dir: &Path, all: bool) -> CliResult<()> {
    let scan = ScanOptions {
        max_depth: None,
        include_hidden: all,
    };
    let tree = load_tree(&expand_path(dir), &scan)?;
    output::info(&tree.to_tree_string());
    Ok(())
}

fn cmd_config(settings: &Settings, explicit: Option<&Path>, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => output::info(&settings.to_toml()?),
        ConfigCommands::Path => {
            match global_config_path() {
                Some(path) => {
                    let state = if path.exists() { "found" } else { "not found" };
                    output::detail(&format!("global:   {} ({state})", path.display()));
                }
                None => output::warning("no config directory on this platform"),
            }
            if let Some(path) = explicit {
                output::detail(&format!("explicit: {}", expand_path(path).display()));
            }
        }
        ConfigCommands::Template => output::info(&Settings::template()),
    }
    Ok(())
}
