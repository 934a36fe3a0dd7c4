//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueHint};

use crate::domain::SortOrder;

/// Browse a directory as a tree table: expand/collapse rows and sort them without
/// breaking the hierarchy
#[derive(Parser, Debug)]
#[command(name = "treegrid")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output, repeat for more (-d info, -dd debug, -ddd trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub debug: u8,

    /// Config file layered over the global one
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a directory as a sorted tree table
    Show(ShowArgs),

    /// Print the directory hierarchy
    Tree {
        /// Directory
        #[arg(value_hint = ValueHint::DirPath)]
        dir: PathBuf,
        /// Include hidden entries
        #[arg(short, long)]
        all: bool,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct ShowArgs {
    /// Directory
    #[arg(value_hint = ValueHint::DirPath)]
    pub dir: PathBuf,

    /// Sort key COLUMN[:asc|desc], primary first (columns: name, size, kind, modified)
    #[arg(short, long = "sort", value_name = "COLUMN[:ORDER]", value_parser = parse_sort_arg)]
    pub sort: Vec<SortArg>,

    /// Header clicks applied after --sort, in order
    #[arg(long = "click", value_name = "COLUMN")]
    pub click: Vec<String>,

    /// Levels expanded below the top rows
    #[arg(long)]
    pub depth: Option<usize>,

    /// Levels read from disk up front; deeper directories load when expanded
    #[arg(long)]
    pub scan_depth: Option<usize>,

    /// Show the root directory as the first row
    #[arg(long, conflicts_with = "hide_root")]
    pub show_root: bool,

    /// Hide the root directory
    #[arg(long)]
    pub hide_root: bool,

    /// Collapse entries with this name after expanding
    #[arg(long = "collapse", value_name = "NAME")]
    pub collapse: Vec<String>,

    /// Directories before files
    #[arg(long)]
    pub dirs_first: bool,

    /// Include hidden entries
    #[arg(short, long)]
    pub all: bool,
}

/// One `--sort` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortArg {
    pub column: String,
    pub order: SortOrder,
}

pub fn parse_sort_arg(s: &str) -> Result<SortArg, String> {
    let (column, order) = match s.split_once(':') {
        Some((column, order)) => (column, order.parse::<SortOrder>()?),
        None => (s, SortOrder::Ascending),
    };
    if column.is_empty() {
        return Err(format!("missing column in sort key: {s}"));
    }
    Ok(SortArg {
        column: column.to_string(),
        order,
    })
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Show config paths
    Path,

    /// Print a config template
    Template,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("size", "size", SortOrder::Ascending)]
    #[case("size:desc", "size", SortOrder::Descending)]
    #[case("Name:ASC", "Name", SortOrder::Ascending)]
    fn given_sort_text_when_parsing_then_column_and_order(
        #[case] text: &str,
        #[case] column: &str,
        #[case] order: SortOrder,
    ) {
        let arg = parse_sort_arg(text).unwrap();
        assert_eq!(arg.column, column);
        assert_eq!(arg.order, order);
    }

    #[rstest]
    #[case(":desc")]
    #[case("size:sideways")]
    fn given_malformed_sort_text_when_parsing_then_error(#[case] text: &str) {
        assert!(parse_sort_arg(text).is_err());
    }

    #[test]
    fn given_show_command_when_parsing_then_repeated_flags_collected() {
        let cli = Cli::parse_from([
            "treegrid", "show", "/tmp", "--sort", "size:desc", "--sort", "name", "--click", "kind", "-dd",
        ]);
        assert_eq!(cli.debug, 2);
        match cli.command {
            Some(Commands::Show(args)) => {
                assert_eq!(args.sort.len(), 2);
                assert_eq!(args.click, vec!["kind".to_string()]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
