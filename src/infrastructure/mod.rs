//! Infrastructure layer: filesystem-backed tree models
//!
//! This layer reads directory hierarchies from disk into the domain's tree types.

pub mod error;
pub mod fs_tree;

pub use error::{InfraError, InfraResult};
pub use fs_tree::{load_tree, FileColumns, FileEntry, FileTree, LazyDirLoader, ScanOptions};
