//! Sort keys and the header-click toggle policy.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::error::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    Ascending,
    Descending,
    Unsorted,
}

impl SortOrder {
    /// Next order on a repeated click: ascending, descending, unsorted, ascending, ...
    pub fn cycle(self) -> Self {
        match self {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Unsorted,
            SortOrder::Unsorted => SortOrder::Ascending,
        }
    }

    pub fn is_sorted(self) -> bool {
        self != SortOrder::Unsorted
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Ascending),
            "desc" | "descending" => Ok(SortOrder::Descending),
            "none" | "unsorted" => Ok(SortOrder::Unsorted),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
            SortOrder::Unsorted => "none",
        })
    }
}

/// One level of a multi-column sort. The first key in a list is primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortKey {
    pub column: usize,
    pub order: SortOrder,
}

impl SortKey {
    pub fn new(column: usize, order: SortOrder) -> Self {
        Self { column, order }
    }

    pub fn ascending(column: usize) -> Self {
        Self::new(column, SortOrder::Ascending)
    }

    pub fn descending(column: usize) -> Self {
        Self::new(column, SortOrder::Descending)
    }
}

/// Where a newly clicked column enters the key list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NewColumnPlacement {
    #[default]
    AlwaysFirst,
    FirstIfRoom,
    AlwaysLast,
    LastIfRoom,
}

/// What a click on a column already in the key list does to its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReclickBehavior {
    #[default]
    MakePrimary,
    KeepPosition,
}

/// Which keys go away when a key cycles to unsorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnsortedRemoval {
    #[default]
    RemoveKey,
    RemoveTrailing,
    ClearAll,
}

/// Parameters of the sort-key toggle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortPolicy {
    pub placement: NewColumnPlacement,
    pub reclick: ReclickBehavior,
    pub removal: UnsortedRemoval,
    /// At least 1
    pub max_keys: usize,
}

impl Default for SortPolicy {
    fn default() -> Self {
        Self {
            placement: NewColumnPlacement::default(),
            reclick: ReclickBehavior::default(),
            removal: UnsortedRemoval::default(),
            max_keys: 3,
        }
    }
}

impl SortPolicy {
    /// Applies one header click on `column` to `keys`.
    pub fn toggle(&self, keys: &mut Vec<SortKey>, column: usize) {
        let max_keys = self.max_keys.max(1);
        match keys.iter().position(|k| k.column == column) {
            Some(position) => {
                let order = keys[position].order.cycle();
                if order.is_sorted() {
                    match self.reclick {
                        ReclickBehavior::MakePrimary => {
                            keys.remove(position);
                            keys.insert(0, SortKey::new(column, order));
                        }
                        ReclickBehavior::KeepPosition => keys[position].order = order,
                    }
                } else {
                    match self.removal {
                        UnsortedRemoval::RemoveKey => {
                            keys.remove(position);
                        }
                        UnsortedRemoval::RemoveTrailing => keys.truncate(position),
                        UnsortedRemoval::ClearAll => keys.clear(),
                    }
                }
            }
            None => {
                let key = SortKey::ascending(column);
                let full = keys.len() >= max_keys;
                match self.placement {
                    NewColumnPlacement::AlwaysFirst => {
                        keys.insert(0, key);
                        keys.truncate(max_keys);
                    }
                    NewColumnPlacement::AlwaysLast => {
                        if full {
                            // evict the lowest-priority existing key
                            keys.truncate(max_keys - 1);
                        }
                        keys.push(key);
                    }
                    NewColumnPlacement::FirstIfRoom => {
                        if full {
                            keys[0] = key;
                        } else {
                            keys.insert(0, key);
                        }
                    }
                    NewColumnPlacement::LastIfRoom => {
                        if full {
                            let last = keys.len() - 1;
                            keys[last] = key;
                        } else {
                            keys.push(key);
                        }
                    }
                }
            }
        }
        debug!(column, ?keys, "sort keys toggled");
    }
}

/// Checks column bounds and that no column appears twice.
pub fn validate_keys(keys: &[SortKey], column_count: usize) -> DomainResult<()> {
    let mut seen = HashSet::new();
    for key in keys {
        if key.column >= column_count {
            return Err(DomainError::ColumnOutOfRange {
                column: key.column,
                count: column_count,
            });
        }
        if !seen.insert(key.column) {
            return Err(DomainError::DuplicateSortColumn(key.column));
        }
    }
    Ok(())
}

/// True when at least one key actually orders rows.
pub fn any_active(keys: &[SortKey]) -> bool {
    keys.iter().any(|k| k.order.is_sorted())
}
