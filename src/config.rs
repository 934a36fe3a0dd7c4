//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/treegrid/treegrid.toml`
//! 3. Explicit config file (`--config`)
//! 4. Environment variables: `TREEGRID_*` prefix, `__` between sections
//!    (e.g. `TREEGRID_SORTING__MAX_KEYS=2`)

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::{ApplicationError, TableOptions};
use crate::domain::sort_key::{NewColumnPlacement, ReclickBehavior, SortPolicy, UnsortedRemoval};
use crate::domain::sorter::DEFAULT_MAX_REPOSITION;
use crate::util::path::expand_path;

/// How the tree is shown when a table is first built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ViewConfig {
    /// Show the root node as the first row
    pub show_root: bool,
    /// Levels expanded below the top rows on load (0: nothing expanded)
    pub expand_depth: usize,
    /// Directories before files, ahead of any sort key
    pub containers_first: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            show_root: false,
            expand_depth: 1,
            containers_first: true,
        }
    }
}

/// Header-click policy and sorter limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SortingConfig {
    pub placement: NewColumnPlacement,
    pub reclick: ReclickBehavior,
    pub removal: UnsortedRemoval,
    pub max_keys: usize,
    /// Neighbour swaps allowed when one edited row moves
    pub max_reposition: usize,
}

impl Default for SortingConfig {
    fn default() -> Self {
        let policy = SortPolicy::default();
        Self {
            placement: policy.placement,
            reclick: policy.reclick,
            removal: policy.removal,
            max_keys: policy.max_keys,
            max_reposition: DEFAULT_MAX_REPOSITION,
        }
    }
}

impl SortingConfig {
    pub fn policy(&self) -> SortPolicy {
        SortPolicy {
            placement: self.placement,
            reclick: self.reclick,
            removal: self.removal,
            max_keys: self.max_keys,
        }
    }
}

/// Raw settings for intermediate parsing; `None` means "not specified, inherit".
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub view: RawViewConfig,
    pub sorting: RawSortingConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawViewConfig {
    pub show_root: Option<bool>,
    pub expand_depth: Option<usize>,
    pub containers_first: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSortingConfig {
    pub placement: Option<NewColumnPlacement>,
    pub reclick: Option<ReclickBehavior>,
    pub removal: Option<UnsortedRemoval>,
    pub max_keys: Option<usize>,
    pub max_reposition: Option<usize>,
}

/// Unified configuration for treegrid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Settings {
    pub view: ViewConfig,
    pub sorting: SortingConfig,
}

/// Get the XDG config directory for treegrid.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "treegrid").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("treegrid.toml"))
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ApplicationError::config(format!("read {}: {}", path.display(), e)))?;
    toml::from_str(&content).map_err(|e| ApplicationError::config(format!("parse {}: {}", path.display(), e)))
}

impl Settings {
    /// Overlay wins where it specifies a value.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        let view = &overlay.view;
        let sorting = &overlay.sorting;
        Self {
            view: ViewConfig {
                show_root: view.show_root.unwrap_or(self.view.show_root),
                expand_depth: view.expand_depth.unwrap_or(self.view.expand_depth),
                containers_first: view.containers_first.unwrap_or(self.view.containers_first),
            },
            sorting: SortingConfig {
                placement: sorting.placement.unwrap_or(self.sorting.placement),
                reclick: sorting.reclick.unwrap_or(self.sorting.reclick),
                removal: sorting.removal.unwrap_or(self.sorting.removal),
                max_keys: sorting.max_keys.unwrap_or(self.sorting.max_keys),
                max_reposition: sorting.max_reposition.unwrap_or(self.sorting.max_reposition),
            },
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `explicit` - Optional config file given on the command line; must exist.
    ///   `~` and `$VAR` are expanded.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ApplicationError> {
        Self::load_layers(global_config_path().as_deref(), explicit)
    }

    /// Same as `load`, with the global config location supplied by the caller.
    pub fn load_layers(global: Option<&Path>, explicit: Option<&Path>) -> Result<Self, ApplicationError> {
        // 1. Start with defaults
        let mut current = Self::default();

        // 2. Global config, if present
        if let Some(global_path) = global {
            if global_path.exists() {
                debug!(path = %global_path.display(), "loading global config");
                current = current.merge_with(&load_raw_settings(global_path)?);
            }
        }

        // 3. Explicit config file
        if let Some(path) = explicit {
            let path = expand_path(path);
            if !path.exists() {
                return Err(ApplicationError::config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            debug!(path = %path.display(), "loading explicit config");
            current = current.merge_with(&load_raw_settings(&path)?);
        }

        // 4. Environment variables
        current = Self::apply_env_overrides(current)?;

        current.validate()?;
        Ok(current)
    }

    /// Apply TREEGRID_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("TREEGRID")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get_bool("view.show_root") {
            settings.view.show_root = val;
        }
        if let Ok(val) = config.get_int("view.expand_depth") {
            settings.view.expand_depth = to_usize("view.expand_depth", val)?;
        }
        if let Ok(val) = config.get_bool("view.containers_first") {
            settings.view.containers_first = val;
        }
        if let Ok(val) = config.get_string("sorting.placement") {
            settings.sorting.placement = parse_setting("sorting.placement", val)?;
        }
        if let Ok(val) = config.get_string("sorting.reclick") {
            settings.sorting.reclick = parse_setting("sorting.reclick", val)?;
        }
        if let Ok(val) = config.get_string("sorting.removal") {
            settings.sorting.removal = parse_setting("sorting.removal", val)?;
        }
        if let Ok(val) = config.get_int("sorting.max_keys") {
            settings.sorting.max_keys = to_usize("sorting.max_keys", val)?;
        }
        if let Ok(val) = config.get_int("sorting.max_reposition") {
            settings.sorting.max_reposition = to_usize("sorting.max_reposition", val)?;
        }

        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ApplicationError> {
        if self.sorting.max_keys == 0 {
            return Err(ApplicationError::config("sorting.max_keys must be at least 1"));
        }
        Ok(())
    }

    /// Engine options derived from these settings.
    pub fn table_options(&self) -> TableOptions {
        TableOptions {
            show_root: self.view.show_root,
            policy: self.sorting.policy(),
            max_reposition: self.sorting.max_reposition,
            containers_first: self.view.containers_first,
        }
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::config(format!("serialize config: {e}")))
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# treegrid configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/treegrid/treegrid.toml
#   Explicit: --config <FILE>
#   Env:    TREEGRID_* environment variables, e.g. TREEGRID_VIEW__SHOW_ROOT=true

[view]
# Show the root directory as the first row
# show_root = false

# Levels expanded below the top rows when a table is built
# expand_depth = 1

# Directories before files, ahead of any sort key
# containers_first = true

[sorting]
# Where a newly clicked column enters the sort keys:
# always-first | first-if-room | always-last | last-if-room
# placement = "always-first"

# Clicking a column that is already a key: make-primary | keep-position
# reclick = "make-primary"

# When a key cycles to unsorted: remove-key | remove-trailing | clear-all
# removal = "remove-key"

# Maximum number of sort keys (at least 1)
# max_keys = 3

# Neighbour swaps allowed when an edited row moves before a full re-sort
# max_reposition = 64
"#
        .to_string()
    }
}

fn parse_setting<T: DeserializeOwned>(key: &str, value: String) -> Result<T, ApplicationError> {
    toml::Value::String(value)
        .try_into()
        .map_err(|e| ApplicationError::config(format!("{key}: {e}")))
}

fn to_usize(key: &str, value: i64) -> Result<usize, ApplicationError> {
    usize::try_from(value).map_err(|_| ApplicationError::config(format!("{key}: expected a non-negative number, got {value}")))
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
